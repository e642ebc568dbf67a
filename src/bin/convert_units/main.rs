use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use error_stack::ResultExt;

use colconv_rs::{
    dobson::{mmr_to_dobson, StandardConditions, TraceGas},
    fields::{FieldCollection, GriddedField},
    io,
    logging::init_logging,
    units::TargetUnit,
};

fn main() -> ExitCode {
    let clargs = Cli::parse();
    init_logging(clargs.verbosity.log_level_filter());
    if let Err(e) = driver(clargs) {
        eprintln!("ERROR: {e:?}");
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// Convert a trace-gas mass-mixing-ratio field in a gridded model-output
/// file into a column amount in Dobson Units, for comparison against
/// reference datasets that use that convention.
#[derive(Debug, clap::Parser)]
struct Cli {
    /// Input file to process.
    #[clap(short = 'i', long)]
    input_file: PathBuf,

    /// Transformed output file.
    #[clap(short = 'o', long)]
    output_file: PathBuf,

    /// Units to convert to.
    #[clap(short = 'f', long, default_value_t = TargetUnit::DobsonUnits)]
    format: TargetUnit,

    /// Name fragment identifying the air-mass-per-cell field in the input.
    /// Must match exactly one field name.
    #[clap(long, default_value = "AIR MASS DIAGNOSTIC (WHOLE")]
    air_mass_name: String,

    /// Name fragment identifying the trace-gas mass-mixing-ratio field.
    /// Must match exactly one field name; also labels the output field.
    #[clap(long, default_value = "O3")]
    gas_name: String,

    /// Molar mass of the trace gas in kg/mol.
    #[clap(long, default_value_t = 0.048)]
    molar_mass: f64,

    /// Name of the vertical coordinate to sum each column over.
    #[clap(long, default_value = "atmosphere_hybrid_height_coordinate")]
    vertical_coord: String,

    #[command(flatten)]
    verbosity: Verbosity<InfoLevel>,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("Error reading {}", .0.display())]
    ReadError(PathBuf),
    #[error("Could not identify the fields to convert")]
    FindField,
    #[error("Error converting to {0}")]
    Convert(TargetUnit),
    #[error("Error writing output {}", .0.display())]
    WriteError(PathBuf),
}

fn driver(clargs: Cli) -> error_stack::Result<(), CliError> {
    log::info!("Attempting to load file: {}", clargs.input_file.display());
    let collection = io::load(&clargs.input_file)
        .change_context_lazy(|| CliError::ReadError(clargs.input_file.clone()))?;

    let (air_mass, mixing_ratio) = locate_inputs(&collection, &clargs)?;

    let gas = TraceGas::new(&clargs.gas_name, clargs.molar_mass);
    let converted = match clargs.format {
        TargetUnit::DobsonUnits => mmr_to_dobson(
            air_mass,
            mixing_ratio,
            &gas,
            &StandardConditions::default(),
            &clargs.vertical_coord,
        )
        .change_context(CliError::Convert(clargs.format))?,
    };

    log::info!("Writing output to {}", clargs.output_file.display());
    io::save_field(&converted, &clargs.output_file)
        .change_context_lazy(|| CliError::WriteError(clargs.output_file.clone()))?;

    log::info!("All done");
    Ok(())
}

fn locate_inputs<'c>(
    collection: &'c FieldCollection,
    clargs: &Cli,
) -> error_stack::Result<(&'c GriddedField, &'c GriddedField), CliError> {
    let air_mass = collection
        .require_unique(&clargs.air_mass_name)
        .change_context(CliError::FindField)?;
    let mixing_ratio = collection
        .require_unique(&clargs.gas_name)
        .change_context(CliError::FindField)?;
    Ok((air_mass, mixing_ratio))
}

#[cfg(test)]
mod tests {
    use super::*;
    use colconv_rs::fields::Coordinate;
    use indexmap::IndexMap;
    use ndarray::{Array, Array1, IxDyn};

    fn test_output_dir() -> PathBuf {
        let out_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("test-data")
            .join("outputs");
        std::fs::create_dir_all(&out_dir).expect("Creating the output directory should not fail");
        out_dir
    }

    fn example_inputs() -> (GriddedField, GriddedField) {
        let level =
            Coordinate::new(Array1::from(vec![20.0, 1000.0, 15_000.0])).with_units("m");
        let lat = Coordinate::new(Array1::from(vec![-30.0, 30.0])).with_units("degrees");
        let lon =
            Coordinate::new(Array1::from(vec![60.0, 180.0, 300.0])).with_units("degrees");
        let coords = IndexMap::from([
            ("atmosphere_hybrid_height_coordinate".to_string(), level),
            ("latitude".to_string(), lat),
            ("longitude".to_string(), lon),
        ]);

        let air = GriddedField::new(
            "AIR MASS DIAGNOSTIC (WHOLE ATMOS)",
            "kg",
            Array::from_shape_fn(IxDyn(&[3, 2, 3]), |idx| {
                1e16 * (3.0 - idx[0] as f64) * (1.0 + 0.1 * idx[1] as f64 + 0.01 * idx[2] as f64)
            }),
            coords.clone(),
        )
        .unwrap();
        let mmr = GriddedField::new(
            "O3 MASS MIXING RATIO",
            "1",
            Array::from_shape_fn(IxDyn(&[3, 2, 3]), |idx| 1e-7 * (1.0 + idx[0] as f64)),
            coords,
        )
        .unwrap();
        (air, mmr)
    }

    #[test]
    fn test_driver_end_to_end() {
        let out_dir = test_output_dir();
        let input_file = out_dir.join("convert_units_input.nc");
        let output_file = out_dir.join("convert_units_output.nc");
        let _ = std::fs::remove_file(&output_file);

        let (air, mmr) = example_inputs();
        io::save_collection(&[air.clone(), mmr.clone()], &input_file)
            .expect("Writing the input file should not fail");

        let clargs = Cli {
            input_file,
            output_file: output_file.clone(),
            format: TargetUnit::DobsonUnits,
            air_mass_name: "AIR MASS DIAGNOSTIC (WHOLE".to_string(),
            gas_name: "O3".to_string(),
            molar_mass: 0.048,
            vertical_coord: "atmosphere_hybrid_height_coordinate".to_string(),
            verbosity: Verbosity::new(0, 0),
        };
        driver(clargs).expect("Running the conversion should not fail");

        let expected = mmr_to_dobson(
            &air,
            &mmr,
            &TraceGas::ozone(),
            &StandardConditions::default(),
            "atmosphere_hybrid_height_coordinate",
        )
        .unwrap();

        let written = io::load(&output_file).expect("Reading the output file should not fail");
        assert_eq!(written.len(), 1);
        let column = written.require_unique("O3 column amount").unwrap();
        assert_eq!(column.units, "DU");
        assert_eq!(column.data.shape(), &[2, 3]);
        assert!(column.coord("atmosphere_hybrid_height_coordinate").is_none());
        assert_eq!(column.data, expected.data);
    }

    #[test]
    fn test_unknown_format_is_rejected_at_parse_time() {
        let err = Cli::try_parse_from([
            "convert_units",
            "-i",
            "in.nc",
            "-o",
            "out.nc",
            "-f",
            "ppm",
        ])
        .unwrap_err();
        assert!(err.to_string().contains("ppm"));
    }
}
