//! Conversion of a trace-gas mass mixing ratio to a column amount in
//! Dobson Units.
//!
//! The chain is: mixing ratio (unitless) times air mass per cell (kg) gives
//! gas mass per cell; summing over the vertical coordinate gives the column
//! mass; dividing by the horizontal cell areas gives mass per unit area;
//! the ideal gas law (`pV = nRT`, `n = m/M`) turns that into the thickness
//! of the equivalent layer of pure gas at standard conditions; one Dobson
//! Unit is 10 um of that layer, so the thickness in meters scales by 1e5.

use error_stack::ResultExt;

use crate::area::cell_areas;
use crate::fields::GriddedField;

/// Tolerance for deciding that two fields' coordinate values agree.
const COORD_TOL: f64 = 1e-6;

/// Reference conditions and scale factors for the equivalent-layer
/// calculation. These are deliberately a value, not inline literals, so a
/// caller can convert against non-default reference conditions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StandardConditions {
    pub temperature_k: f64,
    pub pressure_pa: f64,
    /// J K^-1 mol^-1
    pub molar_gas_constant: f64,
    /// 1 DU = 10 um of pure gas, i.e. 1e5 DU per meter of layer thickness.
    pub dobson_per_meter: f64,
}

impl Default for StandardConditions {
    fn default() -> Self {
        Self {
            temperature_k: 273.15 + 25.0,
            pressure_pa: 101_325.0,
            molar_gas_constant: 8.314,
            dobson_per_meter: 1e5,
        }
    }
}

/// The gas being converted. Only the molar mass enters the arithmetic; the
/// formula labels the output field.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceGas {
    pub formula: String,
    pub molar_mass_kg_per_mol: f64,
}

impl TraceGas {
    pub fn new<S: ToString>(formula: S, molar_mass_kg_per_mol: f64) -> Self {
        Self {
            formula: formula.to_string(),
            molar_mass_kg_per_mol,
        }
    }

    /// Ozone, with the molar mass approximated from the molecular formula.
    pub fn ozone() -> Self {
        Self::new("O3", 3.0 * 16.0 * 1e-3)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("Molar mass must be a finite, positive value in kg/mol, got {0}")]
    BadMolarMass(f64),
    #[error("Standard {name} must be finite and positive, got {value}")]
    BadConditions { name: &'static str, value: f64 },
    #[error("'{air_mass}' has shape {air_mass_shape:?} but '{mixing_ratio}' has shape {mixing_ratio_shape:?}; both inputs must be on one grid")]
    ShapeMismatch {
        air_mass: String,
        air_mass_shape: Vec<usize>,
        mixing_ratio: String,
        mixing_ratio_shape: Vec<usize>,
    },
    #[error("'{air_mass}' and '{mixing_ratio}' have the same shape but different coordinates; both inputs must be on one grid")]
    CoordinateMismatch {
        air_mass: String,
        mixing_ratio: String,
    },
    #[error("Error summing the per-cell gas mass over the vertical coordinate")]
    CollapsingColumn,
    #[error("Error computing the horizontal cell areas")]
    CellAreas,
}

/// Convert a mass-mixing-ratio field to a column amount in Dobson Units.
///
/// `air_mass` holds the air mass per grid cell in kg and `mixing_ratio` the
/// unitless gas-to-air mass ratio, both on the same grid. `vertical_coord`
/// names the coordinate to collapse. Neither input is modified; the result
/// is a fresh field on the horizontal coordinates only, in units of `DU`.
///
/// Negative or NaN mixing ratios pass through arithmetically, so invalid
/// input shows up as invalid output rather than being hidden.
pub fn mmr_to_dobson(
    air_mass: &GriddedField,
    mixing_ratio: &GriddedField,
    gas: &TraceGas,
    conditions: &StandardConditions,
    vertical_coord: &str,
) -> error_stack::Result<GriddedField, ConvertError> {
    check_parameters(gas, conditions)?;
    check_one_grid(air_mass, mixing_ratio)?;

    // Mass mixing ratio (unitless) x air mass per cell (kg) -> gas mass per cell (kg)
    let gas_mass = GriddedField {
        name: format!("{} mass per cell", gas.formula),
        units: "kg".to_string(),
        data: &mixing_ratio.data * &air_mass.data,
        coords: mixing_ratio.coords.clone(),
    };

    log::debug!("Summing {} over '{vertical_coord}'", gas_mass.name);
    let column_mass = gas_mass
        .sum_over(vertical_coord)
        .change_context(ConvertError::CollapsingColumn)?;

    // Total column mass (kg) -> mass per unit area (kg m^-2)
    let areas = cell_areas(&column_mass).change_context(ConvertError::CellAreas)?;
    let mass_per_area = &column_mass.data / &areas;

    // pV = nRT with n = m / M  =>  V / A = (m/A) R T / (M p), a thickness in
    // meters, then 1e5 DU per meter.
    let meters_per_kg_m2 = conditions.molar_gas_constant * conditions.temperature_k
        / (gas.molar_mass_kg_per_mol * conditions.pressure_pa);
    let dobson = mass_per_area * (meters_per_kg_m2 * conditions.dobson_per_meter);

    Ok(GriddedField {
        name: format!("{} column amount", gas.formula),
        units: "DU".to_string(),
        data: dobson,
        coords: column_mass.coords,
    })
}

fn check_parameters(gas: &TraceGas, conditions: &StandardConditions) -> Result<(), ConvertError> {
    if !gas.molar_mass_kg_per_mol.is_finite() || gas.molar_mass_kg_per_mol <= 0.0 {
        return Err(ConvertError::BadMolarMass(gas.molar_mass_kg_per_mol));
    }
    let checks = [
        ("temperature", conditions.temperature_k),
        ("pressure", conditions.pressure_pa),
        ("molar gas constant", conditions.molar_gas_constant),
    ];
    for (name, value) in checks {
        if !value.is_finite() || value <= 0.0 {
            return Err(ConvertError::BadConditions { name, value });
        }
    }
    Ok(())
}

fn check_one_grid(air_mass: &GriddedField, mixing_ratio: &GriddedField) -> Result<(), ConvertError> {
    if air_mass.data.shape() != mixing_ratio.data.shape() {
        return Err(ConvertError::ShapeMismatch {
            air_mass: air_mass.name.clone(),
            air_mass_shape: air_mass.data.shape().to_vec(),
            mixing_ratio: mixing_ratio.name.clone(),
            mixing_ratio_shape: mixing_ratio.data.shape().to_vec(),
        });
    }
    if !air_mass.same_grid(mixing_ratio, COORD_TOL) {
        return Err(ConvertError::CoordinateMismatch {
            air_mass: air_mass.name.clone(),
            mixing_ratio: mixing_ratio.name.clone(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::area::EARTH_RADIUS_M;
    use crate::fields::Coordinate;
    use approx::assert_relative_eq;
    use indexmap::IndexMap;
    use ndarray::{arr2, Array, Array1, IxDyn};

    const VERTICAL: &str = "atmosphere_hybrid_height_coordinate";

    /// A single-column grid whose one horizontal cell has an area of
    /// exactly 1 m^2 (a 0-90 degree latitude band narrowed in longitude).
    fn single_column_coords(nlev: usize) -> IndexMap<String, Coordinate> {
        let lon_width_deg = (1.0 / (EARTH_RADIUS_M * EARTH_RADIUS_M)).to_degrees();
        IndexMap::from([
            (
                VERTICAL.to_string(),
                Coordinate::new(Array1::from_iter((0..nlev).map(|i| i as f64 * 1000.0)))
                    .with_units("m"),
            ),
            (
                "latitude".to_string(),
                Coordinate::new(Array1::from(vec![45.0]))
                    .with_units("degrees")
                    .with_bounds(arr2(&[[0.0, 90.0]])),
            ),
            (
                "longitude".to_string(),
                Coordinate::new(Array1::from(vec![lon_width_deg / 2.0]))
                    .with_units("degrees")
                    .with_bounds(arr2(&[[0.0, lon_width_deg]])),
            ),
        ])
    }

    fn column_field(name: &str, units: &str, per_level: &[f64]) -> GriddedField {
        let coords = single_column_coords(per_level.len());
        let data = Array::from_shape_vec(IxDyn(&[per_level.len(), 1, 1]), per_level.to_vec())
            .unwrap();
        GriddedField::new(name, units, data, coords).unwrap()
    }

    fn run(air: &GriddedField, mmr: &GriddedField) -> GriddedField {
        mmr_to_dobson(
            air,
            mmr,
            &TraceGas::ozone(),
            &StandardConditions::default(),
            VERTICAL,
        )
        .unwrap()
    }

    #[test]
    fn test_known_single_cell_value() {
        // 1 kg of pure gas over 1 m^2: (1/0.048) * 8.314 * 298.15 / 101325
        // meters of layer, i.e. roughly 51 000 DU.
        let air = column_field("AIR MASS DIAGNOSTIC (WHOLE ATMOS)", "kg", &[1.0]);
        let mmr = column_field("O3 MASS MIXING RATIO", "1", &[1.0]);
        let out = run(&air, &mmr);

        assert_eq!(out.units, "DU");
        assert_eq!(out.data.shape(), &[1, 1]);
        assert!(out.coord(VERTICAL).is_none());
        assert_relative_eq!(
            out.data[IxDyn(&[0, 0])],
            50_966.76,
            max_relative = 1e-4
        );
    }

    #[test]
    fn test_zero_mixing_ratio_gives_zero_columns() {
        let air = column_field("AIR MASS DIAGNOSTIC (WHOLE ATMOS)", "kg", &[4e15, 3e15, 1e15]);
        let mmr = column_field("O3 MASS MIXING RATIO", "1", &[0.0, 0.0, 0.0]);
        let out = run(&air, &mmr);
        assert!(out.data.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_linear_in_mixing_ratio() {
        let air = column_field("AIR MASS DIAGNOSTIC (WHOLE ATMOS)", "kg", &[4e15, 3e15, 1e15]);
        let mmr = column_field("O3 MASS MIXING RATIO", "1", &[2e-7, 1e-6, 7.6e-7]);
        let doubled = column_field("O3 MASS MIXING RATIO", "1", &[4e-7, 2e-6, 1.52e-6]);

        let base = run(&air, &mmr);
        let twice = run(&air, &doubled);
        assert_relative_eq!(
            twice.data[IxDyn(&[0, 0])],
            2.0 * base.data[IxDyn(&[0, 0])],
            max_relative = 1e-12
        );
    }

    #[test]
    fn test_realistic_column_magnitude() {
        // About 5.9 g of ozone per m^2 of column, which should land near the
        // ~300 DU reference for a typical mid-latitude ozone column.
        let air = column_field(
            "AIR MASS DIAGNOSTIC (WHOLE ATMOS)",
            "kg",
            &[3000.0, 3000.0, 3000.0],
        );
        let mmr = column_field("O3 MASS MIXING RATIO", "1", &[2e-7, 1e-6, 7.6e-7]);
        let out = run(&air, &mmr);
        let du = out.data[IxDyn(&[0, 0])];
        assert!(
            (100.0..500.0).contains(&du),
            "expected a few hundred DU, got {du}"
        );
    }

    #[test]
    fn test_idempotent_over_reruns() {
        let air = column_field("AIR MASS DIAGNOSTIC (WHOLE ATMOS)", "kg", &[4e15, 3e15, 1e15]);
        let mmr = column_field("O3 MASS MIXING RATIO", "1", &[2e-7, 1e-6, 7.6e-7]);
        let first = run(&air, &mmr);
        let second = run(&air, &mmr);
        assert_eq!(first.data, second.data);
        // Inputs are untouched by the run.
        assert_eq!(mmr.data[IxDyn(&[1, 0, 0])], 1e-6);
    }

    #[test]
    fn test_nan_mixing_ratio_propagates() {
        let air = column_field("AIR MASS DIAGNOSTIC (WHOLE ATMOS)", "kg", &[1.0, 1.0]);
        let mmr = column_field("O3 MASS MIXING RATIO", "1", &[f64::NAN, 1e-6]);
        let out = run(&air, &mmr);
        assert!(out.data[IxDyn(&[0, 0])].is_nan());
    }

    #[test]
    fn test_shape_mismatch_rejected_before_any_arithmetic() {
        let air = column_field("AIR MASS DIAGNOSTIC (WHOLE ATMOS)", "kg", &[1.0, 1.0]);
        let mmr = column_field("O3 MASS MIXING RATIO", "1", &[1e-6]);
        let err = mmr_to_dobson(
            &air,
            &mmr,
            &TraceGas::ozone(),
            &StandardConditions::default(),
            VERTICAL,
        )
        .unwrap_err();
        assert!(matches!(
            err.current_context(),
            ConvertError::ShapeMismatch { .. }
        ));
    }

    #[test]
    fn test_differing_coordinates_rejected() {
        let air = column_field("AIR MASS DIAGNOSTIC (WHOLE ATMOS)", "kg", &[1.0, 1.0]);
        let mut mmr = column_field("O3 MASS MIXING RATIO", "1", &[1e-6, 2e-6]);
        let vertical = mmr.coords.get_mut(VERTICAL).unwrap();
        vertical.values[1] += 250.0;
        let err = mmr_to_dobson(
            &air,
            &mmr,
            &TraceGas::ozone(),
            &StandardConditions::default(),
            VERTICAL,
        )
        .unwrap_err();
        assert!(matches!(
            err.current_context(),
            ConvertError::CoordinateMismatch { .. }
        ));
    }

    #[test]
    fn test_missing_vertical_coordinate() {
        let air = column_field("AIR MASS DIAGNOSTIC (WHOLE ATMOS)", "kg", &[1.0]);
        let mmr = column_field("O3 MASS MIXING RATIO", "1", &[1e-6]);
        let err = mmr_to_dobson(
            &air,
            &mmr,
            &TraceGas::ozone(),
            &StandardConditions::default(),
            "model_level_number",
        )
        .unwrap_err();
        assert!(matches!(
            err.current_context(),
            ConvertError::CollapsingColumn
        ));
    }

    #[test]
    fn test_nonpositive_molar_mass_rejected() {
        let air = column_field("AIR MASS DIAGNOSTIC (WHOLE ATMOS)", "kg", &[1.0]);
        let mmr = column_field("O3 MASS MIXING RATIO", "1", &[1e-6]);
        for bad in [0.0, -0.048, f64::NAN] {
            let err = mmr_to_dobson(
                &air,
                &mmr,
                &TraceGas::new("O3", bad),
                &StandardConditions::default(),
                VERTICAL,
            )
            .unwrap_err();
            assert!(matches!(
                err.current_context(),
                ConvertError::BadMolarMass(_)
            ));
        }
    }
}
