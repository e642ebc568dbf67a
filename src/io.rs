//! The NetCDF boundary: load a dataset into a [`FieldCollection`] and save
//! converted fields back out.
//!
//! Every numeric variable that is not a coordinate variable (same name as
//! its dimension) and not a bounds variable becomes one [`GriddedField`],
//! with its data promoted to f64. The field's `name` is the `long_name`
//! attribute when present, since that is the label datasets use for human
//! identification, falling back to the variable name.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use error_stack::ResultExt;
use indexmap::IndexMap;
use itertools::Itertools;
use ndarray::{Array1, Ix1, Ix2};
use netcdf::{types::NcVariableType, AttributeValue, Extents};

use crate::fields::{Coordinate, FieldCollection, GriddedField};

static BOUNDS_DIM_NAME: &str = "bnds";

#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("Error opening {} as a gridded dataset", .0.display())]
    Open(PathBuf),
    #[error("Error reading variable '{0}'")]
    Variable(String),
    #[error("Error reading the coordinate for dimension '{0}'")]
    Coordinate(String),
}

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("Error creating {}", .0.display())]
    Create(PathBuf),
    #[error("Error writing dimension or coordinate '{0}'")]
    Coordinate(String),
    #[error("Dimension '{name}' already written with length {existing}, but field '{field}' needs length {wanted}")]
    DimensionConflict {
        name: String,
        existing: usize,
        wanted: usize,
        field: String,
    },
    #[error("Error writing the variable for field '{0}'")]
    Variable(String),
    #[error("Error writing the global history attribute")]
    History,
}

/// Read every gridded field from the NetCDF file at `path`.
pub fn load(path: &Path) -> error_stack::Result<FieldCollection, ReadError> {
    let ds =
        netcdf::open(path).change_context_lazy(|| ReadError::Open(path.to_path_buf()))?;

    let bounds_vars = bounds_variable_names(&ds);
    let mut collection = FieldCollection::new();
    for var in ds.variables() {
        let varname = var.name();
        if is_coordinate_variable(&var) || bounds_vars.contains(&varname) {
            continue;
        }
        if !is_numeric(&var) {
            log::debug!("Skipping non-numeric variable '{varname}'");
            continue;
        }
        let field = read_field(&ds, &var)?;
        collection.push(field);
    }
    log::debug!(
        "Loaded {} field(s) from {}: {}",
        collection.len(),
        path.display(),
        collection.iter().map(|f| f.name.as_str()).join(", ")
    );
    Ok(collection)
}

/// Write a single field as a new NetCDF file at `path`.
pub fn save_field(field: &GriddedField, path: &Path) -> error_stack::Result<(), WriteError> {
    save_collection(std::slice::from_ref(field), path)
}

/// Write several fields as a new NetCDF file at `path`. Fields may share
/// dimensions; a shared dimension is only written once and must have the
/// same length everywhere.
pub fn save_collection(
    fields: &[GriddedField],
    path: &Path,
) -> error_stack::Result<(), WriteError> {
    let mut ds =
        netcdf::create(path).change_context_lazy(|| WriteError::Create(path.to_path_buf()))?;
    for field in fields {
        for (cname, coord) in field.coords.iter() {
            add_coordinate(&mut ds, cname, coord, &field.name)?;
        }
        add_data_variable(&mut ds, field)?;
    }
    ds.add_attribute("history", history_stamp())
        .change_context(WriteError::History)?;
    Ok(())
}

/// Names of all variables referenced by some coordinate's `bounds`
/// attribute; these describe cell edges and are not data fields themselves.
fn bounds_variable_names(ds: &netcdf::File) -> HashSet<String> {
    ds.variables()
        .filter_map(|var| string_attribute(&var, "bounds"))
        .collect()
}

fn is_coordinate_variable(var: &netcdf::Variable) -> bool {
    var.dimensions().len() == 1 && var.dimensions()[0].name() == var.name()
}

fn is_numeric(var: &netcdf::Variable) -> bool {
    matches!(
        var.vartype(),
        NcVariableType::Int(_) | NcVariableType::Float(_)
    )
}

fn string_attribute(var: &netcdf::Variable, attr_name: &str) -> Option<String> {
    let value = var.attribute(attr_name)?.value().ok()?;
    if let AttributeValue::Str(s) = value {
        Some(s)
    } else {
        None
    }
}

fn read_field(
    ds: &netcdf::File,
    var: &netcdf::Variable,
) -> error_stack::Result<GriddedField, ReadError> {
    let varname = var.name();
    let err = || ReadError::Variable(varname.clone());

    let data = var.get::<f64, _>(Extents::All).change_context_lazy(err)?;
    let name = string_attribute(var, "long_name").unwrap_or_else(|| varname.clone());
    let units = string_attribute(var, "units").unwrap_or_else(|| "unknown".to_string());

    let mut coords = IndexMap::new();
    for dim in var.dimensions() {
        let dim_name = dim.name();
        let coord = read_coordinate(ds, &dim_name, dim.len())?;
        coords.insert(dim_name, coord);
    }

    GriddedField::new(name, units, data, coords).change_context_lazy(err)
}

fn read_coordinate(
    ds: &netcdf::File,
    dim_name: &str,
    dim_len: usize,
) -> error_stack::Result<Coordinate, ReadError> {
    let err = || ReadError::Coordinate(dim_name.to_string());

    let var = match ds.variable(dim_name) {
        Some(v) => v,
        None => {
            // No coordinate variable for this dimension; synthesize an index
            // coordinate so by-name reductions still work on the field.
            let values = Array1::from_iter((0..dim_len).map(|i| i as f64));
            return Ok(Coordinate::new(values));
        }
    };

    let values = var
        .get::<f64, _>(Extents::All)
        .change_context_lazy(err)?
        .into_dimensionality::<Ix1>()
        .change_context_lazy(err)?;
    let mut coord = Coordinate::new(values);
    if let Some(units) = string_attribute(&var, "units") {
        coord = coord.with_units(units);
    }
    if let Some(bounds_name) = string_attribute(&var, "bounds") {
        if let Some(bounds_var) = ds.variable(&bounds_name) {
            let bounds = bounds_var
                .get::<f64, _>(Extents::All)
                .change_context_lazy(err)?
                .into_dimensionality::<Ix2>()
                .change_context_lazy(err)?;
            coord = coord.with_bounds(bounds);
        }
    }
    Ok(coord)
}

fn add_coordinate(
    ds: &mut netcdf::FileMut,
    name: &str,
    coord: &Coordinate,
    field_name: &str,
) -> error_stack::Result<(), WriteError> {
    let err = || WriteError::Coordinate(name.to_string());

    if let Some(dim) = ds.dimension(name) {
        if dim.len() != coord.len() {
            return Err(WriteError::DimensionConflict {
                name: name.to_string(),
                existing: dim.len(),
                wanted: coord.len(),
                field: field_name.to_string(),
            }
            .into());
        }
        // Already written for an earlier field.
        return Ok(());
    }

    ds.add_dimension(name, coord.len()).change_context_lazy(err)?;
    if coord.bounds.is_some() && ds.dimension(BOUNDS_DIM_NAME).is_none() {
        ds.add_dimension(BOUNDS_DIM_NAME, 2)
            .change_context_lazy(err)?;
    }

    let bounds_name = format!("{name}_{BOUNDS_DIM_NAME}");
    {
        let mut var = ds
            .add_variable::<f64>(name, &[name])
            .change_context_lazy(err)?;
        if let Some(units) = &coord.units {
            var.put_attribute("units", units.as_str())
                .change_context_lazy(err)?;
        }
        if coord.bounds.is_some() {
            var.put_attribute("bounds", bounds_name.as_str())
                .change_context_lazy(err)?;
        }
        var.put(coord.values.view(), Extents::All)
            .change_context_lazy(err)?;
    }

    if let Some(bounds) = &coord.bounds {
        let mut bounds_var = ds
            .add_variable::<f64>(&bounds_name, &[name, BOUNDS_DIM_NAME])
            .change_context_lazy(err)?;
        bounds_var
            .put(bounds.view(), Extents::All)
            .change_context_lazy(err)?;
    }
    Ok(())
}

fn add_data_variable(
    ds: &mut netcdf::FileMut,
    field: &GriddedField,
) -> error_stack::Result<(), WriteError> {
    let err = || WriteError::Variable(field.name.clone());

    let varname = variable_name(&field.name);
    let dim_names: Vec<&str> = field.coords.keys().map(|k| k.as_str()).collect();
    let mut var = ds
        .add_variable::<f64>(&varname, &dim_names)
        .change_context_lazy(err)?;
    var.put_attribute("long_name", field.name.as_str())
        .change_context_lazy(err)?;
    var.put_attribute("units", field.units.as_str())
        .change_context_lazy(err)?;
    var.put(field.data.view(), Extents::All)
        .change_context_lazy(err)?;
    Ok(())
}

/// Squash a descriptive field label into a NetCDF-friendly variable name.
fn variable_name(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    let mut last_was_sep = false;
    for c in label.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_was_sep = false;
        } else if !out.is_empty() && !last_was_sep {
            out.push('_');
            last_was_sep = true;
        }
    }
    let trimmed = out.trim_end_matches('_');
    if trimmed.is_empty() {
        "data".to_string()
    } else {
        trimmed.to_string()
    }
}

fn history_stamp() -> String {
    format!(
        "{}: created by {} v{}",
        chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    )
}
