//! Physical surface areas of horizontal grid cells.
//!
//! Areas come from the latitude/longitude cell bounds on a sphere:
//! `R^2 * |sin(lat1) - sin(lat0)| * |lon1 - lon0|` with the angles in
//! radians. When a file does not store cell bounds they are derived from
//! midpoints between adjacent coordinate points, with the end cells
//! extrapolated symmetrically and latitude edges clamped to the poles.

use ndarray::{Array1, Array2, ArrayD};

use crate::fields::{Coordinate, GriddedField};

/// Default spherical Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_367_470.0;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum AreaError {
    #[error("Field '{field}' has no {which} coordinate (coordinates present: {})", .present.join(", "))]
    MissingCoordinate {
        field: String,
        which: &'static str,
        present: Vec<String>,
    },
    #[error("Coordinate '{coordinate}' has {len} point(s) and no stored bounds, so cell edges cannot be derived")]
    TooFewPoints { coordinate: String, len: usize },
    #[error("Bounds of coordinate '{coordinate}' must have shape ({len}, 2), got ({rows}, {cols})")]
    BadBounds {
        coordinate: String,
        len: usize,
        rows: usize,
        cols: usize,
    },
    #[error("Cell {index} of coordinate '{coordinate}' has zero angular width, which would give a zero cell area")]
    DegenerateCell { coordinate: String, index: usize },
}

/// Per-cell surface area (m^2) for every cell of `field`, as an array of the
/// field's full shape. The area varies only along the latitude and longitude
/// axes; any other axes are broadcast over.
pub fn cell_areas(field: &GriddedField) -> Result<ArrayD<f64>, AreaError> {
    let (lat_ax, lat_name, lat_coord) = find_horizontal_coord(field, "lat", "latitude")?;
    let (lon_ax, lon_name, lon_coord) = find_horizontal_coord(field, "lon", "longitude")?;

    let mut lat_edges = cell_edges(lat_name, lat_coord)?;
    lat_edges.mapv_inplace(|v| v.clamp(-90.0, 90.0));
    let lon_edges = cell_edges(lon_name, lon_coord)?;

    // |sin(upper) - sin(lower)| per latitude band, |upper - lower| per
    // longitude column, both from edges in radians.
    let band = edge_spans(&lat_edges, |v| v.to_radians().sin());
    let width = edge_spans(&lon_edges, |v| v.to_radians());
    check_nonzero(lat_name, &band)?;
    check_nonzero(lon_name, &width)?;

    let r2 = EARTH_RADIUS_M * EARTH_RADIUS_M;
    Ok(ArrayD::from_shape_fn(field.data.raw_dim(), |idx| {
        r2 * band[idx[lat_ax]] * width[idx[lon_ax]]
    }))
}

fn find_horizontal_coord<'f>(
    field: &'f GriddedField,
    key: &str,
    which: &'static str,
) -> Result<(usize, &'f str, &'f Coordinate), AreaError> {
    field
        .coords
        .iter()
        .enumerate()
        .find(|(_, (name, _))| name.to_lowercase().contains(key))
        .map(|(ax, (name, coord))| (ax, name.as_str(), coord))
        .ok_or_else(|| AreaError::MissingCoordinate {
            field: field.name.clone(),
            which,
            present: field.coords.keys().cloned().collect(),
        })
}

/// Cell edges as an `(n, 2)` lower/upper array: the stored bounds when the
/// coordinate has them, otherwise contiguous bounds guessed from midpoints.
fn cell_edges(name: &str, coord: &Coordinate) -> Result<Array2<f64>, AreaError> {
    if let Some(bounds) = &coord.bounds {
        if bounds.nrows() != coord.len() || bounds.ncols() != 2 {
            return Err(AreaError::BadBounds {
                coordinate: name.to_string(),
                len: coord.len(),
                rows: bounds.nrows(),
                cols: bounds.ncols(),
            });
        }
        return Ok(bounds.clone());
    }

    let v = &coord.values;
    let n = v.len();
    if n < 2 {
        return Err(AreaError::TooFewPoints {
            coordinate: name.to_string(),
            len: n,
        });
    }

    let mut edges = Array2::zeros((n, 2));
    for i in 0..n {
        edges[(i, 0)] = if i == 0 {
            v[0] - 0.5 * (v[1] - v[0])
        } else {
            0.5 * (v[i - 1] + v[i])
        };
        edges[(i, 1)] = if i == n - 1 {
            v[n - 1] + 0.5 * (v[n - 1] - v[n - 2])
        } else {
            0.5 * (v[i] + v[i + 1])
        };
    }
    Ok(edges)
}

fn edge_spans(edges: &Array2<f64>, f: impl Fn(f64) -> f64) -> Array1<f64> {
    Array1::from_iter(
        edges
            .rows()
            .into_iter()
            .map(|row| (f(row[1]) - f(row[0])).abs()),
    )
}

fn check_nonzero(name: &str, spans: &Array1<f64>) -> Result<(), AreaError> {
    if let Some(index) = spans.iter().position(|&s| s == 0.0) {
        Err(AreaError::DegenerateCell {
            coordinate: name.to_string(),
            index,
        })
    } else {
        Ok(())
    }
}
