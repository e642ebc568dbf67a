//! Gridded fields, field collections, and name-based field lookup.
//!
//! A [`GriddedField`] is one physical quantity sampled on a multi-dimensional
//! grid, with its unit tracked explicitly and one named [`Coordinate`] per
//! data dimension. A [`FieldCollection`] is the set of fields loaded from one
//! dataset; field names are descriptive labels and are *not* unique, so
//! lookup is by name fragment with a strict exactly-one-match policy.

use indexmap::IndexMap;
use ndarray::{Array1, Array2, ArrayD, Axis};

/// One grid dimension: the coordinate values, their unit (if known), and
/// optionally the cell bounds as an `(n, 2)` array of lower/upper edges.
#[derive(Debug, Clone, PartialEq)]
pub struct Coordinate {
    pub values: Array1<f64>,
    pub units: Option<String>,
    pub bounds: Option<Array2<f64>>,
}

impl Coordinate {
    pub fn new(values: Array1<f64>) -> Self {
        Self {
            values,
            units: None,
            bounds: None,
        }
    }

    pub fn with_units<S: ToString>(mut self, units: S) -> Self {
        self.units = Some(units.to_string());
        self
    }

    pub fn with_bounds(mut self, bounds: Array2<f64>) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CoordinateError {
    #[error("Field '{field}' has no coordinate named '{coordinate}' (coordinates present: {})", .present.join(", "))]
    NoSuchCoordinate {
        field: String,
        coordinate: String,
        present: Vec<String>,
    },
    #[error("Field '{field}' has {ndims} data dimensions but {ncoords} coordinates")]
    DimensionCountMismatch {
        field: String,
        ndims: usize,
        ncoords: usize,
    },
    #[error("Coordinate '{coordinate}' of field '{field}' has {coord_len} values but the matching data dimension has length {dim_len}")]
    LengthMismatch {
        field: String,
        coordinate: String,
        coord_len: usize,
        dim_len: usize,
    },
}

/// A named physical quantity on a coordinate grid.
///
/// The coordinate map has exactly one entry per data dimension, in dimension
/// order; all reductions address dimensions by coordinate name, never by
/// positional index.
#[derive(Debug, Clone, PartialEq)]
pub struct GriddedField {
    pub name: String,
    pub units: String,
    pub data: ArrayD<f64>,
    pub coords: IndexMap<String, Coordinate>,
}

impl GriddedField {
    /// Build a field, checking the one-coordinate-per-dimension invariant.
    pub fn new<N: ToString, U: ToString>(
        name: N,
        units: U,
        data: ArrayD<f64>,
        coords: IndexMap<String, Coordinate>,
    ) -> Result<Self, CoordinateError> {
        let name = name.to_string();
        if data.ndim() != coords.len() {
            return Err(CoordinateError::DimensionCountMismatch {
                field: name,
                ndims: data.ndim(),
                ncoords: coords.len(),
            });
        }
        for (i, (cname, coord)) in coords.iter().enumerate() {
            if coord.len() != data.shape()[i] {
                return Err(CoordinateError::LengthMismatch {
                    field: name,
                    coordinate: cname.clone(),
                    coord_len: coord.len(),
                    dim_len: data.shape()[i],
                });
            }
        }
        Ok(Self {
            name,
            units: units.to_string(),
            data,
            coords,
        })
    }

    /// The axis index of the named coordinate, if the field has it.
    pub fn coord_axis(&self, coord_name: &str) -> Option<usize> {
        self.coords.get_index_of(coord_name)
    }

    pub fn coord(&self, coord_name: &str) -> Option<&Coordinate> {
        self.coords.get(coord_name)
    }

    fn no_such_coordinate(&self, coord_name: &str) -> CoordinateError {
        CoordinateError::NoSuchCoordinate {
            field: self.name.clone(),
            coordinate: coord_name.to_string(),
            present: self.coords.keys().cloned().collect(),
        }
    }

    /// Sum the field along the named coordinate, producing a new field with
    /// that coordinate removed. The accumulation order is fixed by the array
    /// layout, so repeated runs give bit-identical results.
    pub fn sum_over(&self, coord_name: &str) -> Result<GriddedField, CoordinateError> {
        let axis = self
            .coord_axis(coord_name)
            .ok_or_else(|| self.no_such_coordinate(coord_name))?;
        let data = self.data.sum_axis(Axis(axis));
        let coords = self
            .coords
            .iter()
            .filter(|(cname, _)| cname.as_str() != coord_name)
            .map(|(cname, coord)| (cname.clone(), coord.clone()))
            .collect();
        Ok(GriddedField {
            name: self.name.clone(),
            units: self.units.clone(),
            data,
            coords,
        })
    }

    /// Whether `other` is defined on the same grid: same shape, same
    /// coordinate names in the same order, and coordinate values equal to
    /// within `tol`.
    pub fn same_grid(&self, other: &GriddedField, tol: f64) -> bool {
        if self.data.shape() != other.data.shape() {
            return false;
        }
        if self.coords.len() != other.coords.len() {
            return false;
        }
        self.coords
            .iter()
            .zip(other.coords.iter())
            .all(|((na, ca), (nb, cb))| na == nb && ca.values.abs_diff_eq(&cb.values, tol))
    }
}

/// Result of scanning a collection for fields matching a predicate.
///
/// Silently taking the first of several matches risks converting the wrong
/// quantity, so multiple matches are reported as [`FieldMatch::Ambiguous`]
/// with every matching name and the caller must tighten its fragment.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldMatch<'a> {
    Found(&'a GriddedField),
    NotFound,
    Ambiguous(Vec<&'a str>),
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum FindFieldError {
    #[error("No fields match '{0}'")]
    NoMatch(String),
    #[error("All of these fields match '{fragment}': {}", .names.join(", "))]
    MultipleMatches { fragment: String, names: Vec<String> },
}

/// The unordered set of fields loaded from one dataset.
#[derive(Debug, Default)]
pub struct FieldCollection {
    fields: Vec<GriddedField>,
}

impl FieldCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: GriddedField) {
        self.fields.push(field);
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GriddedField> {
        self.fields.iter()
    }

    /// Linear scan with an arbitrary name predicate. Fields with empty names
    /// are never matched.
    pub fn find<P: Fn(&str) -> bool>(&self, pred: P) -> FieldMatch<'_> {
        let matches: Vec<&GriddedField> = self
            .fields
            .iter()
            .filter(|f| !f.name.is_empty() && pred(&f.name))
            .collect();
        match matches.as_slice() {
            [] => FieldMatch::NotFound,
            [one] => FieldMatch::Found(*one),
            several => FieldMatch::Ambiguous(several.iter().map(|f| f.name.as_str()).collect()),
        }
    }

    /// Scan for fields whose name contains `fragment` (case-sensitive,
    /// exact substring).
    pub fn find_by_fragment(&self, fragment: &str) -> FieldMatch<'_> {
        self.find(|name| name.contains(fragment))
    }

    /// The one and only field whose name contains `fragment`, or an error
    /// describing why there is no unique match.
    pub fn require_unique(&self, fragment: &str) -> Result<&GriddedField, FindFieldError> {
        match self.find_by_fragment(fragment) {
            FieldMatch::Found(field) => Ok(field),
            FieldMatch::NotFound => Err(FindFieldError::NoMatch(fragment.to_string())),
            FieldMatch::Ambiguous(names) => Err(FindFieldError::MultipleMatches {
                fragment: fragment.to_string(),
                names: names.into_iter().map(|n| n.to_string()).collect(),
            }),
        }
    }
}

impl FromIterator<GriddedField> for FieldCollection {
    fn from_iter<T: IntoIterator<Item = GriddedField>>(iter: T) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}
