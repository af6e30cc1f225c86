//! Dimensions.
//!
//! A [`Dimension`] is a named axis shared by the arrays of a group. A dimension may carry an
//! axis type and direction (derived from CF attributes) and an **indexing variable**: a
//! rank-1 array of the same name and size holding the coordinate values along the axis.
//!
//! Dimensions come in two kinds. *XArray-bound* dimensions are named by an array through
//! `_ARRAY_DIMENSIONS` (V2) or `dimension_names` (V3) and may be renamed; *local* dimensions
//! were synthesized (`dim0`, `dim1`, ...) and may not.

use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::{array::Array, error::ZarrError, node::is_valid_node_name};

/// The axis type of a dimension.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum DimensionType {
    /// A horizontal X axis (longitude or easting).
    HorizontalX,
    /// A horizontal Y axis (latitude or northing).
    HorizontalY,
    /// A vertical axis.
    Vertical,
    /// A temporal axis.
    Temporal,
}

/// The direction of increasing coordinates along a dimension.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum DimensionDirection {
    /// Eastwards.
    East,
    /// Northwards.
    North,
    /// Upwards.
    Up,
    /// Downwards.
    Down,
}

/// A shared dimension handle.
pub type SharedDimension = Arc<RwLock<Dimension>>;

/// A named axis.
#[derive(Debug)]
pub struct Dimension {
    name: String,
    size: u64,
    dim_type: Option<DimensionType>,
    direction: Option<DimensionDirection>,
    xarray_bound: bool,
    indexing_variable: Weak<Array>,
    regular_coordinates: Option<(f64, f64)>,
}

impl Dimension {
    /// Create a new dimension.
    #[must_use]
    pub fn new(
        name: String,
        size: u64,
        dim_type: Option<DimensionType>,
        direction: Option<DimensionDirection>,
    ) -> Self {
        Self {
            name,
            size,
            dim_type,
            direction,
            xarray_bound: false,
            indexing_variable: Weak::new(),
            regular_coordinates: None,
        }
    }

    /// Create a new shared dimension handle.
    #[must_use]
    pub fn new_shared(
        name: String,
        size: u64,
        dim_type: Option<DimensionType>,
        direction: Option<DimensionDirection>,
    ) -> SharedDimension {
        Arc::new(RwLock::new(Self::new(name, size, dim_type, direction)))
    }

    /// The dimension name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The dimension size.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// The axis type, if known.
    #[must_use]
    pub fn dim_type(&self) -> Option<DimensionType> {
        self.dim_type
    }

    /// The axis direction, if known.
    #[must_use]
    pub fn direction(&self) -> Option<DimensionDirection> {
        self.direction
    }

    /// Set the axis type and direction.
    pub fn set_type_and_direction(
        &mut self,
        dim_type: Option<DimensionType>,
        direction: Option<DimensionDirection>,
    ) {
        if dim_type.is_some() {
            self.dim_type = dim_type;
        }
        if direction.is_some() {
            self.direction = direction;
        }
    }

    /// Return true if an array names this dimension through its dimension names.
    #[must_use]
    pub fn is_xarray_bound(&self) -> bool {
        self.xarray_bound
    }

    /// Mark this dimension as named by an array.
    pub fn bind_xarray(&mut self) {
        self.xarray_bound = true;
    }

    /// The indexing variable: the same-named rank-1 array of coordinate values, if
    /// registered and still alive.
    #[must_use]
    pub fn indexing_variable(&self) -> Option<Arc<Array>> {
        self.indexing_variable.upgrade()
    }

    /// Attach `array` as the indexing variable.
    ///
    /// # Errors
    /// Returns [`ZarrError::InvalidArgument`] unless `array` has rank 1, the dimension's
    /// name, and the dimension's size.
    pub fn set_indexing_variable(&mut self, array: &Arc<Array>) -> Result<(), ZarrError> {
        let shape = array.shape();
        if array.name() != self.name || shape.len() != 1 || shape[0] != self.size {
            return Err(ZarrError::invalid_argument(format!(
                "array {} (shape {shape:?}) cannot index dimension {} of size {}",
                array.name(),
                self.name,
                self.size
            )));
        }
        self.indexing_variable = Arc::downgrade(array);
        Ok(())
    }

    /// Synthesized regular coordinates `(start, step)`, recorded when an affine transform
    /// declares the coordinates of this axis and no indexing variable exists.
    #[must_use]
    pub fn regular_coordinates(&self) -> Option<(f64, f64)> {
        self.regular_coordinates
    }

    /// Record synthesized regular coordinates for this axis.
    pub fn set_regular_coordinates(&mut self, start: f64, step: f64) {
        self.regular_coordinates = Some((start, step));
    }

    /// Grow the dimension to `size`.
    ///
    /// # Errors
    /// Returns [`ZarrError::Unsupported`] for a shrinking resize.
    pub fn resize(&mut self, size: u64) -> Result<(), ZarrError> {
        if size < self.size {
            return Err(ZarrError::Unsupported(format!(
                "shrinking dimension {} from {} to {size}",
                self.name, self.size
            )));
        }
        self.size = size;
        Ok(())
    }

    /// Rename the dimension.
    ///
    /// # Errors
    /// Returns [`ZarrError::Unsupported`] for a dimension that is not XArray-bound, or
    /// [`ZarrError::InvalidArgument`] for an invalid name.
    pub fn rename(&mut self, name: &str) -> Result<(), ZarrError> {
        if !self.xarray_bound {
            return Err(ZarrError::Unsupported(format!(
                "dimension {} was not named by an array and cannot be renamed",
                self.name
            )));
        }
        if !is_valid_node_name(name) {
            return Err(ZarrError::invalid_argument(format!(
                "{name} is not a valid dimension name"
            )));
        }
        self.name = name.to_string();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimension_rename_requires_binding() {
        let mut dimension = Dimension::new("dim0".to_string(), 10, None, None);
        assert!(dimension.rename("x").is_err());
        dimension.bind_xarray();
        dimension.rename("x").unwrap();
        assert_eq!(dimension.name(), "x");
        assert!(dimension.rename("bad/name").is_err());
    }

    #[test]
    fn dimension_resize_monotonic() {
        let mut dimension = Dimension::new("time".to_string(), 4, None, None);
        dimension.resize(8).unwrap();
        assert_eq!(dimension.size(), 8);
        assert!(dimension.resize(2).is_err());
    }
}
