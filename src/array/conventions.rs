//! Special-attribute handling on array open.
//!
//! Three attribute conventions are recognized and lifted into typed array state, with the
//! consumed tags removed from the user-visible attribute bag:
//!  - **XArray**: `_ARRAY_DIMENSIONS` (Zarr V2) names the dimensions of the array.
//!  - **CF**: `units`, `add_offset`, `scale_factor` become the unit/offset/scale of the
//!    array; `axis`, `standard_name` and `positive` on a rank-1 coordinate array set the
//!    type and direction of its dimension.
//!  - **Geo**: `_CRS`, `proj:*` and `spatial:*` yield a spatial reference and an affine
//!    geotransform; regular X/Y coordinates are synthesized on the trailing dimensions when
//!    a transform is declared and no indexing variable exists.

use log::debug;
use serde_json::Value;

use crate::{
    context::CoordinateRegularity,
    dimension::{DimensionDirection, DimensionType},
    error::ZarrError,
    metadata::Attributes,
};

use super::Array;

/// The relative tolerance for deciding that 1-D coordinates are regularly spaced.
const REGULARITY_RELATIVE_TOLERANCE: f64 = 1e-3;

/// A spatial reference lifted from array attributes.
#[derive(Clone, Debug, PartialEq)]
pub enum CrsDefinition {
    /// A WKT2 string (`proj:wkt2` or `_CRS.wkt`).
    Wkt(String),
    /// A PROJJSON object (`proj:projjson` or `_CRS.projjson`).
    ProjJson(Value),
    /// An EPSG code (`proj:epsg`).
    Epsg(u32),
    /// An authority code string such as `EPSG:4326` (`proj:code` or `_CRS.url`).
    Code(String),
    /// The name of a CF grid-mapping variable (`grid_mapping`).
    GridMappingName(String),
}

/// Extract `_ARRAY_DIMENSIONS` from a Zarr V2 attribute bag, consuming it.
pub(crate) fn take_array_dimensions(attributes: &mut Attributes) -> Option<Vec<String>> {
    let value = attributes.remove("_ARRAY_DIMENSIONS")?;
    let names: Option<Vec<String>> = value
        .as_array()?
        .iter()
        .map(|name| name.as_str().map(ToString::to_string))
        .collect();
    names
}

fn take_f64(attributes: &mut Attributes, key: &str) -> Option<f64> {
    match attributes.get(key)?.as_f64() {
        Some(value) => {
            attributes.remove(key);
            Some(value)
        }
        None => None,
    }
}

fn take_string(attributes: &mut Attributes, key: &str) -> Option<String> {
    match attributes.get(key)?.as_str() {
        Some(value) => {
            let value = value.to_string();
            attributes.remove(key);
            Some(value)
        }
        None => None,
    }
}

impl Array {
    /// Scan the attribute bag for recognized conventions, lift them into typed state, and
    /// remove the consumed tags.
    ///
    /// Called once when the array is opened or created, after dimensions are bound.
    pub(crate) fn apply_conventions(&self) {
        let mut state = self.state.write();
        let attributes = &mut state.attributes;

        // CF value metadata.
        let unit = take_string(attributes, "units");
        let offset = take_f64(attributes, "add_offset");
        let scale = take_f64(attributes, "scale_factor");

        // CF axis metadata on a rank-1 coordinate array.
        let mut dim_type = None;
        let mut direction = None;
        if let Some(axis) = take_string(attributes, "axis") {
            (dim_type, direction) = match axis.as_str() {
                "X" => (Some(DimensionType::HorizontalX), Some(DimensionDirection::East)),
                "Y" => (Some(DimensionType::HorizontalY), Some(DimensionDirection::North)),
                "Z" => (Some(DimensionType::Vertical), None),
                "T" => (Some(DimensionType::Temporal), None),
                _ => (None, None),
            };
        }
        if dim_type.is_none() {
            if let Some(standard_name) = attributes.get("standard_name").and_then(Value::as_str) {
                let lifted = match standard_name {
                    "longitude" | "projection_x_coordinate" => Some((
                        DimensionType::HorizontalX,
                        Some(DimensionDirection::East),
                    )),
                    "latitude" | "projection_y_coordinate" => Some((
                        DimensionType::HorizontalY,
                        Some(DimensionDirection::North),
                    )),
                    "time" => Some((DimensionType::Temporal, None)),
                    _ => None,
                };
                if let Some((lifted_type, lifted_direction)) = lifted {
                    dim_type = Some(lifted_type);
                    direction = lifted_direction;
                    attributes.remove("standard_name");
                }
            }
        }
        if let Some(positive) = take_string(attributes, "positive") {
            direction = match positive.to_ascii_lowercase().as_str() {
                "up" => Some(DimensionDirection::Up),
                "down" => Some(DimensionDirection::Down),
                _ => direction,
            };
            dim_type = dim_type.or(Some(DimensionType::Vertical));
        }

        // Geo conventions.
        let crs = take_crs(attributes);
        let geotransform = take_geotransform(attributes);

        state.unit = unit;
        state.offset = offset;
        state.scale = scale;
        state.crs = crs;
        state.geotransform = geotransform;
        drop(state);

        if let (Some(dim_type), true) = (dim_type, self.dimensionality() == 1) {
            let dim = &self.dimensions()[0];
            dim.write().set_type_and_direction(Some(dim_type), direction);
        }

        if let Some(geotransform) = geotransform {
            self.synthesize_xy_coordinates(geotransform);
        }
    }

    /// Record regular X/Y coordinates on the trailing dimensions from an affine transform
    /// when no indexing variable exists. Coordinates are pixel-center.
    fn synthesize_xy_coordinates(&self, geotransform: [f64; 6]) {
        let rank = self.dimensionality();
        if rank < 2 || geotransform[2] != 0.0 || geotransform[4] != 0.0 {
            return;
        }
        let dims = self.dimensions();
        let x_dim = &dims[rank - 1];
        let y_dim = &dims[rank - 2];
        {
            let mut x = x_dim.write();
            if x.indexing_variable().is_none() && x.regular_coordinates().is_none() {
                debug!("synthesizing regular X coordinates for dimension {}", x.name());
                x.set_regular_coordinates(
                    geotransform[0] + 0.5 * geotransform[1],
                    geotransform[1],
                );
                x.set_type_and_direction(
                    Some(DimensionType::HorizontalX),
                    Some(DimensionDirection::East),
                );
            }
        }
        let mut y = y_dim.write();
        if y.indexing_variable().is_none() && y.regular_coordinates().is_none() {
            debug!("synthesizing regular Y coordinates for dimension {}", y.name());
            y.set_regular_coordinates(
                geotransform[3] + 0.5 * geotransform[5],
                geotransform[5],
            );
            y.set_type_and_direction(
                Some(DimensionType::HorizontalY),
                Some(DimensionDirection::North),
            );
        }
    }
}

impl Array {
    /// Whether this 1-D coordinate array is regularly spaced, and its `(start, step)`.
    ///
    /// The answer is memoized in the store-wide coordinate-regularity cache, keyed by the
    /// array path; the cache is only invalidated by an explicit
    /// [`clear_coordinate_regularity`](crate::context::StoreContext::clear_coordinate_regularity).
    ///
    /// # Errors
    /// Returns a [`ZarrError`] for a non-1-D or non-numeric array, or on a failing read.
    pub fn coordinate_regularity(&self) -> Result<CoordinateRegularity, ZarrError> {
        self.check_not_deleted()?;
        if self.dimensionality() != 1 || !self.data_type().is_numeric() {
            return Err(ZarrError::invalid_argument(format!(
                "{} is not a 1-D numeric coordinate array",
                self.path()
            )));
        }
        if let Some(memoized) = self.ctx().coordinate_regularity(self.path().as_str()) {
            return Ok(memoized);
        }

        let size = self.shape()[0];
        let values = self.read_elements::<f64>(&[0], &[size])?;
        let regularity = match values.as_slice() {
            [] | [_] => CoordinateRegularity {
                regular: true,
                start: values.first().copied().unwrap_or(0.0),
                step: 0.0,
            },
            [start, rest @ ..] => {
                let step = rest[0] - start;
                let tolerance = step.abs() * REGULARITY_RELATIVE_TOLERANCE;
                let mut regular = step != 0.0;
                let mut previous = *start;
                for &value in rest {
                    if (value - previous - step).abs() > tolerance {
                        regular = false;
                        break;
                    }
                    previous = value;
                }
                CoordinateRegularity {
                    regular,
                    start: *start,
                    step,
                }
            }
        };
        self.ctx()
            .set_coordinate_regularity(self.path().as_str(), regularity);
        Ok(regularity)
    }
}

fn take_crs(attributes: &mut Attributes) -> Option<CrsDefinition> {
    if let Some(value) = attributes.remove("_CRS") {
        if let Some(object) = value.as_object() {
            if let Some(wkt) = object.get("wkt").and_then(Value::as_str) {
                return Some(CrsDefinition::Wkt(wkt.to_string()));
            }
            if let Some(projjson) = object.get("projjson") {
                return Some(CrsDefinition::ProjJson(projjson.clone()));
            }
            if let Some(url) = object.get("url").and_then(Value::as_str) {
                return Some(CrsDefinition::Code(url.to_string()));
            }
        }
        return None;
    }
    if let Some(wkt) = take_string(attributes, "proj:wkt2") {
        return Some(CrsDefinition::Wkt(wkt));
    }
    if let Some(projjson) = attributes.remove("proj:projjson") {
        return Some(CrsDefinition::ProjJson(projjson));
    }
    if let Some(epsg) = attributes.get("proj:epsg").and_then(Value::as_u64) {
        attributes.remove("proj:epsg");
        return u32::try_from(epsg).ok().map(CrsDefinition::Epsg);
    }
    if let Some(code) = take_string(attributes, "proj:code") {
        return Some(CrsDefinition::Code(code));
    }
    take_string(attributes, "grid_mapping").map(CrsDefinition::GridMappingName)
}

fn take_geotransform(attributes: &mut Attributes) -> Option<[f64; 6]> {
    let value = attributes.get("spatial:transform")?;
    let numbers: Option<Vec<f64>> = value.as_array()?.iter().map(Value::as_f64).collect();
    let numbers = numbers?;
    if numbers.len() != 6 {
        return None;
    }
    attributes.remove("spatial:transform");
    Some([
        numbers[0], numbers[1], numbers[2], numbers[3], numbers[4], numbers[5],
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_array_dimensions_consumes() {
        let mut attributes: Attributes =
            serde_json::from_str(r#"{"_ARRAY_DIMENSIONS": ["y", "x"], "other": 1}"#).unwrap();
        assert_eq!(
            take_array_dimensions(&mut attributes),
            Some(vec!["y".to_string(), "x".to_string()])
        );
        assert!(!attributes.contains_key("_ARRAY_DIMENSIONS"));
        assert!(attributes.contains_key("other"));
    }

    #[test]
    fn take_crs_priority() {
        let mut attributes: Attributes = serde_json::from_str(
            r#"{"_CRS": {"wkt": "GEOGCRS[...]"}, "proj:epsg": 4326}"#,
        )
        .unwrap();
        assert_eq!(
            take_crs(&mut attributes),
            Some(CrsDefinition::Wkt("GEOGCRS[...]".to_string()))
        );
        // `_CRS` consumed, `proj:epsg` still available for a second pass.
        assert_eq!(take_crs(&mut attributes), Some(CrsDefinition::Epsg(4326)));
        assert_eq!(take_crs(&mut attributes), None);
    }

    #[test]
    fn take_geotransform_validates() {
        let mut attributes: Attributes =
            serde_json::from_str(r#"{"spatial:transform": [440720.0, 60.0, 0.0, 3751320.0, 0.0, -60.0]}"#)
                .unwrap();
        assert_eq!(
            take_geotransform(&mut attributes),
            Some([440_720.0, 60.0, 0.0, 3_751_320.0, 0.0, -60.0])
        );
        let mut attributes: Attributes =
            serde_json::from_str(r#"{"spatial:transform": [1.0, 2.0]}"#).unwrap();
        assert_eq!(take_geotransform(&mut attributes), None);
        assert!(attributes.contains_key("spatial:transform"));
    }
}
