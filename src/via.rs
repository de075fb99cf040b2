use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::mask::Polygon;

/// A region could not be turned into a labelled polygon.
#[derive(Debug, Error, PartialEq)]
pub enum RegionError {
    #[error("polygon has {xs} x coordinates but {ys} y coordinates")]
    MismatchedVertices { xs: usize, ys: usize },
    #[error("unsupported region shape '{0}'")]
    UnsupportedShape(String),
    #[error("region has no 'names' attribute")]
    MissingClassName,
}

/// One image entry of a VIA project export, keyed by `<filename><size>` at the top level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViaImage {
    pub filename: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_regions")]
    pub regions: Vec<ViaRegion>,
    #[serde(default)]
    pub file_attributes: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViaRegion {
    pub shape_attributes: ShapeAttributes,
    #[serde(default)]
    pub region_attributes: RegionAttributes,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShapeAttributes {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub all_points_x: Option<Vec<f64>>,
    #[serde(default)]
    pub all_points_y: Option<Vec<f64>>,
    #[serde(default)]
    pub x: Option<f64>,
    #[serde(default)]
    pub y: Option<f64>,
    #[serde(default)]
    pub width: Option<f64>,
    #[serde(default)]
    pub height: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegionAttributes {
    #[serde(default)]
    pub names: Option<String>,
}

// VIA 1.x wrote regions as an object keyed "0", "1", ... while 2.x writes a list.
fn deserialize_regions<'de, D>(deserializer: D) -> Result<Vec<ViaRegion>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Regions {
        List(Vec<ViaRegion>),
        Keyed(serde_json::Map<String, serde_json::Value>),
    }

    match Regions::deserialize(deserializer)? {
        Regions::List(regions) => Ok(regions),
        Regions::Keyed(map) => map
            .into_iter()
            .map(|(_, value)| serde_json::from_value(value).map_err(D::Error::custom))
            .collect(),
    }
}

impl ShapeAttributes {
    /// Converts the shape into the vertex list the rasterizer fills.
    ///
    /// Shapes that carry `all_points_x`/`all_points_y` (polygon and polyline) are used as
    /// they are. A `rect` becomes its four corners.
    pub fn to_polygon(&self) -> Result<Polygon, RegionError> {
        if let (Some(xs), Some(ys)) = (&self.all_points_x, &self.all_points_y) {
            if xs.len() != ys.len() {
                return Err(RegionError::MismatchedVertices {
                    xs: xs.len(),
                    ys: ys.len(),
                });
            }
            return Ok(Polygon::new(xs.clone(), ys.clone()));
        }

        if let (Some(x), Some(y), Some(w), Some(h)) = (self.x, self.y, self.width, self.height) {
            return Ok(Polygon::new(vec![x, x + w, x + w, x], vec![y, y, y + h, y + h]));
        }

        Err(RegionError::UnsupportedShape(
            self.name.clone().unwrap_or_else(|| "unnamed".into()),
        ))
    }
}

impl ViaRegion {
    /// The class name written by the annotator.
    pub fn class_name(&self) -> Result<&str, RegionError> {
        self.region_attributes
            .names
            .as_deref()
            .ok_or(RegionError::MissingClassName)
    }
}

/// Parses a VIA project export, keeping the images in file order.
pub fn parse_project(json: &str) -> serde_json::Result<Vec<ViaImage>> {
    let project: serde_json::Map<String, serde_json::Value> = serde_json::from_str(json)?;
    project
        .into_iter()
        .map(|(_, value)| serde_json::from_value(value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROJECT: &str = r#"{
        "leaf1.jpg1234": {
            "filename": "leaf1.jpg",
            "size": 1234,
            "regions": [
                {
                    "shape_attributes": {"name": "polygon", "all_points_x": [10, 200, 390], "all_points_y": [20, 280, 30]},
                    "region_attributes": {"names": "Tomato_Healthy"}
                }
            ],
            "file_attributes": {}
        },
        "empty.jpg99": {"filename": "empty.jpg", "size": 99, "regions": [], "file_attributes": {}},
        "old.jpg7": {
            "filename": "old.jpg",
            "regions": {
                "0": {"shape_attributes": {"name": "rect", "x": 1, "y": 2, "width": 3, "height": 4}, "region_attributes": {"names": "Apple_Scab"}},
                "1": {"shape_attributes": {"name": "polygon", "all_points_x": [0.5, 4.5, 2.0], "all_points_y": [0.5, 0.5, 3.5]}, "region_attributes": {"names": "Apple_Rust"}}
            }
        }
    }"#;

    #[test]
    fn parse_project_keeps_file_order() {
        let images = parse_project(PROJECT).unwrap();
        let names: Vec<&str> = images.iter().map(|i| i.filename.as_str()).collect();
        assert_eq!(names, vec!["leaf1.jpg", "empty.jpg", "old.jpg"]);
        assert!(images[1].regions.is_empty());
    }

    #[test]
    fn keyed_regions_are_accepted() {
        let images = parse_project(PROJECT).unwrap();
        let old = &images[2];
        assert_eq!(old.regions.len(), 2);
        assert_eq!(old.regions[0].class_name().unwrap(), "Apple_Scab");
        assert_eq!(old.regions[1].class_name().unwrap(), "Apple_Rust");
    }

    #[test]
    fn rect_becomes_four_corners() {
        let images = parse_project(PROJECT).unwrap();
        let polygon = images[2].regions[0].shape_attributes.to_polygon().unwrap();
        assert_eq!(polygon.xs, vec![1.0, 4.0, 4.0, 1.0]);
        assert_eq!(polygon.ys, vec![2.0, 2.0, 6.0, 6.0]);
    }

    #[test]
    fn shape_errors() {
        let mismatched = ShapeAttributes {
            name: Some("polygon".into()),
            all_points_x: Some(vec![1.0, 2.0, 3.0]),
            all_points_y: Some(vec![1.0, 2.0]),
            ..Default::default()
        };
        assert_eq!(
            mismatched.to_polygon().unwrap_err(),
            RegionError::MismatchedVertices { xs: 3, ys: 2 }
        );

        let circle = ShapeAttributes {
            name: Some("circle".into()),
            ..Default::default()
        };
        assert_eq!(
            circle.to_polygon().unwrap_err(),
            RegionError::UnsupportedShape("circle".into())
        );

        let region = ViaRegion {
            shape_attributes: ShapeAttributes::default(),
            region_attributes: RegionAttributes::default(),
        };
        assert_eq!(region.class_name().unwrap_err(), RegionError::MissingClassName);
    }
}
