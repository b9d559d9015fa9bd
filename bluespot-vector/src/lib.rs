/*
This code is part of the BluespotTools pluvial flood screening library.
Authors: Dr. Mette Kirkeby
Created: 02/06/2023
Last Modified: 22/05/2025
License: MIT
*/

mod geojson;

pub use self::geojson::{GeoJsonVectorSink, GeoJsonVectorSource};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::io::Error;

/// A GeoJSON-shaped geometry: a tagged `{type, coordinates}` pair.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    Point { coordinates: [f64; 2] },
    LineString { coordinates: Vec<[f64; 2]> },
}

impl Geometry {
    pub fn point(x: f64, y: f64) -> Geometry {
        Geometry::Point {
            coordinates: [x, y],
        }
    }

    pub fn line_string(coordinates: Vec<[f64; 2]>) -> Geometry {
        Geometry::LineString {
            coordinates: coordinates,
        }
    }
}

/// A vector feature: id, geometry and a free-form property map.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Feature {
    #[serde(rename = "type", default = "feature_type")]
    pub feature_type: String,
    pub id: i64,
    pub geometry: Geometry,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

fn feature_type() -> String {
    "Feature".to_string()
}

impl Feature {
    pub fn new(id: i64, geometry: Geometry) -> Feature {
        Feature {
            feature_type: feature_type(),
            id: id,
            geometry: geometry,
            properties: Map::new(),
        }
    }

    pub fn set_property(&mut self, name: &str, value: Value) {
        self.properties.insert(name.to_string(), value);
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }
}

/// A vector input collaborator yielding the features of a named layer.
pub trait VectorSource {
    fn crs(&self) -> String;
    fn read_features(&self) -> Result<Vec<Feature>, Error>;
}

/// A vector output collaborator persisting features as a named layer.
pub trait VectorSink {
    fn write_features(&mut self, features: &[Feature]) -> Result<(), Error>;
}

/// In-memory vector source.
pub struct MemoryVectorSource {
    features: Vec<Feature>,
    crs: String,
}

impl MemoryVectorSource {
    pub fn new(features: Vec<Feature>, crs: &str) -> MemoryVectorSource {
        MemoryVectorSource {
            features: features,
            crs: crs.to_string(),
        }
    }
}

impl VectorSource for MemoryVectorSource {
    fn crs(&self) -> String {
        self.crs.clone()
    }

    fn read_features(&self) -> Result<Vec<Feature>, Error> {
        Ok(self.features.clone())
    }
}

/// In-memory vector sink keeping the last written feature set.
pub struct MemoryVectorSink {
    pub features: Vec<Feature>,
}

impl MemoryVectorSink {
    pub fn new() -> MemoryVectorSink {
        MemoryVectorSink { features: vec![] }
    }
}

impl VectorSink for MemoryVectorSink {
    fn write_features(&mut self, features: &[Feature]) -> Result<(), Error> {
        self.features = features.to_vec();
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::{Feature, Geometry, MemoryVectorSink, MemoryVectorSource, VectorSink, VectorSource};
    use serde_json::json;

    #[test]
    fn test_geometry_serializes_geojson_shaped() {
        let point = Geometry::point(12.5, 55.7);
        let value = serde_json::to_value(&point).unwrap();
        assert_eq!(
            value,
            json!({"type": "Point", "coordinates": [12.5, 55.7]})
        );

        let line = Geometry::line_string(vec![[0.0, 0.0], [1.0, 1.0]]);
        let value = serde_json::to_value(&line).unwrap();
        assert_eq!(
            value,
            json!({"type": "LineString", "coordinates": [[0.0, 0.0], [1.0, 1.0]]})
        );
    }

    #[test]
    fn test_memory_collaborators() {
        let mut feature = Feature::new(3, Geometry::point(1.0, 2.0));
        feature.set_property("nodeid", json!(3));
        let source = MemoryVectorSource::new(vec![feature], "EPSG:25832");
        assert_eq!(source.crs(), "EPSG:25832");

        let features = source.read_features().unwrap();
        let mut sink = MemoryVectorSink::new();
        sink.write_features(&features).unwrap();
        assert_eq!(sink.features.len(), 1);
        assert_eq!(sink.features[0].property("nodeid"), Some(&json!(3)));
    }

    #[test]
    fn test_feature_round_trip() {
        let mut feature = Feature::new(7, Geometry::point(1.0, 2.0));
        feature.set_property("bspot_id", json!(7));
        feature.set_property("bspot_vol", json!(12.25));
        let text = serde_json::to_string(&feature).unwrap();
        let back: Feature = serde_json::from_str(&text).unwrap();
        assert_eq!(back.id, 7);
        assert_eq!(back.property("bspot_id"), Some(&json!(7)));
        assert_eq!(back.geometry, Geometry::point(1.0, 2.0));
    }
}
