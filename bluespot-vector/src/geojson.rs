use super::{Feature, VectorSink, VectorSource};
use serde::{Deserialize, Serialize};
use serde_json;
use std::fs;
use std::io::{Error, ErrorKind};
use std::path::{Path, PathBuf};

// A layer is a single <layer>.geojson file inside a datasource directory,
// holding one FeatureCollection. The CRS string rides along in the legacy
// named-crs member.

#[derive(Serialize, Deserialize)]
struct FeatureCollection {
    #[serde(rename = "type")]
    collection_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    crs: Option<CrsMember>,
    features: Vec<Feature>,
}

#[derive(Serialize, Deserialize)]
struct CrsMember {
    #[serde(rename = "type")]
    crs_type: String,
    properties: CrsProperties,
}

#[derive(Serialize, Deserialize)]
struct CrsProperties {
    name: String,
}

fn layer_file(datasource: &str, layer: &str) -> PathBuf {
    let path = Path::new(datasource);
    if path.is_dir() || !datasource.to_lowercase().ends_with(".geojson") {
        path.join(format!("{}.geojson", layer))
    } else {
        path.to_path_buf()
    }
}

/// File-backed vector source reading a GeoJSON layer. The datasource is
/// either a directory holding `<layer>.geojson` or the path of a .geojson
/// file itself.
pub struct GeoJsonVectorSource {
    crs: String,
    features: Vec<Feature>,
}

impl GeoJsonVectorSource {
    pub fn new(datasource: &str, layer: &str) -> Result<GeoJsonVectorSource, Error> {
        let file = layer_file(datasource, layer);
        let contents = fs::read_to_string(&file)?;
        let collection: FeatureCollection = serde_json::from_str(&contents).map_err(|e| {
            Error::new(
                ErrorKind::InvalidData,
                format!("Malformed GeoJSON in {}: {}", file.display(), e),
            )
        })?;
        Ok(GeoJsonVectorSource {
            crs: collection
                .crs
                .map(|c| c.properties.name)
                .unwrap_or_else(String::new),
            features: collection.features,
        })
    }
}

impl VectorSource for GeoJsonVectorSource {
    fn crs(&self) -> String {
        self.crs.clone()
    }

    fn read_features(&self) -> Result<Vec<Feature>, Error> {
        Ok(self.features.clone())
    }
}

/// File-backed vector sink persisting features as a GeoJSON layer inside a
/// datasource directory. The directory is created when missing.
pub struct GeoJsonVectorSink {
    datasource: String,
    layer: String,
    crs: String,
}

impl GeoJsonVectorSink {
    pub fn new(datasource: &str, layer: &str, crs: &str) -> GeoJsonVectorSink {
        GeoJsonVectorSink {
            datasource: datasource.to_string(),
            layer: layer.to_string(),
            crs: crs.to_string(),
        }
    }
}

impl VectorSink for GeoJsonVectorSink {
    fn write_features(&mut self, features: &[Feature]) -> Result<(), Error> {
        let path = Path::new(&self.datasource);
        if !path.exists() {
            fs::create_dir_all(path)?;
        }
        let collection = FeatureCollection {
            collection_type: "FeatureCollection".to_string(),
            crs: if self.crs.is_empty() {
                None
            } else {
                Some(CrsMember {
                    crs_type: "name".to_string(),
                    properties: CrsProperties {
                        name: self.crs.clone(),
                    },
                })
            },
            features: features.to_vec(),
        };
        let text = serde_json::to_string(&collection).map_err(|e| {
            Error::new(
                ErrorKind::Other,
                format!("Error serializing layer {}: {}", self.layer, e),
            )
        })?;
        fs::write(layer_file(&self.datasource, &self.layer), text)
    }
}

#[cfg(test)]
mod test {
    use super::super::{Feature, Geometry, VectorSink, VectorSource};
    use super::{GeoJsonVectorSink, GeoJsonVectorSource};
    use serde_json::json;
    use std::fs;

    #[test]
    fn test_geojson_layer_round_trip() {
        let dir = std::env::temp_dir().join("bluespot_geojson_test");
        let _ = fs::remove_dir_all(&dir);
        let datasource = dir.to_string_lossy().to_string();

        let mut feature = Feature::new(1, Geometry::point(710000.5, 6170000.5));
        feature.set_property("nodeid", json!(1));
        feature.set_property("dstrnodeid", json!(null));

        let mut sink = GeoJsonVectorSink::new(&datasource, "nodes", "EPSG:25832");
        sink.write_features(&[feature]).unwrap();

        let source = GeoJsonVectorSource::new(&datasource, "nodes").unwrap();
        assert_eq!(source.crs(), "EPSG:25832");
        let features = source.read_features().unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].property("nodeid"), Some(&json!(1)));
        assert_eq!(features[0].property("dstrnodeid"), Some(&json!(null)));

        let _ = fs::remove_dir_all(&dir);
    }
}
