/*
This tool is part of the BluespotTools pluvial flood screening library.
Authors: Dr. Mette Kirkeby
Created: 13/06/2023
Last Modified: 17/02/2025
License: MIT
*/

use crate::tools::*;
use bluespot_common::algorithms::net::{self, NodeType, StreamNode};
use bluespot_common::utils::get_formatted_elapsed_time;
use bluespot_raster::*;
use bluespot_vector::{Feature, GeoJsonVectorSink, GeoJsonVectorSource, Geometry, VectorSink, VectorSource};
use serde_json::json;
use std::collections::HashMap;
use std::env;
use std::io::{Error, ErrorKind};
use std::path;
use std::time::Instant;

/// Calculates the stream network between bluespots. Each pour point is traced
/// downstream to the next bluespot, and junction nodes are inserted wherever
/// two or more streams merge before reaching their common downstream
/// bluespot, so that the merged reach is represented once.
///
/// The tool writes two layers: `nodes` (points; the persisted network record
/// consumed by `Rain`) and `streams` (the traced stream lines).
///
/// # See Also
/// `Pourpts`, `Rain`
pub struct Network {
    name: String,
    description: String,
    toolbox: String,
    parameters: Vec<ToolParameter>,
    example_usage: String,
}

impl Network {
    pub fn new() -> Network {
        // public constructor
        let name = "Network".to_string();
        let toolbox = "Bluespot Analysis".to_string();
        let description = "Calculates the stream network between bluespots.".to_string();

        let mut parameters = vec![];
        parameters.push(ToolParameter {
            name: "Input Bluespot File".to_owned(),
            flags: vec!["--bluespots".to_owned()],
            description: "Input raster file holding labelled bluespots.".to_owned(),
            parameter_type: ParameterType::ExistingFile(ParameterFileType::Raster),
            default_value: None,
            optional: false,
        });

        parameters.push(ToolParameter {
            name: "Input Flow Direction File".to_owned(),
            flags: vec!["--flowdir".to_owned()],
            description: "Input raster file holding flow directions.".to_owned(),
            parameter_type: ParameterType::ExistingFile(ParameterFileType::Raster),
            default_value: None,
            optional: false,
        });

        parameters.push(ToolParameter {
            name: "Input Pour Points Datasource".to_owned(),
            flags: vec!["--pourpoints".to_owned()],
            description: "Vector datasource containing the pour points layer.".to_owned(),
            parameter_type: ParameterType::ExistingFile(ParameterFileType::Vector),
            default_value: None,
            optional: false,
        });

        parameters.push(ToolParameter {
            name: "Pour Points Layer Name".to_owned(),
            flags: vec!["--pourpoints_layer".to_owned()],
            description: "Name of the pour points layer.".to_owned(),
            parameter_type: ParameterType::String,
            default_value: Some("pourpoints".to_owned()),
            optional: true,
        });

        parameters.push(ToolParameter {
            name: "Output Datasource".to_owned(),
            flags: vec!["--out".to_owned()],
            description: "Output vector datasource directory.".to_owned(),
            parameter_type: ParameterType::Directory,
            default_value: None,
            optional: false,
        });

        parameters.push(ToolParameter {
            name: "Output Nodes Layer Name".to_owned(),
            flags: vec!["--out_nodes_layer".to_owned()],
            description: "Layer name of the output nodes layer.".to_owned(),
            parameter_type: ParameterType::String,
            default_value: Some("nodes".to_owned()),
            optional: true,
        });

        parameters.push(ToolParameter {
            name: "Output Streams Layer Name".to_owned(),
            flags: vec!["--out_streams_layer".to_owned()],
            description: "Layer name of the output streams layer.".to_owned(),
            parameter_type: ParameterType::String,
            default_value: Some("streams".to_owned()),
            optional: true,
        });

        let sep: String = path::MAIN_SEPARATOR.to_string();
        let e = format!("{}", env::current_exe().unwrap().display());
        let mut parent = env::current_exe().unwrap();
        parent.pop();
        let p = format!("{}", parent.display());
        let mut short_exe = e
            .replace(&p, "")
            .replace(".exe", "")
            .replace(".", "")
            .replace(&sep, "");
        if e.contains(".exe") {
            short_exe += ".exe";
        }
        let usage = format!(
            ">>.*{0} -r={1} -v --wd=\"*path*to*data*\" --bluespots=bspots.asc --flowdir=flowdir.asc --pourpoints=vector --out=vector",
            short_exe, name
        )
        .replace("*", &sep);

        Network {
            name: name,
            description: description,
            toolbox: toolbox,
            parameters: parameters,
            example_usage: usage,
        }
    }
}

/// Pulls the pour point cells out of a pour points layer, paired with their
/// bluespot ids.
pub fn pour_point_cells_from_features(
    features: &[Feature],
) -> Result<Vec<(i32, (isize, isize))>, Error> {
    let mut pour_points = vec![];
    for feature in features {
        let pid = feature_i32(feature, "bspot_id")?;
        let row = feature_i32(feature, "cell_row")? as isize;
        let col = feature_i32(feature, "cell_col")? as isize;
        pour_points.push((pid, (row, col)));
    }
    Ok(pour_points)
}

/// Builds the persisted node records. Pour point nodes carry the bluespot
/// statistics of their pour point feature; junction nodes get zeroed
/// bluespot fields and a null `bspot_id`.
pub fn build_node_features(
    nodes: &[StreamNode],
    pour_point_features: &[Feature],
    configs: &RasterConfigs,
) -> Result<Vec<Feature>, Error> {
    let mut pp_index: HashMap<i32, &Feature> = HashMap::new();
    for feature in pour_point_features {
        pp_index.insert(feature_i32(feature, "bspot_id")?, feature);
    }

    let mut node_features = vec![];
    for node in nodes {
        let (x, y) = configs.cell_to_world(node.cell.0, node.cell.1);
        let mut feature = Feature::new(node.id as i64, Geometry::point(x, y));
        feature.set_property("nodeid", json!(node.id));
        feature.set_property(
            "dstrnodeid",
            match node.downstream_id {
                Some(id) => json!(id),
                None => json!(null),
            },
        );
        feature.set_property("nodetype", json!(node.node_type.as_str()));
        feature.set_property("cell_row", json!(node.cell.0));
        feature.set_property("cell_col", json!(node.cell.1));
        // Default properties for junction nodes
        feature.set_property("bspot_id", json!(null));
        feature.set_property("bspot_area", json!(0.0));
        feature.set_property("bspot_vol", json!(0.0));
        feature.set_property("wshed_area", json!(0.0));
        if node.node_type == NodeType::PourPoint {
            if let Some(pp) = pp_index.get(&node.id) {
                feature.set_property("bspot_id", json!(feature_i32(pp, "bspot_id")?));
                feature.set_property("bspot_area", json!(feature_f64(pp, "bspot_area")?));
                feature.set_property("bspot_vol", json!(feature_f64(pp, "bspot_vol")?));
                feature.set_property("wshed_area", json!(feature_f64(pp, "wshed_area")?));
            }
        }
        node_features.push(feature);
    }
    Ok(node_features)
}

/// Builds the stream line features: one LineString per node with a traced
/// geometry.
pub fn build_stream_features(nodes: &[StreamNode], configs: &RasterConfigs) -> Vec<Feature> {
    let mut stream_features = vec![];
    for node in nodes {
        if node.geometry.is_empty() {
            continue;
        }
        let coordinates: Vec<[f64; 2]> = node
            .geometry
            .iter()
            .map(|cell| {
                let (x, y) = configs.cell_to_world(cell.0, cell.1);
                [x, y]
            })
            .collect();
        let mut feature = Feature::new(node.id as i64, Geometry::line_string(coordinates));
        feature.set_property("nodeid", json!(node.id));
        feature.set_property(
            "dstrnodeid",
            match node.downstream_id {
                Some(id) => json!(id),
                None => json!(null),
            },
        );
        stream_features.push(feature);
    }
    stream_features
}

impl BluespotTool for Network {
    fn get_source_file(&self) -> String {
        String::from(file!())
    }

    fn get_tool_name(&self) -> String {
        self.name.clone()
    }

    fn get_tool_description(&self) -> String {
        self.description.clone()
    }

    fn get_tool_parameters(&self) -> String {
        match serde_json::to_string(&self.parameters) {
            Ok(json_str) => return format!("{{\"parameters\":{}}}", json_str),
            Err(err) => return format!("{:?}", err),
        }
    }

    fn get_example_usage(&self) -> String {
        self.example_usage.clone()
    }

    fn get_toolbox(&self) -> String {
        self.toolbox.clone()
    }

    fn run<'a>(
        &self,
        args: Vec<String>,
        working_directory: &'a str,
        verbose: bool,
    ) -> Result<(), Error> {
        let mut bluespots_file = String::new();
        let mut flowdir_file = String::new();
        let mut pourpoints_datasource = String::new();
        let mut pourpoints_layer = "pourpoints".to_string();
        let mut output_datasource = String::new();
        let mut nodes_layer = "nodes".to_string();
        let mut streams_layer = "streams".to_string();

        if args.len() == 0 {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "Tool run with no parameters.",
            ));
        }
        for i in 0..args.len() {
            let mut arg = args[i].replace("\"", "");
            arg = arg.replace("\'", "");
            let cmd = arg.split("="); // in case an equals sign was used
            let vec = cmd.collect::<Vec<&str>>();
            let mut keyval = false;
            if vec.len() > 1 {
                keyval = true;
            }
            let flag_val = vec[0].to_lowercase().replace("--", "-");
            if flag_val == "-bluespots" {
                bluespots_file = if keyval {
                    vec[1].to_string()
                } else {
                    args[i + 1].to_string()
                };
            } else if flag_val == "-flowdir" {
                flowdir_file = if keyval {
                    vec[1].to_string()
                } else {
                    args[i + 1].to_string()
                };
            } else if flag_val == "-pourpoints" {
                pourpoints_datasource = if keyval {
                    vec[1].to_string()
                } else {
                    args[i + 1].to_string()
                };
            } else if flag_val == "-pourpoints_layer" {
                pourpoints_layer = if keyval {
                    vec[1].to_string()
                } else {
                    args[i + 1].to_string()
                };
            } else if flag_val == "-out" || flag_val == "-o" || flag_val == "-output" {
                output_datasource = if keyval {
                    vec[1].to_string()
                } else {
                    args[i + 1].to_string()
                };
            } else if flag_val == "-out_nodes_layer" {
                nodes_layer = if keyval {
                    vec[1].to_string()
                } else {
                    args[i + 1].to_string()
                };
            } else if flag_val == "-out_streams_layer" {
                streams_layer = if keyval {
                    vec[1].to_string()
                } else {
                    args[i + 1].to_string()
                };
            }
        }

        if verbose {
            let tool_name = self.get_tool_name();
            let welcome_len = format!("* Welcome to {} *", tool_name).len().max(28);
            // 28 = length of the 'Powered by' statement.
            println!("{}", "*".repeat(welcome_len));
            println!("* Welcome to {} {}*", tool_name, " ".repeat(welcome_len - 15 - tool_name.len()));
            println!("* Powered by BluespotTools {}*", " ".repeat(welcome_len - 28));
            println!("{}", "*".repeat(welcome_len));
        }

        let sep: String = path::MAIN_SEPARATOR.to_string();

        if !bluespots_file.contains(&sep) && !bluespots_file.contains("/") {
            bluespots_file = format!("{}{}", working_directory, bluespots_file);
        }
        if !flowdir_file.contains(&sep) && !flowdir_file.contains("/") {
            flowdir_file = format!("{}{}", working_directory, flowdir_file);
        }
        if !pourpoints_datasource.contains(&sep) && !pourpoints_datasource.contains("/") {
            pourpoints_datasource = format!("{}{}", working_directory, pourpoints_datasource);
        }
        if !output_datasource.contains(&sep) && !output_datasource.contains("/") {
            output_datasource = format!("{}{}", working_directory, output_datasource);
        }

        if verbose {
            println!("Reading data...")
        };

        let pourpoints_source = GeoJsonVectorSource::new(&pourpoints_datasource, &pourpoints_layer)?;
        let pour_point_features = pourpoints_source.read_features()?;
        let pour_points = pour_point_cells_from_features(&pour_point_features)?;

        let bluespots = FileRasterSource::new(&bluespots_file, None)?.read()?;
        let flowdir_raster = FileRasterSource::new(&flowdir_file, None)?.read()?;
        check_same_shape(&bluespots, &flowdir_raster)?;

        let start = Instant::now();
        let labelled = labels_from_raster(&bluespots)?;
        let flowdir = flow_directions_from_raster(&flowdir_raster)?;

        if verbose {
            println!("Processing stream network...")
        };
        let nodes = net::pourpoint_network(&flowdir, &labelled, &pour_points, Some(0))?;

        if verbose {
            println!("Writing {} nodes...", nodes.len())
        };
        let crs = flowdir_raster.configs.coordinate_ref_system_wkt.clone();
        let node_features = build_node_features(&nodes, &pour_point_features, &bluespots.configs)?;
        let mut nodes_sink = GeoJsonVectorSink::new(&output_datasource, &nodes_layer, &crs);
        nodes_sink.write_features(&node_features)?;

        let stream_features = build_stream_features(&nodes, &bluespots.configs);
        let mut streams_sink = GeoJsonVectorSink::new(&output_datasource, &streams_layer, &crs);
        streams_sink.write_features(&stream_features)?;

        let elapsed_time = get_formatted_elapsed_time(start);
        if verbose {
            println!(
                "{}",
                &format!("Elapsed Time (excluding I/O): {}", elapsed_time)
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::{build_node_features, build_stream_features};
    use bluespot_common::algorithms::net::{NodeType, StreamNode};
    use bluespot_raster::RasterConfigs;
    use bluespot_vector::{Feature, Geometry};
    use serde_json::json;

    fn configs() -> RasterConfigs {
        RasterConfigs {
            rows: 10,
            columns: 10,
            west: 0.0,
            north: 10.0,
            south: 0.0,
            east: 10.0,
            resolution_x: 1.0,
            resolution_y: 1.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_build_node_features() {
        let nodes = vec![
            StreamNode {
                id: 1,
                downstream_id: Some(2),
                node_type: NodeType::PourPoint,
                cell: (3, 4),
                geometry: vec![(3, 4), (4, 4)],
            },
            StreamNode {
                id: 2,
                downstream_id: None,
                node_type: NodeType::Junction,
                cell: (4, 4),
                geometry: vec![(4, 4), (5, 4)],
            },
        ];
        let mut pp = Feature::new(1, Geometry::point(4.5, 6.5));
        pp.set_property("bspot_id", json!(1));
        pp.set_property("bspot_area", json!(12.0));
        pp.set_property("bspot_vol", json!(3.5));
        pp.set_property("wshed_area", json!(100.0));

        let features = build_node_features(&nodes, &[pp], &configs()).unwrap();
        assert_eq!(features.len(), 2);
        // The pour point node copies its bluespot statistics.
        assert_eq!(features[0].property("nodeid"), Some(&json!(1)));
        assert_eq!(features[0].property("dstrnodeid"), Some(&json!(2)));
        assert_eq!(features[0].property("nodetype"), Some(&json!("pourpoint")));
        assert_eq!(features[0].property("bspot_vol"), Some(&json!(3.5)));
        assert_eq!(features[0].property("wshed_area"), Some(&json!(100.0)));
        // The junction node gets zeroed bluespot fields and a null id.
        assert_eq!(features[1].property("nodetype"), Some(&json!("junction")));
        assert_eq!(features[1].property("dstrnodeid"), Some(&json!(null)));
        assert_eq!(features[1].property("bspot_id"), Some(&json!(null)));
        assert_eq!(features[1].property("bspot_vol"), Some(&json!(0.0)));

        let streams = build_stream_features(&nodes, &configs());
        assert_eq!(streams.len(), 2);
        match &streams[0].geometry {
            Geometry::LineString { coordinates } => {
                assert_eq!(coordinates.len(), 2);
                assert_eq!(coordinates[0], [4.5, 6.5]);
                assert_eq!(coordinates[1], [4.5, 5.5]);
            }
            _ => panic!("expected a LineString"),
        }
    }
}
