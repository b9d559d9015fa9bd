/*
This tool is part of the BluespotTools pluvial flood screening library.
Authors: Dr. Mette Kirkeby
Created: 20/06/2023
Last Modified: 28/11/2024
License: MIT
*/

use crate::tools::*;
use bluespot_common::algorithms::net::NodeType;
use bluespot_common::algorithms::rain::{NetworkNode, StreamNetwork};
use bluespot_common::utils::get_formatted_elapsed_time;
use bluespot_vector::{Feature, GeoJsonVectorSink, GeoJsonVectorSource, VectorSink, VectorSource};
use serde_json::json;
use std::collections::HashMap;
use std::env;
use std::io::{Error, ErrorKind};
use std::path;
use std::time::Instant;

/// Calculates bluespot fill and spill volumes for specific rain incidents.
/// Terrain is impermeable, stream capacity is infinite and time is not
/// modelled: each incident's volume simply propagates through the stream
/// network until it is stored in a bluespot or leaves the raster.
///
/// Multiple rain incidents can be calculated at once by repeating the
/// `--rain` option. Per node and incident of R mm the output carries the
/// attributes `rainv_R` (local watershed volume), `spillv_R` (volume spilled
/// downstream), `v_R` (stored volume) and `pctv_R` (percent filled; null for
/// junction nodes).
///
/// # See Also
/// `Network`
pub struct Rain {
    name: String,
    description: String,
    toolbox: String,
    parameters: Vec<ToolParameter>,
    example_usage: String,
}

impl Rain {
    pub fn new() -> Rain {
        // public constructor
        let name = "Rain".to_string();
        let toolbox = "Bluespot Analysis".to_string();
        let description =
            "Calculates bluespot fill and spill volumes for specific rain incidents.".to_string();

        let mut parameters = vec![];
        parameters.push(ToolParameter {
            name: "Input Nodes Datasource".to_owned(),
            flags: vec!["--nodes".to_owned()],
            description: "Vector datasource containing the network nodes layer.".to_owned(),
            parameter_type: ParameterType::ExistingFile(ParameterFileType::Vector),
            default_value: None,
            optional: false,
        });

        parameters.push(ToolParameter {
            name: "Nodes Layer Name".to_owned(),
            flags: vec!["--nodes_layer".to_owned()],
            description: "Name of the nodes layer.".to_owned(),
            parameter_type: ParameterType::String,
            default_value: Some("nodes".to_owned()),
            optional: true,
        });

        parameters.push(ToolParameter {
            name: "Rain Incident (mm)".to_owned(),
            flags: vec!["--rain".to_owned()],
            description: "Rain incident in mm. Repeat the flag for multiple incidents.".to_owned(),
            parameter_type: ParameterType::FloatList,
            default_value: None,
            optional: false,
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
            name: "Output Layer Name".to_owned(),
            flags: vec!["--out_layer".to_owned()],
            description: "Layer name of the output events layer.".to_owned(),
            parameter_type: ParameterType::String,
            default_value: Some("events".to_owned()),
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
            ">>.*{0} -r={1} -v --wd=\"*path*to*data*\" --nodes=vector --rain=10 --rain=100 --out=vector",
            short_exe, name
        )
        .replace("*", &sep);

        Rain {
            name: name,
            description: description,
            toolbox: toolbox,
            parameters: parameters,
            example_usage: usage,
        }
    }
}

/// Parses the persisted node records of a nodes layer.
pub fn network_nodes_from_features(features: &[Feature]) -> Result<Vec<NetworkNode>, Error> {
    let mut nodes = vec![];
    for feature in features {
        let node_type = NodeType::from_str(&feature_string(feature, "nodetype")?)?;
        nodes.push(NetworkNode {
            node_id: feature_i32(feature, "nodeid")?,
            downstream_id: feature_opt_i32(feature, "dstrnodeid"),
            node_type: node_type,
            cell: (
                feature_i32(feature, "cell_row")? as isize,
                feature_i32(feature, "cell_col")? as isize,
            ),
            bspot_id: feature_opt_i32(feature, "bspot_id"),
            bspot_area: feature_f64(feature, "bspot_area")?,
            bspot_vol: feature_f64(feature, "bspot_vol")?,
            wshed_area: feature_f64(feature, "wshed_area")?,
        });
    }
    Ok(nodes)
}

// Rain amounts are formatted with shortest round-trip formatting, so an
// incident of 10 mm yields `spillv_10` and one of 30.5 mm `spillv_30.5`.
fn rain_suffix(rain_mm: f64) -> String {
    format!("{}", rain_mm)
}

/// Runs the rain incidents over the node features and merges the per-node
/// event values into their properties.
pub fn apply_rain_events(features: &mut [Feature], rains_mm: &[f64]) -> Result<(), Error> {
    let nodes = network_nodes_from_features(features)?;
    let network = StreamNetwork::new(nodes);

    let mut index: HashMap<i32, usize> = HashMap::new();
    for (i, feature) in features.iter().enumerate() {
        index.insert(feature_i32(feature, "nodeid")?, i);
    }

    for rain_mm in rains_mm {
        let suffix = rain_suffix(*rain_mm);
        for event in network.rain_event(*rain_mm) {
            let i = *index.get(&event.node_id).ok_or_else(|| {
                Error::new(
                    ErrorKind::Other,
                    format!("Event for unknown node id {}.", event.node_id),
                )
            })?;
            let feature = &mut features[i];
            feature.set_property(&format!("rainv_{}", suffix), json!(event.rain_vol));
            feature.set_property(&format!("spillv_{}", suffix), json!(event.spill_vol));
            feature.set_property(&format!("v_{}", suffix), json!(event.fill_vol));
            feature.set_property(
                &format!("pctv_{}", suffix),
                match event.fill_pct {
                    Some(pct) => json!(pct),
                    None => json!(null),
                },
            );
        }
    }
    Ok(())
}

impl BluespotTool for Rain {
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
        let mut nodes_datasource = String::new();
        let mut nodes_layer = "nodes".to_string();
        let mut output_datasource = String::new();
        let mut output_layer = "events".to_string();
        let mut rains_mm: Vec<f64> = vec![];

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
            if flag_val == "-nodes" {
                nodes_datasource = if keyval {
                    vec[1].to_string()
                } else {
                    args[i + 1].to_string()
                };
            } else if flag_val == "-nodes_layer" {
                nodes_layer = if keyval {
                    vec[1].to_string()
                } else {
                    args[i + 1].to_string()
                };
            } else if flag_val == "-rain" {
                let value = if keyval {
                    vec[1].to_string()
                } else {
                    args[i + 1].to_string()
                };
                rains_mm.push(value.parse::<f64>().map_err(|_| {
                    Error::new(
                        ErrorKind::InvalidInput,
                        format!("Error parsing rain incident '{}'.", value),
                    )
                })?);
            } else if flag_val == "-out" || flag_val == "-o" || flag_val == "-output" {
                output_datasource = if keyval {
                    vec[1].to_string()
                } else {
                    args[i + 1].to_string()
                };
            } else if flag_val == "-out_layer" {
                output_layer = if keyval {
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

        if rains_mm.is_empty() {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "At least one rain incident (--rain) must be specified.",
            ));
        }

        let sep: String = path::MAIN_SEPARATOR.to_string();

        if !nodes_datasource.contains(&sep) && !nodes_datasource.contains("/") {
            nodes_datasource = format!("{}{}", working_directory, nodes_datasource);
        }
        if !output_datasource.contains(&sep) && !output_datasource.contains("/") {
            output_datasource = format!("{}{}", working_directory, output_datasource);
        }

        if verbose {
            println!("Reading input nodes...")
        };

        let nodes_source = GeoJsonVectorSource::new(&nodes_datasource, &nodes_layer)?;
        let mut features = nodes_source.read_features()?;

        let start = Instant::now();
        if verbose {
            for rain_mm in &rains_mm {
                println!("Calculating rain event: {}mm", rain_mm);
            }
        }
        apply_rain_events(&mut features, &rains_mm)?;

        if verbose {
            println!("Writing {} event records...", features.len())
        };
        let mut sink =
            GeoJsonVectorSink::new(&output_datasource, &output_layer, &nodes_source.crs());
        sink.write_features(&features)?;

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
    use super::{apply_rain_events, rain_suffix};
    use bluespot_vector::{Feature, Geometry};
    use serde_json::json;

    fn node_feature(id: i32, downstream: Option<i32>, bspot_vol: f64, wshed_area: f64) -> Feature {
        let mut f = Feature::new(id as i64, Geometry::point(0.0, 0.0));
        f.set_property("nodeid", json!(id));
        f.set_property(
            "dstrnodeid",
            match downstream {
                Some(d) => json!(d),
                None => json!(null),
            },
        );
        f.set_property("nodetype", json!("pourpoint"));
        f.set_property("cell_row", json!(0));
        f.set_property("cell_col", json!(0));
        f.set_property("bspot_id", json!(id));
        f.set_property("bspot_area", json!(0.0));
        f.set_property("bspot_vol", json!(bspot_vol));
        f.set_property("wshed_area", json!(wshed_area));
        f
    }

    #[test]
    fn test_rain_suffix_shortest_round_trip() {
        assert_eq!(rain_suffix(10.0), "10");
        assert_eq!(rain_suffix(30.5), "30.5");
        assert_eq!(rain_suffix(0.25), "0.25");
    }

    #[test]
    fn test_apply_rain_events_tags_attributes() {
        // 1000 m2 watershed, 5 m3 capacity, draining into a large root spot.
        let mut features = vec![
            node_feature(1, Some(2), 5.0, 1000.0),
            node_feature(2, None, 1000.0, 0.0),
        ];
        apply_rain_events(&mut features, &[10.0, 30.5]).unwrap();

        assert_eq!(features[0].property("rainv_10"), Some(&json!(10.0)));
        assert_eq!(features[0].property("v_10"), Some(&json!(5.0)));
        assert_eq!(features[0].property("spillv_10"), Some(&json!(5.0)));
        assert_eq!(features[0].property("pctv_10"), Some(&json!(100.0)));
        // The root stores the upstream spill.
        assert_eq!(features[1].property("v_10"), Some(&json!(5.0)));
        assert_eq!(features[1].property("spillv_10"), Some(&json!(0.0)));
        // The second incident gets its own attribute set.
        assert_eq!(features[0].property("rainv_30.5"), Some(&json!(30.5)));
        assert!(features[0].property("spillv_30.5").is_some());
    }
}
