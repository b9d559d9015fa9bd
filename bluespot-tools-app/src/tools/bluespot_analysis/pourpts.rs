/*
This tool is part of the BluespotTools pluvial flood screening library.
Authors: Dr. Mette Kirkeby
Created: 30/05/2023
Last Modified: 17/02/2025
License: MIT
*/

use crate::tools::*;
use bluespot_common::algorithms::fill;
use bluespot_common::algorithms::label::{self, LabelStats};
use bluespot_common::utils::get_formatted_elapsed_time;
use bluespot_raster::*;
use bluespot_vector::{Feature, GeoJsonVectorSink, Geometry, VectorSink};
use serde_json::json;
use std::env;
use std::io::{Error, ErrorKind};
use std::path;
use std::time::Instant;

/// Determines the pour point of each bluespot: the cell through which water
/// escapes when the bluespot is filled to its rim. One of two candidate
/// policies applies, selected by the supplied inputs:
///
/// * Maximum accumulated flow within the bluespot (`--accum` given). This
///   picks the most-trafficked threshold cell.
/// * Minimum no-flats filled elevation within the bluespot (`--dem` given).
///   This picks the lowest point on the rim.
///
/// The two policies only differ when a bluespot has multiple threshold cells
/// of identical elevation; ties are broken by row-major cell order. Each pour
/// point feature carries the bluespot statistics used by the downstream
/// network and rain tools: maximum depth, area, volume, local watershed area
/// and the rain depth in mm needed to fill the bluespot from its own
/// watershed (`bspot_fumm`).
///
/// # See Also
/// `Bspots`, `Wsheds`, `Network`
pub struct Pourpts {
    name: String,
    description: String,
    toolbox: String,
    parameters: Vec<ToolParameter>,
    example_usage: String,
}

impl Pourpts {
    pub fn new() -> Pourpts {
        // public constructor
        let name = "Pourpts".to_string();
        let toolbox = "Bluespot Analysis".to_string();
        let description = "Determines a pour point for each bluespot.".to_string();

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
            name: "Input Depths File".to_owned(),
            flags: vec!["--depths".to_owned()],
            description: "Input raster file holding bluespot depths.".to_owned(),
            parameter_type: ParameterType::ExistingFile(ParameterFileType::Raster),
            default_value: None,
            optional: false,
        });

        parameters.push(ToolParameter {
            name: "Input Watersheds File".to_owned(),
            flags: vec!["--watersheds".to_owned()],
            description: "Input raster file holding bluespot watersheds.".to_owned(),
            parameter_type: ParameterType::ExistingFile(ParameterFileType::Raster),
            default_value: None,
            optional: false,
        });

        parameters.push(ToolParameter {
            name: "Input DEM File".to_owned(),
            flags: vec!["--dem".to_owned()],
            description: "Input raster DEM file (minimum rim elevation policy).".to_owned(),
            parameter_type: ParameterType::ExistingFile(ParameterFileType::Raster),
            default_value: None,
            optional: true,
        });

        parameters.push(ToolParameter {
            name: "Input Accumulated Flow File".to_owned(),
            flags: vec!["--accum".to_owned()],
            description: "Input raster file holding accumulated flow (maximum accumulation policy)."
                .to_owned(),
            parameter_type: ParameterType::ExistingFile(ParameterFileType::Raster),
            default_value: None,
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
            name: "Output Layer Name".to_owned(),
            flags: vec!["--out_layer".to_owned()],
            description: "Name of the output pour points layer.".to_owned(),
            parameter_type: ParameterType::String,
            default_value: Some("pourpoints".to_owned()),
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
            ">>.*{0} -r={1} -v --wd=\"*path*to*data*\" --bluespots=bspots.asc --depths=depths.asc --watersheds=wsheds.asc --dem=DEM.asc --out=vector",
            short_exe, name
        )
        .replace("*", &sep);

        Pourpts {
            name: name,
            description: description,
            toolbox: toolbox,
            parameters: parameters,
            example_usage: usage,
        }
    }
}

/// Puts together the pour point features of all bluespot ids 0..=nlabels.
/// The id 0 record describes the background.
pub fn assemble_pour_points(
    configs: &RasterConfigs,
    pp_cells: &[(isize, isize)],
    bluespot_stats: &[LabelStats],
    watershed_counts: &[i64],
) -> Vec<Feature> {
    let cell_area = configs.cell_area();
    let mut pour_points = vec![];
    for (ix, cell) in pp_cells.iter().enumerate() {
        let stats = &bluespot_stats[ix];
        let bspot_area = stats.count as f64 * cell_area;
        let bspot_vol = stats.sum * cell_area;
        let wshed_area = watershed_counts[ix] as f64 * cell_area;
        // mm of rain needed to fill the bluespot with water from its local
        // watershed alone.
        let bspot_fumm = if wshed_area > 0f64 {
            1000f64 * bspot_vol / wshed_area
        } else {
            0f64
        };

        let (x, y) = configs.cell_to_world(cell.0, cell.1);
        let mut feature = Feature::new(ix as i64, Geometry::point(x, y));
        feature.set_property("bspot_id", json!(ix));
        feature.set_property("cell_row", json!(cell.0));
        feature.set_property("cell_col", json!(cell.1));
        feature.set_property("bspot_dmax", json!(stats.max));
        feature.set_property("bspot_area", json!(bspot_area));
        feature.set_property("bspot_vol", json!(bspot_vol));
        feature.set_property("wshed_area", json!(wshed_area));
        feature.set_property("bspot_fumm", json!(bspot_fumm));
        pour_points.push(feature);
    }
    pour_points
}

/// Pour point cells per bluespot id under the maximum accumulated flow
/// policy.
pub fn pour_points_by_max_accum(
    accum: &bluespot_common::structures::Array2D<f64>,
    labelled: &bluespot_common::structures::Array2D<i32>,
    nlabels: i32,
) -> Vec<(isize, isize)> {
    label::label_stats(accum, labelled, nlabels)
        .iter()
        .map(|s| s.max_cell)
        .collect()
}

/// Pour point cells per bluespot id under the minimum no-flats filled
/// elevation policy.
pub fn pour_points_by_min_filled(
    filled_no_flats: &bluespot_common::structures::Array2D<f64>,
    labelled: &bluespot_common::structures::Array2D<i32>,
    nlabels: i32,
) -> Vec<(isize, isize)> {
    label::label_stats(filled_no_flats, labelled, nlabels)
        .iter()
        .map(|s| s.min_cell)
        .collect()
}

impl BluespotTool for Pourpts {
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
        let mut depths_file = String::new();
        let mut watersheds_file = String::new();
        let mut dem_file = String::new();
        let mut accum_file = String::new();
        let mut output_datasource = String::new();
        let mut output_layer = "pourpoints".to_string();

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
            } else if flag_val == "-depths" {
                depths_file = if keyval {
                    vec[1].to_string()
                } else {
                    args[i + 1].to_string()
                };
            } else if flag_val == "-watersheds" {
                watersheds_file = if keyval {
                    vec[1].to_string()
                } else {
                    args[i + 1].to_string()
                };
            } else if flag_val == "-dem" {
                dem_file = if keyval {
                    vec[1].to_string()
                } else {
                    args[i + 1].to_string()
                };
            } else if flag_val == "-accum" {
                accum_file = if keyval {
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

        if accum_file.is_empty() && dem_file.is_empty() {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "Either --accum or --dem must be specified.",
            ));
        }

        let sep: String = path::MAIN_SEPARATOR.to_string();

        if !bluespots_file.contains(&sep) && !bluespots_file.contains("/") {
            bluespots_file = format!("{}{}", working_directory, bluespots_file);
        }
        if !depths_file.contains(&sep) && !depths_file.contains("/") {
            depths_file = format!("{}{}", working_directory, depths_file);
        }
        if !watersheds_file.contains(&sep) && !watersheds_file.contains("/") {
            watersheds_file = format!("{}{}", working_directory, watersheds_file);
        }
        if !dem_file.is_empty() && !dem_file.contains(&sep) && !dem_file.contains("/") {
            dem_file = format!("{}{}", working_directory, dem_file);
        }
        if !accum_file.is_empty() && !accum_file.contains(&sep) && !accum_file.contains("/") {
            accum_file = format!("{}{}", working_directory, accum_file);
        }
        if !output_datasource.contains(&sep) && !output_datasource.contains("/") {
            output_datasource = format!("{}{}", working_directory, output_datasource);
        }

        if verbose {
            println!("Reading data...")
        };

        let depths_source = FileRasterSource::new(&depths_file, None)?;
        let depths_raster = depths_source.read()?;
        check_square_cells(&depths_raster)?;
        let bluespots = FileRasterSource::new(&bluespots_file, None)?.read()?;
        let watersheds_raster = FileRasterSource::new(&watersheds_file, None)?.read()?;
        check_same_shape(&depths_raster, &bluespots)?;
        check_same_shape(&depths_raster, &watersheds_raster)?;

        let start = Instant::now();
        let labelled = labels_from_raster(&bluespots)?;
        let nlabels = max_label(&labelled);
        let depths = depths_raster.get_data_as_array2d();
        let bluespot_stats = label::label_stats(&depths, &labelled, nlabels);
        drop(depths);

        let pp_cells = if !accum_file.is_empty() {
            if verbose {
                println!("Calculating pour points at max accumulated flow...")
            };
            let accum = FileRasterSource::new(&accum_file, None)?.read()?;
            check_same_shape(&depths_raster, &accum)?;
            pour_points_by_max_accum(&accum.get_data_as_array2d(), &labelled, nlabels)
        } else {
            if verbose {
                println!("Calculating pour points at min filled elevation...")
            };
            let dem_raster = FileRasterSource::new(&dem_file, None)?.read()?;
            check_same_shape(&depths_raster, &dem_raster)?;
            let dem = dem_raster.get_data_as_f32_array2d();
            let (short, diag) = fill::minimum_safe_short_and_diag(&dem);
            let filled_no_flats = fill::fill_terrain_no_flats(&dem, short, diag);
            pour_points_by_min_filled(&filled_no_flats, &labelled, nlabels)
        };

        let watersheds = labels_from_raster(&watersheds_raster)?;
        let watershed_counts = label::label_count(&watersheds, nlabels);

        if verbose {
            println!("Writing {} pour points...", pp_cells.len())
        };
        let pour_points = assemble_pour_points(
            &depths_raster.configs,
            &pp_cells,
            &bluespot_stats,
            &watershed_counts,
        );
        let mut sink = GeoJsonVectorSink::new(
            &output_datasource,
            &output_layer,
            &depths_raster.configs.coordinate_ref_system_wkt,
        );
        sink.write_features(&pour_points)?;

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
    use super::assemble_pour_points;
    use bluespot_common::algorithms::label::LabelStats;
    use bluespot_raster::RasterConfigs;
    use serde_json::json;

    #[test]
    fn test_assemble_pour_points_attributes() {
        let configs = RasterConfigs {
            rows: 10,
            columns: 10,
            west: 0.0,
            north: 10.0,
            south: 0.0,
            east: 10.0,
            resolution_x: 1.0,
            resolution_y: 1.0,
            ..Default::default()
        };
        let background = LabelStats {
            min: 0.0,
            max: 0.0,
            sum: 0.0,
            count: 90,
            min_cell: (0, 0),
            max_cell: (0, 0),
        };
        let bspot = LabelStats {
            min: 0.1,
            max: 0.75,
            sum: 4.0,
            count: 10,
            min_cell: (5, 5),
            max_cell: (5, 6),
        };
        let features = assemble_pour_points(
            &configs,
            &[(0, 0), (5, 4)],
            &[background, bspot],
            &[60, 40],
        );
        assert_eq!(features.len(), 2);
        let f = &features[1];
        assert_eq!(f.property("bspot_id"), Some(&json!(1)));
        assert_eq!(f.property("cell_row"), Some(&json!(5)));
        assert_eq!(f.property("cell_col"), Some(&json!(4)));
        assert_eq!(f.property("bspot_dmax"), Some(&json!(0.75)));
        assert_eq!(f.property("bspot_area"), Some(&json!(10.0)));
        assert_eq!(f.property("bspot_vol"), Some(&json!(4.0)));
        assert_eq!(f.property("wshed_area"), Some(&json!(40.0)));
        // 1000 * 4 m3 / 40 m2 = 100 mm to fill from the local watershed.
        assert_eq!(f.property("bspot_fumm"), Some(&json!(100.0)));
    }
}
