/*
This tool is part of the BluespotTools pluvial flood screening library.
Authors: Dr. Mette Kirkeby
Created: 27/06/2023
Last Modified: 22/05/2025
License: MIT
*/

use super::bspots::filter_bluespots;
use super::filter::FilterExpression;
use super::network::{build_node_features, build_stream_features};
use super::pourpts::{assemble_pour_points, pour_points_by_max_accum, pour_points_by_min_filled};
use super::rain::apply_rain_events;
use crate::tools::*;
use bluespot_common::algorithms::{fill, flow, label, net};
use bluespot_common::structures::Array2D;
use bluespot_common::utils::get_formatted_elapsed_time;
use bluespot_raster::*;
use bluespot_vector::{Feature, GeoJsonVectorSink, VectorSink};
use std::env;
use std::fs;
use std::io::{Error, ErrorKind};
use std::path;
use std::time::Instant;

/// Runs the whole bluespot screening pipeline in one go: fill, depths, flow
/// directions, optional flow accumulation, bluespot labelling and filtering,
/// watersheds, pour points, stream network and rain events.
///
/// The output directory must exist and be empty. The rasters are written to
/// the directory itself and the vector layers (`pourpoints`, `nodes`,
/// `streams`, `events`) to a `vector` subdirectory.
///
/// # See Also
/// `Filled`, `Depths`, `FlowDir`, `Accum`, `Bspots`, `Wsheds`, `Pourpts`,
/// `Network`, `Rain`
pub struct Complete {
    name: String,
    description: String,
    toolbox: String,
    parameters: Vec<ToolParameter>,
    example_usage: String,
}

impl Complete {
    pub fn new() -> Complete {
        // public constructor
        let name = "Complete".to_string();
        let toolbox = "Bluespot Analysis".to_string();
        let description = "Runs all pipeline stages from DEM to rain events.".to_string();

        let mut parameters = vec![];
        parameters.push(ToolParameter {
            name: "Input DEM File".to_owned(),
            flags: vec!["--dem".to_owned()],
            description: "Input raster DEM file. Horizontal and vertical units must be meters."
                .to_owned(),
            parameter_type: ParameterType::ExistingFile(ParameterFileType::Raster),
            default_value: None,
            optional: false,
        });

        parameters.push(ToolParameter {
            name: "Output Directory".to_owned(),
            flags: vec!["--outdir".to_owned()],
            description: "Output directory. Must exist and be empty.".to_owned(),
            parameter_type: ParameterType::Directory,
            default_value: None,
            optional: false,
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
            name: "Filter Expression".to_owned(),
            flags: vec!["--filter".to_owned()],
            description: "Filter bluespots by area, maximum depth and volume, e.g. \"area > 20.5 and (maxdepth > 0.05 or volume > 2.5)\".".to_owned(),
            parameter_type: ParameterType::String,
            default_value: None,
            optional: true,
        });

        parameters.push(ToolParameter {
            name: "Calculate Accumulated Flow?".to_owned(),
            flags: vec!["--accum".to_owned()],
            description: "Calculate accumulated flow and use it to place pour points.".to_owned(),
            parameter_type: ParameterType::Boolean,
            default_value: Some("false".to_owned()),
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
            ">>.*{0} -r={1} -v --wd=\"*path*to*data*\" --dem=DEM.asc --outdir=out --rain=10 --rain=100 --filter=\"volume > 2.5\"",
            short_exe, name
        )
        .replace("*", &sep);

        Complete {
            name: name,
            description: description,
            toolbox: toolbox,
            parameters: parameters,
            example_usage: usage,
        }
    }
}

/// Everything the pipeline produces, held in memory. The orchestrator owns
/// the rasters and drops intermediates as soon as downstream stages have
/// consumed them.
pub struct PipelineProducts {
    pub filled: Raster,
    pub depths: Raster,
    pub flowdir: Raster,
    pub accum: Option<Raster>,
    pub bluespots: Raster,
    pub watersheds: Raster,
    pub pour_points: Vec<Feature>,
    pub nodes: Vec<Feature>,
    pub streams: Vec<Feature>,
    pub events: Vec<Feature>,
}

/// Chains the core pipeline stages over in-memory grids: DEM -> filled ->
/// depths -> flow directions (-> accumulated flow) -> bluespots ->
/// watersheds -> pour points -> network -> rain events.
///
/// Pour points are placed at the cell of maximum accumulated flow when
/// `calc_accum` is set, otherwise at the cell of minimum no-flats filled
/// elevation.
pub fn run_complete_pipeline(
    dem_source: &dyn RasterSource,
    rains_mm: &[f64],
    filter: &FilterExpression,
    calc_accum: bool,
    verbose: bool,
) -> Result<PipelineProducts, Error> {
    let dem_raster = dem_source.read()?;
    check_square_cells(&dem_raster)?;
    let configs = dem_raster.configs.clone();
    let cell_area = configs.cell_area();
    let rows = configs.rows as isize;
    let columns = configs.columns as isize;
    let dem = dem_raster.get_data_as_f32_array2d();
    drop(dem_raster);

    if verbose {
        println!("Calculating filled DEM...")
    };
    let filled = fill::fill_terrain(&dem);

    if verbose {
        println!("Calculating bluespot depths...")
    };
    let mut depths: Array2D<f64> = Array2D::new(rows, columns, 0f64, -1f64)?;
    for row in 0..rows {
        for col in 0..columns {
            depths.set_value(
                row,
                col,
                (filled.get_value(row, col) - dem.get_value(row, col)) as f64,
            );
        }
    }
    let mut filled_raster = Raster::initialize_using_array2d("filled.asc", &configs, filled);
    filled_raster.configs.data_type = DataType::F32;

    if verbose {
        println!("Calculating flow directions...")
    };
    let (short, diag) = fill::minimum_safe_short_and_diag(&dem);
    let filled_no_flats = fill::fill_terrain_no_flats(&dem, short, diag);
    drop(dem);
    let flowdir = flow::terrain_flow_directions(&filled_no_flats, true);

    let accum = if calc_accum {
        if verbose {
            println!("Calculating flow accumulation...")
        };
        Some(flow::accumulated_flow(&flowdir)?)
    } else {
        None
    };

    if verbose {
        println!("Calculating unfiltered bluespots...")
    };
    let (raw_labelled, raw_nlabels) = label::connected_components(&depths, 0f64)?;
    if verbose {
        println!("Number of bluespots found before filtering: {}", raw_nlabels)
    };
    let raw_stats = label::label_stats(&depths, &raw_labelled, raw_nlabels);
    let keepers = filter_bluespots(filter, cell_area, &raw_stats);
    let kept = label::keep_labels(&raw_labelled, &keepers);
    drop(raw_labelled);
    let (labelled, nlabels) = label::connected_components(&kept, 0u8)?;
    drop(kept);
    if verbose {
        println!("Number of bluespots left after filtering: {}", nlabels)
    };
    let bluespot_stats = label::label_stats(&depths, &labelled, nlabels);
    let mut depths_raster = Raster::initialize_using_array2d("depths.asc", &configs, depths);
    depths_raster.configs.data_type = DataType::F32;

    if verbose {
        println!("Calculating watersheds...")
    };
    let mut watersheds = labelled.duplicate();
    flow::watersheds_from_labels(&flowdir, &mut watersheds, 0);
    let watershed_counts = label::label_count(&watersheds, nlabels);

    let pp_cells = match &accum {
        Some(accum) => {
            if verbose {
                println!("Calculating pour points at max accumulated flow...")
            };
            pour_points_by_max_accum(accum, &labelled, nlabels)
        }
        None => {
            if verbose {
                println!("Calculating pour points at min filled elevation...")
            };
            pour_points_by_min_filled(&filled_no_flats, &labelled, nlabels)
        }
    };
    drop(filled_no_flats);
    let pour_points =
        assemble_pour_points(&configs, &pp_cells, &bluespot_stats, &watershed_counts);

    if verbose {
        println!("Processing stream network...")
    };
    let pairs: Vec<(i32, (isize, isize))> = pp_cells
        .iter()
        .enumerate()
        .map(|(i, cell)| (i as i32, *cell))
        .collect();
    let stream_nodes = net::pourpoint_network(&flowdir, &labelled, &pairs, Some(0))?;
    let nodes = build_node_features(&stream_nodes, &pour_points, &configs)?;
    let streams = build_stream_features(&stream_nodes, &configs);

    if verbose {
        println!("Calculating rain events...")
    };
    let mut events = nodes.clone();
    apply_rain_events(&mut events, rains_mm)?;

    let mut flowdir_raster = Raster::initialize_using_array2d("flowdir.asc", &configs, flowdir);
    flowdir_raster.configs.data_type = DataType::U8;
    flowdir_raster.configs.nodata = 255f64;
    let accum_raster = match accum {
        Some(accum) => {
            let mut r = Raster::initialize_using_array2d("accum.asc", &configs, accum);
            r.configs.data_type = DataType::F64;
            Some(r)
        }
        None => None,
    };
    let mut bluespots_raster = Raster::initialize_using_array2d("bspots.asc", &configs, labelled);
    bluespots_raster.configs.data_type = DataType::I32;
    bluespots_raster.configs.nodata = 0f64;
    let mut watersheds_raster =
        Raster::initialize_using_array2d("wsheds.asc", &configs, watersheds);
    watersheds_raster.configs.data_type = DataType::I32;
    watersheds_raster.configs.nodata = 0f64;

    Ok(PipelineProducts {
        filled: filled_raster,
        depths: depths_raster,
        flowdir: flowdir_raster,
        accum: accum_raster,
        bluespots: bluespots_raster,
        watersheds: watersheds_raster,
        pour_points: pour_points,
        nodes: nodes,
        streams: streams,
        events: events,
    })
}

impl BluespotTool for Complete {
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
        let mut dem_file = String::new();
        let mut outdir = String::new();
        let mut filter_expression = String::new();
        let mut rains_mm: Vec<f64> = vec![];
        let mut calc_accum = false;

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
            if flag_val == "-dem" {
                dem_file = if keyval {
                    vec[1].to_string()
                } else {
                    args[i + 1].to_string()
                };
            } else if flag_val == "-outdir" {
                outdir = if keyval {
                    vec[1].to_string()
                } else {
                    args[i + 1].to_string()
                };
            } else if flag_val == "-filter" {
                filter_expression = if keyval {
                    // rejoin; the expression itself may contain '='
                    vec[1..].join("=")
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
            } else if flag_val == "-accum" {
                if vec.len() == 1 || !vec[1].to_string().to_lowercase().contains("false") {
                    calc_accum = true;
                }
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

        if !dem_file.contains(&sep) && !dem_file.contains("/") {
            dem_file = format!("{}{}", working_directory, dem_file);
        }
        if !outdir.contains(&sep) && !outdir.contains("/") {
            outdir = format!("{}{}", working_directory, outdir);
        }

        // Check that outdir exists and is empty
        let outdir_path = path::Path::new(&outdir);
        if !outdir_path.is_dir() || fs::read_dir(outdir_path)?.next().is_some() {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "outdir isn't an empty directory.",
            ));
        }

        let filter = if filter_expression.trim().is_empty() {
            FilterExpression::accept_all()
        } else {
            FilterExpression::parse(&filter_expression)?
        };

        if verbose {
            println!("Reading data...")
        };
        let dem_source = FileRasterSource::new(&dem_file, Some(NODATA_SUBST))?;
        let crs = dem_source.crs();

        let start = Instant::now();
        let mut products = run_complete_pipeline(&dem_source, &rains_mm, &filter, calc_accum, verbose)?;

        if verbose {
            println!("Saving data...")
        };
        let raster_path = |file: &str| format!("{}{}{}", outdir, sep, file);
        FileRasterSink::new(&raster_path("filled.asc")).write(&mut products.filled)?;
        FileRasterSink::new(&raster_path("depths.asc")).write(&mut products.depths)?;
        FileRasterSink::new(&raster_path("flowdir.asc")).write(&mut products.flowdir)?;
        if let Some(accum) = products.accum.as_mut() {
            FileRasterSink::new(&raster_path("accum.asc")).write(accum)?;
        }
        FileRasterSink::new(&raster_path("bspots.asc")).write(&mut products.bluespots)?;
        FileRasterSink::new(&raster_path("wsheds.asc")).write(&mut products.watersheds)?;

        let vector_dir = format!("{}{}vector", outdir, sep);
        GeoJsonVectorSink::new(&vector_dir, "pourpoints", &crs)
            .write_features(&products.pour_points)?;
        GeoJsonVectorSink::new(&vector_dir, "nodes", &crs).write_features(&products.nodes)?;
        GeoJsonVectorSink::new(&vector_dir, "streams", &crs).write_features(&products.streams)?;
        GeoJsonVectorSink::new(&vector_dir, "events", &crs).write_features(&products.events)?;

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
    use super::super::filter::FilterExpression;
    use super::run_complete_pipeline;
    use bluespot_raster::{MemoryRasterSource, Raster, RasterConfigs};
    use serde_json::json;

    fn configs(rows: usize, columns: usize) -> RasterConfigs {
        RasterConfigs {
            rows: rows,
            columns: columns,
            nodata: -9999.0,
            west: 0.0,
            north: rows as f64,
            south: 0.0,
            east: columns as f64,
            resolution_x: 1.0,
            resolution_y: 1.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_pipeline_on_inclined_plane_finds_no_bluespots() {
        // A monotonic incline holds no depressions; the only network node is
        // the background record.
        let mut dem = Raster::initialize_using_config("dem.asc", &configs(8, 8));
        for row in 0..8 {
            for col in 0..8 {
                dem.set_value(row, col, 0.1 * row as f64 + 0.001 * col as f64);
            }
        }
        let source = MemoryRasterSource::new(dem, Some(-999.0));
        let products = run_complete_pipeline(
            &source,
            &[10.0],
            &FilterExpression::accept_all(),
            false,
            false,
        )
        .unwrap();

        for row in 0..8 {
            for col in 0..8 {
                assert_eq!(products.bluespots.get_value(row, col), 0.0);
                assert_eq!(products.depths.get_value(row, col), 0.0);
                // Nothing is stored anywhere, so filled == dem.
                let z = 0.1 * row as f64 + 0.001 * col as f64;
                assert!((products.filled.get_value(row, col) - z).abs() < 1e-6);
            }
        }
        assert_eq!(products.nodes.len(), 1);
        assert_eq!(products.events.len(), 1);
        assert_eq!(products.nodes[0].property("bspot_id"), Some(&json!(0)));
        assert_eq!(products.nodes[0].property("dstrnodeid"), Some(&json!(null)));
    }

    #[test]
    fn test_pipeline_on_single_pit() {
        // An inclined plane with a two-cell pit at (4,4)-(4,5). The pit fills
        // to the level of its downhill rim and everything else stays dry.
        let mut dem = Raster::initialize_using_config("dem.asc", &configs(10, 10));
        for row in 0..10 {
            for col in 0..10 {
                dem.set_value(row, col, 0.1 * row as f64 + 0.001 * col as f64);
            }
        }
        dem.set_value(4, 4, 0.1 * 4.0 + 0.001 * 4.0 - 1.0);
        dem.set_value(4, 5, 0.1 * 4.0 + 0.001 * 5.0 - 1.0);

        let source = MemoryRasterSource::new(dem, Some(-999.0));
        let products = run_complete_pipeline(
            &source,
            &[0.0, 1000.0],
            &FilterExpression::accept_all(),
            false,
            false,
        )
        .unwrap();

        // Exactly one bluespot covering the two pit cells.
        let mut labelled_cells = vec![];
        for row in 0..10 {
            for col in 0..10 {
                let lbl = products.bluespots.get_value(row, col);
                assert!(lbl == 0.0 || lbl == 1.0);
                if lbl == 1.0 {
                    labelled_cells.push((row, col));
                }
            }
        }
        assert_eq!(labelled_cells, vec![(4, 4), (4, 5)]);

        // Background node plus the bluespot node.
        assert_eq!(products.nodes.len(), 2);
        assert_eq!(products.events.len(), 2);
        let bspot = products
            .events
            .iter()
            .find(|f| f.property("nodeid") == Some(&json!(1)))
            .unwrap();

        // The pit is 0.9 m deep at (4,4); both cells fill to the rim level.
        let vol = bspot.property("bspot_vol").unwrap().as_f64().unwrap();
        assert!((vol - 1.797).abs() < 0.01, "unexpected volume {}", vol);
        let wshed = bspot.property("wshed_area").unwrap().as_f64().unwrap();
        assert!(wshed >= 2.0);

        // No rain, no water.
        assert_eq!(bspot.property("rainv_0"), Some(&json!(0.0)));
        assert_eq!(bspot.property("v_0"), Some(&json!(0.0)));
        assert_eq!(bspot.property("spillv_0"), Some(&json!(0.0)));

        // A metre of rain drowns the bluespot and spills the rest.
        let pct = bspot.property("pctv_1000").unwrap().as_f64().unwrap();
        assert_eq!(pct, 100.0);
        let spill = bspot.property("spillv_1000").unwrap().as_f64().unwrap();
        let rainv = bspot.property("rainv_1000").unwrap().as_f64().unwrap();
        let stored = bspot.property("v_1000").unwrap().as_f64().unwrap();
        assert!((rainv - (stored + spill)).abs() < 1e-9);

        // The watershed raster still contains the bluespot's own cells.
        assert_eq!(products.watersheds.get_value(4, 4), 1.0);
        assert_eq!(products.watersheds.get_value(4, 5), 1.0);
    }

    #[test]
    fn test_pipeline_filter_drops_small_bluespots() {
        let mut dem = Raster::initialize_using_config("dem.asc", &configs(10, 10));
        for row in 0..10 {
            for col in 0..10 {
                dem.set_value(row, col, 0.1 * row as f64 + 0.001 * col as f64);
            }
        }
        dem.set_value(4, 4, 0.1 * 4.0 + 0.001 * 4.0 - 1.0);
        dem.set_value(4, 5, 0.1 * 4.0 + 0.001 * 5.0 - 1.0);

        let source = MemoryRasterSource::new(dem, Some(-999.0));
        let filter = FilterExpression::parse("volume > 100").unwrap();
        let products = run_complete_pipeline(&source, &[10.0], &filter, false, false).unwrap();

        for row in 0..10 {
            for col in 0..10 {
                assert_eq!(products.bluespots.get_value(row, col), 0.0);
            }
        }
        assert_eq!(products.nodes.len(), 1);
    }
}
