/*
This tool is part of the BluespotTools pluvial flood screening library.
Authors: Dr. Mette Kirkeby
Created: 04/04/2023
Last Modified: 17/02/2025
License: MIT
*/

use crate::tools::*;
use bluespot_common::algorithms::fill;
use bluespot_common::algorithms::flow::{self, FLOWDIR_NODIR};
use bluespot_common::structures::Array2D;
use bluespot_common::utils::get_formatted_elapsed_time;
use bluespot_raster::*;
use num_cpus;
use std::env;
use std::io::{Error, ErrorKind};
use std::path;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

/// Calculates surface water flow directions from a DEM. This is a two step
/// process: first the DEM is filled with an enforced minimum slope, so that
/// every cell gains a strictly downslope path to the raster edge, then the D8
/// steepest-descent direction of each cell is determined on the filled
/// terrain.
///
/// The output uses the following direction encoding:
///
/// | .  |  .  |  . |
/// |:--:|:---:|:--:|
/// | 7  |  0  | 1  |
/// | 6  |  .  | 2  |
/// | 5  |  4  | 3  |
///
/// Edge cells are hardcoded to flow off the raster. Because the no-flats fill
/// leaves no flat areas, every interior cell receives a direction; the
/// no-direction code 8 can only appear if this tool is run on other terrain.
///
/// # See Also
/// `Filled`, `Accum`, `Wsheds`
pub struct FlowDir {
    name: String,
    description: String,
    toolbox: String,
    parameters: Vec<ToolParameter>,
    example_usage: String,
}

impl FlowDir {
    pub fn new() -> FlowDir {
        // public constructor
        let name = "FlowDir".to_string();
        let toolbox = "Hydrological Analysis".to_string();
        let description =
            "Calculates D8 flow directions on a no-flats filled version of a DEM.".to_string();

        let mut parameters = vec![];
        parameters.push(ToolParameter {
            name: "Input DEM File".to_owned(),
            flags: vec!["-i".to_owned(), "--dem".to_owned()],
            description: "Input raster DEM file.".to_owned(),
            parameter_type: ParameterType::ExistingFile(ParameterFileType::Raster),
            default_value: None,
            optional: false,
        });

        parameters.push(ToolParameter {
            name: "Output File".to_owned(),
            flags: vec!["-o".to_owned(), "--output".to_owned()],
            description: "Output raster file (flow directions).".to_owned(),
            parameter_type: ParameterType::NewFile(ParameterFileType::Raster),
            default_value: None,
            optional: false,
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
            ">>.*{0} -r={1} -v --wd=\"*path*to*data*\" --dem=DEM.asc -o=flowdir.asc",
            short_exe, name
        )
        .replace("*", &sep);

        FlowDir {
            name: name,
            description: description,
            toolbox: toolbox,
            parameters: parameters,
            example_usage: usage,
        }
    }
}

impl BluespotTool for FlowDir {
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
        let mut input_file = String::new();
        let mut output_file = String::new();

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
            if flag_val == "-i" || flag_val == "-input" || flag_val == "-dem" {
                input_file = if keyval {
                    vec[1].to_string()
                } else {
                    args[i + 1].to_string()
                };
            } else if flag_val == "-o" || flag_val == "-output" || flag_val == "-out" {
                output_file = if keyval {
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

        let mut progress: usize;
        let mut old_progress: usize = 1;

        if !input_file.contains(&sep) && !input_file.contains("/") {
            input_file = format!("{}{}", working_directory, input_file);
        }
        if !output_file.contains(&sep) && !output_file.contains("/") {
            output_file = format!("{}{}", working_directory, output_file);
        }

        if verbose {
            println!("Reading data...")
        };

        let source = FileRasterSource::new(&input_file, Some(NODATA_SUBST))?;
        let input = source.read()?;
        check_square_cells(&input)?;

        let start = Instant::now();
        let rows = input.configs.rows as isize;
        let columns = input.configs.columns as isize;

        let dem = input.get_data_as_f32_array2d();
        let (short, diag) = fill::minimum_safe_short_and_diag(&dem);
        if verbose {
            println!("Filling depressions (minimum slope {})...", short)
        };
        let filled = Arc::new(fill::fill_terrain_no_flats(&dem, short, diag));
        drop(dem);

        if verbose {
            println!("Calculating flow directions...")
        };
        let mut num_procs = num_cpus::get() as isize;
        let configs = bluespot_common::configs::get_configs()?;
        let max_procs = configs.max_procs;
        if max_procs > 0 && max_procs < num_procs {
            num_procs = max_procs;
        }
        let (tx, rx) = mpsc::channel();
        for tid in 0..num_procs {
            let filled = filled.clone();
            let tx1 = tx.clone();
            thread::spawn(move || {
                for row in (0..rows).filter(|r| r % num_procs == tid) {
                    let data = flow::flow_direction_row(&filled, row, true);
                    tx1.send((row, data)).unwrap();
                }
            });
        }

        let mut flowdir: Array2D<u8> = Array2D::new(rows, columns, FLOWDIR_NODIR, FLOWDIR_NODIR)?;
        for r in 0..rows {
            let (row, data) = rx.recv().expect("Error receiving data from thread.");
            flowdir.set_row_data(row, data);

            if verbose {
                progress = (100.0_f64 * r as f64 / (rows - 1) as f64) as usize;
                if progress != old_progress {
                    println!("Progress: {}%", progress);
                    old_progress = progress;
                }
            }
        }
        drop(filled);

        let mut output = Raster::initialize_using_array2d(&output_file, &input.configs, flowdir);
        output.configs.data_type = DataType::U8;
        output.configs.nodata = 255f64;

        let elapsed_time = get_formatted_elapsed_time(start);
        output.add_metadata_entry(format!(
            "Created by bluespot_tools\' {} tool",
            self.get_tool_name()
        ));
        output.add_metadata_entry(format!("Input file: {}", input_file));
        output.add_metadata_entry(format!("Minimum slope (short): {}", short));
        output.add_metadata_entry(format!("Elapsed Time (excluding I/O): {}", elapsed_time));

        if verbose {
            println!("Saving data...")
        };
        let _ = match output.write() {
            Ok(_) => {
                if verbose {
                    println!("Output file written")
                }
            }
            Err(e) => return Err(e),
        };
        if verbose {
            println!(
                "{}",
                &format!("Elapsed Time (excluding I/O): {}", elapsed_time)
            );
        }

        Ok(())
    }
}
