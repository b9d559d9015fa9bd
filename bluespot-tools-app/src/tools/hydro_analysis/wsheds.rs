/*
This tool is part of the BluespotTools pluvial flood screening library.
Authors: Dr. Mette Kirkeby
Created: 25/04/2023
Last Modified: 03/10/2024
License: MIT
*/

use crate::tools::*;
use bluespot_common::algorithms::flow;
use bluespot_common::utils::get_formatted_elapsed_time;
use bluespot_raster::*;
use std::env;
use std::io::{Error, ErrorKind};
use std::path;
use std::time::Instant;

/// Calculates the local bluespot watersheds. Every cell receives the id of
/// the bluespot it drains into; cells draining off the raster keep 0.
///
/// # See Also
/// `Bspots`, `FlowDir`
pub struct Wsheds {
    name: String,
    description: String,
    toolbox: String,
    parameters: Vec<ToolParameter>,
    example_usage: String,
}

impl Wsheds {
    pub fn new() -> Wsheds {
        // public constructor
        let name = "Wsheds".to_string();
        let toolbox = "Hydrological Analysis".to_string();
        let description = "Calculates the local watershed of each bluespot.".to_string();

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
            name: "Output File".to_owned(),
            flags: vec!["-o".to_owned(), "--output".to_owned()],
            description: "Output raster file (bluespot watersheds).".to_owned(),
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
            ">>.*{0} -r={1} -v --wd=\"*path*to*data*\" --bluespots=bspots.asc --flowdir=flowdir.asc -o=wsheds.asc",
            short_exe, name
        )
        .replace("*", &sep);

        Wsheds {
            name: name,
            description: description,
            toolbox: toolbox,
            parameters: parameters,
            example_usage: usage,
        }
    }
}

impl BluespotTool for Wsheds {
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

        if !bluespots_file.contains(&sep) && !bluespots_file.contains("/") {
            bluespots_file = format!("{}{}", working_directory, bluespots_file);
        }
        if !flowdir_file.contains(&sep) && !flowdir_file.contains("/") {
            flowdir_file = format!("{}{}", working_directory, flowdir_file);
        }
        if !output_file.contains(&sep) && !output_file.contains("/") {
            output_file = format!("{}{}", working_directory, output_file);
        }

        if verbose {
            println!("Reading data...")
        };

        let bluespots = FileRasterSource::new(&bluespots_file, None)?.read()?;
        let flowdir_raster = FileRasterSource::new(&flowdir_file, None)?.read()?;
        check_same_shape(&bluespots, &flowdir_raster)?;

        let start = Instant::now();
        let mut watersheds = labels_from_raster(&bluespots)?;
        let flowdir = flow_directions_from_raster(&flowdir_raster)?;

        if verbose {
            println!("Painting watersheds...")
        };
        flow::watersheds_from_labels(&flowdir, &mut watersheds, 0);

        let mut output =
            Raster::initialize_using_array2d(&output_file, &bluespots.configs, watersheds);
        output.configs.data_type = DataType::I32;
        output.configs.nodata = 0f64;

        let elapsed_time = get_formatted_elapsed_time(start);
        output.add_metadata_entry(format!(
            "Created by bluespot_tools\' {} tool",
            self.get_tool_name()
        ));
        output.add_metadata_entry(format!("Bluespot file: {}", bluespots_file));
        output.add_metadata_entry(format!("Flow direction file: {}", flowdir_file));
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
