/*
This tool is part of the BluespotTools pluvial flood screening library.
Authors: Dr. Mette Kirkeby
Created: 04/04/2023
Last Modified: 28/11/2024
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

/// Calculates the accumulated flow raster from a flow direction raster. Each
/// output cell holds the number of cells draining through it, itself
/// included, so the smallest possible value is 1.
///
/// The input must use the direction encoding produced by `FlowDir`; any other
/// cell value is rejected.
///
/// # See Also
/// `FlowDir`, `Pourpts`
pub struct Accum {
    name: String,
    description: String,
    toolbox: String,
    parameters: Vec<ToolParameter>,
    example_usage: String,
}

impl Accum {
    pub fn new() -> Accum {
        // public constructor
        let name = "Accum".to_string();
        let toolbox = "Hydrological Analysis".to_string();
        let description = "Calculates accumulated flow from flow directions.".to_string();

        let mut parameters = vec![];
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
            description: "Output raster file (accumulated flow).".to_owned(),
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
            ">>.*{0} -r={1} -v --wd=\"*path*to*data*\" --flowdir=flowdir.asc -o=accum.asc",
            short_exe, name
        )
        .replace("*", &sep);

        Accum {
            name: name,
            description: description,
            toolbox: toolbox,
            parameters: parameters,
            example_usage: usage,
        }
    }
}

impl BluespotTool for Accum {
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
            if flag_val == "-flowdir" || flag_val == "-i" || flag_val == "-input" {
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

        if !flowdir_file.contains(&sep) && !flowdir_file.contains("/") {
            flowdir_file = format!("{}{}", working_directory, flowdir_file);
        }
        if !output_file.contains(&sep) && !output_file.contains("/") {
            output_file = format!("{}{}", working_directory, output_file);
        }

        if verbose {
            println!("Reading data...")
        };

        let input = FileRasterSource::new(&flowdir_file, None)?.read()?;
        let flowdir = flow_directions_from_raster(&input)?;

        let start = Instant::now();
        if verbose {
            println!("Calculating accumulated flow...")
        };
        let accum = flow::accumulated_flow(&flowdir)?;

        let mut output = Raster::initialize_using_array2d(&output_file, &input.configs, accum);
        output.configs.data_type = DataType::F64;
        output.configs.nodata = NODATA_SUBST;

        let elapsed_time = get_formatted_elapsed_time(start);
        output.add_metadata_entry(format!(
            "Created by bluespot_tools\' {} tool",
            self.get_tool_name()
        ));
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
