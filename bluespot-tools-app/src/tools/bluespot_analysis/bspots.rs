/*
This tool is part of the BluespotTools pluvial flood screening library.
Authors: Dr. Mette Kirkeby
Created: 16/05/2023
Last Modified: 09/01/2025
License: MIT
*/

use crate::tools::bluespot_analysis::filter::FilterExpression;
use crate::tools::*;
use bluespot_common::algorithms::label::{self, LabelStats};
use bluespot_common::utils::get_formatted_elapsed_time;
use bluespot_raster::*;
use std::env;
use std::io::{Error, ErrorKind};
use std::path;
use std::time::Instant;

/// Labels the bluespots of a depths raster. All cells belonging to the same
/// bluespot (an 8-connected component of cells with depth > 0) receive one
/// unique id; id 0 is used for cells not belonging to any bluespot.
///
/// Small and shallow bluespots are commonly noise. They can be disregarded
/// with a filter expression over the unfiltered bluespot statistics, e.g.
/// `--filter="area > 20.5 and (maxdepth > 0.05 or volume > 2.5)"`. The
/// remaining bluespots are relabelled so that the output ids are contiguous.
///
/// # See Also
/// `Depths`, `Wsheds`, `Pourpts`
pub struct Bspots {
    name: String,
    description: String,
    toolbox: String,
    parameters: Vec<ToolParameter>,
    example_usage: String,
}

impl Bspots {
    pub fn new() -> Bspots {
        // public constructor
        let name = "Bspots".to_string();
        let toolbox = "Bluespot Analysis".to_string();
        let description = "Labels bluespots, optionally filtered by area, depth and volume.".to_string();

        let mut parameters = vec![];
        parameters.push(ToolParameter {
            name: "Input Depths File".to_owned(),
            flags: vec!["--depths".to_owned()],
            description: "Input raster file holding bluespot depths.".to_owned(),
            parameter_type: ParameterType::ExistingFile(ParameterFileType::Raster),
            default_value: None,
            optional: false,
        });

        parameters.push(ToolParameter {
            name: "Output File".to_owned(),
            flags: vec!["-o".to_owned(), "--output".to_owned()],
            description: "Output raster file (labelled bluespots).".to_owned(),
            parameter_type: ParameterType::NewFile(ParameterFileType::Raster),
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
            ">>.*{0} -r={1} -v --wd=\"*path*to*data*\" --depths=depths.asc -o=bspots.asc --filter=\"volume > 2.5\"",
            short_exe, name
        )
        .replace("*", &sep);

        Bspots {
            name: name,
            description: description,
            toolbox: toolbox,
            parameters: parameters,
            example_usage: usage,
        }
    }
}

/// Applies a filter expression to raw bluespot statistics. The i'th element
/// of the result tells whether the bluespot with id i passes the filter.
/// Area and volume are converted to world units using the cell area.
pub fn filter_bluespots(
    filter: &FilterExpression,
    cell_area: f64,
    raw_bluespot_stats: &[LabelStats],
) -> Vec<bool> {
    raw_bluespot_stats
        .iter()
        .map(|s| filter.evaluate(s.count as f64 * cell_area, s.max, s.sum * cell_area))
        .collect()
}

impl BluespotTool for Bspots {
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
        let mut depths_file = String::new();
        let mut output_file = String::new();
        let mut filter_expression = String::new();

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
            if flag_val == "-depths" {
                depths_file = if keyval {
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
            } else if flag_val == "-filter" {
                filter_expression = if keyval {
                    // rejoin; the expression itself may contain '='
                    vec[1..].join("=")
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

        if !depths_file.contains(&sep) && !depths_file.contains("/") {
            depths_file = format!("{}{}", working_directory, depths_file);
        }
        if !output_file.contains(&sep) && !output_file.contains("/") {
            output_file = format!("{}{}", working_directory, output_file);
        }

        // Malformed filters are rejected before any data is read.
        let filter = if filter_expression.trim().is_empty() {
            FilterExpression::accept_all()
        } else {
            FilterExpression::parse(&filter_expression)?
        };

        if verbose {
            println!("Reading data...")
        };

        let input = FileRasterSource::new(&depths_file, None)?.read()?;

        let start = Instant::now();
        let depths = input.get_data_as_array2d();

        if verbose {
            println!("Labelling bluespots...")
        };
        let (raw_labelled, raw_nlabels) = label::connected_components(&depths, 0f64)?;
        if verbose {
            println!("Number of bluespots found before filtering: {}", raw_nlabels)
        };

        let labelled = if filter.is_accept_all() {
            raw_labelled
        } else {
            check_square_cells(&input)?;
            let cell_area = input.configs.cell_area();
            let raw_stats = label::label_stats(&depths, &raw_labelled, raw_nlabels);
            let keepers = filter_bluespots(&filter, cell_area, &raw_stats);
            let kept = label::keep_labels(&raw_labelled, &keepers);
            drop(raw_labelled);
            let (relabelled, nlabels) = label::connected_components(&kept, 0u8)?;
            if verbose {
                println!("Number of bluespots left after filtering: {}", nlabels)
            };
            relabelled
        };

        let mut output = Raster::initialize_using_array2d(&output_file, &input.configs, labelled);
        output.configs.data_type = DataType::I32;
        output.configs.nodata = 0f64;

        let elapsed_time = get_formatted_elapsed_time(start);
        output.add_metadata_entry(format!(
            "Created by bluespot_tools\' {} tool",
            self.get_tool_name()
        ));
        output.add_metadata_entry(format!("Depths file: {}", depths_file));
        if !filter_expression.trim().is_empty() {
            output.add_metadata_entry(format!("Filter: {}", filter_expression));
        }
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

#[cfg(test)]
mod test {
    use super::filter_bluespots;
    use crate::tools::bluespot_analysis::filter::FilterExpression;
    use bluespot_common::algorithms::label::LabelStats;

    fn stats(count: i64, max: f64, sum: f64) -> LabelStats {
        LabelStats {
            min: 0.0,
            max: max,
            sum: sum,
            count: count,
            min_cell: (0, 0),
            max_cell: (0, 0),
        }
    }

    #[test]
    fn test_filter_bluespots_uses_world_units() {
        // 2x2 m cells: area = count * 4, volume = sum * 4.
        let filter = FilterExpression::parse("area > 20.5 and maxdepth > 0.5 or volume > 2.5").unwrap();
        let records = vec![
            stats(10, 0.1, 0.4), // area 40, shallow, volume 1.6 -> dropped
            stats(10, 0.9, 0.4), // area 40, deep -> kept
            stats(2, 0.1, 0.8),  // area 8, volume 3.2 -> kept
        ];
        let keepers = filter_bluespots(&filter, 4.0, &records);
        assert_eq!(keepers, vec![false, true, true]);
    }
}
