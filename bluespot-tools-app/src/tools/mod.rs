/*
This code is part of the BluespotTools pluvial flood screening library.
Authors: Dr. Mette Kirkeby
Created: 14/03/2023
Last Modified: 22/05/2025
License: MIT
*/

pub mod bluespot_analysis;
pub mod hydro_analysis;

use bluespot_common::structures::Array2D;
use bluespot_raster::Raster;
use bluespot_vector::Feature;
use serde_json;
use std::io::{Error, ErrorKind};

/// Nodata substitution applied to DEM inputs before they enter the core
/// algorithms. The core treats every cell value as a valid elevation, so
/// nodata cells are replaced with a value well below any real elevation.
pub const NODATA_SUBST: f64 = -999.0;

#[derive(Default)]
pub struct ToolManager {
    pub working_dir: String,
    pub verbose: bool,
    tool_names: Vec<String>,
}

impl ToolManager {
    pub fn new<'a>(
        working_directory: &'a str,
        verbose_mode: &'a bool,
    ) -> Result<ToolManager, Error> {
        let mut tool_names = vec![];
        // hydro_analysis
        tool_names.push("Filled".to_string());
        tool_names.push("Depths".to_string());
        tool_names.push("FlowDir".to_string());
        tool_names.push("Accum".to_string());
        tool_names.push("Wsheds".to_string());

        // bluespot_analysis
        tool_names.push("Bspots".to_string());
        tool_names.push("Pourpts".to_string());
        tool_names.push("Network".to_string());
        tool_names.push("Rain".to_string());
        tool_names.push("Complete".to_string());

        tool_names.sort();

        let tm = ToolManager {
            working_dir: working_directory.to_string(),
            verbose: *verbose_mode,
            tool_names: tool_names,
        };
        Ok(tm)
    }

    fn get_tool(&self, tool_name: &str) -> Option<Box<dyn BluespotTool + 'static>> {
        match tool_name.to_lowercase().replace("_", "").as_ref() {
            // hydro_analysis
            "filled" => Some(Box::new(hydro_analysis::Filled::new())),
            "depths" => Some(Box::new(hydro_analysis::Depths::new())),
            "flowdir" => Some(Box::new(hydro_analysis::FlowDir::new())),
            "accum" => Some(Box::new(hydro_analysis::Accum::new())),
            "wsheds" => Some(Box::new(hydro_analysis::Wsheds::new())),

            // bluespot_analysis
            "bspots" => Some(Box::new(bluespot_analysis::Bspots::new())),
            "pourpts" => Some(Box::new(bluespot_analysis::Pourpts::new())),
            "network" => Some(Box::new(bluespot_analysis::Network::new())),
            "rain" => Some(Box::new(bluespot_analysis::Rain::new())),
            "complete" => Some(Box::new(bluespot_analysis::Complete::new())),

            _ => None,
        }
    }

    pub fn run_tool(&self, tool_name: String, args: Vec<String>) -> Result<(), Error> {
        match self.get_tool(tool_name.as_ref()) {
            Some(tool) => tool.run(args, &self.working_dir, self.verbose),
            None => Err(Error::new(
                ErrorKind::NotFound,
                format!("Unrecognized tool name {}.", tool_name),
            )),
        }
    }

    pub fn tool_help(&self, tool_name: String) -> Result<(), Error> {
        if tool_name.is_empty() {
            for name in &self.tool_names {
                if let Some(tool) = self.get_tool(name) {
                    println!("{}", get_help(tool));
                }
            }
            return Ok(());
        }
        match self.get_tool(tool_name.as_ref()) {
            Some(tool) => {
                println!("{}", get_help(tool));
                Ok(())
            }
            None => Err(Error::new(
                ErrorKind::NotFound,
                format!("Unrecognized tool name {}.", tool_name),
            )),
        }
    }

    pub fn tool_parameters(&self, tool_name: String) -> Result<(), Error> {
        match self.get_tool(tool_name.as_ref()) {
            Some(tool) => {
                println!("{}", tool.get_tool_parameters());
                Ok(())
            }
            None => Err(Error::new(
                ErrorKind::NotFound,
                format!("Unrecognized tool name {}.", tool_name),
            )),
        }
    }

    pub fn toolbox(&self, tool_name: String) -> Result<(), Error> {
        if tool_name.is_empty() {
            for name in &self.tool_names {
                if let Some(tool) = self.get_tool(name) {
                    println!("{}: {}", tool.get_tool_name(), tool.get_toolbox());
                }
            }
            return Ok(());
        }
        match self.get_tool(tool_name.as_ref()) {
            Some(tool) => {
                println!("{}", tool.get_toolbox());
                Ok(())
            }
            None => Err(Error::new(
                ErrorKind::NotFound,
                format!("Unrecognized tool name {}.", tool_name),
            )),
        }
    }

    pub fn list_tools(&self) {
        let mut s: String = "All {} Available Tools:\n".replace("{}", &self.tool_names.len().to_string());
        for name in &self.tool_names {
            if let Some(tool) = self.get_tool(name) {
                let (tool_name, description) = get_name_and_description(tool);
                s.push_str(&format!("{}: {}\n\n", tool_name, description));
            }
        }
        println!("{}", s);
    }

    pub fn list_tools_with_keywords(&self, keywords: Vec<String>) {
        let mut s = String::from("Matching Tools:\n");
        for name in &self.tool_names {
            if let Some(tool) = self.get_tool(name) {
                let (tool_name, description) = get_name_and_description(tool);
                for keyword in &keywords {
                    if tool_name.to_lowercase().contains(&keyword.to_lowercase())
                        || description.to_lowercase().contains(&keyword.to_lowercase())
                    {
                        s.push_str(&format!("{}: {}\n\n", tool_name, description));
                        break;
                    }
                }
            }
        }
        println!("{}", s);
    }
}

pub trait BluespotTool {
    fn get_tool_name(&self) -> String;
    fn get_tool_description(&self) -> String;
    fn get_tool_parameters(&self) -> String;
    fn get_example_usage(&self) -> String;
    fn get_toolbox(&self) -> String;
    fn get_source_file(&self) -> String;
    fn run<'a>(
        &self,
        args: Vec<String>,
        working_directory: &'a str,
        verbose: bool,
    ) -> Result<(), Error>;
}

fn get_help<'a>(wt: Box<dyn BluespotTool + 'a>) -> String {
    let tool_name = wt.get_tool_name();
    let description = wt.get_tool_description();
    let parameters = wt.get_tool_parameters();
    let toolbox = wt.get_toolbox();
    let o: serde_json::Value = serde_json::from_str(&parameters).unwrap();
    let a = o["parameters"].as_array().unwrap();
    let mut p = String::new();
    p.push_str("Flag               Description\n");
    p.push_str("-----------------  -----------\n");
    for d in a {
        let mut s = String::new();
        for f in d["flags"].as_array().unwrap() {
            s.push_str(&format!("{}, ", f.as_str().unwrap()));
        }
        p.push_str(&format!(
            "{:width$} {}\n",
            s.trim().trim_matches(','),
            d["description"].as_str().unwrap(),
            width = 18
        ));
    }
    let example = wt.get_example_usage();
    if example.len() <= 1 {
        format!(
            "{}

Description:\n{}
Toolbox: {}
Parameters:\n
{}
",
            tool_name, description, toolbox, p
        )
    } else {
        format!(
            "{}
Description:\n{}
Toolbox: {}
Parameters:\n
{}

Example usage:
{}
",
            tool_name, description, toolbox, p, example
        )
    }
}

fn get_name_and_description<'a>(wt: Box<dyn BluespotTool + 'a>) -> (String, String) {
    (wt.get_tool_name(), wt.get_tool_description())
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ToolParameter {
    pub name: String,
    pub flags: Vec<String>,
    pub description: String,
    pub parameter_type: ParameterType,
    pub default_value: Option<String>,
    pub optional: bool,
}

#[derive(Serialize, Deserialize, Debug)]
pub enum ParameterType {
    Boolean,
    String,
    Integer,
    Float,
    FloatList,
    ExistingFile(ParameterFileType),
    NewFile(ParameterFileType),
    Directory,
}

#[derive(Serialize, Deserialize, Debug)]
pub enum ParameterFileType {
    Any,
    Raster,
    Vector,
}

/// Reads a flow direction grid out of a raster, rejecting any cell that does
/// not hold one of the nine known direction codes.
pub fn flow_directions_from_raster(raster: &Raster) -> Result<Array2D<u8>, Error> {
    let rows = raster.configs.rows as isize;
    let columns = raster.configs.columns as isize;
    let mut flowdir: Array2D<u8> = Array2D::new(
        rows,
        columns,
        bluespot_common::algorithms::flow::FLOWDIR_NODIR,
        bluespot_common::algorithms::flow::FLOWDIR_NODIR,
    )?;
    let mut z: f64;
    for row in 0..rows {
        for col in 0..columns {
            z = raster.get_value(row, col);
            if z < 0f64 || z > 8f64 || z != z.floor() {
                return Err(Error::new(
                    ErrorKind::InvalidInput,
                    format!(
                        "Unknown flow direction code {} at cell ({}, {}).",
                        z, row, col
                    ),
                ));
            }
            flowdir.set_value(row, col, z as u8);
        }
    }
    Ok(flowdir)
}

/// Reads a label grid out of a raster, rejecting negative or fractional
/// values.
pub fn labels_from_raster(raster: &Raster) -> Result<Array2D<i32>, Error> {
    let rows = raster.configs.rows as isize;
    let columns = raster.configs.columns as isize;
    let mut labels: Array2D<i32> = Array2D::new(rows, columns, 0, -1)?;
    let mut z: f64;
    for row in 0..rows {
        for col in 0..columns {
            z = raster.get_value(row, col);
            if z < 0f64 || z != z.floor() {
                return Err(Error::new(
                    ErrorKind::InvalidInput,
                    format!("Invalid label value {} at cell ({}, {}).", z, row, col),
                ));
            }
            labels.set_value(row, col, z as i32);
        }
    }
    Ok(labels)
}

/// The largest label value present in a label grid.
pub fn max_label(labels: &Array2D<i32>) -> i32 {
    let mut max = 0i32;
    for row in 0..labels.rows {
        for col in 0..labels.columns {
            let lbl = labels.get_value(row, col);
            if lbl > max {
                max = lbl;
            }
        }
    }
    max
}

/// Reads a required numeric property off a vector feature.
pub fn feature_f64(feature: &Feature, name: &str) -> Result<f64, Error> {
    feature
        .property(name)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| missing_property(feature, name))
}

/// Reads a required integer property off a vector feature.
pub fn feature_i32(feature: &Feature, name: &str) -> Result<i32, Error> {
    feature
        .property(name)
        .and_then(|v| v.as_i64())
        .map(|v| v as i32)
        .ok_or_else(|| missing_property(feature, name))
}

/// Reads a nullable integer property off a vector feature. An absent
/// property counts as null.
pub fn feature_opt_i32(feature: &Feature, name: &str) -> Option<i32> {
    feature
        .property(name)
        .and_then(|v| v.as_i64())
        .map(|v| v as i32)
}

/// Reads a required string property off a vector feature.
pub fn feature_string(feature: &Feature, name: &str) -> Result<String, Error> {
    feature
        .property(name)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
        .ok_or_else(|| missing_property(feature, name))
}

fn missing_property(feature: &Feature, name: &str) -> Error {
    Error::new(
        ErrorKind::InvalidInput,
        format!("Feature {} is missing property '{}'.", feature.id, name),
    )
}

/// Two rasters of one pipeline must share shape.
pub fn check_same_shape(a: &Raster, b: &Raster) -> Result<(), Error> {
    if a.configs.rows != b.configs.rows || a.configs.columns != b.configs.columns {
        return Err(Error::new(
            ErrorKind::InvalidInput,
            "The input files must have the same number of rows and columns and spatial extent.",
        ));
    }
    Ok(())
}

/// The core assumes square cells; the two resolutions must agree within 1%.
pub fn check_square_cells(raster: &Raster) -> Result<(), Error> {
    if !raster.configs.cells_are_square() {
        return Err(Error::new(
            ErrorKind::InvalidInput,
            "Input cells must be square.",
        ));
    }
    Ok(())
}
