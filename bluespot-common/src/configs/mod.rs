use serde::{Deserialize, Serialize};
use serde_json;
use std::fs;
use std::fs::File;
use std::io::prelude::*;
use std::io::Error;

/// A structure to hold environment settings. Backed by settings.json file in same directory
#[derive(Serialize, Deserialize, Debug)]
pub struct Configs {
    pub verbose_mode: bool,
    pub working_directory: String,
    pub max_procs: isize,
}

impl Configs {
    pub fn new() -> Configs {
        Configs {
            verbose_mode: true,
            working_directory: String::new(),
            max_procs: -1,
        }
    }
}

fn configs_file_path() -> String {
    let mut exe_path = std::env::current_exe().unwrap();
    exe_path.pop();
    if exe_path.ends_with("bluespot_tools") || exe_path.ends_with("bluespot_tools.exe") {
        exe_path.pop();
    }
    let config_file = exe_path.join("settings.json");
    config_file
        .to_str()
        .unwrap_or("No configs path found.")
        .to_string()
}

pub fn get_configs() -> std::result::Result<Configs, Error> {
    let configs: Configs = match fs::read_to_string(configs_file_path()) {
        Ok(contents) => {
            serde_json::from_str(&contents).expect("Failed to parse settings.json file.")
        }
        Err(_) => Configs::new(),
    };
    Ok(configs)
}

pub fn save_configs(configs: &Configs) -> std::result::Result<(), Error> {
    let configs_json =
        serde_json::to_string_pretty(&configs).expect("Error converting Configs object to JSON.");
    match File::create(configs_file_path()) {
        Ok(mut file) => {
            match file.write_all(configs_json.as_bytes()) {
                Ok(()) => {} // do nothing
                Err(_e) => {
                    eprintln!("Error writing to output settings.json file, likely due to a permissions problem. Settings will not be updated.");
                }
            };
        }
        Err(_e) => {
            eprintln!("Could not create output settings.json file. The tools are likely installed somewhere without write permission.")
        }
    };

    Ok(())
}
