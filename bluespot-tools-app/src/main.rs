/*
This code is part of the BluespotTools pluvial flood screening library.
Authors: Dr. Mette Kirkeby
Created: 14/03/2023
Last Modified: 22/05/2025
License: MIT
*/

/*!
BluespotTools is a command-line platform for screening digital elevation models
for pluvial flood risk. It finds the closed depressions of a terrain model
("bluespots"), derives the stream network connecting them and simulates how
rain incidents fill and spill between them.

The following commands are recognized:

| Command           | Description                                                                              |
| ----------------- | ---------------------------------------------------------------------------------------- |
| --cd, --wd        | Changes the working directory; used in conjunction with --run flag.                      |
| -h, --help        | Prints help information.                                                                 |
| -l, --license     | Prints the BluespotTools license.                                                        |
| --listtools       | Lists all available tools, with tool descriptions.                                       |
| -r, --run         | Runs a tool; used in conjunction with --cd flag; -r="Filled".                            |
| --toolbox         | Prints the toolbox associated with a tool; --toolbox=Accum.                              |
| --toolhelp        | Prints the help associated with a tool; --toolhelp="Network".                            |
| --toolparameters  | Prints the parameters (in json form) for a specific tool; --toolparameters="Rain".       |
| -v                | Verbose mode. Without this flag, tool outputs will not be printed.                       |
| --version         | Prints the version information.                                                          |

*/

pub mod tools;

use crate::tools::ToolManager;
use std::env;
use std::io::Error;
use std::path;

#[macro_use]
extern crate serde_derive;

fn main() {
    match run() {
        Ok(()) => {}
        Err(err) => panic!("{}", err),
    }
}

fn run() -> Result<(), Error> {
    let sep: &str = &path::MAIN_SEPARATOR.to_string();
    let mut working_dir = String::new();
    let mut tool_name = String::new();
    let mut run_tool = false;
    let mut tool_help = false;
    let mut tool_parameters = false;
    let mut toolbox = false;
    let mut list_tools = false;
    let mut keywords: Vec<String> = vec![];
    let mut tool_args_vec: Vec<String> = vec![];
    let mut finding_working_dir = false;
    let args: Vec<String> = env::args().collect();
    if args.len() <= 1 {
        version();
        help();
        let tm = ToolManager::new(&working_dir, &false)?;
        tm.list_tools();
        return Ok(());
    }

    let mut configs = bluespot_common::configs::get_configs()?;
    let mut configs_modified = false;

    for arg in args {
        let flag_val = arg.to_lowercase().replace("--", "-");
        if flag_val == "-h" || flag_val == "-help" {
            help();
            return Ok(());
        } else if flag_val.starts_with("-cd")
            || flag_val.starts_with("-wd")
            || flag_val.starts_with("-working_directory")
        {
            let mut v = arg
                .replace("--cd", "")
                .replace("--wd", "")
                .replace("--working_directory", "")
                .replace("-cd", "")
                .replace("-wd", "")
                .replace("-working_directory", "")
                .replace("\"", "")
                .replace("\'", "");
            if v.starts_with("=") {
                v = v[1..v.len()].to_string();
            }
            if v.trim().is_empty() {
                finding_working_dir = true;
            }
            if !v.ends_with(sep) {
                v.push_str(sep);
            }
            working_dir = v.to_string();
            if configs.working_directory != working_dir {
                configs.working_directory = working_dir.clone();
                configs_modified = true;
            }
        } else if arg.starts_with("-run") || arg.starts_with("--run") || arg.starts_with("-r") {
            let mut v = arg
                .replace("--run", "")
                .replace("-run", "")
                .replace("-r", "")
                .replace("\"", "")
                .replace("\'", "");
            if v.starts_with("=") {
                v = v[1..v.len()].to_string();
            }
            tool_name = v;
            run_tool = true;
        } else if arg.starts_with("-toolhelp") || arg.starts_with("--toolhelp") {
            let mut v = arg
                .replace("--toolhelp", "")
                .replace("-toolhelp", "")
                .replace("\"", "")
                .replace("\'", "");
            if v.starts_with("=") {
                v = v[1..v.len()].to_string();
            }
            tool_name = v;
            tool_help = true;
        } else if arg.starts_with("-toolparameters") || arg.starts_with("--toolparameters") {
            let mut v = arg
                .replace("--toolparameters", "")
                .replace("-toolparameters", "")
                .replace("\"", "")
                .replace("\'", "");
            if v.starts_with("=") {
                v = v[1..v.len()].to_string();
            }
            tool_name = v;
            tool_parameters = true;
        } else if arg.starts_with("-toolbox") || arg.starts_with("--toolbox") {
            let mut v = arg
                .replace("--toolbox", "")
                .replace("-toolbox", "")
                .replace("\"", "")
                .replace("\'", "");
            if v.starts_with("=") {
                v = v[1..v.len()].to_string();
            }
            tool_name = v;
            toolbox = true;
        } else if arg.starts_with("-listtools")
            || arg.starts_with("--listtools")
            || arg.starts_with("-list_tools")
            || arg.starts_with("--list_tools")
        {
            list_tools = true;
        } else if arg.starts_with("-license")
            || arg.starts_with("-licence")
            || arg.starts_with("--license")
            || arg.starts_with("--licence")
            || arg.starts_with("-l")
        {
            license();
            return Ok(());
        } else if arg.starts_with("-v") || arg.starts_with("--verbose") {
            let mut v = arg
                .replace("-v", "")
                .replace("--verbose", "")
                .replace("-verbose", "")
                .replace("\"", "")
                .replace("\'", "");
            if v.starts_with("=") {
                v = v[1..v.len()].to_string();
            }
            if v.to_lowercase().contains("t") || v.is_empty() {
                if !configs.verbose_mode {
                    configs.verbose_mode = true;
                    configs_modified = true;
                }
            } else {
                if configs.verbose_mode {
                    configs.verbose_mode = false;
                    configs_modified = true;
                }
            }
        } else if arg.starts_with("-max_procs") || arg.starts_with("--max_procs") {
            let mut v = arg
                .replace("--max_procs", "")
                .replace("-max_procs", "")
                .replace("\"", "")
                .replace("\'", "");
            if v.starts_with("=") {
                v = v[1..v.len()].to_string();
            }
            let val = v.parse::<isize>().map_err(|_| {
                Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("Error parsing max_procs value {}", v),
                )
            })?;
            if val != configs.max_procs {
                configs.max_procs = val;
                configs_modified = true;
            }
        } else if arg.starts_with("-version") || arg.starts_with("--version") {
            version();
            return Ok(());
        } else if arg.starts_with("-") {
            // it's an arg to be fed to the tool
            tool_args_vec.push(arg.trim().to_string().clone());
        } else if !arg.contains("bluespot_tools") {
            // add it to the keywords list
            keywords.push(arg.trim().replace("\"", "").replace("\'", "").to_string());
            if finding_working_dir {
                working_dir = arg.trim().to_string().clone();
                finding_working_dir = false;
                configs.working_directory = working_dir.clone();
                configs_modified = true;
            } else if tool_args_vec.len() > 0 {
                tool_args_vec.push(arg.trim().to_string().clone());
            }
        }
    }

    if configs_modified {
        bluespot_common::configs::save_configs(&configs)?;
    }

    let tm = ToolManager::new(&configs.working_directory, &configs.verbose_mode)?;
    if run_tool {
        if tool_name.is_empty() && keywords.len() > 0 {
            tool_name = keywords[0].clone();
        }
        return tm.run_tool(tool_name, tool_args_vec);
    } else if tool_help {
        if tool_name.is_empty() && keywords.len() > 0 {
            tool_name = keywords[0].clone();
        }
        return tm.tool_help(tool_name);
    } else if tool_parameters {
        if tool_name.is_empty() && keywords.len() > 0 {
            tool_name = keywords[0].clone();
        }
        return tm.tool_parameters(tool_name);
    } else if toolbox {
        if tool_name.is_empty() && keywords.len() > 0 {
            tool_name = keywords[0].clone();
        }
        return tm.toolbox(tool_name);
    } else if list_tools {
        if keywords.len() == 0 {
            tm.list_tools();
        } else {
            tm.list_tools_with_keywords(keywords);
        }
    }

    Ok(())
}

fn help() {
    let mut ext = "";
    if cfg!(target_os = "windows") {
        ext = ".exe";
    }

    let exe_name = &format!("bluespot_tools{}", ext);
    let sep: String = path::MAIN_SEPARATOR.to_string();
    let s = "BluespotTools Help

The following commands are recognized:
--cd, --wd          Changes the working directory; used in conjunction with --run flag.
-h, --help          Prints help information.
-l, --license       Prints the BluespotTools license.
--listtools         Lists all available tools. Keywords may also be used, --listtools depressions.
--max_procs         Sets the maximum number of processors used. -1 = all available processors. e.g. --max_procs=2
-r, --run           Runs a tool; used in conjunction with --wd flag; -r=\"Filled\".
--toolbox           Prints the toolbox associated with a tool; --toolbox=Accum.
--toolhelp          Prints the help associated with a tool; --toolhelp=\"Network\".
--toolparameters    Prints the parameters (in json form) for a specific tool; --toolparameters=\"Rain\".
-v                  Verbose mode. Without this flag, tool outputs will not be printed.
--version           Prints the version information.

Example Usage:
>> .*EXE_NAME -r=Complete -v --wd=\"*path*to*data*\" -dem=dem.asc -outdir=out --rain=10 --rain=100
"
    .replace("*", &sep)
    .replace("EXE_NAME", exe_name);
    println!("{}", s);
}

fn license() {
    let license_text = "BluespotTools License
Copyright 2023-2025 Mette Kirkeby

Permission is hereby granted, free of charge, to any person obtaining a copy of this software and
associated documentation files (the \"Software\"), to deal in the Software without restriction,
including without limitation the rights to use, copy, modify, merge, publish, distribute, sublicense,
and/or sell copies of the Software, and to permit persons to whom the Software is furnished to do so,
subject to the following conditions:

The above copyright notice and this permission notice shall be included in all copies or substantial
portions of the Software.

THE SOFTWARE IS PROVIDED \"AS IS\", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR IMPLIED, INCLUDING BUT
NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND
NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES
OR OTHER LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN
CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.";
    println!("{}", license_text);
}

fn version() {
    const VERSION: Option<&'static str> = option_env!("CARGO_PKG_VERSION");
    println!(
        "BluespotTools v{} (c) 2023-2025

BluespotTools is a command-line platform for pluvial flood screening of
digital elevation models.",
        VERSION.unwrap_or("unknown")
    );
}
