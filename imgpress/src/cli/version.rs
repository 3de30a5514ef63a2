use std::env;

use serde::Serialize;
use server::config::Config;

#[derive(Debug, Serialize)]
struct VersionInfo {
    name: &'static str,
    version: &'static str,
    os: &'static str,
    architecture: &'static str,
    formats: Vec<String>,
}

impl VersionInfo {
    fn current() -> Self {
        Self {
            name: clap::crate_name!(),
            version: clap::crate_version!(),
            os: env::consts::OS,
            architecture: env::consts::ARCH,
            formats: Config::from_env()
                .allowed_formats
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

pub fn run(json: bool) {
    let info = VersionInfo::current();
    if json {
        match serde_json::to_string_pretty(&info) {
            Ok(s) => println!("{s}"),
            Err(e) => eprintln!("error: {e}"),
        }
        return;
    }

    println!("Name           : {}", info.name);
    println!("Version        : {}", info.version);
    println!("OS             : {}", info.os);
    println!("Architecture   : {}", info.architecture);
    println!("Formats        : {}", info.formats.join(", "));
}
