use std::env;

use clap::ArgMatches;
use server::config::Config;

/// Starts the service. Flags win over `IMGPRESS_*` variables.
pub async fn run(matches: &ArgMatches) {
    let port = matches.get_one::<u16>("port").map(ToString::to_string);
    let temp_dir = matches.get_one::<String>("temp-dir").cloned();

    let config = Config::from_lookup(|key| match key {
        "IMGPRESS_PORT" if port.is_some() => port.clone(),
        "IMGPRESS_TEMP_DIR" if temp_dir.is_some() => temp_dir.clone(),
        _ => env::var(key).ok(),
    });

    if let Err(e) = server::run(config).await {
        eprintln!("server error: {e}");
        std::process::exit(1);
    }
}
