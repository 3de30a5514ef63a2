use clap::{arg, command, crate_name, value_parser, ArgMatches, Command};
use client::CompressParams;

mod cli;

fn uri_arg() -> clap::Arg {
    arg!(-u --uri <URI>)
        .required(true)
        .help("Image compression service URI, for example http://localhost:3000")
}

fn build_cli() -> Command {
    command!(crate_name!())
        .version(clap::crate_version!())
        .about(clap::crate_description!())
        .subcommand(
            Command::new(cli::VERSION_SUBCOMMAND)
                .about(cli::VERSION_DESCRIPTION)
                .arg(arg!(--json).help("Print as JSON")),
        )
        .subcommand(Command::new(cli::BUGREPORT_SUBCOMMAND).about(cli::BUGREPORT_DESCRIPTION))
        .subcommand(
            Command::new(cli::SERVER_SUBCOMMAND)
                .about(cli::SERVER_DESCRIPTION)
                .arg(
                    arg!(-p --port <PORT>)
                        .required(false)
                        .value_parser(value_parser!(u16))
                        .help("Port to listen on, overrides IMGPRESS_PORT"),
                )
                .arg(
                    arg!(-t --"temp-dir" <DIR>)
                        .required(false)
                        .help("Directory for stored images, overrides IMGPRESS_TEMP_DIR"),
                ),
        )
        .subcommand(
            Command::new(cli::COMPRESS_SUBCOMMAND)
                .about(cli::COMPRESS_DESCRIPTION)
                .arg(uri_arg())
                .arg(
                    arg!(-f --file <FILE>)
                        .required(true)
                        .help("Path to the image to compress"),
                )
                .arg(
                    arg!(--width <WIDTH>)
                        .required(false)
                        .value_parser(value_parser!(u32))
                        .help("Target width in pixels"),
                )
                .arg(
                    arg!(--height <HEIGHT>)
                        .required(false)
                        .value_parser(value_parser!(u32))
                        .help("Target height in pixels"),
                )
                .arg(
                    arg!(--format <FORMAT>)
                        .required(false)
                        .help("Output format: jpeg, png, webp or avif"),
                )
                .arg(
                    arg!(-q --quality <QUALITY>)
                        .required(false)
                        .value_parser(value_parser!(u8).range(1..=100))
                        .help("Encoder quality from 1 to 100"),
                )
                .arg(
                    arg!(--fit <FIT>)
                        .required(false)
                        .help("Resize mode: cover, contain, fill, inside or outside"),
                ),
        )
        .subcommand(
            Command::new(cli::STATS_SUBCOMMAND)
                .about(cli::STATS_DESCRIPTION)
                .arg(uri_arg()),
        )
        .subcommand(
            Command::new(cli::CLEANUP_SUBCOMMAND)
                .about(cli::CLEANUP_DESCRIPTION)
                .arg(uri_arg())
                .arg(
                    arg!(-r --retention <HOURS>)
                        .required(false)
                        .value_parser(value_parser!(u64).range(1..))
                        .help("Retention in hours, defaults to the service setting"),
                ),
        )
        .arg_required_else_help(true)
        .disable_version_flag(true)
}

fn compress_params(matches: &ArgMatches) -> CompressParams {
    CompressParams {
        uri: matches.get_one::<String>("uri").cloned().unwrap_or_default(),
        file: matches.get_one::<String>("file").cloned().unwrap_or_default(),
        width: matches.get_one::<u32>("width").copied(),
        height: matches.get_one::<u32>("height").copied(),
        format: matches.get_one::<String>("format").cloned(),
        quality: matches.get_one::<u8>("quality").copied(),
        fit: matches.get_one::<String>("fit").cloned(),
    }
}

fn uri(matches: &ArgMatches) -> &str {
    matches.get_one::<String>("uri").map_or("", String::as_str)
}

#[tokio::main]
async fn main() {
    let cli = build_cli().get_matches();

    match cli.subcommand() {
        Some((cli::VERSION_SUBCOMMAND, matches)) => cli::version::run(matches.get_flag("json")),
        Some((cli::BUGREPORT_SUBCOMMAND, _)) => cli::bugreport::run(),
        Some((cli::SERVER_SUBCOMMAND, matches)) => cli::server::run(matches).await,
        Some((cli::COMPRESS_SUBCOMMAND, matches)) => {
            cli::client::compress(compress_params(matches)).await;
        }
        Some((cli::STATS_SUBCOMMAND, matches)) => cli::client::stats(uri(matches)).await,
        Some((cli::CLEANUP_SUBCOMMAND, matches)) => {
            let retention = matches.get_one::<u64>("retention").copied();
            cli::client::cleanup(uri(matches), retention).await;
        }
        _ => {}
    }
}
