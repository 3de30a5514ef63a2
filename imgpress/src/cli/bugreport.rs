use bugreport::{
    bugreport,
    collector::{CompileTimeInformation, EnvironmentVariables, OperatingSystem, SoftwareVersion},
    format::Markdown,
};

const SETTINGS: [&str; 12] = [
    "IMGPRESS_PORT",
    "IMGPRESS_BASE_URL",
    "IMGPRESS_MAX_FILE_SIZE_BYTES",
    "IMGPRESS_TEMP_DIR",
    "IMGPRESS_RATE_LIMIT_WINDOW_MS",
    "IMGPRESS_RATE_LIMIT_MAX_REQUESTS",
    "IMGPRESS_BATCH_SIZE_LIMIT",
    "IMGPRESS_FILE_RETENTION_HOURS",
    "IMGPRESS_CLEANUP_INTERVAL_MINUTES",
    "IMGPRESS_ALLOWED_FORMATS",
    "IMGPRESS_ALLOWED_MIMES",
    "RUST_LOG",
];

pub fn run() {
    bugreport!()
        .info(SoftwareVersion::default())
        .info(OperatingSystem::default())
        .info(EnvironmentVariables::list(&SETTINGS))
        .info(CompileTimeInformation::default())
        .print::<Markdown>();
}
