pub mod bugreport;
pub mod client;
pub mod server;
pub mod version;

pub const SERVER_SUBCOMMAND: &str = "server";
pub const SERVER_DESCRIPTION: &str = "Run the image compression service";

pub const VERSION_SUBCOMMAND: &str = "version";
pub const VERSION_DESCRIPTION: &str = "Display the version and build information";

pub const BUGREPORT_SUBCOMMAND: &str = "bugreport";
pub const BUGREPORT_DESCRIPTION: &str = "Collect information about the system and the environment for bug reports";

pub const COMPRESS_SUBCOMMAND: &str = "compress";
pub const COMPRESS_DESCRIPTION: &str = "Compress an image on the service and print its download link";

pub const STATS_SUBCOMMAND: &str = "stats";
pub const STATS_DESCRIPTION: &str = "Show what the service currently keeps in temporary storage";

pub const CLEANUP_SUBCOMMAND: &str = "cleanup";
pub const CLEANUP_DESCRIPTION: &str = "Delete stored images older than the retention window";
