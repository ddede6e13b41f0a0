//! CLI arguments and server configuration defaults.

use clap::Parser;
use shadow_rs::formatcp;

use crate::build;

const VERSION_INFO: &str = formatcp!(
    r#"{}\ncommit_hash: {}\nbuild_time: {}\nbuild_env: {},{}"#,
    build::PKG_VERSION,
    build::SHORT_COMMIT,
    build::BUILD_TIME,
    build::RUST_VERSION,
    build::RUST_CHANNEL
);

pub const DEFAULT_STORAGE_DIR: &str = ".filebay/storage";
pub const DEFAULT_UPLOAD_MAX_SIZE: u64 = 256 * 1024 * 1024;
pub const DEFAULT_TEMP_TTL_SECS: u64 = 60 * 60;
pub const TEMP_SWEEP_INTERVAL_SECS: u64 = 900;

/// CLI arguments and environment configuration for the server.
#[derive(Parser, Debug)]
#[command(name = "filebay", version = VERSION_INFO, about = "Filebay file storage server")]
pub struct Args {
    #[arg(
        short = 's',
        long,
        env = "FILEBAY_STORAGE_DIR",
        default_value = DEFAULT_STORAGE_DIR,
        help = "Storage directory for files"
    )]
    pub storage_dir: String,
    #[arg(
        short = 'b',
        long,
        env = "FILEBAY_BIND",
        default_value = "0.0.0.0",
        help = "Bind address"
    )]
    pub host: String,
    #[arg(
        short = 'p',
        long,
        env = "FILEBAY_PORT",
        default_value_t = 8000,
        help = "HTTP port"
    )]
    pub port: u16,
    #[arg(long, env = "FILEBAY_CORS_ORIGINS", help = "Comma separated CORS origins")]
    pub cors_origins: Option<String>,
    #[arg(
        long,
        env = "FILEBAY_UPLOAD_MAX_SIZE",
        default_value_t = DEFAULT_UPLOAD_MAX_SIZE,
        help = "Max upload size in bytes"
    )]
    pub upload_max_size: u64,
    #[arg(
        long,
        env = "FILEBAY_TEMP_TTL_SECS",
        default_value_t = DEFAULT_TEMP_TTL_SECS,
        help = "Stale scratch file cleanup threshold in seconds"
    )]
    pub temp_ttl_secs: u64,
}
