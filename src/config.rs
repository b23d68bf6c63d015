//! CLI 参数与上传服务默认配置。

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

pub const UPLOAD_TEMP_DIR: &str = ".axo/temp";
pub const FILE_NAME_HEADER: &str = "x-file-name";
pub const UPLOAD_ID_HEADER: &str = "x-upload-id";
pub const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;
pub const DEFAULT_TEMP_TTL_SECS: u64 = 24 * 60 * 60;
pub const DEFAULT_LOCK_WAIT_TIMEOUT_SECS: u64 = 30;
pub const TEMP_CLEAN_INTERVAL_SECS: u64 = 900;

/// 上传服务的命令行与环境变量配置。
#[derive(Parser, Debug)]
#[command(name = "axo-upload", version = VERSION_INFO, about = "AxoUpload server")]
pub struct Args {
    #[arg(
        short = 's',
        long,
        env = "AXO_STORAGE_DIR",
        default_value = ".axo/uploads",
        help = "Target directory for uploaded files"
    )]
    pub storage_dir: String,
    #[arg(
        short = 'b',
        long = "bind",
        env = "AXO_BIND",
        default_value = "0.0.0.0",
        help = "Bind address"
    )]
    pub host: String,
    #[arg(
        short = 'p',
        long,
        env = "AXO_PORT",
        default_value_t = 5005,
        help = "HTTP port"
    )]
    pub port: u16,
    #[arg(
        long,
        env = "AXO_MAX_FILE_SIZE",
        default_value_t = DEFAULT_MAX_FILE_SIZE,
        help = "Max accepted file size in bytes (0 to disable)"
    )]
    pub max_file_size: u64,
    #[arg(long, env = "AXO_CORS_ORIGINS", help = "Comma separated CORS origins")]
    pub cors_origins: Option<String>,
    #[arg(
        long,
        env = "AXO_TEMP_TTL_SECS",
        default_value_t = DEFAULT_TEMP_TTL_SECS,
        help = "Staging file and resumable session expiry in seconds (0 keeps staging files; sessions then use the default)"
    )]
    pub temp_ttl_secs: u64,
}
