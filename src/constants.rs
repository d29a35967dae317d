/// Package name.
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
/// Default configuration file name.
pub const CONFIG_NAME: &str = "config.toml";
/// Environment file loaded from the configuration directory.
pub const ENV_FILE_NAME: &str = ".env";
/// Environment variable overriding the configuration file location.
pub const CONFIG_ENV: &str = "LABKIT_CONFIG";
/// Environment variable holding the Telegram bot token.
pub const TELEGRAM_TOKEN_ENV: &str = "TELEGRAM_TOKEN";
/// Placeholder used when the hostname or service name cannot be resolved.
pub const UNKNOWN: &str = "Unknown";
/// Files with more lines than this are refused by `file_util::read_file`.
pub const READ_LINE_LIMIT: usize = 10_000;
/// Default timeout, in seconds, for `lk exec`.
pub const DEFAULT_COMMAND_TIMEOUT: u64 = 30;
