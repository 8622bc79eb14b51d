use log::{debug, error, info, warn};

/// Initialize the logger. Defaults to `info` unless RUST_LOG overrides it.
pub fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

/// Log an informational message
pub fn log_info(message: &str) {
    info!("{}", message);
}

/// Log a debug message
pub fn log_debug(message: &str) {
    debug!("{}", message);
}

/// Log a warning message
pub fn log_warning(message: &str) {
    warn!("{}", message);
}

/// Log an error message
pub fn log_error(message: &str) {
    error!("{}", message);
}

/// Log an error and abort the process. Reserved for states where
/// continuing would corrupt the dataset.
pub fn log_fatal(message: &str) -> ! {
    error!("{}", message);
    std::process::exit(1);
}
