use chrono::Local;
use log::LevelFilter;
use simplelog::{self, CombinedLogger, WriteLogger};
use std::fs::OpenOptions;
use std::io::Write;

/// Sets up logging to a file
///
/// # Arguments
///
/// * `log_level` - The level of log messages to capture
/// * `log_file` - Optional path to log file. If None, creates a timestamped file
///
/// # Returns
///
/// The path to the created log file
pub fn setup_logging(log_level: LevelFilter, log_file: Option<&str>) -> std::io::Result<String> {
    let timestamp = Local::now().format("%Y%m%d_%H").to_string();

    let log_path = match log_file {
        Some(path) => path.to_string(),
        None => format!("gmail_relay_{}.log", timestamp),
    };

    // Create the log file with append mode and write header in one operation
    let mut log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    writeln!(
        log_file,
        "====== GMAIL RELAY LOG - Started at {} ======",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    )?;

    // Quiet the HTTP and websocket internals unless tracing everything
    let log_config = simplelog::ConfigBuilder::new()
        .add_filter_ignore_str("hyper")
        .add_filter_ignore_str("tungstenite")
        .build();

    CombinedLogger::init(vec![WriteLogger::new(log_level, log_config, log_file)])
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

    log::info!("Logging initialized to file: {}", log_path);
    log::debug!("Debug logging enabled");

    Ok(log_path)
}

/// Stderr-only logging for environments where no log file can be written.
pub fn setup_stderr_logging(log_level: LevelFilter) {
    let _ = env_logger::builder()
        .filter_level(log_level)
        .try_init();
}
