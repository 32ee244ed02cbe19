// log4rs bootstrap: console plus one timestamped file per run

use std::error::Error;
use std::path::{Path, PathBuf};

use chrono::Local;
use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

const PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S)} - {l} - {t} - {m}{n}";

pub fn level_for(debug: bool) -> LevelFilter {
    if debug {
        LevelFilter::Info
    } else {
        LevelFilter::Warn
    }
}

pub fn log_file_path(log_dir: &Path) -> PathBuf {
    let timestamp = Local::now().format("%Y-%m-%d-%H_%M").to_string();
    log_dir.join(format!("{timestamp}.log"))
}

pub fn build_config(log_path: &Path, debug: bool) -> Result<Config, Box<dyn Error>> {
    let file_appender = FileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .build(log_path)?;
    let console_appender = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .build();

    let config = Config::builder()
        .appender(Appender::builder().build("console", Box::new(console_appender)))
        .appender(Appender::builder().build("file", Box::new(file_appender)))
        .build(
            Root::builder()
                .appender("console")
                .appender("file")
                .build(level_for(debug)),
        )?;
    Ok(config)
}

/// Install the global logger. Returns the path of this run's log file.
pub fn setup_logging(log_dir: &Path, debug: bool) -> Result<PathBuf, Box<dyn Error>> {
    std::fs::create_dir_all(log_dir)?;
    let log_path = log_file_path(log_dir);
    log4rs::init_config(build_config(&log_path, debug)?)?;
    Ok(log_path)
}
