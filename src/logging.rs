//! Logging setup
//!
//! Library code logs through the `log` facade. This module provides the
//! numeric verbosity scale used on the command line and in config files,
//! and a logger that writes to stderr and optionally appends to a log file.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use log::{Level, LevelFilter, Log, Metadata, Record};
use parking_lot::Mutex;

/// Verbosity levels, lowest to highest
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LogLevel {
    Nothing = 0,
    User = 1,
    Error = 2,
    Warning = 3,
    #[default]
    Info = 4,
    Debug = 5,
    All = 6,
}

impl LogLevel {
    /// Create a LogLevel from an integer
    pub fn from_i32(level: i32) -> Self {
        match level {
            0 => LogLevel::Nothing,
            1 => LogLevel::User,
            2 => LogLevel::Error,
            3 => LogLevel::Warning,
            4 => LogLevel::Info,
            5 => LogLevel::Debug,
            6 => LogLevel::All,
            _ => LogLevel::Info,
        }
    }

    pub fn as_i32(&self) -> i32 {
        *self as i32
    }

    /// Most verbose `log` level let through at this verbosity
    pub fn to_level_filter(self) -> LevelFilter {
        match self {
            LogLevel::Nothing => LevelFilter::Off,
            LogLevel::User | LogLevel::Error => LevelFilter::Error,
            LogLevel::Warning => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::All => LevelFilter::Trace,
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(n) = s.parse::<i32>() {
            return if (0..=6).contains(&n) {
                Ok(LogLevel::from_i32(n))
            } else {
                Err(format!("log level {} out of range 0-6", n))
            };
        }
        match s.to_ascii_lowercase().as_str() {
            "nothing" | "off" | "none" => Ok(LogLevel::Nothing),
            "user" => Ok(LogLevel::User),
            "error" => Ok(LogLevel::Error),
            "warning" | "warn" => Ok(LogLevel::Warning),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "all" | "trace" => Ok(LogLevel::All),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

/// Stderr logger with an optional log file
struct StageLogger {
    file: Mutex<Option<File>>,
}

static LOGGER: StageLogger = StageLogger {
    file: Mutex::new(None),
};

fn format_record(record: &Record) -> String {
    format!("[{:<5}] {}: {}", record.level(), record.target(), record.args())
}

impl Log for StageLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format_record(record);
        eprintln!("{}", line);

        if let Some(file) = self.file.lock().as_mut() {
            let _ = writeln!(file, "{}", line);
            let _ = file.flush();
        }
    }

    fn flush(&self) {
        if let Some(file) = self.file.lock().as_mut() {
            let _ = file.flush();
        }
    }
}

/// Install the logger (once per process) and apply `level` and `file`
///
/// Calling again changes the level and log file of the installed logger.
pub fn init_logging(level: LogLevel, file: Option<&Path>) -> std::io::Result<()> {
    let handle = match file {
        Some(path) => Some(OpenOptions::new().create(true).append(true).open(path)?),
        None => None,
    };
    *LOGGER.file.lock() = handle;

    // Fails only when a logger is already installed, which is fine here
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(level.to_level_filter());
    Ok(())
}

/// Log a message at one of the numeric levels
pub fn log_add(level: LogLevel, message: &str) {
    let level = match level {
        LogLevel::Nothing => return,
        LogLevel::User | LogLevel::Error => Level::Error,
        LogLevel::Warning => Level::Warn,
        LogLevel::Info => Level::Info,
        LogLevel::Debug => Level::Debug,
        LogLevel::All => Level::Trace,
    };
    log::log!(level, "{}", message);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_from_i32() {
        assert_eq!(LogLevel::from_i32(0), LogLevel::Nothing);
        assert_eq!(LogLevel::from_i32(3), LogLevel::Warning);
        assert_eq!(LogLevel::from_i32(6), LogLevel::All);
        // Invalid values default to Info
        assert_eq!(LogLevel::from_i32(100), LogLevel::Info);
        assert_eq!(LogLevel::from_i32(-1), LogLevel::Info);
    }

    #[test]
    fn test_log_level_as_i32() {
        assert_eq!(LogLevel::Nothing.as_i32(), 0);
        assert_eq!(LogLevel::Debug.as_i32(), 5);
    }

    #[test]
    fn test_level_filter_mapping() {
        assert_eq!(LogLevel::Nothing.to_level_filter(), LevelFilter::Off);
        assert_eq!(LogLevel::User.to_level_filter(), LevelFilter::Error);
        assert_eq!(LogLevel::Warning.to_level_filter(), LevelFilter::Warn);
        assert_eq!(LogLevel::All.to_level_filter(), LevelFilter::Trace);
    }

    #[test]
    fn test_log_level_from_str() {
        assert_eq!("debug".parse::<LogLevel>(), Ok(LogLevel::Debug));
        assert_eq!("WARN".parse::<LogLevel>(), Ok(LogLevel::Warning));
        assert_eq!("2".parse::<LogLevel>(), Ok(LogLevel::Error));
        assert!("7".parse::<LogLevel>().is_err());
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_init_logging_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audio.log");

        init_logging(LogLevel::Debug, Some(&path)).unwrap();
        log_add(LogLevel::Warning, "device lost");
        log::logger().flush();
        init_logging(LogLevel::Info, None).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("device lost"));
        assert!(contents.contains("WARN"));
    }
}
