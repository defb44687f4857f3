use std::fs::{File, OpenOptions};
use std::io::{stderr, Write};
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{bail, Result};
use log::{LevelFilter, Log, Metadata, Record};
use once_cell::sync::OnceCell;
use serde_json::json;

static RUNWAY_LOGGER: OnceCell<RunwayLogger> = OnceCell::new();
static LOG_FILE: OnceCell<Option<File>> = OnceCell::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            unknown => bail!("unknown log format: {}", unknown),
        }
    }
}

pub fn init(debug: bool, log_file: Option<PathBuf>, format: LogFormat) -> Result<()> {
    LOG_FILE.get_or_try_init(|| -> Result<Option<File>> {
        match log_file {
            Some(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .write(true)
                    .append(true)
                    .open(path)?;
                Ok(Some(file))
            }
            None => Ok(None),
        }
    })?;

    let level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    let logger = RUNWAY_LOGGER.get_or_init(|| RunwayLogger { format });
    if log::set_logger(logger).is_ok() {
        log::set_max_level(level);
    }

    Ok(())
}

pub struct RunwayLogger {
    format: LogFormat,
}

impl RunwayLogger {
    fn render(&self, record: &Record) -> String {
        match self.format {
            LogFormat::Text => format!("[{}] {}", record.level(), record.args()),
            LogFormat::Json => json!({
                "level": record.level().to_string(),
                "msg": record.args().to_string(),
                "time": chrono::Utc::now().to_rfc3339(),
            })
            .to_string(),
        }
    }
}

impl Log for RunwayLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let line = self.render(record);
        match LOG_FILE.get().and_then(|f| f.as_ref()) {
            Some(mut file) => {
                let _ = writeln!(file, "{}", line);
            }
            None => {
                let _ = writeln!(stderr(), "{}", line);
            }
        }
    }

    fn flush(&self) {
        if let Some(mut file) = LOG_FILE.get().and_then(|f| f.as_ref()) {
            let _ = file.flush();
        } else {
            let _ = stderr().flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_from_str() {
        assert_eq!(LogFormat::from_str("text").unwrap(), LogFormat::Text);
        assert_eq!(LogFormat::from_str("json").unwrap(), LogFormat::Json);
        assert!(LogFormat::from_str("yaml").is_err());
    }
}
