//! Shared logging setup for FaxSpool binaries.
//!
//! Logs go to stderr and to a size-rotated file under `<home>/logs`, where
//! home is `FAXSPOOL_HOME` or `~/.faxspool`.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub const DEFAULT_LOG_FILTER: &str = "faxspool_bridge=info,faxspool_protocol=info";
const MAX_LOG_FILES: usize = 5;
const MAX_LOG_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Logging configuration for a binary.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    /// Console shows debug output regardless of `RUST_LOG`.
    pub verbose: bool,
    /// Override for the log directory (defaults to [`logs_dir`]).
    pub log_dir: Option<PathBuf>,
}

/// Initialize tracing with a rotating file writer and stderr output.
///
/// Returns the directory the log file lives in.
pub fn init_logging(config: LogConfig<'_>) -> Result<PathBuf> {
    let dir = match config.log_dir {
        Some(dir) => dir,
        None => logs_dir(),
    };
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create logs directory: {}", dir.display()))?;

    let file_writer = SharedLogWriter::open(&dir, config.app_name)
        .context("Failed to initialize rotating log writer")?;

    let file_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let console_filter = if config.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(dir)
}

/// FaxSpool home directory.
///
/// Priority:
/// 1) FAXSPOOL_HOME
/// 2) ~/.faxspool
/// 3) ./.faxspool
pub fn faxspool_home() -> PathBuf {
    if let Ok(override_path) = std::env::var("FAXSPOOL_HOME") {
        return PathBuf::from(override_path);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".faxspool")
}

/// Logs directory: `<home>/logs`
pub fn logs_dir() -> PathBuf {
    faxspool_home().join("logs")
}

/// Append-only log file that rotates to `<name>.log.1 .. <name>.log.N` once
/// it exceeds `max_size`.
struct RotatingFile {
    dir: PathBuf,
    base_name: String,
    keep: usize,
    max_size: u64,
    file: Option<File>,
    written: u64,
}

impl RotatingFile {
    fn open(dir: &Path, base_name: &str, keep: usize, max_size: u64) -> io::Result<Self> {
        let mut log = Self {
            dir: dir.to_path_buf(),
            base_name: sanitize_name(base_name),
            keep: keep.max(1),
            max_size,
            file: None,
            written: 0,
        };
        log.reopen()?;
        if log.written > log.max_size {
            log.rotate()?;
        }
        Ok(log)
    }

    fn active_path(&self) -> PathBuf {
        self.dir.join(format!("{}.log", self.base_name))
    }

    fn archive_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("{}.log.{}", self.base_name, index))
    }

    fn reopen(&mut self) -> io::Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.active_path())?;
        self.written = file.metadata()?.len();
        self.file = Some(file);
        Ok(())
    }

    fn rotate(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            let _ = file.flush();
        }

        let oldest = self.keep - 1;
        if oldest > 0 {
            let last = self.archive_path(oldest);
            if last.exists() {
                fs::remove_file(&last)?;
            }
            for index in (1..oldest).rev() {
                let from = self.archive_path(index);
                if from.exists() {
                    fs::rename(&from, self.archive_path(index + 1))?;
                }
            }
            let active = self.active_path();
            if active.exists() {
                fs::rename(active, self.archive_path(1))?;
            }
        } else {
            // Single-file mode: truncate in place.
            let _ = fs::remove_file(self.active_path());
        }

        self.reopen()
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written + buf.len() as u64 > self.max_size {
            self.rotate()?;
        }
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "log file unavailable"))?;
        let n = file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

/// `MakeWriter` handing out guards onto one shared rotating file.
#[derive(Clone)]
struct SharedLogWriter {
    inner: Arc<Mutex<RotatingFile>>,
}

impl SharedLogWriter {
    fn open(dir: &Path, base_name: &str) -> Result<Self> {
        let file = RotatingFile::open(dir, base_name, MAX_LOG_FILES, MAX_LOG_FILE_SIZE)
            .with_context(|| format!("Failed to open log file for {}", base_name))?;
        Ok(Self {
            inner: Arc::new(Mutex::new(file)),
        })
    }
}

struct SharedLogGuard {
    inner: Arc<Mutex<RotatingFile>>,
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SharedLogWriter {
    type Writer = SharedLogGuard;

    fn make_writer(&'a self) -> Self::Writer {
        SharedLogGuard {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Write for SharedLogGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer lock poisoned"))?
            .write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer lock poisoned"))?
            .flush()
    }
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn rotates_when_size_exceeded() {
        let temp = TempDir::new().unwrap();
        let mut log = RotatingFile::open(temp.path(), "bridge", 3, 16).unwrap();

        log.write_all(b"0123456789").unwrap();
        log.write_all(b"0123456789").unwrap();
        log.write_all(b"abcdefghij").unwrap();
        log.flush().unwrap();

        assert!(temp.path().join("bridge.log").exists());
        assert!(temp.path().join("bridge.log.1").exists());
        assert!(temp.path().join("bridge.log.2").exists());
        assert!(!temp.path().join("bridge.log.3").exists());

        let active = fs::read_to_string(temp.path().join("bridge.log")).unwrap();
        assert_eq!(active, "abcdefghij");
    }

    #[test]
    fn sanitizes_app_name() {
        assert_eq!(sanitize_name("faxspool bridge/1"), "faxspool_bridge_1");
    }
}
