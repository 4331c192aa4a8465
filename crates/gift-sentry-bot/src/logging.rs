//! Log setup: console plus two size-rotated files.
//!
//! - `app.log`: everything at DEBUG and above, 10 MiB × 5 generations
//! - `errors.log`: ERROR only, 5 MiB × 3 generations
//!
//! Rotated files are named `app.log.1`, `app.log.2`, ... with `.1` the newest.

use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

const APP_LOG_MAX: u64 = 10 * 1024 * 1024;
const APP_LOG_GENERATIONS: u32 = 5;
const ERROR_LOG_MAX: u64 = 5 * 1024 * 1024;
const ERROR_LOG_GENERATIONS: u32 = 3;

/// Crates whose chatter is capped at WARN.
const QUIET_TARGETS: &str = "hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn,h2=warn";

/// Append-only file that rotates itself once it grows past `max_bytes`.
pub struct RotatingFile {
    file: File,
    path: PathBuf,
    current_size: u64,
    max_bytes: u64,
    generations: u32,
}

impl RotatingFile {
    pub fn open(path: impl Into<PathBuf>, max_bytes: u64, generations: u32) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = open_append(&path)?;
        let current_size = file.metadata().map(|m| m.len()).unwrap_or(0);
        Ok(Self {
            file,
            path,
            current_size,
            max_bytes,
            generations: generations.max(1),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;

        let oldest = rotation_path(&self.path, self.generations);
        if oldest.exists() {
            std::fs::remove_file(&oldest)?;
        }
        for i in (1..self.generations).rev() {
            let from = rotation_path(&self.path, i);
            if from.exists() {
                std::fs::rename(&from, rotation_path(&self.path, i + 1))?;
            }
        }
        std::fs::rename(&self.path, rotation_path(&self.path, 1))?;

        self.file = open_append(&self.path)?;
        self.current_size = 0;
        Ok(())
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.current_size > 0 && self.current_size + buf.len() as u64 > self.max_bytes {
            self.rotate()?;
        }
        let written = self.file.write(buf)?;
        self.current_size += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// `app.log` → `app.log.3`.
fn rotation_path(base: &Path, index: u32) -> PathBuf {
    let name = format!(
        "{}.{index}",
        base.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("app.log")
    );
    base.with_file_name(name)
}

#[derive(Debug, Clone)]
pub struct LogOptions {
    pub dir: PathBuf,
    pub level: String,
    pub json: bool,
}

/// Install the global subscriber.
pub fn init(options: &LogOptions) -> Result<()> {
    let app_file = RotatingFile::open(options.dir.join("app.log"), APP_LOG_MAX, APP_LOG_GENERATIONS)
        .with_context(|| format!("failed to open {}", options.dir.join("app.log").display()))?;
    let error_file = RotatingFile::open(
        options.dir.join("errors.log"),
        ERROR_LOG_MAX,
        ERROR_LOG_GENERATIONS,
    )
    .with_context(|| format!("failed to open {}", options.dir.join("errors.log").display()))?;

    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},{QUIET_TARGETS}", options.level)));

    let console = if options.json {
        fmt::layer()
            .json()
            .with_writer(io::stderr)
            .with_filter(console_filter)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(io::stderr)
            .with_filter(console_filter)
            .boxed()
    };

    let layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = vec![
        console,
        fmt::layer()
            .with_ansi(false)
            .with_writer(Mutex::new(app_file))
            .with_filter(EnvFilter::new(format!("debug,{QUIET_TARGETS}")))
            .boxed(),
        fmt::layer()
            .with_ansi(false)
            .with_writer(Mutex::new(error_file))
            .with_filter(LevelFilter::ERROR)
            .boxed(),
    ];

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .context("a global tracing subscriber is already installed")?;
    Ok(())
}
