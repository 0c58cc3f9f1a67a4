use std::{
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use anyhow::Context;
use chrono::{Local, NaiveDate};
use tracing_subscriber::{fmt, fmt::MakeWriter, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Settings;

pub fn init(settings: &Settings) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_filter))
        .context("invalid log filter")?;

    let file_layer = match &settings.log_dir {
        Some(dir) => Some(
            fmt::layer()
                .with_ansi(false)
                .with_writer(DailyLogWriter::new(dir)?),
        ),
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;
    Ok(())
}

/// Appends log lines to `log_YYYY-MM-DD.txt`, switching files at local midnight.
///
/// The open file is shared by every event of the same day. If it cannot be
/// opened, lines are dropped and the failure is reported once on stderr.
pub struct DailyLogWriter {
    dir: PathBuf,
    current: Mutex<Option<(NaiveDate, Arc<File>)>>,
    open_failed: AtomicBool,
}

impl DailyLogWriter {
    pub fn new(dir: &Path) -> anyhow::Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create log directory '{}'", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            current: Mutex::new(None),
            open_failed: AtomicBool::new(false),
        })
    }

    pub fn file_name(date: NaiveDate) -> String {
        format!("log_{}.txt", date.format("%Y-%m-%d"))
    }

    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(Self::file_name(date))
    }

    pub fn current_path(&self) -> PathBuf {
        self.path_for(Local::now().date_naive())
    }

    fn file_for(&self, date: NaiveDate) -> io::Result<Arc<File>> {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((day, file)) = current.as_ref() {
            if *day == date {
                return Ok(file.clone());
            }
        }
        let file = Arc::new(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.path_for(date))?,
        );
        *current = Some((date, file.clone()));
        Ok(file)
    }

    fn writer_for(&self, date: NaiveDate) -> DailyLogFile {
        match self.file_for(date) {
            Ok(file) => {
                self.open_failed.store(false, Ordering::Relaxed);
                DailyLogFile::Open(file)
            }
            Err(err) => {
                if !self.open_failed.swap(true, Ordering::Relaxed) {
                    eprintln!(
                        "failed to open log file '{}': {err}; file logging paused",
                        self.path_for(date).display()
                    );
                }
                DailyLogFile::Dropped
            }
        }
    }
}

impl<'a> MakeWriter<'a> for DailyLogWriter {
    type Writer = DailyLogFile;

    fn make_writer(&'a self) -> Self::Writer {
        self.writer_for(Local::now().date_naive())
    }
}

pub enum DailyLogFile {
    Open(Arc<File>),
    Dropped,
}

impl Write for DailyLogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Open(file) => (&**file).write(buf),
            Self::Dropped => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Open(file) => (&**file).flush(),
            Self::Dropped => Ok(()),
        }
    }
}
