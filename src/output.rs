//! Output sinks: stdout/stderr, or `.hash`/`.csv`/`.log` files under a
//! caller-chosen prefix.

use std::fs::{DirBuilder, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::Local;

use crate::error::{Result, WalkError};
use crate::files::csv::CsvRecord;
use crate::types::{Interval, Nsec3Params};

pub const SUFFIX_HASH: &str = ".hash";
pub const SUFFIX_CSV: &str = ".csv";
pub const SUFFIX_LOG: &str = ".log";

const PERM_FILE: u32 = 0o644;
const PERM_DIR: u32 = 0o755;

// Buffer sizes in kbytes; zero flushes on every record.
const BUFF_SIZE_HASH: usize = 0;
const BUFF_SIZE_CSV: usize = 0;
const BUFF_SIZE_LOG: usize = 0;

struct FileSink {
    name: String,
    writer: BufWriter<File>,
    buff_kb: usize,
}

impl FileSink {
    fn open(path: String, buff_kb: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .mode(PERM_FILE)
            .open(&path)
            .map_err(|err| WalkError::io(err.to_string(), Some(path.clone())))?;

        let capacity = if buff_kb > 0 { buff_kb * 1024 } else { 1024 };

        Ok(Self {
            name: path,
            writer: BufWriter::with_capacity(capacity, file),
            buff_kb,
        })
    }

    fn write(&mut self, data: &str) -> Result<()> {
        let result = self.writer.write_all(data.as_bytes()).and_then(|()| {
            if self.buff_kb == 0 {
                self.writer.flush()
            } else {
                Ok(())
            }
        });

        result.map_err(|err| {
            WalkError::io(
                format!("error writing to {}: {err}", self.name),
                Some(self.name.clone()),
            )
        })
    }

    fn flush(&mut self) {
        let _ = self.writer.flush();
    }
}

struct OutputFiles {
    hash: Mutex<FileSink>,
    csv: Mutex<FileSink>,
    log: Mutex<FileSink>,
}

/// Sink for everything a walk produces: hash lines, CSV records, and
/// operator-facing log lines. Without a file prefix, hash lines go to
/// stdout and log lines to stderr; CSV records are only kept when
/// writing to files.
pub struct Output {
    files: Option<OutputFiles>,
    verbose: bool,
}

impl Output {
    pub fn new(verbose: bool) -> Self {
        Self {
            files: None,
            verbose,
        }
    }

    /// Open `<prefix>.hash`, `<prefix>.csv`, and `<prefix>.log` for
    /// appending.
    pub fn with_prefix(prefix: &str, verbose: bool) -> Result<Self> {
        let files = OutputFiles {
            hash: Mutex::new(FileSink::open(
                format!("{prefix}{SUFFIX_HASH}"),
                BUFF_SIZE_HASH,
            )?),
            csv: Mutex::new(FileSink::open(format!("{prefix}{SUFFIX_CSV}"), BUFF_SIZE_CSV)?),
            log: Mutex::new(FileSink::open(format!("{prefix}{SUFFIX_LOG}"), BUFF_SIZE_LOG)?),
        };

        Ok(Self {
            files: Some(files),
            verbose,
        })
    }

    pub fn is_file_output(&self) -> bool {
        self.files.is_some()
    }

    /// Emit one `hash:.apex:salt:iterations` line.
    pub fn hash(&self, hash: &str, params: &Nsec3Params) {
        let line = format!(
            "{}:.{}:{}:{}\n",
            hash,
            params.apex(),
            params.salt_hex(),
            params.iterations()
        );

        match &self.files {
            None => print!("{line}"),
            Some(files) => {
                if let Err(err) = files.hash.lock().unwrap().write(&line) {
                    self.fatal(&err);
                }
            }
        }
    }

    /// Emit one seven-field CSV record for a fully known interval.
    pub fn csv(&self, interval: &Interval, params: &Nsec3Params) {
        let Some(files) = &self.files else {
            return;
        };

        let record = CsvRecord::from_interval(interval, params);
        let line = format!("{}\n", record.to_line());
        if let Err(err) = files.csv.lock().unwrap().write(&line) {
            self.fatal(&err);
        }
    }

    /// Log an operator-facing line, duplicated into the `.log` file when
    /// file output is active.
    pub fn log(&self, message: &str) {
        tracing::info!("{message}");

        if let Some(files) = &self.files {
            let line = format!(
                "{} {}\n",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                message
            );
            if let Err(err) = files.log.lock().unwrap().write(&line) {
                self.fatal(&err);
            }
        }
    }

    pub fn log_verbose(&self, message: &str) {
        if self.verbose {
            self.log(message);
        }
    }

    pub fn flush(&self) {
        if let Some(files) = &self.files {
            files.hash.lock().unwrap().flush();
            files.csv.lock().unwrap().flush();
            files.log.lock().unwrap().flush();
        }
    }

    /// Flush everything and terminate the process.
    pub fn fatal(&self, err: &WalkError) -> ! {
        tracing::error!("{err}");
        self.flush();
        std::process::exit(1);
    }
}

impl Default for Output {
    fn default() -> Self {
        Self::new(false)
    }
}

/// Resolve the user-supplied output path into a file prefix. An existing
/// directory gets a `<apex>-<timestamp>` prefix inside it; otherwise the
/// path itself is the prefix and missing parent directories are created.
pub fn output_file_prefix(path: &str, domain: &str) -> Result<String> {
    let path_buf = PathBuf::from(path);

    if path_buf.is_dir() {
        let prefix = format!("{}-{}", domain, Local::now().format("%Y_%m_%d-%H_%M"));
        return Ok(path_buf.join(prefix).to_string_lossy().into_owned());
    }

    if let Some(parent) = path_buf.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            DirBuilder::new()
                .recursive(true)
                .mode(PERM_DIR)
                .create(parent)
                .map_err(|err| {
                    WalkError::io(err.to_string(), Some(parent.to_string_lossy().into_owned()))
                })?;
        }
    }

    Ok(path.to_string())
}
