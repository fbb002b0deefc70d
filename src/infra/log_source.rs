use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;

/// The log as currently on disk. Only `lines[..complete]` ended with a newline; a trailing
/// partial line may still be being written.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LogLines {
    pub lines: Vec<String>,
    pub complete: usize,
}

impl LogLines {
    pub fn complete_lines(&self) -> &[String] {
        &self.lines[..self.complete]
    }
}

#[derive(Debug, Error)]
pub enum LogSourceError {
    #[error("cannot open log {path}: {source}")]
    Open { path: PathBuf, source: io::Error },

    #[error("failed to read log {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
}

pub trait LineSource: Send {
    /// True when the modification time moved past the last consumed one. The first call
    /// always reports growth. Growth stays pending until `mark_consumed`.
    fn has_grown(&mut self) -> Result<bool, LogSourceError>;

    /// Re-reads the whole file.
    fn current_lines(&self) -> Result<LogLines, LogSourceError>;

    /// Records the pending growth as read. Call only after `current_lines` succeeded.
    fn mark_consumed(&mut self);
}

#[derive(Debug)]
pub struct LogFile {
    path: PathBuf,
    last_modified: Option<SystemTime>,
    pending: Option<SystemTime>,
}

impl LogFile {
    /// Fails when the file cannot be opened.
    pub fn open(path: &Path) -> Result<Self, LogSourceError> {
        File::open(path).map_err(|source| LogSourceError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            last_modified: None,
            pending: None,
        })
    }

    fn read_error(&self, source: io::Error) -> LogSourceError {
        LogSourceError::Read {
            path: self.path.clone(),
            source,
        }
    }
}

impl LineSource for LogFile {
    fn has_grown(&mut self) -> Result<bool, LogSourceError> {
        let modified = fs::metadata(&self.path)
            .and_then(|meta| meta.modified())
            .map_err(|error| self.read_error(error))?;
        let grown = self.last_modified.is_none_or(|last| modified > last);
        if grown {
            self.pending = Some(modified);
        }
        Ok(grown)
    }

    fn current_lines(&self) -> Result<LogLines, LogSourceError> {
        let bytes = fs::read(&self.path).map_err(|error| self.read_error(error))?;
        Ok(split_lines(&bytes))
    }

    fn mark_consumed(&mut self) {
        if let Some(modified) = self.pending.take() {
            self.last_modified = Some(modified);
        }
    }
}

/// Splits on `\n` or `\r\n`. Invalid UTF-8 is replaced rather than rejected.
pub fn split_lines(bytes: &[u8]) -> LogLines {
    let text = String::from_utf8_lossy(bytes);
    let mut lines: Vec<String> = text
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
        .collect();

    // `split` always yields a final segment: empty when the text ends with a newline,
    // otherwise the unterminated tail.
    let tail_is_partial = lines.last().is_some_and(|tail| !tail.is_empty());
    if !tail_is_partial {
        lines.pop();
    }
    let complete = if tail_is_partial {
        lines.len() - 1
    } else {
        lines.len()
    };
    LogLines { lines, complete }
}
