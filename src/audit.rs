//! Audit trail of exchanged application messages.
//!
//! The relay engine calls [`MessageRecorder::record`] once per inbound
//! message. Recording never fails from the caller's point of view and never
//! influences routing.

use crate::error::ProxyError;
use chrono::Local;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Marker used when the sender has no partner yet.
pub const NO_RECIPIENT: &str = "<none>";

const SEPARATOR: &str = "---------------------------------";

pub trait MessageRecorder: Send + Sync {
    fn record(&self, event: &str);
}

pub fn format_event(sender: &str, recipient: Option<&str>, message: &str) -> String {
    format!("{} sent to {}:\n{}", sender, recipient.unwrap_or(NO_RECIPIENT), message)
}

/// Appends timestamped events to a file, one block per event.
pub struct FileAuditLog {
    path: PathBuf,
    writer: Mutex<BufWriter<std::fs::File>>,
}

impl FileAuditLog {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ProxyError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| ProxyError::Config(format!("Failed to open audit log {}: {}", path.display(), e)))?;

        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MessageRecorder for FileAuditLog {
    fn record(&self, event: &str) {
        let timestamp = Local::now().format("%H:%M:%S %A, %d %B %Y");
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writeln!(writer, "{}", timestamp);
            let _ = writeln!(writer, "{}", event);
            let _ = writeln!(writer, "{}", SEPARATOR);
            let _ = writer.flush();
        }
    }
}

/// Sends events to the diagnostic logger at trace level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogRecorder;

impl MessageRecorder for LogRecorder {
    fn record(&self, event: &str) {
        log::trace!(target: "audit", "{}", event);
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullRecorder;

impl MessageRecorder for NullRecorder {
    fn record(&self, _event: &str) {}
}
