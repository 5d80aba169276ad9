//! Rotating pcap capture stream
//!
//! Every dispatched frame is appended to the current capture file as a
//! classic pcap record (link type 105, raw 802.11). Once a file grows past
//! the configured size it is closed and a fresh one is started.

use chrono::{DateTime, Datelike, Local, TimeZone};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::store::{Storage, HANDSHAKE_DIR};
use crate::{CaptureError, Result};

pub const PCAP_MAGIC: u32 = 0xa1b2_c3d4;
pub const PCAP_VERSION_MAJOR: u16 = 2;
pub const PCAP_VERSION_MINOR: u16 = 4;
pub const PCAP_SNAPLEN: u32 = 0xffff;
/// LINKTYPE_IEEE802_11
pub const LINKTYPE_IEEE802_11: u32 = 105;

pub const GLOBAL_HEADER_LEN: usize = 24;
pub const RECORD_HEADER_LEN: usize = 16;

/// Wall-clock readings before this year mean the clock was never set
const CLOCK_VALID_YEAR: i32 = 2020;

/// The 24-byte pcap global header, little-endian
pub fn global_header() -> [u8; GLOBAL_HEADER_LEN] {
    let mut header = [0u8; GLOBAL_HEADER_LEN];
    header[0..4].copy_from_slice(&PCAP_MAGIC.to_le_bytes());
    header[4..6].copy_from_slice(&PCAP_VERSION_MAJOR.to_le_bytes());
    header[6..8].copy_from_slice(&PCAP_VERSION_MINOR.to_le_bytes());
    // thiszone and sigfigs stay zero
    header[16..20].copy_from_slice(&PCAP_SNAPLEN.to_le_bytes());
    header[20..24].copy_from_slice(&LINKTYPE_IEEE802_11.to_le_bytes());
    header
}

/// Per-record header: seconds, microseconds, captured and original length
pub fn record_header(timestamp: Duration, len: u32) -> [u8; RECORD_HEADER_LEN] {
    let mut header = [0u8; RECORD_HEADER_LEN];
    header[0..4].copy_from_slice(&(timestamp.as_secs() as u32).to_le_bytes());
    header[4..8].copy_from_slice(&timestamp.subsec_micros().to_le_bytes());
    header[8..12].copy_from_slice(&len.to_le_bytes());
    header[12..16].copy_from_slice(&len.to_le_bytes());
    header
}

/// File stem for a new capture: `YYYYMMDD_HHMMSS`, or the uptime in
/// seconds padded to ten digits when the clock is unset.
pub fn capture_file_stem<Tz: TimeZone>(now: &DateTime<Tz>, uptime: Duration) -> String
where
    Tz::Offset: std::fmt::Display,
{
    if now.year() >= CLOCK_VALID_YEAR {
        now.format("%Y%m%d_%H%M%S").to_string()
    } else {
        format!("{:010}", uptime.as_secs())
    }
}

/// Current capture file and its byte count
pub struct CaptureSession {
    storage: Arc<dyn Storage>,
    writer: Option<Box<dyn Write + Send>>,
    path: Option<PathBuf>,
    bytes_written: u64,
    max_size: u64,
    files_opened: u64,
    /// Set while no file could be opened, so the outage is warned about once
    open_failed: bool,
    started: Instant,
}

impl CaptureSession {
    /// Create a session with no open file. Call `rotate` to start one.
    pub fn new(storage: Arc<dyn Storage>, max_size: u64) -> Self {
        Self {
            storage,
            writer: None,
            path: None,
            bytes_written: 0,
            max_size,
            files_opened: 0,
            open_failed: false,
            started: Instant::now(),
        }
    }

    /// Close the current file and open a new one named after the clock
    pub fn rotate(&mut self) -> Result<&Path> {
        let stem = capture_file_stem(&Local::now(), self.started.elapsed());
        self.rotate_to(&stem)
    }

    /// Close the current file and open `handshakes/<stem>.pcap`, adding a
    /// numeric suffix if that name is taken
    pub fn rotate_to(&mut self, stem: &str) -> Result<&Path> {
        self.close()?;

        let path = self.unused_path(stem);
        let mut writer = self.storage.open_stream(&path)?;
        writer
            .write_all(&global_header())
            .map_err(|source| CaptureError::Storage {
                path: self.storage.resolve(&path),
                source,
            })?;

        self.bytes_written = GLOBAL_HEADER_LEN as u64;
        self.files_opened += 1;
        self.writer = Some(writer);
        info!("New capture file: {}", self.storage.resolve(&path).display());

        let current: &Path = self.path.insert(path);
        Ok(current)
    }

    fn unused_path(&self, stem: &str) -> PathBuf {
        let dir = Path::new(HANDSHAKE_DIR);
        let mut path = dir.join(format!("{stem}.pcap"));
        let mut suffix = 1;
        while self.storage.exists(&path) {
            path = dir.join(format!("{stem}_{suffix}.pcap"));
            suffix += 1;
        }
        path
    }

    /// Append one record. Returns `true` if the append pushed the file past
    /// the size limit and a new file was started.
    ///
    /// With no file open, a new one is opened first. If that fails the
    /// record is refused with `NoCaptureFile`.
    pub fn append(&mut self, data: &[u8], timestamp: Duration) -> Result<bool> {
        let len = u32::try_from(data.len())
            .map_err(|_| CaptureError::Config(format!("frame of {} bytes", data.len())))?;
        if self.writer.is_none() {
            self.reopen()?;
        }
        let path = self.path.as_deref().ok_or(CaptureError::NoCaptureFile)?;
        let writer = self.writer.as_mut().ok_or(CaptureError::NoCaptureFile)?;

        let header = record_header(timestamp, len);
        writer
            .write_all(&header)
            .and_then(|_| writer.write_all(data))
            .map_err(|source| CaptureError::Storage {
                path: self.storage.resolve(path),
                source,
            })?;
        self.bytes_written += (RECORD_HEADER_LEN + data.len()) as u64;

        if self.bytes_written > self.max_size {
            debug!(
                "Capture file reached {} bytes (limit {}), rotating",
                self.bytes_written, self.max_size
            );
            // the record is already on disk; a failed rotation only
            // defers the new file to the next append
            if let Err(e) = self.rotate() {
                warn!("Capture rotation failed, retrying on the next frame: {}", e);
                self.open_failed = true;
                return Ok(false);
            }
            return Ok(true);
        }
        Ok(false)
    }

    fn reopen(&mut self) -> Result<()> {
        match self.rotate() {
            Ok(path) => {
                let path = path.to_path_buf();
                if self.open_failed {
                    info!("Capture resumed in {}", path.display());
                }
                self.open_failed = false;
                Ok(())
            }
            Err(e) => {
                if self.open_failed {
                    debug!("Capture file still unavailable: {}", e);
                } else {
                    warn!("Cannot open a capture file, frames are not recorded: {}", e);
                    self.open_failed = true;
                }
                Err(CaptureError::NoCaptureFile)
            }
        }
    }

    pub fn flush(&mut self) -> Result<()> {
        if let (Some(writer), Some(path)) = (self.writer.as_mut(), self.path.as_deref()) {
            writer.flush().map_err(|source| CaptureError::Storage {
                path: self.storage.resolve(path),
                source,
            })?;
        }
        Ok(())
    }

    /// Flush and drop the current file. The path is kept for display.
    pub fn close(&mut self) -> Result<()> {
        let flushed = self.flush();
        if self.writer.take().is_some() {
            if let Err(e) = &flushed {
                warn!("Closing capture file after flush failure: {}", e);
            }
        }
        flushed
    }

    /// Path of the file being written, as the storage resolves it
    pub fn current_path(&self) -> Option<PathBuf> {
        self.path.as_deref().map(|p| self.storage.resolve(p))
    }

    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    /// Bytes in the current file, global header included
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    /// Files opened since the session started
    pub fn files_opened(&self) -> u64 {
        self.files_opened
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!("Failed to flush capture file on shutdown: {}", e);
        }
    }
}
