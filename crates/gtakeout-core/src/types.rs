use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::SystemTime;

/// Photo formats the organizer picks up
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Heic,
    Webp,
    Tiff,
    Gif,
    Other(String),
}

impl ImageFormat {
    /// Determine format from file extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" => Self::Jpeg,
            "png" => Self::Png,
            "heic" => Self::Heic,
            "webp" => Self::Webp,
            "tif" | "tiff" => Self::Tiff,
            "gif" => Self::Gif,
            other => Self::Other(other.to_string()),
        }
    }

    /// Check if format is supported
    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

/// Representation of a photo found in the source tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotoFile {
    /// Full path to the photo
    pub path: PathBuf,

    /// File size in bytes
    pub size: u64,

    /// Last modified timestamp
    pub last_modified: SystemTime,

    /// Image format
    pub format: ImageFormat,
}

/// A Takeout ZIP found in the download directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveFile {
    /// Full path to the archive
    pub path: PathBuf,

    /// Sum of the uncompressed entry sizes (0 if the archive is unreadable)
    pub uncompressed_size: u64,
}

/// Where a capture date came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateSource {
    Exif,
    Sidecar,
    ModifiedTime,
}

/// Capture date of a photo, in local time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureDate {
    pub when: NaiveDateTime,
    pub source: DateSource,
}

/// Pipeline stage an event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Download,
    Extract,
    Organize,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Download => "download",
            Phase::Extract => "extract",
            Phase::Organize => "organize",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened within a phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Start,
    FileProgress,
    FileComplete,
    FileSkipped,
    FileError,
    End,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Start => "start",
            EventKind::FileProgress => "file_progress",
            EventKind::FileComplete => "file_complete",
            EventKind::FileSkipped => "file_skipped",
            EventKind::FileError => "file_error",
            EventKind::End => "end",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A progress notification emitted by one of the pipeline stages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub phase: Phase,
    pub kind: EventKind,
    pub filename: Option<String>,
    pub archive: Option<String>,
    pub key: Option<String>,
    pub bytes_done: Option<u64>,
    pub bytes_total: Option<u64>,
    pub completed_files: Option<usize>,
    pub total_files: Option<usize>,
    pub error: Option<String>,
}

impl ProgressEvent {
    pub fn new(phase: Phase, kind: EventKind) -> Self {
        Self {
            phase,
            kind,
            filename: None,
            archive: None,
            key: None,
            bytes_done: None,
            bytes_total: None,
            completed_files: None,
            total_files: None,
            error: None,
        }
    }

    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn archive(mut self, archive: impl Into<String>) -> Self {
        self.archive = Some(archive.into());
        self
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn bytes(mut self, done: u64, total: Option<u64>) -> Self {
        self.bytes_done = Some(done);
        self.bytes_total = total;
        self
    }

    pub fn files(mut self, completed: Option<usize>, total: usize) -> Self {
        self.completed_files = completed;
        self.total_files = Some(total);
        self
    }

    pub fn error(mut self, error: impl fmt::Display) -> Self {
        self.error = Some(error.to_string());
        self
    }
}
