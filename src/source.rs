//! Frame sources.
//!
//! A frame source hands the scheduler one encoded image per capture. Two
//! implementations ship with the crate:
//! - `StubSource`: synthetic JPEG bytes, for tests and dry runs
//! - `DirectorySource`: cycles through image files in a directory, standing
//!   in for a live camera during development
//!
//! Sources MUST NOT:
//! - Retain frames beyond handoff to the scheduler
//! - Transmit frames anywhere themselves

use anyhow::{anyhow, Context, Result};
use image::GenericImageView;
use std::path::{Path, PathBuf};

/// Image container formats the classification service accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Webp,
}

impl ImageFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Webp => "image/webp",
        }
    }

    /// Identify the container from magic bytes. Never decodes.
    pub fn sniff(bytes: &[u8]) -> Option<ImageFormat> {
        if bytes.len() < 12 {
            return None;
        }
        if bytes[0] == 0xFF && bytes[1] == 0xD8 && bytes[2] == 0xFF {
            return Some(ImageFormat::Jpeg);
        }
        if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
            return Some(ImageFormat::Png);
        }
        if &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            return Some(ImageFormat::Webp);
        }
        None
    }

    fn from_extension(path: &Path) -> Option<ImageFormat> {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .as_deref()
        {
            Some("jpg") | Some("jpeg") => Some(ImageFormat::Jpeg),
            Some("png") => Some(ImageFormat::Png),
            Some("webp") => Some(ImageFormat::Webp),
            _ => None,
        }
    }
}

/// One captured frame, already encoded for upload.
#[derive(Clone, Debug)]
pub struct EncodedFrame {
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
    /// Pixel dimensions when the source knows them.
    pub dimensions: Option<(u32, u32)>,
}

/// Capture statistics, for health logging.
#[derive(Clone, Debug, Default)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub capture_failures: u64,
}

/// A live or simulated frame producer.
pub trait FrameSource: Send {
    /// Capture the current frame. Errors are non-fatal: the scheduler
    /// counts them as missed ticks and moves on.
    fn capture(&mut self) -> Result<EncodedFrame>;

    fn stats(&self) -> SourceStats;
}

// -------------------- stub --------------------

/// Minimal valid JPEG header so sniffing and upload framing behave like the
/// real thing. Not decodable; pair with a stub classifier.
const STUB_JPEG_PREFIX: [u8; 20] = [
    0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00, 0x01, 0x01, 0x00, 0x00,
    0x48, 0x00, 0x48, 0x00, 0x00,
];

/// Synthetic frame source for tests and dry runs.
pub struct StubSource {
    stats: SourceStats,
    payload_len: usize,
}

impl StubSource {
    pub fn new() -> Self {
        Self {
            stats: SourceStats::default(),
            payload_len: 4 * 1024,
        }
    }

    pub fn with_payload_len(mut self, len: usize) -> Self {
        self.payload_len = len;
        self
    }
}

impl Default for StubSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSource for StubSource {
    fn capture(&mut self) -> Result<EncodedFrame> {
        let mut bytes = STUB_JPEG_PREFIX.to_vec();
        bytes.resize(STUB_JPEG_PREFIX.len() + self.payload_len, 0);
        self.stats.frames_captured += 1;
        Ok(EncodedFrame {
            bytes,
            format: ImageFormat::Jpeg,
            dimensions: Some((640, 480)),
        })
    }

    fn stats(&self) -> SourceStats {
        self.stats.clone()
    }
}

// -------------------- directory --------------------

/// Cycles through the image files of a directory in lexical filename
/// order, wrapping around at the end.
pub struct DirectorySource {
    files: Vec<PathBuf>,
    next: usize,
    stats: SourceStats,
}

impl DirectorySource {
    pub fn open(dir: &Path) -> Result<Self> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
            .with_context(|| format!("read frame directory {}", dir.display()))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| ImageFormat::from_extension(path).is_some())
            .collect();
        files.sort();
        if files.is_empty() {
            return Err(anyhow!("no image files in {}", dir.display()));
        }
        Ok(Self {
            files,
            next: 0,
            stats: SourceStats::default(),
        })
    }
}

impl FrameSource for DirectorySource {
    fn capture(&mut self) -> Result<EncodedFrame> {
        let path = &self.files[self.next];
        self.next = (self.next + 1) % self.files.len();

        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.stats.capture_failures += 1;
                return Err(anyhow!("read frame {}: {}", path.display(), e));
            }
        };
        let Some(format) = ImageFormat::sniff(&bytes) else {
            self.stats.capture_failures += 1;
            return Err(anyhow!("{} is not a supported image", path.display()));
        };
        // Dimensions feed pre-validation; WebP is sniffed but not decoded
        // (the image build carries jpeg+png only).
        let dimensions = match format {
            ImageFormat::Webp => None,
            _ => image::load_from_memory(&bytes).ok().map(|i| i.dimensions()),
        };

        self.stats.frames_captured += 1;
        Ok(EncodedFrame {
            bytes,
            format,
            dimensions,
        })
    }

    fn stats(&self) -> SourceStats {
        self.stats.clone()
    }
}
