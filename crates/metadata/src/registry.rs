//! Extension → format handler registry.

use crate::{container, tiff, Absence, ExtractResult, Extraction};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// How capture time is read for one family of file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatHandler {
    /// JPEG/HEIF containers, read through `kamadak-exif`.
    ExifContainer,
    /// TIFF-structured raw formats, read by the built-in header parser.
    Tiff,
    /// No metadata support; always reports [`Absence::UnsupportedFormat`].
    Absent,
}

impl FormatHandler {
    pub fn extract(self, path: &Path) -> ExtractResult<Extraction> {
        match self {
            FormatHandler::ExifContainer => container::read_capture_time(path),
            FormatHandler::Tiff => {
                let mut reader = BufReader::new(File::open(path)?);
                tiff::read_capture_time(&mut reader)
            }
            FormatHandler::Absent => Ok(Extraction::Absent(Absence::UnsupportedFormat)),
        }
    }
}

/// Picks a [`FormatHandler`] from a file's extension and runs it.
///
/// Lookups are case-insensitive. Extensions without a registered handler resolve to
/// [`FormatHandler::Absent`].
#[derive(Debug, Clone)]
pub struct MetadataExtractor {
    handlers: HashMap<String, FormatHandler>,
}

impl Default for MetadataExtractor {
    fn default() -> Self {
        let mut extractor = Self::empty();
        for ext in ["jpg", "jpeg", "heic", "heif"] {
            extractor.register(ext, FormatHandler::ExifContainer);
        }
        for ext in ["tif", "tiff", "cr2", "orf"] {
            extractor.register(ext, FormatHandler::Tiff);
        }
        extractor
    }
}

impl MetadataExtractor {
    /// An extractor with the built-in format table.
    pub fn new() -> Self {
        Self::default()
    }

    /// An extractor that knows no formats.
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registers `handler` for `extension` (leading dot optional), replacing any previous one.
    pub fn register(&mut self, extension: &str, handler: FormatHandler) {
        self.handlers
            .insert(normalise_extension(extension), handler);
    }

    pub fn handler_for(&self, path: &Path) -> FormatHandler {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| self.handlers.get(&normalise_extension(ext)))
            .copied()
            .unwrap_or(FormatHandler::Absent)
    }

    /// Reads the capture time of the file at `path`.
    pub fn extract(&self, path: &Path) -> ExtractResult<Extraction> {
        let handler = self.handler_for(path);
        let extraction = handler.extract(path)?;
        tracing::debug!(path = %path.display(), ?handler, ?extraction, "metadata extracted");
        Ok(extraction)
    }
}

fn normalise_extension(extension: &str) -> String {
    extension.trim_start_matches('.').to_ascii_lowercase()
}
