//! Ark capture-time extraction
//!
//! Determines when a photo or raw image was actually taken by reading the metadata embedded
//! in the file, so that the archive can file it under the right day even when filesystem
//! timestamps are long gone.
//!
//! ## Outcomes
//!
//! Every extraction ends in one of three ways:
//!
//! - [`Extraction::Found`]: a `DateTimeOriginal` value was read and parsed
//! - [`Extraction::Absent`]: a *soft* miss (unknown extension, no Exif block, tag missing);
//!   callers fall back to another timestamp
//! - `Err(`[`ExtractError`]`)`: a *hard* failure, the file claims to be a known format but its
//!   bytes are malformed
//!
//! Keeping soft and hard outcomes apart lets callers fall back without masking corruption.
//!
//! ## Formats
//!
//! | extensions | handler |
//! |---|---|
//! | `jpg`, `jpeg`, `heic`, `heif` | [`FormatHandler::ExifContainer`] (`kamadak-exif`) |
//! | `tif`, `tiff`, `cr2`, `orf` | [`FormatHandler::Tiff`] (built-in TIFF header parser) |
//! | anything else | [`FormatHandler::Absent`] |

mod constants;
mod container;
mod registry;
mod tiff;

pub use registry::{FormatHandler, MetadataExtractor};
pub use tiff::{read_capture_time as read_tiff_capture_time, ByteOrder};

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};

/// Errors that make a file's metadata unusable.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// The TIFF byte-order marker is neither `II` nor `MM`
    #[error("unknown endianness: 0x{0:04X}")]
    UnknownEndianness(u16),

    /// The TIFF magic number matches none of the supported variants
    #[error("unknown magic number: 0x{0:04X}")]
    UnknownMagicNumber(u16),

    /// A tag value is larger than anything a timestamp could need
    #[error("tag 0x{tag:04X} value of {len} bytes exceeds the {max} byte limit")]
    ValueTooLarge { tag: u16, len: u64, max: u64 },

    /// A text tag does not hold valid UTF-8
    #[error("tag 0x{0:04X} does not contain valid text")]
    InvalidText(u16),

    /// The date string does not follow `YYYY:MM:DD HH:MM:SS`
    #[error("invalid date/time '{value}': {source}")]
    InvalidDateTime {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    /// Structured container parsing failed
    #[error("exif error: {0}")]
    Exif(::exif::Error),

    /// I/O error, including unexpected end of file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ExtractResult<T> = std::result::Result<T, ExtractError>;

/// Why no capture time was produced. None of these are errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Absence {
    /// No handler is registered for the file's extension
    UnsupportedFormat,
    /// The file has no Exif block (or no Exif IFD pointer)
    NoExifData,
    /// The Exif block has no `DateTimeOriginal`
    NotFound,
}

impl std::fmt::Display for Absence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Absence::UnsupportedFormat => write!(f, "unsupported format"),
            Absence::NoExifData => write!(f, "no exif data"),
            Absence::NotFound => write!(f, "dateTimeOriginal not found"),
        }
    }
}

/// Capture time as recorded by the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureTime {
    /// Wall-clock time on the camera when the shot was taken.
    pub taken: NaiveDateTime,
    /// Advisory UTC offset, when the camera recorded one.
    pub offset: Option<FixedOffset>,
}

impl CaptureTime {
    pub fn new(taken: NaiveDateTime) -> Self {
        Self {
            taken,
            offset: None,
        }
    }

    /// The camera's wall-clock time tagged as UTC.
    ///
    /// The archive files media by the day the photographer saw on the camera, so the local
    /// time is kept as-is rather than shifted by [`CaptureTime::offset`].
    pub fn as_utc(&self) -> DateTime<Utc> {
        self.taken.and_utc()
    }
}

/// Result of a successful extraction attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extraction {
    Found(CaptureTime),
    Absent(Absence),
}

impl Extraction {
    pub fn capture_time(self) -> Option<CaptureTime> {
        match self {
            Extraction::Found(time) => Some(time),
            Extraction::Absent(_) => None,
        }
    }
}

/// Parses an Exif date/time payload (`YYYY:MM:DD HH:MM:SS`), tolerating one trailing NUL.
pub(crate) fn parse_exif_date_time(tag: u16, raw: &[u8]) -> ExtractResult<NaiveDateTime> {
    let raw = raw.strip_suffix(&[0]).unwrap_or(raw);
    let value = std::str::from_utf8(raw).map_err(|_| ExtractError::InvalidText(tag))?;
    NaiveDateTime::parse_from_str(value, constants::EXIF_DATE_TIME_FORMAT).map_err(|source| {
        ExtractError::InvalidDateTime {
            value: value.to_owned(),
            source,
        }
    })
}

/// Parses an Exif `OffsetTime*` value such as `+02:00` or `-05:30`.
pub(crate) fn parse_exif_offset(raw: &[u8]) -> Option<FixedOffset> {
    let raw = raw.strip_suffix(&[0]).unwrap_or(raw);
    let value = std::str::from_utf8(raw).ok()?;
    let (sign, rest) = match value.as_bytes().first()? {
        b'+' => (1, &value[1..]),
        b'-' => (-1, &value[1..]),
        _ => return None,
    };
    let (hours, minutes) = rest.split_once(':')?;
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if !(0..60).contains(&minutes) {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}
