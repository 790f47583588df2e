//! Exif extraction from structured containers (JPEG, HEIF) via `kamadak-exif`.

use crate::constants::DATE_TIME_ORIGINAL;
use crate::{parse_exif_date_time, Absence, CaptureTime, ExtractError, ExtractResult, Extraction};
use exif::{In, Tag, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

pub(crate) fn read_capture_time(path: &Path) -> ExtractResult<Extraction> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let exif = match exif::Reader::new().read_from_container(&mut reader) {
        Ok(exif) => exif,
        Err(exif::Error::NotFound(_) | exif::Error::NotSupported(_) | exif::Error::BlankValue(_)) => {
            return Ok(Extraction::Absent(Absence::NoExifData));
        }
        Err(exif::Error::Io(e)) => return Err(ExtractError::Io(e)),
        Err(e) => return Err(ExtractError::Exif(e)),
    };

    let Some(field) = exif.get_field(Tag::DateTimeOriginal, In::PRIMARY) else {
        return Ok(Extraction::Absent(Absence::NotFound));
    };

    match &field.value {
        Value::Ascii(values) => match values.first() {
            Some(raw) => {
                let taken = parse_exif_date_time(DATE_TIME_ORIGINAL, raw)?;
                Ok(Extraction::Found(CaptureTime::new(taken)))
            }
            None => Ok(Extraction::Absent(Absence::NotFound)),
        },
        _ => Ok(Extraction::Absent(Absence::NotFound)),
    }
}
