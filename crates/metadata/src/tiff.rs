//! TIFF header parser for raw image formats.
//!
//! Several vendor raw formats (Canon CR2, Olympus ORF, plain TIFF) share the TIFF header
//! layout: an 8-byte header followed by a chain of Image File Directories (IFDs). The capture
//! time lives in the Exif sub-IFD, which IFD0 points to through tag `0x8769`.
//!
//! ```text
//! offset 0   2   4        8
//!        +---+---+--------+
//!        |II |*\0| IFD0 → |    II/MM byte order, magic, offset of IFD0
//!        +---+---+--------+
//!
//! IFD:   count:u16, count × entry, next-IFD:u32
//! entry: tag:u16 type:u16 count:u32 value-or-offset:u32   (12 bytes)
//! ```
//!
//! Only the handful of entries we care about are ever materialised; a directory scan stops
//! as soon as it passes the largest wanted tag id, because entries are sorted by tag id.

use crate::constants::{
    DATE_TIME_ORIGINAL, ENTRY_LEN, EXIF_IFD_POINTER, HEADER_LEN, INTEL_BYTE_ORDER,
    KNOWN_MAGIC_NUMBERS, MAX_VALUE_LEN, MOTOROLA_BYTE_ORDER, OFFSET_TIME_ORIGINAL,
    TIME_ZONE_OFFSET,
};
use crate::{
    parse_exif_date_time, parse_exif_offset, Absence, CaptureTime, ExtractError, ExtractResult,
    Extraction,
};
use chrono::FixedOffset;
use std::collections::BTreeMap;
use std::io::{Read, Seek, SeekFrom};

/// Byte order selected by the TIFF header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}

impl ByteOrder {
    /// Reads the two-byte byte-order marker.
    ///
    /// Both valid markers are palindromes, so they decode to the same value under either
    /// byte order.
    pub fn from_marker(marker: [u8; 2]) -> ExtractResult<Self> {
        match u16::from_le_bytes(marker) {
            INTEL_BYTE_ORDER => Ok(ByteOrder::LittleEndian),
            MOTOROLA_BYTE_ORDER => Ok(ByteOrder::BigEndian),
            other => Err(ExtractError::UnknownEndianness(other)),
        }
    }

    pub fn u16(self, bytes: [u8; 2]) -> u16 {
        match self {
            ByteOrder::LittleEndian => u16::from_le_bytes(bytes),
            ByteOrder::BigEndian => u16::from_be_bytes(bytes),
        }
    }

    pub fn i16(self, bytes: [u8; 2]) -> i16 {
        match self {
            ByteOrder::LittleEndian => i16::from_le_bytes(bytes),
            ByteOrder::BigEndian => i16::from_be_bytes(bytes),
        }
    }

    pub fn u32(self, bytes: [u8; 4]) -> u32 {
        match self {
            ByteOrder::LittleEndian => u32::from_le_bytes(bytes),
            ByteOrder::BigEndian => u32::from_be_bytes(bytes),
        }
    }
}

/// Checks that the header's magic number is plain TIFF or a known vendor variant.
pub(crate) fn validate_magic_number(order: ByteOrder, bytes: [u8; 2]) -> ExtractResult<()> {
    let magic = order.u16(bytes);
    if KNOWN_MAGIC_NUMBERS.contains(&magic) {
        Ok(())
    } else {
        Err(ExtractError::UnknownMagicNumber(magic))
    }
}

/// A single IFD entry, kept exactly as it appears on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct IfdEntry {
    pub tag: u16,
    pub data_type: u16,
    pub count: u32,
    /// Inline value, or an offset to the value, depending on its size.
    pub value: [u8; 4],
}

impl IfdEntry {
    fn parse(order: ByteOrder, raw: &[u8; ENTRY_LEN]) -> Self {
        Self {
            tag: order.u16([raw[0], raw[1]]),
            data_type: order.u16([raw[2], raw[3]]),
            count: order.u32([raw[4], raw[5], raw[6], raw[7]]),
            value: [raw[8], raw[9], raw[10], raw[11]],
        }
    }

    /// Size in bytes of one element of this entry's data type.
    ///
    /// Unknown types are treated as byte arrays so that `count` is the payload length.
    fn element_size(&self) -> u64 {
        match self.data_type {
            // BYTE, ASCII, SBYTE, UNDEFINED
            1 | 2 | 6 | 7 => 1,
            // SHORT, SSHORT
            3 | 8 => 2,
            // LONG, SLONG, FLOAT, IFD
            4 | 9 | 11 | 13 => 4,
            // RATIONAL, SRATIONAL, DOUBLE
            5 | 10 | 12 => 8,
            _ => 1,
        }
    }

    fn byte_len(&self) -> u64 {
        self.element_size() * u64::from(self.count)
    }

    fn offset(&self, order: ByteOrder) -> u32 {
        order.u32(self.value)
    }

    /// Reads this entry's payload, inline when it fits in the value field and through a
    /// separate seek otherwise.
    fn read_bytes<R: Read + Seek>(&self, order: ByteOrder, r: &mut R) -> ExtractResult<Vec<u8>> {
        let len = self.byte_len();
        if len <= self.value.len() as u64 {
            return Ok(self.value[..len as usize].to_vec());
        }
        if len > MAX_VALUE_LEN {
            return Err(ExtractError::ValueTooLarge {
                tag: self.tag,
                len,
                max: MAX_VALUE_LEN,
            });
        }

        r.seek(SeekFrom::Start(u64::from(self.offset(order))))?;
        let mut buffer = vec![0u8; len as usize];
        r.read_exact(&mut buffer)?;
        Ok(buffer)
    }
}

/// Set of tag ids a directory scan is looking for.
struct WantedTags<'a> {
    ids: &'a [u16],
    max: u16,
}

impl<'a> WantedTags<'a> {
    fn new(ids: &'a [u16]) -> Self {
        let max = ids.iter().copied().max().unwrap_or(0);
        Self { ids, max }
    }

    fn contains(&self, id: u16) -> bool {
        self.ids.contains(&id)
    }
}

/// Collects the wanted entries of the IFD starting at `offset`.
///
/// Tags are stored in ascending order, so the scan stops at the first entry whose id reaches
/// the largest wanted id. A directory may hold tens of thousands of entries; this keeps the
/// cost proportional to how far the wanted tags sit rather than to the directory size.
fn scan_directory<R: Read + Seek>(
    order: ByteOrder,
    r: &mut R,
    offset: u32,
    wanted: &WantedTags<'_>,
) -> ExtractResult<BTreeMap<u16, IfdEntry>> {
    let mut entries = BTreeMap::new();

    r.seek(SeekFrom::Start(u64::from(offset)))?;
    let mut count = [0u8; 2];
    r.read_exact(&mut count)?;
    let count = order.u16(count);

    let mut raw = [0u8; ENTRY_LEN];
    for _ in 0..count {
        r.read_exact(&mut raw)?;
        let entry = IfdEntry::parse(order, &raw);

        if wanted.contains(entry.tag) {
            entries.insert(entry.tag, entry);
        }

        if entry.tag >= wanted.max {
            break;
        }
    }

    Ok(entries)
}

/// Reads the capture time from a TIFF-structured stream.
///
/// # Errors
///
/// Malformed headers, truncated directories and unparseable dates are hard errors. A file
/// without an Exif IFD pointer, or without `DateTimeOriginal`, yields
/// [`Extraction::Absent`].
pub fn read_capture_time<R: Read + Seek>(r: &mut R) -> ExtractResult<Extraction> {
    let mut header = [0u8; HEADER_LEN];
    r.seek(SeekFrom::Start(0))?;
    r.read_exact(&mut header)?;

    let order = ByteOrder::from_marker([header[0], header[1]])?;
    validate_magic_number(order, [header[2], header[3]])?;
    let ifd0_offset = order.u32([header[4], header[5], header[6], header[7]]);

    let ifd0 = scan_directory(order, r, ifd0_offset, &WantedTags::new(&[EXIF_IFD_POINTER]))?;
    let Some(exif_pointer) = ifd0.get(&EXIF_IFD_POINTER) else {
        return Ok(Extraction::Absent(Absence::NoExifData));
    };

    let exif = scan_directory(
        order,
        r,
        exif_pointer.offset(order),
        &WantedTags::new(&[TIME_ZONE_OFFSET, DATE_TIME_ORIGINAL, OFFSET_TIME_ORIGINAL]),
    )?;
    let Some(date_time_original) = exif.get(&DATE_TIME_ORIGINAL) else {
        return Ok(Extraction::Absent(Absence::NotFound));
    };

    let raw = date_time_original.read_bytes(order, r)?;
    let taken = parse_exif_date_time(DATE_TIME_ORIGINAL, &raw)?;

    Ok(Extraction::Found(CaptureTime {
        taken,
        offset: read_offset(order, r, &exif),
    }))
}

/// Resolves the advisory timezone, preferring `OffsetTimeOriginal` over `TimeZoneOffset`.
///
/// Unreadable or malformed timezone tags are ignored rather than reported.
fn read_offset<R: Read + Seek>(
    order: ByteOrder,
    r: &mut R,
    exif: &BTreeMap<u16, IfdEntry>,
) -> Option<FixedOffset> {
    if let Some(entry) = exif.get(&OFFSET_TIME_ORIGINAL) {
        if let Some(offset) = entry
            .read_bytes(order, r)
            .ok()
            .and_then(|raw| parse_exif_offset(&raw))
        {
            return Some(offset);
        }
    }

    let entry = exif.get(&TIME_ZONE_OFFSET)?;
    if entry.count == 0 || entry.element_size() != 2 {
        return None;
    }
    let hours = order.i16([entry.value[0], entry.value[1]]);
    FixedOffset::east_opt(i32::from(hours) * 3600)
}
