//! TIFF/Exif constants.

/// "II": Intel, little-endian.
pub(crate) const INTEL_BYTE_ORDER: u16 = 0x4949;
/// "MM": Motorola, big-endian.
pub(crate) const MOTOROLA_BYTE_ORDER: u16 = 0x4D4D;

pub(crate) const TIFF_MAGIC_BIG_ENDIAN: u16 = 0x002A;
pub(crate) const TIFF_MAGIC_LITTLE_ENDIAN: u16 = 0x2A00;
/// Olympus ORF ("RO"/"OR").
pub(crate) const ORF_MAGIC_BIG_ENDIAN: u16 = 0x4F52;
pub(crate) const ORF_MAGIC_LITTLE_ENDIAN: u16 = 0x524F;

pub(crate) const KNOWN_MAGIC_NUMBERS: [u16; 4] = [
    TIFF_MAGIC_BIG_ENDIAN,
    TIFF_MAGIC_LITTLE_ENDIAN,
    ORF_MAGIC_BIG_ENDIAN,
    ORF_MAGIC_LITTLE_ENDIAN,
];

/// Pointer from IFD0 to the Exif sub-IFD.
pub(crate) const EXIF_IFD_POINTER: u16 = 0x8769;
/// Offset of DateTimeOriginal from GMT, in hours (signed short).
pub(crate) const TIME_ZONE_OFFSET: u16 = 0x882a;
/// Date/time when the original image was taken.
pub(crate) const DATE_TIME_ORIGINAL: u16 = 0x9003;
/// Timezone of DateTimeOriginal, e.g. `+02:00`.
pub(crate) const OFFSET_TIME_ORIGINAL: u16 = 0x9011;

/// `YYYY:MM:DD HH:MM:SS`
pub(crate) const EXIF_DATE_TIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Upper bound for a single out-of-line tag value we are willing to read.
pub(crate) const MAX_VALUE_LEN: u64 = 64 * 1024;

pub(crate) const HEADER_LEN: usize = 8;
pub(crate) const ENTRY_LEN: usize = 12;
