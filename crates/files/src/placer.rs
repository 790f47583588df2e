//! Atomic placement of received content into the dated archive tree.

use crate::{io_context, FilesError, FilesResult};
use ark_hash::ContentHash;
use ark_metadata::{Extraction, MetadataExtractor};
use chrono::{DateTime, Datelike, Utc};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::TempPath;

/// Directory under the archive root that holds uploads while they are being written.
pub const TMP_DIR_NAME: &str = "tmp";

/// Length of the hash suffix used to disambiguate same-day name clashes.
const CLASH_SUFFIX_LEN: usize = 8;

/// Where a placement's date came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateSource {
    /// Read from the file's embedded metadata
    Extracted,
    /// The client-declared timestamp
    Fallback,
}

/// Result of a successful placement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    /// Final location of the file inside the archive
    pub path: PathBuf,
    /// Capture time used to pick the dated directory
    pub created_at: DateTime<Utc>,
    pub source: DateSource,
}

/// Writes received content into `<root>/<YYYY>/<MM>/<DD>/`.
///
/// Content is written to a temporary file in `<root>/tmp/`, synced, closed and inspected for
/// its capture time before being renamed into place. The rename never replaces an existing
/// file. On any failure the temporary file is removed and no final path exists.
#[derive(Debug, Clone)]
pub struct ArchivePlacer {
    root: PathBuf,
    tmp_dir: PathBuf,
    extractor: MetadataExtractor,
}

impl ArchivePlacer {
    /// Creates a placer for the archive at `root`, creating `<root>/tmp` if needed.
    ///
    /// # Errors
    ///
    /// Returns `FilesError` if:
    /// - `root` does not exist or is not a directory
    /// - the path cannot be canonicalised
    /// - the temporary directory cannot be created
    pub fn new(root: &Path) -> FilesResult<Self> {
        if !root.exists() {
            return Err(FilesError::InvalidRootDirectory(format!(
                "Directory does not exist: {}",
                root.display()
            )));
        }

        if !root.is_dir() {
            return Err(FilesError::InvalidRootDirectory(format!(
                "Path is not a directory: {}",
                root.display()
            )));
        }

        let root = root.canonicalize().map_err(|e| {
            FilesError::InvalidRootDirectory(format!(
                "Cannot canonicalize path {}: {}",
                root.display(),
                e
            ))
        })?;

        let tmp_dir = root.join(TMP_DIR_NAME);
        fs::create_dir_all(&tmp_dir).map_err(|e| {
            io_context(
                e,
                format!("Failed to create temporary directory {}", tmp_dir.display()),
            )
        })?;

        Ok(Self {
            root,
            tmp_dir,
            extractor: MetadataExtractor::new(),
        })
    }

    /// Replaces the metadata extractor used to date incoming files.
    pub fn with_extractor(mut self, extractor: MetadataExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Places `content` in the archive.
    ///
    /// # Arguments
    ///
    /// * `content` - The complete file content
    /// * `name` - Client-supplied file name; only its final component is used
    /// * `hash` - Content hash, used to disambiguate name clashes
    /// * `fallback` - Timestamp used when the content carries no readable capture time
    ///
    /// # Errors
    ///
    /// Returns `FilesError` if:
    /// - `name` has no usable base name
    /// - writing, syncing or renaming the file fails
    /// - the dated directory cannot be created
    pub fn place(
        &self,
        content: &[u8],
        name: &str,
        hash: &ContentHash,
        fallback: DateTime<Utc>,
    ) -> FilesResult<Placement> {
        let base = base_name(name)?;
        let (stem, extension) = split_name(base);

        let temp = self.write_temp(content, stem, extension)?;
        let (created_at, source) = self.resolve_date(&temp, fallback);

        let dir = self.dated_dir(&created_at);
        fs::create_dir_all(&dir)
            .map_err(|e| io_context(e, format!("Failed to create {}", dir.display())))?;

        let path = persist(temp, &dir, base, stem, extension, hash)?;

        tracing::debug!(
            path = %path.display(),
            %created_at,
            ?source,
            size = content.len(),
            "file placed"
        );

        Ok(Placement {
            path,
            created_at,
            source,
        })
    }

    /// Removes a previously placed file.
    ///
    /// # Errors
    ///
    /// Returns [`FilesError::InvalidPath`] if `path` is not inside the archive root, or
    /// [`FilesError::Io`] if removal fails.
    pub fn remove(&self, path: &Path) -> FilesResult<()> {
        if !path.starts_with(&self.root) || path.starts_with(&self.tmp_dir) {
            return Err(FilesError::InvalidPath(format!(
                "{} is not an archived file",
                path.display()
            )));
        }

        fs::remove_file(path)
            .map_err(|e| io_context(e, format!("Failed to remove {}", path.display())))
    }

    fn write_temp(&self, content: &[u8], stem: &str, extension: Option<&str>) -> FilesResult<TempPath> {
        let prefix = format!("{}.", stem);
        let suffix = extension.map(|ext| format!(".{}", ext)).unwrap_or_default();

        let mut file = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(&suffix)
            .tempfile_in(&self.tmp_dir)
            .map_err(|e| io_context(e, "Failed to create temporary file"))?;

        file.write_all(content)
            .map_err(|e| io_context(e, "Failed to write temporary file"))?;
        file.as_file()
            .sync_all()
            .map_err(|e| io_context(e, "Failed to sync temporary file"))?;

        Ok(file.into_temp_path())
    }

    fn resolve_date(&self, temp: &Path, fallback: DateTime<Utc>) -> (DateTime<Utc>, DateSource) {
        match self.extractor.extract(temp) {
            Ok(Extraction::Found(time)) => (time.as_utc(), DateSource::Extracted),
            Ok(Extraction::Absent(reason)) => {
                tracing::debug!(path = %temp.display(), %reason, "no capture time, using fallback");
                (fallback, DateSource::Fallback)
            }
            Err(e) => {
                tracing::warn!(path = %temp.display(), error = %e, "metadata extraction failed, using fallback");
                (fallback, DateSource::Fallback)
            }
        }
    }

    fn dated_dir(&self, created_at: &DateTime<Utc>) -> PathBuf {
        self.root
            .join(format!("{:04}", created_at.year()))
            .join(format!("{:02}", created_at.month()))
            .join(format!("{:02}", created_at.day()))
    }
}

/// Renames `temp` into `dir`, falling back to a hash-suffixed name if `base` is taken.
fn persist(
    temp: TempPath,
    dir: &Path,
    base: &str,
    stem: &str,
    extension: Option<&str>,
    hash: &ContentHash,
) -> FilesResult<PathBuf> {
    let primary = dir.join(base);
    let temp = match temp.persist_noclobber(&primary) {
        Ok(()) => return Ok(primary),
        Err(e) if e.error.kind() == ErrorKind::AlreadyExists => e.path,
        Err(e) => {
            return Err(io_context(
                e.error,
                format!("Failed to move file to {}", primary.display()),
            ))
        }
    };

    let suffix = hash.short(CLASH_SUFFIX_LEN);
    let alternate = match extension {
        Some(ext) => dir.join(format!("{}-{}.{}", stem, suffix, ext)),
        None => dir.join(format!("{}-{}", stem, suffix)),
    };
    tracing::debug!(taken = %primary.display(), path = %alternate.display(), "name clash");

    temp.persist_noclobber(&alternate).map_err(|e| {
        io_context(
            e.error,
            format!("Failed to move file to {}", alternate.display()),
        )
    })?;
    Ok(alternate)
}

/// Final component of a client-supplied name, with either separator stripped.
fn base_name(name: &str) -> FilesResult<&str> {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    if base.is_empty() || base == "." || base == ".." {
        return Err(FilesError::InvalidFileName(name.to_string()));
    }
    Ok(base)
}

fn split_name(base: &str) -> (&str, Option<&str>) {
    match base.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => (stem, Some(ext)),
        _ => (base, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_hash::ContentHasher;
    use chrono::TimeZone;
    use tempfile::TempDir;

    /// Little-endian TIFF whose Exif IFD holds `2023:06:15 10:20:30`.
    fn tiff_taken_2023_06_15() -> Vec<u8> {
        let mut bytes = b"II\x2a\x00".to_vec();
        bytes.extend_from_slice(&28u32.to_le_bytes());
        bytes.extend_from_slice(b"2023:06:15 10:20:30\0");
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&0x8769u16.to_le_bytes());
        bytes.extend_from_slice(&4u16.to_le_bytes());
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&46u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&0x9003u16.to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&20u32.to_le_bytes());
        bytes.extend_from_slice(&8u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes
    }

    fn fallback() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 1, 2, 3, 4, 5).unwrap()
    }

    fn tmp_is_empty(placer: &ArchivePlacer) -> bool {
        fs::read_dir(placer.root().join(TMP_DIR_NAME))
            .unwrap()
            .next()
            .is_none()
    }

    #[test]
    fn test_new_rejects_missing_root() {
        let temp = TempDir::new().unwrap();
        let result = ArchivePlacer::new(&temp.path().join("missing"));
        assert!(matches!(result, Err(FilesError::InvalidRootDirectory(_))));
    }

    #[test]
    fn test_new_rejects_file_root() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("file");
        fs::write(&file, b"x").unwrap();
        assert!(matches!(
            ArchivePlacer::new(&file),
            Err(FilesError::InvalidRootDirectory(_))
        ));
    }

    #[test]
    fn test_place_uses_extracted_date() {
        let temp = TempDir::new().unwrap();
        let placer = ArchivePlacer::new(temp.path()).unwrap();
        let content = tiff_taken_2023_06_15();
        let hash = ContentHasher::new().hash_bytes(&content);

        let placement = placer
            .place(&content, "IMG_0001.CR2", &hash, fallback())
            .unwrap();

        assert_eq!(
            placement.path,
            placer.root().join("2023").join("06").join("15").join("IMG_0001.CR2")
        );
        assert_eq!(placement.source, DateSource::Extracted);
        assert_eq!(
            placement.created_at,
            Utc.with_ymd_and_hms(2023, 6, 15, 10, 20, 30).unwrap()
        );
        assert_eq!(fs::read(&placement.path).unwrap(), content);
        assert!(tmp_is_empty(&placer));
    }

    #[test]
    fn test_place_falls_back_for_unknown_format() {
        let temp = TempDir::new().unwrap();
        let placer = ArchivePlacer::new(temp.path()).unwrap();
        let hash = ContentHasher::new().hash_bytes(b"video");

        let placement = placer.place(b"video", "clip.mp4", &hash, fallback()).unwrap();

        assert_eq!(placement.source, DateSource::Fallback);
        assert_eq!(placement.created_at, fallback());
        assert_eq!(
            placement.path,
            placer.root().join("2020/01/02/clip.mp4")
        );
    }

    #[test]
    fn test_place_falls_back_on_corrupt_metadata() {
        let temp = TempDir::new().unwrap();
        let placer = ArchivePlacer::new(temp.path()).unwrap();
        let content = b"ZZ\x2a\x00\x08\x00\x00\x00";
        let hash = ContentHasher::new().hash_bytes(content);

        let placement = placer.place(content, "broken.orf", &hash, fallback()).unwrap();

        assert_eq!(placement.source, DateSource::Fallback);
        assert!(placement.path.ends_with("2020/01/02/broken.orf"));
    }

    #[test]
    fn test_place_strips_path_components() {
        let temp = TempDir::new().unwrap();
        let placer = ArchivePlacer::new(temp.path()).unwrap();
        let hash = ContentHasher::new().hash_bytes(b"a");

        let unix = placer
            .place(b"a", "../../etc/passwd.mov", &hash, fallback())
            .unwrap();
        assert_eq!(unix.path, placer.root().join("2020/01/02/passwd.mov"));

        let hash = ContentHasher::new().hash_bytes(b"b");
        let windows = placer
            .place(b"b", r"C:\DCIM\100CANON\IMG_1.avi", &hash, fallback())
            .unwrap();
        assert_eq!(windows.path, placer.root().join("2020/01/02/IMG_1.avi"));
    }

    #[test]
    fn test_place_rejects_unusable_names() {
        let temp = TempDir::new().unwrap();
        let placer = ArchivePlacer::new(temp.path()).unwrap();
        let hash = ContentHasher::new().hash_bytes(b"a");

        for name in ["", "dir/", "..", "a/.", "  "] {
            let result = placer.place(b"a", name, &hash, fallback());
            assert!(
                matches!(result, Err(FilesError::InvalidFileName(_))),
                "{name:?} should be rejected"
            );
        }
        assert!(tmp_is_empty(&placer));
    }

    #[test]
    fn test_place_name_clash_uses_hash_suffix() {
        let temp = TempDir::new().unwrap();
        let placer = ArchivePlacer::new(temp.path()).unwrap();
        let first_hash = ContentHasher::new().hash_bytes(b"first");
        let second_hash = ContentHasher::new().hash_bytes(b"second");

        let first = placer
            .place(b"first", "IMG_0001.mov", &first_hash, fallback())
            .unwrap();
        let second = placer
            .place(b"second", "IMG_0001.mov", &second_hash, fallback())
            .unwrap();

        assert_ne!(first.path, second.path);
        assert_eq!(
            second.path.file_name().unwrap().to_str().unwrap(),
            format!("IMG_0001-{}.mov", second_hash.short(8))
        );
        assert_eq!(fs::read(&first.path).unwrap(), b"first");
        assert_eq!(fs::read(&second.path).unwrap(), b"second");
    }

    #[test]
    fn test_failed_placement_leaves_nothing_behind() {
        let temp = TempDir::new().unwrap();
        let placer = ArchivePlacer::new(temp.path()).unwrap();
        // A plain file where the year directory should go.
        fs::write(placer.root().join("2020"), b"blocker").unwrap();
        let hash = ContentHasher::new().hash_bytes(b"a");

        let result = placer.place(b"a", "clip.mp4", &hash, fallback());

        assert!(matches!(result, Err(FilesError::Io(_))));
        assert!(tmp_is_empty(&placer));
        assert!(!placer.root().join("2020/01/02/clip.mp4").exists());
    }

    #[test]
    fn test_remove_placed_file() {
        let temp = TempDir::new().unwrap();
        let placer = ArchivePlacer::new(temp.path()).unwrap();
        let hash = ContentHasher::new().hash_bytes(b"a");
        let placement = placer.place(b"a", "clip.mp4", &hash, fallback()).unwrap();

        placer.remove(&placement.path).unwrap();
        assert!(!placement.path.exists());
    }

    #[test]
    fn test_remove_rejects_paths_outside_archive() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("archive");
        fs::create_dir(&archive).unwrap();
        let outside = temp.path().join("keep.txt");
        fs::write(&outside, b"keep").unwrap();
        let placer = ArchivePlacer::new(&archive).unwrap();

        assert!(matches!(
            placer.remove(&outside),
            Err(FilesError::InvalidPath(_))
        ));
        assert!(outside.exists());
    }

    #[test]
    fn test_split_name() {
        assert_eq!(split_name("a.b.jpg"), ("a.b", Some("jpg")));
        assert_eq!(split_name("README"), ("README", None));
        assert_eq!(split_name(".hidden"), (".hidden", None));
        assert_eq!(split_name("trailing."), ("trailing.", None));
    }
}
