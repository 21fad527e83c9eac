//! Unpacking of downloaded archives.
use crate::fetch::copy_counted;
use crate::{DatasetError, Result};
use flate2::read::GzDecoder;
use log::{debug, info, warn};
use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use zip::ZipArchive;

const ZIP_MAGIC: [u8; 4] = [b'P', b'K', 0x03, 0x04];
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Container format of a downloaded artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    /// A zip archive, possibly holding several files.
    Zip,
    /// A single gzip-compressed file.
    Gzip,
    /// Not an archive: the artifact is the data file.
    Plain,
}

impl ArchiveKind {
    /// Detect the format from the leading bytes of `path`, falling back to its
    /// extension.
    ///
    /// A file named `*.zip` or `*.gz` without the matching magic number is
    /// still reported as an archive so that extraction fails loudly instead of
    /// handing compressed garbage to the parser.
    pub fn detect(path: &Path) -> Result<Self> {
        let mut head = [0u8; 4];
        let mut file = File::open(path)?;
        let mut filled = 0;
        while filled < head.len() {
            let read = file.read(&mut head[filled..])?;
            if read == 0 {
                break;
            }
            filled += read;
        }
        let head = &head[..filled];
        if head.starts_with(&ZIP_MAGIC) {
            return Ok(Self::Zip);
        }
        if head.starts_with(&GZIP_MAGIC) {
            return Ok(Self::Gzip);
        }
        Ok(Self::from_extension(path))
    }

    fn from_extension(path: &Path) -> Self {
        match path.extension().and_then(OsStr::to_str) {
            Some(ext) if ext.eq_ignore_ascii_case("zip") => Self::Zip,
            Some(ext) if ext.eq_ignore_ascii_case("gz") => Self::Gzip,
            _ => Self::Plain,
        }
    }
}

/// Make sure `member_filename` is available in `target_dir`, extracting it
/// from `archive_path` if needed.
///
/// Returns the path of the data file. For artifacts that are not archives
/// this is `archive_path` itself.
pub fn ensure_extracted(
    archive_path: &Path,
    member_filename: &str,
    target_dir: &Path,
) -> Result<PathBuf> {
    let member_path = target_dir.join(member_filename);
    if member_path.exists() {
        debug!("Using extracted {}", member_path.display());
        return Ok(member_path);
    }
    extract(archive_path, member_filename, target_dir, false)
}

/// Extract `archive_path` again, replacing every member already present in
/// `target_dir`. Used after the archive itself has been downloaded anew.
pub fn refresh_extracted(
    archive_path: &Path,
    member_filename: &str,
    target_dir: &Path,
) -> Result<PathBuf> {
    extract(archive_path, member_filename, target_dir, true)
}

fn extract(
    archive_path: &Path,
    member_filename: &str,
    target_dir: &Path,
    overwrite: bool,
) -> Result<PathBuf> {
    let member_path = target_dir.join(member_filename);
    match ArchiveKind::detect(archive_path)? {
        ArchiveKind::Plain => Ok(archive_path.to_path_buf()),
        ArchiveKind::Zip => {
            info!("Extracting {} to {}", archive_path.display(), target_dir.display());
            extract_zip(archive_path, member_filename, target_dir, overwrite)
        }
        ArchiveKind::Gzip => {
            info!("Decompressing {} to {}", archive_path.display(), member_path.display());
            fs::create_dir_all(target_dir)?;
            let decoder = GzDecoder::new(BufReader::new(File::open(archive_path)?));
            publish(decoder, &member_path, archive_path)?;
            Ok(member_path)
        }
    }
}

/// Every member of the archive is extracted; the one named `member_filename`
/// is moved to the top of `target_dir` if it was stored in a subdirectory.
/// Members already on disk are kept unless `overwrite` is set.
fn extract_zip(
    archive_path: &Path,
    member_filename: &str,
    target_dir: &Path,
    overwrite: bool,
) -> Result<PathBuf> {
    let mut written = Vec::new();
    let outcome = unpack_zip(archive_path, member_filename, target_dir, overwrite, &mut written);
    if outcome.is_err() {
        for path in written.iter().rev() {
            let _ = fs::remove_file(path);
        }
    }
    outcome
}

fn unpack_zip(
    archive_path: &Path,
    member_filename: &str,
    target_dir: &Path,
    overwrite: bool,
    written: &mut Vec<PathBuf>,
) -> Result<PathBuf> {
    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(BufReader::new(file))
        .map_err(|err| DatasetError::extraction(archive_path, err))?;
    fs::create_dir_all(target_dir)?;

    let mut found = None;
    for index in 0..archive.len() {
        let entry = archive
            .by_index(index)
            .map_err(|err| DatasetError::extraction(archive_path, err))?;
        let relative = match entry.enclosed_name() {
            Some(relative) => relative.to_path_buf(),
            None => {
                warn!("Skipping unsafe entry {:?} in {}", entry.name(), archive_path.display());
                continue;
            }
        };
        let output = target_dir.join(&relative);
        if entry.is_dir() {
            fs::create_dir_all(&output)?;
            continue;
        }
        if overwrite || !output.exists() {
            if let Some(parent) = output.parent() {
                fs::create_dir_all(parent)?;
            }
            publish(entry, &output, archive_path)?;
            written.push(output.clone());
        }
        if found.is_none() && relative.file_name() == Some(OsStr::new(member_filename)) {
            found = Some(output);
        }
    }

    let member_path = target_dir.join(member_filename);
    let found = found.ok_or_else(|| {
        DatasetError::extraction(archive_path, format!("no member named {member_filename}"))
    })?;
    if found != member_path {
        fs::rename(&found, &member_path)?;
        written.push(member_path.clone());
    }
    Ok(member_path)
}

/// Write `reader` to `destination` through a temporary file so that a
/// failed extraction never leaves a truncated member behind.
fn publish<R: Read>(mut reader: R, destination: &Path, archive_path: &Path) -> Result<()> {
    let parent = destination.parent().unwrap_or_else(|| Path::new("."));
    let mut partial = tempfile::Builder::new()
        .prefix(".extract-")
        .tempfile_in(parent)?;
    copy_counted(&mut reader, partial.as_file_mut(), |err| {
        DatasetError::extraction(archive_path, err)
    })?;
    partial.persist(destination).map_err(|err| err.error)?;
    Ok(())
}
