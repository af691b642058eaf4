//! Moving a finished download into place.
//!
//! # Design
//! The transport leaves the body in a temporary file. `install` removes
//! whatever is at the destination and renames the file over it. When the
//! rename cannot cross filesystems the bytes are copied into a temporary file
//! beside the destination first, so the final step is still a rename. With
//! `unzip` the archive is extracted into a staging directory beside the
//! destination, which is then renamed into place.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempPath;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::error::{ApiError, ConversionError, Result};

pub(crate) fn install(staged: TempPath, destination: &Path, unzip: bool) -> Result<PathBuf> {
    if unzip {
        extract_into_place(&staged, destination)?;
    } else {
        move_into_place(staged, destination).map_err(ApiError::Filesystem)?;
    }
    Ok(destination.to_path_buf())
}

fn move_into_place(staged: TempPath, destination: &Path) -> io::Result<()> {
    remove_existing(destination)?;
    match staged.persist(destination) {
        Ok(()) => Ok(()),
        Err(err) => {
            tracing::debug!(target: "courier", error = %err.error, "rename failed, copying beside destination");
            copy_into_place(&err.path, destination)
        }
    }
}

fn copy_into_place(staged: &Path, destination: &Path) -> io::Result<()> {
    let mut beside = tempfile::Builder::new()
        .prefix(".courier-")
        .tempfile_in(parent_dir(destination))?;
    io::copy(&mut File::open(staged)?, beside.as_file_mut())?;
    beside.persist(destination).map_err(|e| e.error)?;
    Ok(())
}

fn extract_into_place(staged: &Path, destination: &Path) -> Result<()> {
    let staging = tempfile::Builder::new()
        .prefix(".courier-unzip-")
        .tempdir_in(parent_dir(destination))
        .map_err(ApiError::Filesystem)?;
    let file = File::open(staged).map_err(ApiError::Filesystem)?;
    let mut archive = ZipArchive::new(file).map_err(zip_error)?;
    archive.extract(staging.path()).map_err(zip_error)?;

    remove_existing(destination).map_err(ApiError::Filesystem)?;
    fs::rename(staging.path(), destination).map_err(ApiError::Filesystem)?;
    Ok(())
}

fn remove_existing(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn zip_error(err: ZipError) -> ApiError {
    match err {
        ZipError::Io(e) => ApiError::Filesystem(e),
        other => ApiError::Conversion(ConversionError::new(format!("downloaded archive is unreadable: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::{CompressionMethod, ZipWriter};

    fn staged(bytes: &[u8]) -> TempPath {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file.into_temp_path()
    }

    fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(io::Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        for (name, data) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn replaces_existing_file_exactly() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("report.txt");
        fs::write(&dest, b"old content that is longer than the new one").unwrap();

        let path = install(staged(b"new"), &dest, false).unwrap();
        assert_eq!(path, dest);
        assert_eq!(fs::read(&dest).unwrap(), b"new");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("fresh.bin");
        install(staged(&[1, 2, 3]), &dest, false).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn missing_parent_is_a_filesystem_error() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("no-such-dir").join("file.bin");
        let err = install(staged(b"x"), &dest, false).unwrap_err();
        assert!(matches!(err, ApiError::Filesystem(_)));
    }

    #[test]
    fn unzip_replaces_existing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("bundle");
        fs::create_dir(&dest).unwrap();
        fs::write(dest.join("stale.txt"), b"stale").unwrap();

        let archive = zip_bytes(&[("a.txt", b"alpha"), ("nested/b.txt", b"beta")]);
        install(staged(&archive), &dest, true).unwrap();

        assert_eq!(fs::read(dest.join("a.txt")).unwrap(), b"alpha");
        assert_eq!(fs::read(dest.join("nested/b.txt")).unwrap(), b"beta");
        assert!(!dest.join("stale.txt").exists());
        // only the destination remains, no staging leftovers
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn unzip_rejects_non_archive() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("bundle");
        let err = install(staged(b"definitely not a zip"), &dest, true).unwrap_err();
        assert!(matches!(err, ApiError::Conversion(_)));
        assert!(!dest.exists());
    }
}
