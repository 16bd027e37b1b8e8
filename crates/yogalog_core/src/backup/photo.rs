//! Photo collaborators used by export (source) and import (sink).
//!
//! # Responsibility
//! - Read photo binaries from the platform photo store during export.
//! - Write imported photo binaries into managed storage during import.
//!
//! # Invariants
//! - Both directions stream bytes; whole photos are never required in memory.
//! - The sink never replaces an existing file: every write lands on a fresh
//!   path.

use log::warn;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Read side of the platform photo store.
pub trait PhotoSource {
    fn file_exists(&self, path: &str) -> bool;

    /// Opens a streaming reader over one photo.
    fn open(&self, path: &str) -> io::Result<Box<dyn Read + '_>>;

    fn read_bytes(&self, path: &str) -> io::Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.open(path)?.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}

/// Write side of managed photo storage.
pub trait PhotoSink {
    /// Writes a new file named after `file_name` and returns its final path.
    ///
    /// Implementations must pick another name instead of overwriting an
    /// existing file, and must not leave a partial file behind on error.
    fn write_new(&self, file_name: &str, reader: &mut dyn Read) -> io::Result<PathBuf>;

    fn write_bytes(&self, file_name: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        let mut reader = bytes;
        self.write_new(file_name, &mut reader)
    }

    /// Removes a file previously returned by `write_new`.
    fn remove(&self, path: &Path) -> io::Result<()>;
}

/// Filesystem photo source.
///
/// Relative photo paths resolve against `base_dir` when one is set.
#[derive(Debug, Clone, Default)]
pub struct FsPhotoSource {
    base_dir: Option<PathBuf>,
}

impl FsPhotoSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let candidate = Path::new(path.strip_prefix("file://").unwrap_or(path));
        match &self.base_dir {
            Some(base) if candidate.is_relative() => base.join(candidate),
            _ => candidate.to_path_buf(),
        }
    }
}

impl PhotoSource for FsPhotoSource {
    fn file_exists(&self, path: &str) -> bool {
        self.resolve(path).is_file()
    }

    fn open(&self, path: &str) -> io::Result<Box<dyn Read + '_>> {
        let file = File::open(self.resolve(path))?;
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Managed photo directory owned by the app.
#[derive(Debug, Clone)]
pub struct ManagedPhotoDir {
    root: PathBuf,
}

impl ManagedPhotoDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn create_unique(&self, file_name: &str) -> io::Result<(PathBuf, File)> {
        let (stem, extension) = split_file_name(file_name);
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let name = if attempt == 0 {
                file_name.to_string()
            } else {
                format!("{stem}_{attempt}{extension}")
            };
            let path = self.root.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(err) => return Err(err),
            }
        }
        Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("no free managed file name for `{file_name}`"),
        ))
    }
}

impl PhotoSink for ManagedPhotoDir {
    fn write_new(&self, file_name: &str, reader: &mut dyn Read) -> io::Result<PathBuf> {
        if file_name.contains(['/', '\\']) || file_name.trim().is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid managed file name `{file_name}`"),
            ));
        }
        fs::create_dir_all(&self.root)?;

        let (path, file) = self.create_unique(file_name)?;
        let mut writer = BufWriter::new(file);
        let written = io::copy(reader, &mut writer).and_then(|_| writer.flush());
        if let Err(err) = written {
            drop(writer);
            if let Err(cleanup_err) = fs::remove_file(&path) {
                warn!(
                    "event=photo_cleanup module=backup status=error path={} error={}",
                    path.display(),
                    cleanup_err
                );
            }
            return Err(err);
        }
        Ok(path)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        if !path.starts_with(&self.root) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("`{}` is outside managed storage", path.display()),
            ));
        }
        fs::remove_file(path)
    }
}

fn split_file_name(file_name: &str) -> (&str, &str) {
    match file_name.rfind('.') {
        Some(index) if index > 0 => (&file_name[..index], &file_name[index..]),
        _ => (file_name, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::{FsPhotoSource, ManagedPhotoDir, PhotoSink, PhotoSource};
    use std::fs;

    #[test]
    fn managed_dir_never_overwrites_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        let sink = ManagedPhotoDir::new(dir.path().join("photos"));

        let first = sink.write_bytes("a_1_100.jpg", b"first").unwrap();
        let second = sink.write_bytes("a_1_100.jpg", b"second").unwrap();

        assert_ne!(first, second);
        assert_eq!(fs::read(&first).unwrap(), b"first");
        assert_eq!(fs::read(&second).unwrap(), b"second");
        assert_eq!(second.file_name().unwrap(), "a_1_100_1.jpg");
    }

    #[test]
    fn managed_dir_rejects_path_like_names_and_foreign_removals() {
        let dir = tempfile::tempdir().unwrap();
        let sink = ManagedPhotoDir::new(dir.path().join("photos"));
        assert!(sink.write_bytes("../escape.jpg", b"x").is_err());

        let outside = dir.path().join("outside.jpg");
        fs::write(&outside, b"x").unwrap();
        assert!(sink.remove(&outside).is_err());
        assert!(outside.exists());
    }

    #[test]
    fn fs_source_resolves_relative_paths_against_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("pose.jpg"), b"jpeg").unwrap();

        let source = FsPhotoSource::with_base_dir(dir.path());
        assert!(source.file_exists("pose.jpg"));
        assert!(!source.file_exists("missing.jpg"));
        assert_eq!(source.read_bytes("pose.jpg").unwrap(), b"jpeg");
    }
}
