use chrono::{DateTime, Utc};
use jwalk::WalkDir;
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};
use crate::fs::types::FileEntry;

pub struct LocalFs;

impl LocalFs {
    /// Walk `root` and return every regular file below it, sorted by path.
    ///
    /// Directories listed in `reserved` (and everything under them) are skipped.
    /// Unreadable entries are returned separately so the caller can count them
    /// without abandoning the walk.
    pub fn walk_files(root: &Path, reserved: &[PathBuf]) -> (Vec<FileEntry>, Vec<Error>) {
        let mut files = Vec::new();
        let mut errors = Vec::new();

        for entry_result in WalkDir::new(root)
            .skip_hidden(false)
            .follow_links(false)
            .sort(true)
        {
            let entry = match entry_result {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
                    let io_err = e
                        .into_io_error()
                        .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "walk error"));
                    errors.push(Error::from_io_error(io_err, "walking", path));
                    continue;
                }
            };

            let path = entry.path();
            if reserved.iter().any(|r| path.starts_with(r)) {
                continue;
            }
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = match path.strip_prefix(root) {
                Ok(rel) => rel.to_path_buf(),
                Err(_) => continue,
            };

            match entry.metadata() {
                Ok(metadata) => files.push(FileEntry {
                    relative,
                    path,
                    size: metadata.len(),
                    modified: metadata.modified().ok().map(DateTime::<Utc>::from),
                }),
                Err(e) => {
                    let io_err = e
                        .into_io_error()
                        .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "metadata error"));
                    errors.push(Error::from_io_error(io_err, "reading metadata of", path));
                }
            }
        }

        files.sort_by(|a, b| a.relative.cmp(&b.relative));
        (files, errors)
    }

    /// Copy a file, creating parent directories and carrying the source's
    /// modification time over to the destination.
    pub fn copy_file(from: &Path, to: &Path) -> Result<u64> {
        Self::ensure_parent(to)?;

        let bytes = fs::copy(from, to).map_err(|e| Error::from_io_error(e, "copying", from))?;
        Self::copy_mtime(from, to)?;
        Ok(bytes)
    }

    /// Move a file, falling back to copy + remove across filesystems.
    pub fn relocate(from: &Path, to: &Path) -> Result<()> {
        Self::ensure_parent(to)?;

        if fs::rename(from, to).is_ok() {
            return Ok(());
        }

        Self::copy_file(from, to)?;
        if let Err(e) = fs::remove_file(from) {
            // Leave the original where it was rather than holding two copies
            let _ = fs::remove_file(to);
            return Err(Error::from_io_error(e, "removing after move", from));
        }
        Ok(())
    }

    pub fn ensure_parent(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::from_io_error(e, "creating directory", parent))?;
        }
        Ok(())
    }

    /// Remove empty directories from `start` upward, stopping at `stop`.
    pub fn prune_empty_dirs(start: &Path, stop: &Path) {
        let mut current = Some(start);
        while let Some(dir) = current {
            if dir == stop || !dir.starts_with(stop) {
                break;
            }
            // remove_dir refuses non-empty directories
            if fs::remove_dir(dir).is_err() {
                break;
            }
            current = dir.parent();
        }
    }

    fn copy_mtime(from: &Path, to: &Path) -> Result<()> {
        let modified = fs::metadata(from)
            .and_then(|m| m.modified())
            .map_err(|e| Error::from_io_error(e, "reading modification time of", from))?;
        File::options()
            .write(true)
            .open(to)
            .and_then(|f| f.set_modified(modified))
            .map_err(|e| Error::from_io_error(e, "setting modification time of", to))
    }

    /// Turn an absolute path into a relative one that can be nested under
    /// another directory: roots are dropped, drive prefixes become plain
    /// components and `..` can never climb out.
    pub fn mirror_relative(path: &Path) -> PathBuf {
        let mut mirrored = PathBuf::new();

        for component in path.components() {
            match component {
                Component::Prefix(prefix) => {
                    let cleaned: String = prefix
                        .as_os_str()
                        .to_string_lossy()
                        .chars()
                        .filter(|c| c.is_alphanumeric())
                        .collect();
                    if !cleaned.is_empty() {
                        mirrored.push(cleaned);
                    }
                }
                Component::RootDir | Component::CurDir => {}
                Component::ParentDir => mirrored.push("_parent"),
                Component::Normal(name) => mirrored.push(name),
            }
        }

        mirrored
    }
}
