//! Filesystem mechanics of publishing: clearing the publish directory,
//! placing the static and media trees into it, and designating the index
//! page. Best-effort operations report what happened through explicit
//! outcome types rather than swallowing errors, and the caller logs them.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// The file name of the designated index page.
pub const INDEX_FILE_NAME: &str = "index.html";

/// The result of clearing the publish directory. Items that couldn't be
/// removed are reported and left behind.
#[derive(Debug, Default)]
pub struct CleanReport {
    pub removed: usize,
    pub failed: Vec<(PathBuf, io::Error)>,
}

impl CleanReport {
    pub fn log(&self) {
        log::info!("Removed {} previous output item(s)", self.removed);
        for (path, err) in &self.failed {
            log::warn!("Failed to remove {}: {}", path.display(), err);
        }
    }
}

/// Removes the contents of `dir` but not `dir` itself, so a mounted volume
/// can serve as the publish directory. Files and symlinks are unlinked,
/// directories removed recursively. A missing `dir` is not an error.
pub fn clear_dir(dir: &Path) -> Result<CleanReport> {
    let mut report = CleanReport::default();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(report),
        Err(err) => return Err(Error::io(dir, err)),
    };
    for entry in entries {
        let entry = entry.map_err(|err| Error::io(dir, err))?;
        let path = entry.path();
        let removed = match entry.file_type() {
            Ok(kind) if kind.is_dir() => fs::remove_dir_all(&path),
            Ok(_) => fs::remove_file(&path),
            Err(err) => Err(err),
        };
        match removed {
            Ok(()) => report.removed += 1,
            Err(err) => report.failed.push((path, err)),
        }
    }
    Ok(report)
}

/// How a source tree ended up in the publish directory.
#[derive(Debug)]
pub enum Placement {
    Copied(PathBuf),
    Linked(PathBuf),

    /// The target already existed and was left alone.
    AlreadyPresent(PathBuf),

    /// There was nothing to place.
    SourceMissing(PathBuf),

    /// Copying or linking failed part way.
    Failed { target: PathBuf, err: Error },
}

impl Placement {
    pub fn log(&self, what: &str) {
        match self {
            Placement::Copied(target) => log::info!("Copied {} to {}", what, target.display()),
            Placement::Linked(target) => log::info!("Linked {} at {}", what, target.display()),
            Placement::AlreadyPresent(target) => {
                log::info!("{} already present at {}", what, target.display())
            }
            Placement::SourceMissing(source) => {
                log::warn!("No {} found at {}", what, source.display())
            }
            Placement::Failed { target, err } => {
                log::warn!("Placing {} at {}: {}", what, target.display(), err)
            }
        }
    }
}

/// Places the tree at `source` into `publish_dir` under the same base name,
/// by symbolic link or by copy. An existing target is never re-copied.
pub fn place_dir(source: &Path, publish_dir: &Path, symlink: bool) -> Placement {
    let target = match source.file_name() {
        Some(name) => publish_dir.join(name),
        None => return Placement::SourceMissing(source.to_owned()),
    };
    if fs::symlink_metadata(&target).is_ok() {
        return Placement::AlreadyPresent(target);
    }
    if !source.exists() {
        return Placement::SourceMissing(source.to_owned());
    }

    let placed = match symlink {
        true => fs::canonicalize(source)
            .and_then(|absolute| link(&absolute, &target))
            .map_err(|err| Error::io(&target, err)),
        false => copy_dir(source, &target),
    };
    match (placed, symlink) {
        (Ok(()), true) => Placement::Linked(target),
        (Ok(()), false) => Placement::Copied(target),
        (Err(err), _) => Placement::Failed { target, err },
    }
}

/// Recursively copies `src` into `dst`, creating `dst`.
pub fn copy_dir(src: &Path, dst: &Path) -> Result<()> {
    for entry in WalkDir::new(src) {
        let entry = entry?;
        // strip_prefix can't fail; every entry lives under `src`
        let relative = match entry.path().strip_prefix(src) {
            Ok(relative) => relative,
            Err(_) => continue,
        };
        let target = dst.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|err| Error::io(&target, err))?;
        } else {
            fs::copy(entry.path(), &target).map_err(|err| Error::io(&target, err))?;
        }
    }
    Ok(())
}

/// Whether `path` itself is a symbolic link.
pub fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|meta| meta.file_type().is_symlink())
        .unwrap_or(false)
}

/// Designates `filename` (relative to `publish_dir`) as the site's index
/// page, replacing any previous `index.html`. Returns whether a link was
/// created; otherwise the page was copied.
pub fn designate_index(publish_dir: &Path, filename: &str, symlink: bool) -> Result<bool> {
    let index = publish_dir.join(INDEX_FILE_NAME);
    if fs::symlink_metadata(&index).is_ok() {
        fs::remove_file(&index).map_err(|err| Error::io(&index, err))?;
    }
    if symlink && cfg!(unix) {
        link(Path::new(filename), &index).map_err(|err| Error::io(&index, err))?;
        return Ok(true);
    }
    fs::copy(publish_dir.join(filename), &index).map_err(|err| Error::io(&index, err))?;
    Ok(false)
}

#[cfg(unix)]
fn link(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(src, dst)
}

#[cfg(not(unix))]
fn link(src: &Path, dst: &Path) -> io::Result<()> {
    match src.is_dir() {
        true => copy_dir(src, dst)
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err.to_string())),
        false => fs::copy(src, dst).map(|_| ()),
    }
}

/// The result of a fatal publishing operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an I/O problem while publishing.
#[derive(Debug)]
pub enum Error {
    /// Returned for I/O problems on a specific path.
    Io { path: PathBuf, err: io::Error },

    /// Returned for errors walking a source tree.
    WalkDir(walkdir::Error),
}

impl Error {
    fn io(path: &Path, err: io::Error) -> Error {
        Error::Io {
            path: path.to_owned(),
            err,
        }
    }
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io { path, err } => write!(f, "'{}': {}", path.display(), err),
            Error::WalkDir(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io { path: _, err } => Some(err),
            Error::WalkDir(err) => Some(err),
        }
    }
}

impl From<walkdir::Error> for Error {
    /// Converts a [`walkdir::Error`] into an [`Error`]. It allows us to
    /// use the `?` operator while walking source trees.
    fn from(err: walkdir::Error) -> Error {
        Error::WalkDir(err)
    }
}
