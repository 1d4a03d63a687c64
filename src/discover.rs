//! Directory scan for candidate images.

use crate::error::{Result, SqueezeError};
use crate::formats::is_image_file;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Lists the supported images directly inside `dir`, sorted by file name.
///
/// Non-recursive. Only regular files are returned; symlinks to files are
/// followed. The returned paths are absolute. Nothing is opened for
/// writing.
pub fn collect_image_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let discovery_err = |source: io::Error| SqueezeError::Discovery {
        dir: dir.to_path_buf(),
        source,
    };

    let root = dir.canonicalize().map_err(discovery_err)?;
    if !root.is_dir() {
        return Err(discovery_err(io::Error::new(
            io::ErrorKind::NotADirectory,
            "not a directory",
        )));
    }

    let walker = WalkDir::new(&root)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name();

    let mut image_files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() == 0 => {
                let source = err
                    .into_io_error()
                    .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "directory walk failed"));
                return Err(discovery_err(source));
            }
            Err(err) => {
                // Dangling symlinks and entries that vanish mid-scan.
                tracing::debug!(error = %err, "skipping unreadable entry");
                continue;
            }
        };

        let path = entry.path();
        if entry.file_type().is_file() && is_image_file(path) {
            image_files.push(path.to_path_buf());
        }
    }

    tracing::debug!(dir = %root.display(), count = image_files.len(), "discovered images");
    Ok(image_files)
}
