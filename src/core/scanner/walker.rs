//! Directory walking implementation using walkdir.

use super::filter::{is_hidden, PhotoFilter};
use super::ScanConfig;
use crate::error::ScanError;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Scanner implementation using the walkdir crate.
///
/// Entries are visited in file-name order so that two scans of an
/// unchanged tree yield the same sequence.
pub struct WalkDirScanner {
    config: ScanConfig,
    filter: PhotoFilter,
}

impl WalkDirScanner {
    /// Create a new scanner with the given configuration
    pub fn new(config: ScanConfig) -> Self {
        let mut filter = PhotoFilter::new().with_hidden(config.include_hidden);

        if let Some(ref extensions) = config.extensions {
            filter = filter.with_extensions(extensions);
        }

        Self { config, filter }
    }

    /// Lazily scan the given roots, one after the other, in order.
    ///
    /// A missing root or an unreadable directory yields an `Err` item and
    /// scanning carries on with the rest.
    pub fn scan<'a>(
        &'a self,
        roots: &'a [PathBuf],
    ) -> impl Iterator<Item = Result<PathBuf, ScanError>> + 'a {
        roots.iter().flat_map(move |root| self.walk_root(root))
    }

    fn walk_root<'a>(
        &'a self,
        root: &Path,
    ) -> Box<dyn Iterator<Item = Result<PathBuf, ScanError>> + 'a> {
        if !root.is_dir() {
            return Box::new(std::iter::once(Err(ScanError::DirectoryNotFound {
                path: root.to_path_buf(),
            })));
        }

        let max_depth = if self.config.recursive { usize::MAX } else { 1 };
        let include_hidden = self.filter.includes_hidden();

        let walker = WalkDir::new(root)
            .follow_links(self.config.follow_symlinks)
            .max_depth(max_depth)
            .sort_by_file_name()
            .into_iter()
            // Never descend into hidden directories; the root itself is always walked
            .filter_entry(move |e| include_hidden || e.depth() == 0 || !is_hidden(e.file_name()));

        Box::new(walker.filter_map(move |entry_result| match entry_result {
            Ok(entry) => {
                if entry.file_type().is_file() && self.filter.should_include(entry.path()) {
                    Some(Ok(entry.into_path()))
                } else {
                    None
                }
            }
            Err(e) => {
                let path = e.path().map(Path::to_path_buf);
                let message = e.to_string();
                Some(Err(match (path, e.into_io_error()) {
                    (Some(path), Some(source)) => ScanError::Unreadable { path, source },
                    _ => ScanError::Walk(message),
                }))
            }
        }))
    }
}
