//! File filtering logic for the scanner.

use std::collections::HashSet;
use std::ffi::OsStr;
use std::path::Path;

/// Extensions accepted by default: common photo containers plus camera RAW
pub const DEFAULT_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "tiff", "tif", "nef", "cr2", "arw", "dng", "raf", "raw", "heic",
    "heif",
];

/// Filters files to determine if they are supported photos
#[derive(Debug, Clone)]
pub struct PhotoFilter {
    /// Lowercase file extensions to include
    extensions: HashSet<String>,
    /// Whether to include hidden files
    include_hidden: bool,
}

impl PhotoFilter {
    /// Create a new filter with default supported extensions
    pub fn new() -> Self {
        Self {
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            include_hidden: false,
        }
    }

    /// Include hidden files (starting with .)
    pub fn with_hidden(mut self, include: bool) -> Self {
        self.include_hidden = include;
        self
    }

    /// Override the list of extensions to accept
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_lowercase())
            .collect();
        self
    }

    /// Whether hidden entries are kept
    pub fn includes_hidden(&self) -> bool {
        self.include_hidden
    }

    /// Check if a file should be included
    pub fn should_include(&self, path: &Path) -> bool {
        if !self.include_hidden && path.file_name().is_some_and(is_hidden) {
            return false;
        }

        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.contains(&e.to_lowercase()))
            .unwrap_or(false)
    }
}

impl Default for PhotoFilter {
    fn default() -> Self {
        Self::new()
    }
}

/// Dot-prefixed names are hidden (this also covers the organizer's own artifacts)
pub fn is_hidden(name: &OsStr) -> bool {
    name.to_str().is_some_and(|n| n.starts_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_includes_jpeg_any_case() {
        let filter = PhotoFilter::new();
        assert!(filter.should_include(Path::new("/photos/image.jpg")));
        assert!(filter.should_include(Path::new("/photos/image.JPEG")));
    }

    #[test]
    fn filter_includes_raw_formats() {
        let filter = PhotoFilter::new();
        assert!(filter.should_include(Path::new("/photos/DSC_0001.NEF")));
        assert!(filter.should_include(Path::new("/photos/IMG_1234.cr2")));
        assert!(filter.should_include(Path::new("/photos/IMG_1234.HEIC")));
    }

    #[test]
    fn filter_excludes_non_photos() {
        let filter = PhotoFilter::new();
        assert!(!filter.should_include(Path::new("/photos/document.pdf")));
        assert!(!filter.should_include(Path::new("/photos/video.mp4")));
        assert!(!filter.should_include(Path::new("/photos/no_extension")));
    }

    #[test]
    fn filter_excludes_hidden_by_default() {
        let filter = PhotoFilter::new();
        assert!(!filter.should_include(Path::new("/photos/.hidden.jpg")));
        assert!(filter.with_hidden(true).should_include(Path::new("/photos/.hidden.jpg")));
    }

    #[test]
    fn custom_extensions_are_normalized() {
        let filter = PhotoFilter::new().with_extensions([".WEBP", "gif"]);
        assert!(filter.should_include(Path::new("a.webp")));
        assert!(filter.should_include(Path::new("a.GIF")));
        assert!(!filter.should_include(Path::new("a.jpg")));
    }
}
