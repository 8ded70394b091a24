//! Accepted input formats
//!
//! The core will try to decode anything it is handed; callers use these
//! helpers to reject uploads before they reach the converter.

use std::path::Path;

/// File extensions (lowercase, without the dot) accepted as input images.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "jpe", "jfif", "png", "bmp", "gif", "webp", "tif", "tiff",
];

/// Extension used for uploads whose original name carries none.
pub const DEFAULT_EXTENSION: &str = "jpg";

/// Returns `true` if `ext` (with or without a leading dot) is an accepted image extension.
pub fn is_supported_extension(ext: &str) -> bool {
    let ext = ext.trim_start_matches('.').to_ascii_lowercase();
    SUPPORTED_EXTENSIONS.contains(&ext.as_str())
}

/// Returns `true` if the path has an accepted image extension.
pub fn is_supported_path(path: impl AsRef<Path>) -> bool {
    path.as_ref()
        .extension()
        .and_then(|e| e.to_str())
        .map(is_supported_extension)
        .unwrap_or(false)
}

/// Returns `true` for `image/*` media types.
pub fn is_image_content_type(content_type: &str) -> bool {
    content_type
        .trim()
        .to_ascii_lowercase()
        .starts_with("image/")
}

/// Lowercased extension of an uploaded file name, if it has one.
pub fn extension_of(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(|e| e.to_ascii_lowercase())
}
