//! Storage category classification for uploaded artifacts.
//!
//! Every upload declares a MIME type. Types outside the allow-list are
//! rejected with `UnsupportedMediaType` before any bytes reach storage;
//! allowed types map to one of a fixed set of categories that doubles as
//! the storage sub-directory name under the uploads root.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Storage category for an archive.
///
/// The wire (and directory) names are the Spanish forms used by the
/// original fleet-inspection deployment: `imagen`, `documento`, `pdf`,
/// `video`, `otro`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "imagen")]
    Image,
    #[serde(rename = "documento")]
    Document,
    #[serde(rename = "pdf")]
    Pdf,
    #[serde(rename = "video")]
    Video,
    #[serde(rename = "otro")]
    Other,
}

impl Category {
    /// Directory name under the uploads root (equal to the wire name).
    pub fn storage_dir(&self) -> &'static str {
        match self {
            Category::Image => "imagen",
            Category::Document => "documento",
            Category::Pdf => "pdf",
            Category::Video => "video",
            Category::Other => "otro",
        }
    }

    /// Parse a wire name back into a category.
    pub fn parse(s: &str) -> Option<Category> {
        match s {
            "imagen" => Some(Category::Image),
            "documento" => Some(Category::Document),
            "pdf" => Some(Category::Pdf),
            "video" => Some(Category::Video),
            "otro" => Some(Category::Other),
            _ => None,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.storage_dir())
    }
}

/// MIME allow-list mapping each accepted type to its category.
static MIME_CATEGORIES: Lazy<HashMap<&'static str, Category>> = Lazy::new(|| {
    let mut m = HashMap::new();
    // Images
    m.insert("image/jpeg", Category::Image);
    m.insert("image/png", Category::Image);
    m.insert("image/gif", Category::Image);
    m.insert("image/webp", Category::Image);
    m.insert("image/bmp", Category::Image);
    m.insert("image/tiff", Category::Image);
    // PDF gets its own bucket
    m.insert("application/pdf", Category::Pdf);
    // Office / text documents
    m.insert("application/msword", Category::Document);
    m.insert(
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        Category::Document,
    );
    m.insert("application/vnd.ms-excel", Category::Document);
    m.insert(
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        Category::Document,
    );
    m.insert("application/vnd.ms-powerpoint", Category::Document);
    m.insert(
        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        Category::Document,
    );
    m.insert("application/rtf", Category::Document);
    m.insert("text/plain", Category::Document);
    m.insert("text/csv", Category::Document);
    // Video
    m.insert("video/mp4", Category::Video);
    m.insert("video/mpeg", Category::Video);
    m.insert("video/quicktime", Category::Video);
    m.insert("video/webm", Category::Video);
    m.insert("video/x-msvideo", Category::Video);
    // Accepted but uncategorized
    m.insert("application/zip", Category::Other);
    m.insert("application/x-7z-compressed", Category::Other);
    m
});

/// Whether a declared MIME type is accepted for storage.
pub fn is_allowed(mime_type: &str) -> bool {
    MIME_CATEGORIES.contains_key(mime_type)
}

/// Classify an allow-listed MIME type.
///
/// Callers must gate on [`is_allowed`] first; a type outside the list
/// classifies to `Other` only because this function is total, and such a
/// value must never reach storage.
pub fn classify(mime_type: &str) -> Category {
    MIME_CATEGORIES
        .get(mime_type)
        .copied()
        .unwrap_or(Category::Other)
}

/// Lowercased extension of a file name, dot included (`"foto.JPG"` → `".jpg"`).
pub fn extension_of(name: &str) -> Option<String> {
    let idx = name.rfind('.')?;
    let ext = &name[idx..];
    // A trailing dot or a dotfile with no stem is not an extension.
    if ext.len() < 2 || idx == 0 {
        return None;
    }
    Some(ext.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_known_types() {
        assert_eq!(classify("image/png"), Category::Image);
        assert_eq!(classify("application/pdf"), Category::Pdf);
        assert_eq!(classify("video/mp4"), Category::Video);
        assert_eq!(classify("text/csv"), Category::Document);
        assert_eq!(classify("application/zip"), Category::Other);
    }

    #[test]
    fn test_is_allowed_rejects_unknown() {
        assert!(!is_allowed("application/x-msdownload"));
        assert!(!is_allowed("text/html"));
        assert!(!is_allowed(""));
        assert!(is_allowed("image/jpeg"));
    }

    #[test]
    fn test_storage_dir_names() {
        assert_eq!(Category::Image.storage_dir(), "imagen");
        assert_eq!(Category::Document.storage_dir(), "documento");
        assert_eq!(Category::Pdf.storage_dir(), "pdf");
        assert_eq!(Category::Video.storage_dir(), "video");
        assert_eq!(Category::Other.storage_dir(), "otro");
    }

    #[test]
    fn test_parse_round_trip() {
        for cat in [
            Category::Image,
            Category::Document,
            Category::Pdf,
            Category::Video,
            Category::Other,
        ] {
            assert_eq!(Category::parse(cat.storage_dir()), Some(cat));
        }
        assert_eq!(Category::parse("image"), None);
    }

    #[test]
    fn test_serde_wire_names() {
        assert_eq!(serde_json::to_string(&Category::Image).unwrap(), "\"imagen\"");
        let c: Category = serde_json::from_str("\"otro\"").unwrap();
        assert_eq!(c, Category::Other);
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("foto.JPG"), Some(".jpg".to_string()));
        assert_eq!(extension_of("informe.final.pdf"), Some(".pdf".to_string()));
        assert_eq!(extension_of("sin_extension"), None);
        assert_eq!(extension_of(".gitignore"), None);
        assert_eq!(extension_of("raro."), None);
    }
}
