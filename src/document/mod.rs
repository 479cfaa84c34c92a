//! Markdown parsing and render tree construction.
//!
//! This module handles:
//! - Parsing markdown with comrak
//! - Building a [`RenderTree`] of block elements, links, images and anchors
//! - Wrapping block content into styled lines for a line-based viewport

mod builder;
mod types;

use std::borrow::Cow;
use std::path::Path;

use anyhow::{Context, Result};

pub use builder::{BuildHooks, build};
pub use types::{
    Element, ElementHandle, ElementKind, InlineColor, InlineSpan, InlineStyle, LineType,
    RenderTree, RenderedLine, StyleConfig, TreeId,
};

/// Image file extensions that are shown as a single image element.
const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "webp", "bmp", "tiff", "tif", "ico", "svg", "avif",
];

/// Convert CRLF and lone CR line endings to LF.
///
/// Borrows the input when there is nothing to convert.
pub fn normalize_line_endings(source: &str) -> Cow<'_, str> {
    if !source.contains('\r') {
        return Cow::Borrowed(source);
    }
    Cow::Owned(source.replace("\r\n", "\n").replace('\r', "\n"))
}

/// Prepare raw file bytes for rendering based on the file's extension.
///
/// Image files become a markdown image reference without their bytes being
/// decoded. Everything else must be UTF-8 and passes through unchanged.
pub fn prepare_content(file_path: &Path, raw_bytes: Vec<u8>) -> Result<String> {
    if is_image_file(file_path) {
        return Ok(image_markdown(file_path));
    }
    String::from_utf8(raw_bytes)
        .with_context(|| format!("{} is not valid UTF-8", file_path.display()))
}

/// Returns true if the file extension is a recognized image format.
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// Generate markdown content that displays an image file.
///
/// Uses angle brackets around the URL so filenames with spaces or
/// parentheses are parsed correctly by `CommonMark`.
pub fn image_markdown(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    format!("![{name}](<{name}>)")
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoLinks;

    impl BuildHooks for NoLinks {
        fn link(&mut self, _href: &str, _handle: ElementHandle) {}
    }

    fn images_in(md: &str) -> usize {
        build(md, &StyleConfig::default(), None, &mut NoLinks)
            .elements()
            .iter()
            .filter(|e| matches!(e.kind(), ElementKind::Image { .. }))
            .count()
    }

    #[test]
    fn test_normalize_line_endings() {
        assert_eq!(normalize_line_endings("a\r\nb\rc\n"), "a\nb\nc\n");
        assert!(matches!(normalize_line_endings("a\nb"), Cow::Borrowed(_)));
    }

    /// PNG signature followed by bytes that are never valid UTF-8.
    const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0xFF, 0xFE];

    #[test]
    fn test_prepare_content_passes_markdown_through() {
        let content = "# Hello\nworld";
        let result = prepare_content(Path::new("README.md"), content.as_bytes().to_vec()).unwrap();
        assert_eq!(result, content);
    }

    #[test]
    fn test_prepare_content_wraps_png_as_image() {
        let result = prepare_content(Path::new("photo.png"), PNG_BYTES.to_vec()).unwrap();
        assert_eq!(result, "![photo.png](<photo.png>)");
        assert_eq!(images_in(&result), 1);
    }

    #[test]
    fn test_prepare_content_rejects_non_utf8_markdown() {
        let err = prepare_content(Path::new("notes.md"), PNG_BYTES.to_vec()).unwrap_err();
        assert!(err.to_string().contains("notes.md"), "got: {err}");
    }

    #[test]
    fn test_image_extension_case_insensitive() {
        assert!(is_image_file(Path::new("photo.PNG")));
        assert!(!is_image_file(Path::new("notes.md")));
    }

    #[test]
    fn test_image_markdown_with_spaces_parses_as_image() {
        let md = image_markdown(Path::new("image support.png"));
        assert_eq!(images_in(&md), 1, "got markdown: {md}");
    }

    #[test]
    fn test_image_markdown_with_parens_parses_as_image() {
        let md = image_markdown(Path::new("photo (1).jpg"));
        assert_eq!(images_in(&md), 1, "got markdown: {md}");
    }
}
