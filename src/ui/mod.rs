//! Terminal-side view state.
//!
//! - [`viewport`]: Scroll position, visible range and anchor scroll animation

pub mod viewport;

use crate::document::RenderTree;
use viewport::Viewport;

pub const DOCUMENT_LEFT_PADDING: u16 = 2;

/// Plain text of the lines currently inside `viewport`, left-padded.
pub fn visible_text(tree: &RenderTree, viewport: &Viewport) -> Vec<String> {
    let range = viewport.visible_range();
    let pad = " ".repeat(DOCUMENT_LEFT_PADDING as usize);
    tree.visible_lines(range.start, range.len())
        .into_iter()
        .map(|line| format!("{pad}{}", line.content()).trim_end().to_string())
        .collect()
}
