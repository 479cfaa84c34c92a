//! Core render tree types.

use std::fmt;
use std::ops::Range;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TREE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one render tree instance.
///
/// Ids come from a process-wide counter and are never reused, so a handle
/// minted by one parse can never alias an element of a later parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TreeId(u64);

impl TreeId {
    pub(crate) fn next() -> Self {
        Self(NEXT_TREE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw counter value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Opaque reference to one element of one render tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementHandle {
    tree: TreeId,
    index: u32,
}

impl ElementHandle {
    pub(crate) const fn new(tree: TreeId, index: u32) -> Self {
        Self { tree, index }
    }

    /// The tree this handle belongs to.
    pub const fn tree(self) -> TreeId {
        self.tree
    }

    /// Position of the element inside its tree.
    pub const fn index(self) -> usize {
        self.index as usize
    }
}

impl fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.tree, self.index)
    }
}

/// What a render tree element represents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementKind {
    /// Heading with level (1-6)
    Heading(u8),
    Paragraph,
    /// Fenced or indented code block
    CodeBlock { language: Option<String> },
    /// List item with nesting level
    ListItem(usize),
    TableRow,
    HorizontalRule,
    /// Inline link; occupies the line its text starts on
    Link { href: String, text: String },
    /// Inline image. `resolved` is set for local sources when a base directory is known.
    Image {
        alt: String,
        src: String,
        resolved: Option<PathBuf>,
    },
    /// Explicit HTML anchor (`<a id="..">`), zero lines tall
    Anchor,
}

/// One node of the render tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    handle: ElementHandle,
    kind: ElementKind,
    lines: Range<usize>,
    anchor: Option<String>,
}

impl Element {
    pub const fn handle(&self) -> ElementHandle {
        self.handle
    }

    pub const fn kind(&self) -> &ElementKind {
        &self.kind
    }

    /// Rendered line range covered by this element.
    pub fn lines(&self) -> Range<usize> {
        self.lines.clone()
    }

    /// Anchor id this element can be targeted by, if any.
    pub fn anchor(&self) -> Option<&str> {
        self.anchor.as_deref()
    }

    /// Link target, if this element is a link.
    pub fn href(&self) -> Option<&str> {
        match &self.kind {
            ElementKind::Link { href, .. } => Some(href),
            _ => None,
        }
    }
}

/// The output of one build pass: rendered lines plus the elements laid over them.
#[derive(Debug, Clone)]
pub struct RenderTree {
    id: TreeId,
    /// Normalized source text
    source: String,
    lines: Vec<RenderedLine>,
    elements: Vec<Element>,
}

impl RenderTree {
    pub(crate) fn new(id: TreeId, source: String) -> Self {
        Self {
            id,
            source,
            lines: Vec::new(),
            elements: Vec::new(),
        }
    }

    pub(crate) fn push_line(&mut self, line: RenderedLine) {
        self.lines.push(line);
    }

    pub(crate) fn push_element(
        &mut self,
        kind: ElementKind,
        lines: Range<usize>,
        anchor: Option<String>,
    ) -> ElementHandle {
        let index = u32::try_from(self.elements.len()).unwrap_or(u32::MAX);
        let handle = ElementHandle::new(self.id, index);
        self.elements.push(Element {
            handle,
            kind,
            lines,
            anchor,
        });
        handle
    }

    pub const fn id(&self) -> TreeId {
        self.id
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Get the total number of rendered lines.
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn lines(&self) -> &[RenderedLine] {
        &self.lines
    }

    /// Get a specific rendered line by index.
    pub fn line_at(&self, index: usize) -> Option<&RenderedLine> {
        self.lines.get(index)
    }

    /// Get visible lines for rendering.
    ///
    /// Returns lines from `offset` to `offset + count`.
    pub fn visible_lines(&self, offset: usize, count: usize) -> Vec<&RenderedLine> {
        self.lines.iter().skip(offset).take(count).collect()
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    /// Resolve a handle. Handles from other trees never resolve.
    pub fn element(&self, handle: ElementHandle) -> Option<&Element> {
        if handle.tree() != self.id {
            return None;
        }
        self.elements.get(handle.index())
    }

    /// All link elements in document order.
    pub fn links(&self) -> impl Iterator<Item = &Element> + '_ {
        self.elements
            .iter()
            .filter(|e| matches!(e.kind, ElementKind::Link { .. }))
    }

    /// All heading elements in document order.
    pub fn headings(&self) -> impl Iterator<Item = &Element> + '_ {
        self.elements
            .iter()
            .filter(|e| matches!(e.kind, ElementKind::Heading(_)))
    }
}

/// A single rendered line with styling information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedLine {
    /// The text content of the line
    content: String,
    /// The type of line (for styling)
    line_type: LineType,
    /// Optional inline-styled spans for rendering
    spans: Vec<InlineSpan>,
}

impl RenderedLine {
    /// Create a new rendered line.
    pub const fn new(content: String, line_type: LineType) -> Self {
        Self {
            content,
            line_type,
            spans: Vec::new(),
        }
    }

    /// Create a new rendered line with inline spans.
    pub const fn with_spans(content: String, line_type: LineType, spans: Vec<InlineSpan>) -> Self {
        Self {
            content,
            line_type,
            spans,
        }
    }

    /// Get the text content.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Get the line type.
    pub const fn line_type(&self) -> &LineType {
        &self.line_type
    }

    /// Get inline spans, if present.
    pub fn spans(&self) -> Option<&[InlineSpan]> {
        if self.spans.is_empty() {
            None
        } else {
            Some(&self.spans)
        }
    }
}

/// Inline style flags for a text span.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InlineStyle {
    pub emphasis: bool,
    pub strong: bool,
    pub code: bool,
    pub strikethrough: bool,
    pub link: bool,
    pub fg: Option<InlineColor>,
    pub bg: Option<InlineColor>,
}

/// RGB color for inline styling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InlineColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// A styled inline span.
///
/// `target` ties the span to the n-th link or image of its block so the
/// builder can find which wrapped line a link landed on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineSpan {
    text: String,
    style: InlineStyle,
    target: Option<usize>,
}

impl InlineSpan {
    pub const fn new(text: String, style: InlineStyle) -> Self {
        Self {
            text,
            style,
            target: None,
        }
    }

    #[must_use]
    pub(crate) const fn with_target(mut self, target: Option<usize>) -> Self {
        self.target = target;
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub const fn style(&self) -> InlineStyle {
        self.style
    }

    pub(crate) const fn target(&self) -> Option<usize> {
        self.target
    }
}

/// Type of a rendered line, used for styling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineType {
    /// Normal paragraph text
    Paragraph,
    /// Heading with level (1-6)
    Heading(u8),
    /// Code block line
    CodeBlock,
    /// Block quote line
    BlockQuote,
    /// List item with nesting level
    ListItem(usize),
    /// Table row
    Table,
    /// Horizontal rule
    HorizontalRule,
    /// Empty line
    Empty,
}

/// Style parameters for a build pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleConfig {
    /// Column at which paragraphs wrap
    pub wrap_width: u16,
    /// Prefix headings with `#` markers
    pub heading_markers: bool,
    /// Foreground for inline code spans
    pub code_fg: Option<InlineColor>,
    /// Background for inline code spans
    pub code_bg: Option<InlineColor>,
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            wrap_width: 80,
            heading_markers: true,
            code_fg: Some(InlineColor {
                r: 0xd7,
                g: 0x87,
                b: 0x5f,
            }),
            code_bg: None,
        }
    }
}

impl StyleConfig {
    /// Style applied to inline code spans.
    pub const fn code_span_style(&self) -> InlineStyle {
        InlineStyle {
            emphasis: false,
            strong: false,
            code: true,
            strikethrough: false,
            link: false,
            fg: self.code_fg,
            bg: self.code_bg,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_with_lines(count: usize) -> RenderTree {
        let mut tree = RenderTree::new(TreeId::next(), String::new());
        for i in 0..count {
            tree.push_line(RenderedLine::new(format!("Line {}", i + 1), LineType::Paragraph));
        }
        tree
    }

    #[test]
    fn test_tree_ids_are_never_reused() {
        let a = TreeId::next();
        let b = TreeId::next();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn test_rendered_line_type() {
        let line = RenderedLine::new("# Heading".to_string(), LineType::Heading(1));
        assert_eq!(line.line_type(), &LineType::Heading(1));
        assert!(line.spans().is_none());
    }

    #[test]
    fn test_visible_lines() {
        let tree = tree_with_lines(5);
        let visible = tree.visible_lines(1, 2);
        assert_eq!(visible.len(), 2);
        assert_eq!(visible[0].content(), "Line 2");
        assert_eq!(visible[1].content(), "Line 3");
    }

    #[test]
    fn test_visible_lines_beyond_end() {
        let tree = tree_with_lines(2);
        assert_eq!(tree.visible_lines(0, 10).len(), 2);
    }

    #[test]
    fn test_element_lookup_rejects_foreign_handles() {
        let mut first = tree_with_lines(1);
        let mut second = tree_with_lines(1);
        let a = first.push_element(ElementKind::Paragraph, 0..1, None);
        let b = second.push_element(ElementKind::Paragraph, 0..1, None);

        assert!(first.element(a).is_some());
        assert!(first.element(b).is_none(), "handle from another tree must not resolve");
        assert_eq!(a.index(), b.index());
        assert_ne!(a, b);
    }

    #[test]
    fn test_links_filter() {
        let mut tree = tree_with_lines(2);
        tree.push_element(ElementKind::Paragraph, 0..2, None);
        tree.push_element(
            ElementKind::Link {
                href: "#a".to_string(),
                text: "a".to_string(),
            },
            1..2,
            None,
        );
        let links: Vec<_> = tree.links().collect();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].href(), Some("#a"));
    }
}
