//! Render tree construction from comrak's AST.

use std::path::{Path, PathBuf};

use comrak::nodes::{AstNode, ListDelimType, ListType, NodeValue};
use comrak::{Arena, Options, parse_document};
use unicode_width::UnicodeWidthStr;

use super::types::{
    ElementHandle, ElementKind, InlineSpan, InlineStyle, LineType, RenderTree, RenderedLine,
    StyleConfig, TreeId,
};
use crate::anchor;

/// Callbacks the builder invokes while constructing a tree.
pub trait BuildHooks {
    /// Called once per link element, right after it is added to the tree.
    fn link(&mut self, href: &str, handle: ElementHandle);

    /// Style an inline code span.
    fn format_code_span(&mut self, text: &str) -> InlineSpan {
        let style = InlineStyle {
            code: true,
            ..InlineStyle::default()
        };
        InlineSpan::new(text.to_string(), style)
    }
}

/// Parse `source` and build a render tree from it.
///
/// `base_dir` resolves relative image sources to local paths.
///
/// # Example
///
/// ```
/// use markjump::document::{BuildHooks, ElementHandle, StyleConfig, build};
///
/// struct NoLinks;
/// impl BuildHooks for NoLinks {
///     fn link(&mut self, _href: &str, _handle: ElementHandle) {}
/// }
///
/// let tree = build("# Hello\n\nWorld", &StyleConfig::default(), None, &mut NoLinks);
/// assert_eq!(tree.headings().count(), 1);
/// ```
pub fn build(
    source: &str,
    style: &StyleConfig,
    base_dir: Option<&Path>,
    hooks: &mut dyn BuildHooks,
) -> RenderTree {
    let arena = Arena::new();
    let mut options = Options::default();
    // Enable GFM extensions
    options.extension.strikethrough = true;
    options.extension.table = true;
    options.extension.autolink = true;
    options.extension.tasklist = true;
    let root = parse_document(&arena, source, &options);

    let mut builder = Builder {
        tree: RenderTree::new(TreeId::next(), source.to_string()),
        style,
        base_dir,
        hooks,
        quote_depth: 0,
    };
    builder.process_node(root, 0, None);
    builder.tree
}

/// A link or image found while collecting a block's inline content.
enum InlineTarget {
    Link { href: String, text: String },
    Image { alt: String, src: String },
}

#[derive(Default)]
struct InlineContent {
    spans: Vec<InlineSpan>,
    targets: Vec<InlineTarget>,
    anchors: Vec<String>,
}

struct Builder<'s, 'h> {
    tree: RenderTree,
    style: &'s StyleConfig,
    base_dir: Option<&'s Path>,
    hooks: &'h mut dyn BuildHooks,
    quote_depth: usize,
}

impl Builder<'_, '_> {
    fn wrap_width(&self) -> usize {
        usize::from(self.style.wrap_width.max(1))
    }

    fn quote_prefix(&self) -> String {
        "│ ".repeat(self.quote_depth)
    }

    fn text_line_type(&self) -> LineType {
        if self.quote_depth > 0 {
            LineType::BlockQuote
        } else {
            LineType::Paragraph
        }
    }

    fn process_node<'a>(&mut self, node: &'a AstNode<'a>, depth: usize, list_marker: Option<&str>) {
        match &node.data.borrow().value {
            NodeValue::Heading(heading) => {
                let mut content = self.collect_inline(node);
                let rendered = spans_to_string(&content.spans);
                let (text, explicit) = anchor::split_explicit_id(&rendered);
                let id = explicit.map_or_else(|| anchor::slugify(text), ToString::to_string);
                if explicit.is_some() {
                    let keep = text.chars().count();
                    truncate_spans_in_place(&mut content.spans, keep);
                }

                if self.tree.line_count() > 0 {
                    self.ensure_trailing_empty_lines(1);
                }
                let prefix = if self.style.heading_markers {
                    format!("{}{} ", self.quote_prefix(), "#".repeat(usize::from(heading.level)))
                } else {
                    self.quote_prefix()
                };
                let width = self.wrap_width();
                self.emit_block(
                    ElementKind::Heading(heading.level),
                    LineType::Heading(heading.level),
                    content,
                    (&prefix, &prefix),
                    Some(id).filter(|id| !id.is_empty()),
                    width,
                );
                self.push_empty_line();
            }

            NodeValue::Paragraph => {
                let content = self.collect_inline(node);
                let prefix = self.quote_prefix();
                let line_type = self.text_line_type();
                let width = self.wrap_width();
                self.emit_block(
                    ElementKind::Paragraph,
                    line_type,
                    content,
                    (&prefix, &prefix),
                    None,
                    width,
                );
                self.push_empty_line();
            }

            NodeValue::BlockQuote => {
                self.quote_depth += 1;
                for child in node.children() {
                    self.process_node(child, depth, None);
                }
                self.quote_depth -= 1;
                self.ensure_trailing_empty_lines(1);
            }

            NodeValue::CodeBlock(code_block) => {
                let language = code_block
                    .info
                    .split_whitespace()
                    .next()
                    .filter(|s| !s.is_empty())
                    .map(ToString::to_string);
                self.render_code_block(&code_block.literal, language);
            }

            NodeValue::List(list) => {
                let list_depth = depth + 1;
                let start = list.start;
                let delimiter = match list.delimiter {
                    ListDelimType::Paren => ')',
                    ListDelimType::Period => '.',
                };
                let list_len = node.children().count();
                let number_width = (start + list_len.saturating_sub(1)).to_string().len();

                for (index, child) in node.children().enumerate() {
                    let marker = match list.list_type {
                        ListType::Bullet => "• ".to_string(),
                        ListType::Ordered => {
                            format!("{:>number_width$}{delimiter} ", start + index)
                        }
                    };
                    self.process_node(child, list_depth, Some(&marker));
                }
                if depth == 0 {
                    self.push_empty_line();
                }
            }

            NodeValue::Item(_) | NodeValue::TaskItem(_) => {
                self.render_list_item(node, depth, list_marker);
            }

            NodeValue::Table(_) => {
                self.render_table(node);
                self.push_empty_line();
            }

            NodeValue::ThematicBreak => {
                let line = self.tree.line_count();
                let width = self.wrap_width().min(40);
                self.tree
                    .push_line(RenderedLine::new("─".repeat(width), LineType::HorizontalRule));
                self.tree
                    .push_element(ElementKind::HorizontalRule, line..line + 1, None);
                self.push_empty_line();
            }

            NodeValue::HtmlBlock(html) => {
                let line = self.tree.line_count();
                for id in anchor::html_anchor_ids(&html.literal) {
                    self.tree.push_element(ElementKind::Anchor, line..line, Some(id));
                }
            }

            _ => {
                for child in node.children() {
                    self.process_node(child, depth, list_marker);
                }
            }
        }
    }

    fn render_list_item<'a>(&mut self, node: &'a AstNode<'a>, depth: usize, list_marker: Option<&str>) {
        let indent = "  ".repeat(depth.saturating_sub(1));
        let marker = find_task_marker(node).map_or_else(
            || list_marker.unwrap_or("- ").to_string(),
            |task| format!("{task} "),
        );
        let prefix_first = format!("{}{indent}{marker}", self.quote_prefix());
        let prefix_next = format!(
            "{}{indent}{}",
            self.quote_prefix(),
            " ".repeat(UnicodeWidthStr::width(marker.as_str()))
        );
        let width = self.wrap_width();
        let mut rendered_any = false;

        for child in node.children() {
            let is_paragraph = matches!(child.data.borrow().value, NodeValue::Paragraph);
            if is_paragraph {
                let content = self.collect_inline(child);
                let first = if rendered_any {
                    &prefix_next
                } else {
                    &prefix_first
                };
                self.emit_block(
                    ElementKind::ListItem(depth),
                    LineType::ListItem(depth),
                    content,
                    (first, &prefix_next),
                    None,
                    width,
                );
                rendered_any = true;
            } else {
                self.process_node(child, depth, None);
            }
        }

        if !rendered_any {
            let content = self.collect_inline(node);
            self.emit_block(
                ElementKind::ListItem(depth),
                LineType::ListItem(depth),
                content,
                (&prefix_first, &prefix_next),
                None,
                width,
            );
        }
    }

    fn render_code_block(&mut self, literal: &str, language: Option<String>) {
        const CODE_RIGHT_PADDING: usize = 3;
        let content_width = literal
            .lines()
            .map(UnicodeWidthStr::width)
            .max()
            .unwrap_or(0)
            .min(self.wrap_width().saturating_sub(4).max(1));
        let label = format!(" {} ", language.as_deref().unwrap_or("code"));
        let frame_inner_width = content_width + 2 + CODE_RIGHT_PADDING;
        let visible_label: String = label.chars().take(frame_inner_width).collect();

        let start = self.tree.line_count();
        self.tree.push_line(RenderedLine::new(
            format!(
                "┌{visible_label}{}┐",
                "─".repeat(frame_inner_width.saturating_sub(visible_label.chars().count()))
            ),
            LineType::CodeBlock,
        ));
        for raw_line in literal.lines() {
            let code_style = InlineStyle {
                code: true,
                ..InlineStyle::default()
            };
            let trimmed: String = raw_line.chars().take(content_width).collect();
            let padding = " ".repeat(
                content_width.saturating_sub(UnicodeWidthStr::width(trimmed.as_str()))
                    + CODE_RIGHT_PADDING,
            );
            let spans = vec![
                InlineSpan::new("│ ".to_string(), InlineStyle::default()),
                InlineSpan::new(trimmed, code_style),
                InlineSpan::new(format!("{padding}│"), InlineStyle::default()),
            ];
            let content = spans_to_string(&spans);
            self.tree
                .push_line(RenderedLine::with_spans(content, LineType::CodeBlock, spans));
        }
        self.tree.push_line(RenderedLine::new(
            format!("└{}┘", "─".repeat(frame_inner_width)),
            LineType::CodeBlock,
        ));
        let end = self.tree.line_count();
        self.tree
            .push_element(ElementKind::CodeBlock { language }, start..end, None);
        self.push_empty_line();
    }

    fn render_table<'a>(&mut self, table: &'a AstNode<'a>) {
        let mut rows: Vec<Vec<InlineContent>> = Vec::new();
        for row in table.children() {
            let mut cells = Vec::new();
            for cell in row.children() {
                cells.push(self.collect_inline(cell));
            }
            rows.push(cells);
        }

        let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
        let mut widths = vec![0usize; columns];
        for row in &rows {
            for (col, cell) in row.iter().enumerate() {
                let width = UnicodeWidthStr::width(spans_to_string(&cell.spans).as_str());
                widths[col] = widths[col].max(width);
            }
        }

        for row in rows {
            let mut merged = InlineContent::default();
            for (col, cell) in row.into_iter().enumerate() {
                let used = UnicodeWidthStr::width(spans_to_string(&cell.spans).as_str());
                let base = merged.targets.len();
                merged
                    .spans
                    .push(InlineSpan::new("│ ".to_string(), InlineStyle::default()));
                merged.spans.extend(cell.spans.into_iter().map(|span| {
                    let target = span.target().map(|t| t + base);
                    span.with_target(target)
                }));
                merged.spans.push(InlineSpan::new(
                    " ".repeat(widths[col].saturating_sub(used) + 1),
                    InlineStyle::default(),
                ));
                merged.targets.extend(cell.targets);
                merged.anchors.extend(cell.anchors);
            }
            merged
                .spans
                .push(InlineSpan::new("│".to_string(), InlineStyle::default()));
            self.emit_block(
                ElementKind::TableRow,
                LineType::Table,
                merged,
                ("", ""),
                None,
                usize::MAX,
            );
        }
    }

    /// Wrap `content` into lines and record the block plus its inline elements.
    fn emit_block(
        &mut self,
        kind: ElementKind,
        line_type: LineType,
        content: InlineContent,
        (prefix_first, prefix_next): (&str, &str),
        anchor: Option<String>,
        width: usize,
    ) -> ElementHandle {
        let wrapped = wrap_spans(&content.spans, width, prefix_first, prefix_next);
        let start = self.tree.line_count();
        let mut target_lines: Vec<Option<usize>> = vec![None; content.targets.len()];

        for (offset, line_spans) in wrapped.into_iter().enumerate() {
            for span in &line_spans {
                if let Some(target) = span.target()
                    && let Some(slot) = target_lines.get_mut(target)
                    && slot.is_none()
                {
                    *slot = Some(start + offset);
                }
            }
            let text = spans_to_string(&line_spans);
            self.tree
                .push_line(RenderedLine::with_spans(text, line_type, line_spans));
        }

        let end = self.tree.line_count();
        let handle = self.tree.push_element(kind, start..end, anchor);

        for id in content.anchors {
            self.tree
                .push_element(ElementKind::Anchor, start..start, Some(id));
        }

        for (target, line) in content.targets.into_iter().zip(target_lines) {
            let line = line.unwrap_or(start);
            match target {
                InlineTarget::Link { href, text } => {
                    let link = self.tree.push_element(
                        ElementKind::Link {
                            href: href.clone(),
                            text,
                        },
                        line..line + 1,
                        None,
                    );
                    self.hooks.link(&href, link);
                }
                InlineTarget::Image { alt, src } => {
                    let resolved = resolve_image_path(&src, self.base_dir);
                    self.tree.push_element(
                        ElementKind::Image { alt, src, resolved },
                        line..line + 1,
                        None,
                    );
                }
            }
        }

        handle
    }

    fn collect_inline<'a>(&mut self, node: &'a AstNode<'a>) -> InlineContent {
        let mut content = InlineContent::default();
        for child in node.children() {
            self.collect_inline_recursive(child, InlineStyle::default(), None, &mut content);
        }
        content
    }

    fn collect_inline_recursive<'a>(
        &mut self,
        node: &'a AstNode<'a>,
        style: InlineStyle,
        target: Option<usize>,
        content: &mut InlineContent,
    ) {
        match &node.data.borrow().value {
            NodeValue::List(_) | NodeValue::Item(_) => {}
            NodeValue::Text(text) => {
                content
                    .spans
                    .push(InlineSpan::new(text.clone(), style).with_target(target));
            }
            NodeValue::Code(code) => {
                let span = self.hooks.format_code_span(&code.literal);
                content.spans.push(span.with_target(target));
            }
            NodeValue::Emph => {
                let next = InlineStyle {
                    emphasis: true,
                    ..style
                };
                self.collect_children(node, next, target, content);
            }
            NodeValue::Strong => {
                let next = InlineStyle {
                    strong: true,
                    ..style
                };
                self.collect_children(node, next, target, content);
            }
            NodeValue::Strikethrough => {
                let next = InlineStyle {
                    strikethrough: true,
                    ..style
                };
                self.collect_children(node, next, target, content);
            }
            NodeValue::Link(link) => {
                let index = content.targets.len();
                content.targets.push(InlineTarget::Link {
                    href: link.url.clone(),
                    text: extract_text(node),
                });
                let next = InlineStyle { link: true, ..style };
                self.collect_children(node, next, Some(index), content);
            }
            NodeValue::Image(image) => {
                let index = content.targets.len();
                let alt = extract_text(node);
                let label = if alt.is_empty() { &image.url } else { &alt };
                content
                    .spans
                    .push(InlineSpan::new(format!("[Image: {label}]"), style).with_target(Some(index)));
                content.targets.push(InlineTarget::Image {
                    alt,
                    src: image.url.clone(),
                });
            }
            NodeValue::HtmlInline(html) => {
                content.anchors.extend(anchor::html_anchor_ids(html));
            }
            NodeValue::SoftBreak | NodeValue::LineBreak => {
                content
                    .spans
                    .push(InlineSpan::new(" ".to_string(), style).with_target(target));
            }
            _ => self.collect_children(node, style, target, content),
        }
    }

    fn collect_children<'a>(
        &mut self,
        node: &'a AstNode<'a>,
        style: InlineStyle,
        target: Option<usize>,
        content: &mut InlineContent,
    ) {
        for child in node.children() {
            self.collect_inline_recursive(child, style, target, content);
        }
    }

    fn push_empty_line(&mut self) {
        self.tree
            .push_line(RenderedLine::new(String::new(), LineType::Empty));
    }

    fn ensure_trailing_empty_lines(&mut self, count: usize) {
        let existing = self
            .tree
            .lines()
            .iter()
            .rev()
            .take_while(|line| matches!(line.line_type(), LineType::Empty))
            .count();
        for _ in existing..count {
            self.push_empty_line();
        }
    }
}

/// Resolve a local image source against `base_dir`. Remote and data URLs stay unresolved.
fn resolve_image_path(src: &str, base_dir: Option<&Path>) -> Option<PathBuf> {
    if src.is_empty() || src.contains("://") || src.starts_with("data:") {
        return None;
    }
    let path = Path::new(src);
    if path.is_absolute() {
        return Some(path.to_path_buf());
    }
    base_dir.map(|dir| dir.join(path))
}

fn find_task_marker<'a>(node: &'a AstNode<'a>) -> Option<&'static str> {
    if let NodeValue::TaskItem(symbol) = &node.data.borrow().value {
        return Some(if symbol.is_some() { "✓" } else { "□" });
    }
    None
}

fn extract_text<'a>(node: &'a AstNode<'a>) -> String {
    let mut text = String::new();
    extract_text_recursive(node, &mut text);
    text
}

fn extract_text_recursive<'a>(node: &'a AstNode<'a>, text: &mut String) {
    match &node.data.borrow().value {
        NodeValue::Text(t) => text.push_str(t),
        NodeValue::Code(c) => text.push_str(&c.literal),
        NodeValue::SoftBreak | NodeValue::LineBreak => text.push(' '),
        _ => {
            for child in node.children() {
                extract_text_recursive(child, text);
            }
        }
    }
}

fn wrap_spans(
    spans: &[InlineSpan],
    width: usize,
    prefix_first: &str,
    prefix_next: &str,
) -> Vec<Vec<InlineSpan>> {
    let tokens: Vec<InlineSpan> = spans.iter().flat_map(split_inline_tokens).collect();

    let mut lines: Vec<Vec<InlineSpan>> = Vec::new();
    let mut current: Vec<InlineSpan> = Vec::new();
    let mut current_len = 0usize;
    let mut has_word = false;

    let start_new_line = |prefix: &str,
                          current: &mut Vec<InlineSpan>,
                          current_len: &mut usize,
                          has_word: &mut bool| {
        current.clear();
        *current_len = UnicodeWidthStr::width(prefix);
        if !prefix.is_empty() {
            current.push(InlineSpan::new(prefix.to_string(), InlineStyle::default()));
        }
        *has_word = false;
    };

    start_new_line(prefix_first, &mut current, &mut current_len, &mut has_word);

    for token in tokens {
        let token_len = UnicodeWidthStr::width(token.text());
        let token_is_ws = token.text().chars().all(char::is_whitespace);

        if current_len.saturating_add(token_len) > width && has_word {
            lines.push(std::mem::take(&mut current));
            start_new_line(prefix_next, &mut current, &mut current_len, &mut has_word);
        }

        if token_is_ws && !has_word {
            // Drop leading whitespace at wrapped line starts.
            continue;
        }

        current_len += token_len;
        current.push(token);
        if !token_is_ws {
            has_word = true;
        }
    }

    lines.push(current);
    lines
}

fn split_inline_tokens(span: &InlineSpan) -> Vec<InlineSpan> {
    let mut out = Vec::new();
    let mut buf = String::new();
    let mut ws_state: Option<bool> = None;

    for ch in span.text().chars() {
        let is_ws = ch.is_whitespace();
        match ws_state {
            Some(state) if state == is_ws => buf.push(ch),
            Some(_) => {
                out.push(
                    InlineSpan::new(std::mem::take(&mut buf), span.style())
                        .with_target(span.target()),
                );
                buf.push(ch);
                ws_state = Some(is_ws);
            }
            None => {
                buf.push(ch);
                ws_state = Some(is_ws);
            }
        }
    }

    if !buf.is_empty() {
        out.push(InlineSpan::new(buf, span.style()).with_target(span.target()));
    }

    out
}

fn spans_to_string(spans: &[InlineSpan]) -> String {
    spans.iter().map(InlineSpan::text).collect()
}

/// Keep only the first `keep` characters of `spans`, then drop trailing whitespace.
fn truncate_spans_in_place(spans: &mut Vec<InlineSpan>, keep: usize) {
    let mut remaining = keep;
    let mut out = Vec::with_capacity(spans.len());
    for span in spans.drain(..) {
        if remaining == 0 {
            break;
        }
        let taken: String = span.text().chars().take(remaining).collect();
        remaining -= taken.chars().count();
        out.push(InlineSpan::new(taken, span.style()).with_target(span.target()));
    }
    while let Some(last) = out.last_mut() {
        let trimmed = last.text().trim_end().to_string();
        if trimmed.is_empty() {
            out.pop();
        } else {
            *last = InlineSpan::new(trimmed, last.style()).with_target(last.target());
            break;
        }
    }
    *spans = out;
}
