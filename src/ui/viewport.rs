//! Viewport management for scrolling.
//!
//! The [`Viewport`] struct tracks the visible area of the document,
//! handles manual scroll operations and runs anchor scroll animations.

use std::ops::Range;
use std::time::{Duration, Instant};

use crate::document::{ElementHandle, RenderTree, TreeId};
use crate::scroll::{ScrollAnimation, ScrollStep, ScrollView};

/// First rendered line of every element of the installed tree.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Layout {
    tree: TreeId,
    first_lines: Vec<usize>,
}

/// Manages the visible portion of a document.
///
/// The viewport tracks:
/// - Terminal dimensions (width, height)
/// - Current scroll offset (in lines)
/// - Total document length
/// - Where each element of the installed tree starts
///
/// # Example
///
/// ```
/// use markjump::ui::viewport::Viewport;
///
/// let mut vp = Viewport::new(80, 24, 100);
/// assert_eq!(vp.visible_range(), 0..24);
///
/// vp.scroll_down(10);
/// assert_eq!(vp.visible_range(), 10..34);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Viewport {
    width: u16,
    height: u16,
    offset: usize,
    total_lines: usize,
    header_inset: u16,
    layout: Option<Layout>,
    animation: Option<ScrollAnimation>,
}

impl Viewport {
    /// Create a new viewport.
    ///
    /// # Arguments
    ///
    /// * `width` - Terminal width in columns
    /// * `height` - Terminal height in lines (for document area)
    /// * `total_lines` - Total lines in the document
    pub const fn new(width: u16, height: u16, total_lines: usize) -> Self {
        Self {
            width,
            height,
            offset: 0,
            total_lines,
            header_inset: 0,
            layout: None,
            animation: None,
        }
    }

    /// Reserve `lines` rows at the top for fixed chrome (status bar, breadcrumbs).
    #[must_use]
    pub const fn with_header_inset(mut self, lines: u16) -> Self {
        self.header_inset = lines;
        self
    }

    /// Get the current scroll offset.
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// Get the viewport width.
    pub const fn width(&self) -> u16 {
        self.width
    }

    /// Get the viewport height.
    pub const fn height(&self) -> u16 {
        self.height
    }

    /// Get the total number of lines in the document.
    pub const fn total_lines(&self) -> usize {
        self.total_lines
    }

    pub const fn is_animating(&self) -> bool {
        self.animation.is_some()
    }

    /// Where the in-flight animation will land, if any.
    pub fn animation_target(&self) -> Option<f64> {
        self.animation.as_ref().map(ScrollAnimation::target)
    }

    /// Get the range of visible lines.
    ///
    /// Returns a range from the current offset to offset + height,
    /// clamped to the document bounds.
    pub fn visible_range(&self) -> Range<usize> {
        let start = self.offset;
        let end = (self.offset + self.height as usize).min(self.total_lines);
        start..end
    }

    /// Get the scroll percentage (0-100).
    pub fn scroll_percent(&self) -> u8 {
        let max_offset = self.max_offset();
        if self.total_lines == 0 || max_offset == 0 {
            return 100;
        }

        // Percentage value always 0-100
        #[allow(
            clippy::cast_precision_loss,
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss
        )]
        {
            ((self.offset as f64 / max_offset as f64) * 100.0).round() as u8
        }
    }

    /// Scroll up by n lines. Cancels any anchor animation.
    pub const fn scroll_up(&mut self, n: usize) {
        self.animation = None;
        self.offset = self.offset.saturating_sub(n);
    }

    /// Scroll down by n lines. Cancels any anchor animation.
    pub fn scroll_down(&mut self, n: usize) {
        self.animation = None;
        self.offset = (self.offset + n).min(self.max_offset());
    }

    /// Scroll up one page.
    pub const fn page_up(&mut self) {
        self.scroll_up(self.height as usize);
    }

    /// Scroll down one page.
    pub fn page_down(&mut self) {
        self.scroll_down(self.height as usize);
    }

    /// Go to the beginning of the document.
    pub const fn go_to_top(&mut self) {
        self.animation = None;
        self.offset = 0;
    }

    /// Go to the end of the document.
    pub const fn go_to_bottom(&mut self) {
        self.animation = None;
        self.offset = self.max_offset();
    }

    /// Go to a specific line.
    ///
    /// The line will be positioned at the top of the viewport.
    pub fn go_to_line(&mut self, line: usize) {
        self.animation = None;
        self.offset = line.min(self.max_offset());
    }

    /// Resize the viewport.
    pub fn resize(&mut self, width: u16, height: u16) {
        self.width = width;
        self.height = height;
        // Clamp offset if document is now shorter than viewport
        self.offset = self.offset.min(self.max_offset());
    }

    /// Update the total number of lines (e.g., after reload).
    pub fn set_total_lines(&mut self, total: usize) {
        self.total_lines = total;
        self.offset = self.offset.min(self.max_offset());
    }

    /// Calculate the maximum valid offset.
    const fn max_offset(&self) -> usize {
        self.total_lines.saturating_sub(self.height as usize)
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn clamp_to_line(&self, offset: f64) -> usize {
        (offset.round().max(0.0) as usize).min(self.max_offset())
    }
}

#[allow(clippy::cast_precision_loss)]
impl ScrollView for Viewport {
    fn element_offset(&self, element: ElementHandle) -> Option<f64> {
        let layout = self.layout.as_ref().filter(|l| l.tree == element.tree())?;
        let line = *layout.first_lines.get(element.index())?;
        Some(line as f64 - self.offset as f64)
    }

    fn scroll_offset(&self) -> f64 {
        self.offset as f64
    }

    fn header_inset(&self) -> f64 {
        f64::from(self.header_inset)
    }

    fn animate_to(&mut self, offset: f64, duration: Duration) {
        let target = self.clamp_to_line(offset);
        self.animation = Some(ScrollAnimation::new(
            self.offset as f64,
            target as f64,
            duration,
        ));
    }

    fn advance(&mut self, now: Instant) -> ScrollStep {
        let Some(animation) = self.animation.as_mut() else {
            return ScrollStep::Idle;
        };
        let (position, done) = animation.sample(now);
        self.offset = self.clamp_to_line(position);
        if done {
            self.animation = None;
            ScrollStep::Settled(self.offset as f64)
        } else {
            ScrollStep::Moving(position)
        }
    }

    fn install(&mut self, tree: &RenderTree) {
        self.layout = Some(Layout {
            tree: tree.id(),
            first_lines: tree.elements().iter().map(|e| e.lines().start).collect(),
        });
        self.animation = None;
        self.set_total_lines(tree.line_count());
    }
}
