//! Render passes and their lifecycle.
//!
//! A [`RenderSession`] is one parse-and-build pass: the tree, its anchor map
//! and one link handler per link element. A [`DocumentView`] owns the
//! current session for one scrollable view and retires the previous pass
//! whenever it renders again.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Instant;

use thiserror::Error;

use crate::anchor::AnchorMap;
use crate::bus::{BusPublisher, EventBus};
use crate::document::{
    BuildHooks, ElementHandle, InlineSpan, InlineStyle, RenderTree, StyleConfig, build,
    normalize_line_endings,
};
use crate::link::{ExternalLinkCallback, LinkInteractionHandler, LinkOutcome, LinkTargets};
use crate::perf::{self, NavEvent, Stage};
use crate::scroll::{ScrollCoordinator, ScrollStep, ScrollView};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    #[error("document view has been disposed")]
    Disposed,
    #[error("document view has not rendered anything yet")]
    NotRendered,
}

/// Collects links while the tree is being built.
struct SessionHooks {
    code_style: InlineStyle,
    links: Vec<(String, ElementHandle)>,
}

impl BuildHooks for SessionHooks {
    fn link(&mut self, href: &str, handle: ElementHandle) {
        self.links.push((href.to_string(), handle));
    }

    fn format_code_span(&mut self, text: &str) -> InlineSpan {
        InlineSpan::new(text.to_string(), self.code_style)
    }
}

/// One parse-and-build pass.
///
/// Every handler the session hands out, registered or not, shares one
/// liveness flag. Releasing or dropping the session clears it, so clones
/// retained elsewhere become inert.
pub struct RenderSession {
    tree: RenderTree,
    live: Rc<Cell<bool>>,
    anchors: Rc<AnchorMap>,
    targets: LinkTargets,
    style: StyleConfig,
    on_external: Option<ExternalLinkCallback>,
    publisher: BusPublisher,
}

impl fmt::Debug for RenderSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderSession")
            .field("tree", &self.tree.id())
            .field("anchors", &self.anchors.len())
            .field("links", &self.targets.len())
            .finish_non_exhaustive()
    }
}

impl RenderSession {
    /// Parse `markdown` and wire up a handler for every link.
    ///
    /// Relative image sources are resolved against `base_dir`.
    pub fn build(
        markdown: &str,
        style: &StyleConfig,
        base_dir: Option<&Path>,
        on_external: Option<ExternalLinkCallback>,
        bus: &EventBus,
    ) -> Self {
        let _timer = perf::time(Stage::SessionBuild);
        let source = normalize_line_endings(markdown);
        let mut hooks = SessionHooks {
            code_style: style.code_span_style(),
            links: Vec::new(),
        };
        let tree = build(&source, style, base_dir, &mut hooks);
        let anchors = Rc::new(AnchorMap::build(&tree));

        let publisher = bus.publisher();
        let live = Rc::new(Cell::new(true));
        let mut targets = LinkTargets::new();
        for (href, handle) in hooks.links {
            let Some(element) = tree.element(handle) else {
                continue;
            };
            let handler = LinkInteractionHandler::new(
                &href,
                Rc::clone(&anchors),
                on_external.clone(),
                publisher.clone(),
            )
            .in_pass(Rc::clone(&live));
            targets.register(handle, element.lines().start, handler);
        }

        tracing::debug!(
            tree = %tree.id(),
            lines = tree.line_count(),
            anchors = anchors.len(),
            links = targets.len(),
            "render session built"
        );
        perf::record(NavEvent::SessionBuilt {
            tree: tree.id(),
            lines: tree.line_count(),
            anchors: anchors.len(),
            links: targets.len(),
        });

        Self {
            tree,
            live,
            anchors,
            targets,
            style: style.clone(),
            on_external,
            publisher,
        }
    }

    pub const fn tree(&self) -> &RenderTree {
        &self.tree
    }

    pub const fn anchors(&self) -> &Rc<AnchorMap> {
        &self.anchors
    }

    pub const fn targets(&self) -> &LinkTargets {
        &self.targets
    }

    pub const fn style(&self) -> &StyleConfig {
        &self.style
    }

    /// Handler for `href`: the registered one if the document links to it,
    /// otherwise a fresh handler bound to this pass's anchors.
    pub fn handler_for(&self, href: &str) -> LinkInteractionHandler {
        self.targets.handler_for_href(href).cloned().unwrap_or_else(|| {
            LinkInteractionHandler::new(
                href,
                Rc::clone(&self.anchors),
                self.on_external.clone(),
                self.publisher.clone(),
            )
            .in_pass(Rc::clone(&self.live))
        })
    }

    pub fn is_live(&self) -> bool {
        self.live.get()
    }

    /// Release every handler of this pass. Idempotent.
    pub fn release(&self) {
        self.live.set(false);
        self.targets.release_all();
    }

    fn is_unchanged(&self, markdown: &str, style: &StyleConfig) -> bool {
        self.style == *style && self.tree.source() == normalize_line_endings(markdown)
    }
}

impl Drop for RenderSession {
    fn drop(&mut self) {
        self.release();
    }
}

/// Lifecycle of a [`DocumentView`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewState {
    Uninitialized,
    /// Showing the pass with this version (starting at 1)
    Rendered(u64),
    Disposed,
}

/// The current render pass of one scrollable view.
///
/// Rendering builds the new pass first, then releases the old pass's
/// handlers, installs the new tree into the view and re-attaches the scroll
/// coordinator. Exactly one coordinator subscription exists while the view
/// is rendered.
pub struct DocumentView<V: ScrollView + 'static> {
    bus: EventBus,
    view: Rc<RefCell<V>>,
    coordinator: ScrollCoordinator<V>,
    base_dir: Option<PathBuf>,
    on_external: Option<ExternalLinkCallback>,
    session: Option<RenderSession>,
    state: ViewState,
}

impl<V: ScrollView + 'static> fmt::Debug for DocumentView<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentView")
            .field("state", &self.state)
            .field("session", &self.session)
            .field("coordinator", &self.coordinator)
            .finish_non_exhaustive()
    }
}

impl<V: ScrollView + 'static> DocumentView<V> {
    pub fn new(bus: EventBus, view: Rc<RefCell<V>>) -> Self {
        Self {
            coordinator: ScrollCoordinator::new(bus.clone()),
            bus,
            view,
            base_dir: None,
            on_external: None,
            session: None,
            state: ViewState::Uninitialized,
        }
    }

    /// Directory relative image sources are resolved against.
    #[must_use]
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// Callback for links that do not resolve to an anchor in the document.
    #[must_use]
    pub fn with_external_link(mut self, callback: impl Fn(&str) + 'static) -> Self {
        self.on_external = Some(Rc::new(callback));
        self
    }

    pub const fn state(&self) -> ViewState {
        self.state
    }

    pub const fn session(&self) -> Option<&RenderSession> {
        self.session.as_ref()
    }

    pub const fn view(&self) -> &Rc<RefCell<V>> {
        &self.view
    }

    pub const fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Build a new pass from `markdown` and make it current.
    pub fn render(
        &mut self,
        markdown: &str,
        style: &StyleConfig,
    ) -> Result<&RenderSession, SessionError> {
        let version = match self.state {
            ViewState::Disposed => return Err(SessionError::Disposed),
            ViewState::Uninitialized => 1,
            ViewState::Rendered(v) => v + 1,
        };
        let _timer = perf::time(Stage::ViewRender);

        let next = RenderSession::build(
            markdown,
            style,
            self.base_dir.as_deref(),
            self.on_external.clone(),
            &self.bus,
        );

        if let Some(previous) = self.session.take() {
            previous.release();
            tracing::debug!(tree = %previous.tree().id(), "render session superseded");
        }
        self.coordinator.detach();
        self.view.borrow_mut().install(next.tree());
        self.coordinator.attach(&self.view);

        self.state = ViewState::Rendered(version);
        perf::record(NavEvent::SessionInstalled {
            version,
            tree: next.tree().id(),
        });
        Ok(&*self.session.insert(next))
    }

    /// Re-render only if the text or the style changed.
    ///
    /// Returns whether a new pass was built.
    pub fn rerender_if_changed(
        &mut self,
        markdown: &str,
        style: &StyleConfig,
    ) -> Result<bool, SessionError> {
        if self.state == ViewState::Disposed {
            return Err(SessionError::Disposed);
        }
        if self
            .session
            .as_ref()
            .is_some_and(|s| s.is_unchanged(markdown, style))
        {
            return Ok(false);
        }
        self.render(markdown, style)?;
        Ok(true)
    }

    /// Release the current pass and stop scrolling the view. Idempotent.
    pub fn dispose(&mut self) {
        if self.state == ViewState::Disposed {
            return;
        }
        if let Some(session) = self.session.take() {
            session.release();
        }
        self.coordinator.detach();
        self.state = ViewState::Disposed;
        tracing::debug!("document view disposed");
        perf::record(NavEvent::ViewDisposed);
    }

    /// Activate the link element `handle` of the current pass.
    ///
    /// Returns `None` if the current pass has no such link.
    pub fn activate_link(&self, handle: ElementHandle) -> Option<LinkOutcome> {
        let handler = self.session.as_ref()?.targets().handler(handle)?;
        Some(handler.activate())
    }

    /// Activate the first link starting on rendered line `line`.
    pub fn activate_link_at_line(&self, line: usize) -> Option<LinkOutcome> {
        let handler = self.session.as_ref()?.targets().handler_at_line(line)?;
        Some(handler.activate())
    }

    /// Activate `href` as if the document linked to it.
    pub fn follow_href(&self, href: &str) -> Result<LinkOutcome, SessionError> {
        match (&self.state, &self.session) {
            (ViewState::Disposed, _) => Err(SessionError::Disposed),
            (_, None) => Err(SessionError::NotRendered),
            (_, Some(session)) => Ok(session.handler_for(href).activate()),
        }
    }

    /// Advance the view's scroll animation.
    pub fn tick(&self, now: Instant) -> ScrollStep {
        self.coordinator.tick(now)
    }
}

impl<V: ScrollView + 'static> Drop for DocumentView<V> {
    fn drop(&mut self) {
        self.dispose();
    }
}
