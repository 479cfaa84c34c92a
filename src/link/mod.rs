//! Link activation.
//!
//! One [`LinkInteractionHandler`] exists per link element of a render pass.
//! It holds an immutable snapshot of that pass's anchor map and decides,
//! per activation, between scrolling to an internal anchor and handing the
//! href to the host. Handlers are released when their pass is superseded;
//! a released handler does nothing.

use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::anchor::{self, AnchorMap};
use crate::bus::{AnchorRequested, BusPublisher};
use crate::document::ElementHandle;

/// Host callback for links that do not resolve inside the document.
pub type ExternalLinkCallback = Rc<dyn Fn(&str)>;

/// What one activation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    /// Published an anchor request for this element
    Scrolled(ElementHandle),
    /// Forwarded to the external link callback
    External,
    /// Not internal and no external callback installed
    Ignored,
    /// The handler was already released
    Inert,
}

/// Tap handler for one link element.
///
/// Clones share the same registration: releasing any clone releases all.
/// A handler bound to a render pass also goes inert once that pass ends,
/// whether or not the pass ever registered it.
#[derive(Clone)]
pub struct LinkInteractionHandler {
    href: Rc<str>,
    anchors: Rc<AnchorMap>,
    on_external: Option<ExternalLinkCallback>,
    publisher: BusPublisher,
    active: Rc<Cell<bool>>,
    pass: Option<Rc<Cell<bool>>>,
}

impl fmt::Debug for LinkInteractionHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkInteractionHandler")
            .field("href", &self.href)
            .field("tree", &self.anchors.tree_id())
            .field("external", &self.on_external.is_some())
            .field("active", &self.is_active())
            .finish()
    }
}

impl LinkInteractionHandler {
    pub fn new(
        href: &str,
        anchors: Rc<AnchorMap>,
        on_external: Option<ExternalLinkCallback>,
        publisher: BusPublisher,
    ) -> Self {
        Self {
            href: Rc::from(href),
            anchors,
            on_external,
            publisher,
            active: Rc::new(Cell::new(true)),
            pass: None,
        }
    }

    /// Bind the handler to a render pass's liveness flag.
    #[must_use]
    pub(crate) fn in_pass(mut self, pass: Rc<Cell<bool>>) -> Self {
        self.pass = Some(pass);
        self
    }

    pub fn href(&self) -> &str {
        &self.href
    }

    pub fn is_active(&self) -> bool {
        self.active.get() && self.pass.as_ref().is_none_or(|pass| pass.get())
    }

    /// Release the handler. Releasing twice is a no-op.
    pub fn release(&self) {
        if self.active.replace(false) {
            tracing::trace!(href = %self.href, "link handler released");
        }
    }

    /// Handle a tap. Exactly one of: publish, external callback, nothing.
    pub fn activate(&self) -> LinkOutcome {
        if !self.is_active() {
            tracing::debug!(href = %self.href, "activation of released link handler ignored");
            return LinkOutcome::Inert;
        }

        if let Some(target) = anchor::fragment(&self.href).and_then(|id| self.anchors.lookup(id)) {
            tracing::debug!(href = %self.href, %target, "internal anchor");
            self.publisher
                .publish_anchor_requested(AnchorRequested { target });
            return LinkOutcome::Scrolled(target);
        }

        match &self.on_external {
            Some(callback) => {
                tracing::debug!(href = %self.href, "external link");
                callback(&self.href);
                LinkOutcome::External
            }
            None => LinkOutcome::Ignored,
        }
    }
}

/// Link handlers of one render pass, keyed by link element.
///
/// This is the registration table pointer hits are resolved against.
#[derive(Debug, Default)]
pub struct LinkTargets {
    handlers: HashMap<ElementHandle, LinkInteractionHandler>,
    /// (first line, element) in document order
    by_line: Vec<(usize, ElementHandle)>,
}

impl LinkTargets {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(
        &mut self,
        element: ElementHandle,
        line: usize,
        handler: LinkInteractionHandler,
    ) {
        self.by_line.push((line, element));
        self.handlers.insert(element, handler);
    }

    pub fn handler(&self, element: ElementHandle) -> Option<&LinkInteractionHandler> {
        self.handlers.get(&element)
    }

    /// First link starting on `line`.
    pub fn handler_at_line(&self, line: usize) -> Option<&LinkInteractionHandler> {
        self.by_line
            .iter()
            .find(|(l, _)| *l == line)
            .and_then(|(_, element)| self.handlers.get(element))
    }

    /// First link whose href is exactly `href`.
    pub fn handler_for_href(&self, href: &str) -> Option<&LinkInteractionHandler> {
        self.by_line
            .iter()
            .filter_map(|(_, element)| self.handlers.get(element))
            .find(|handler| handler.href() == href)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ElementHandle, &LinkInteractionHandler)> + '_ {
        self.by_line
            .iter()
            .filter_map(|(_, element)| self.handlers.get(element).map(|h| (*element, h)))
    }

    pub fn release_all(&self) {
        for handler in self.handlers.values() {
            handler.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::bus::EventBus;
    use crate::document::{BuildHooks, StyleConfig, build};

    struct NoLinks;

    impl BuildHooks for NoLinks {
        fn link(&mut self, _href: &str, _handle: ElementHandle) {}
    }

    struct Fixture {
        bus: EventBus,
        anchors: Rc<AnchorMap>,
        published: Rc<RefCell<Vec<ElementHandle>>>,
        external: Rc<RefCell<Vec<String>>>,
    }

    impl Fixture {
        fn new() -> Self {
            let tree = build(
                "# Intro\n\n## Section 2 {#section-2}\n",
                &StyleConfig::default(),
                None,
                &mut NoLinks,
            );
            let bus = EventBus::new();
            let published = Rc::new(RefCell::new(Vec::new()));
            let p = published.clone();
            bus.subscribe_anchor_requested(move |e| p.borrow_mut().push(e.target));
            Self {
                bus,
                anchors: Rc::new(AnchorMap::build(&tree)),
                published,
                external: Rc::new(RefCell::new(Vec::new())),
            }
        }

        fn handler(&self, href: &str) -> LinkInteractionHandler {
            let external = self.external.clone();
            let callback: ExternalLinkCallback =
                Rc::new(move |href: &str| external.borrow_mut().push(href.to_string()));
            LinkInteractionHandler::new(
                href,
                self.anchors.clone(),
                Some(callback),
                self.bus.publisher(),
            )
        }
    }

    #[test]
    fn test_internal_anchor_publishes_once_without_callback() {
        let fx = Fixture::new();
        let outcome = fx.handler("#section-2").activate();
        let expected = fx.anchors.lookup("section-2").unwrap();
        assert_eq!(outcome, LinkOutcome::Scrolled(expected));
        assert_eq!(*fx.published.borrow(), vec![expected]);
        assert!(fx.external.borrow().is_empty());
    }

    #[test]
    fn test_external_url_invokes_callback_once() {
        let fx = Fixture::new();
        let outcome = fx.handler("https://example.com").activate();
        assert_eq!(outcome, LinkOutcome::External);
        assert!(fx.published.borrow().is_empty());
        assert_eq!(*fx.external.borrow(), vec!["https://example.com".to_string()]);
    }

    #[test]
    fn test_missing_anchor_falls_back_to_callback() {
        let fx = Fixture::new();
        let outcome = fx.handler("#missing").activate();
        assert_eq!(outcome, LinkOutcome::External);
        assert!(fx.published.borrow().is_empty());
        assert_eq!(*fx.external.borrow(), vec!["#missing".to_string()]);
    }

    #[test]
    fn test_no_callback_is_noop() {
        let fx = Fixture::new();
        let handler =
            LinkInteractionHandler::new("https://x.test", fx.anchors.clone(), None, fx.bus.publisher());
        assert_eq!(handler.activate(), LinkOutcome::Ignored);
        assert!(fx.published.borrow().is_empty());
    }

    #[test]
    fn test_released_handler_is_inert_across_clones() {
        let fx = Fixture::new();
        let handler = fx.handler("#intro");
        let retained = handler.clone();
        handler.release();
        handler.release();

        assert!(!retained.is_active());
        assert_eq!(retained.activate(), LinkOutcome::Inert);
        assert!(fx.published.borrow().is_empty());
        assert!(fx.external.borrow().is_empty());
    }

    #[test]
    fn test_ended_pass_makes_bound_handlers_inert() {
        let fx = Fixture::new();
        let pass = Rc::new(Cell::new(true));
        let first = fx.handler("#intro").in_pass(pass.clone());
        let second = fx.handler("https://x.test").in_pass(pass.clone());
        let unbound = fx.handler("#section-2");

        pass.set(false);
        assert_eq!(first.activate(), LinkOutcome::Inert);
        assert_eq!(second.activate(), LinkOutcome::Inert);
        assert!(fx.published.borrow().is_empty());
        assert!(fx.external.borrow().is_empty());
        assert!(unbound.is_active());
    }

    #[test]
    fn test_link_targets_lookup_and_release_all() {
        let fx = Fixture::new();
        let mut targets = LinkTargets::new();
        let a = fx.anchors.lookup("intro").unwrap();
        let b = fx.anchors.lookup("section-2").unwrap();
        targets.register(a, 4, fx.handler("#section-2"));
        targets.register(b, 9, fx.handler("https://x.test"));

        assert_eq!(targets.len(), 2);
        assert_eq!(targets.handler_at_line(9).unwrap().href(), "https://x.test");
        assert!(targets.handler_at_line(5).is_none());
        assert_eq!(targets.handler_for_href("#section-2").unwrap().href(), "#section-2");

        targets.release_all();
        assert!(targets.iter().all(|(_, h)| !h.is_active()));
    }
}
