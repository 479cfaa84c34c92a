//! Anchor-driven scrolling.
//!
//! [`ScrollCoordinator`] listens for [`AnchorRequested`] on the bus and
//! animates its view to the requested element. A newer request replaces
//! whatever animation is in flight; requests are never queued.

mod animation;

pub use animation::{ScrollAnimation, ease_out_cubic};

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};

use crate::bus::{AnchorRequested, EventBus, PositionReport, SubscriptionId};
use crate::document::{ElementHandle, RenderTree};
use crate::perf::{self, NavEvent};

/// Duration of an anchor jump.
pub const ANCHOR_SCROLL_DURATION: Duration = Duration::from_millis(200);

/// Result of advancing a view's animation by one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScrollStep {
    /// No animation in flight
    Idle,
    /// Animation in progress at this offset
    Moving(f64),
    /// Animation finished at this offset
    Settled(f64),
}

/// A scrollable host view.
pub trait ScrollView {
    /// Offset of `element` relative to the top of the viewport, or `None`
    /// if it is not laid out (or belongs to another tree).
    fn element_offset(&self, element: ElementHandle) -> Option<f64>;

    fn scroll_offset(&self) -> f64;

    /// Height of fixed chrome overlaying the top of the viewport.
    fn header_inset(&self) -> f64;

    /// Start an ease-out animation to `offset`, replacing any in flight.
    fn animate_to(&mut self, offset: f64, duration: Duration);

    fn advance(&mut self, now: Instant) -> ScrollStep;

    /// Adopt a freshly built tree.
    fn install(&mut self, tree: &RenderTree);
}

/// Compute the target offset for `element` and start scrolling there.
///
/// Returns the target, or `None` when the element has no known position.
pub fn scroll_to_element<V: ScrollView + ?Sized>(view: &mut V, element: ElementHandle) -> Option<f64> {
    let Some(relative) = view.element_offset(element) else {
        tracing::debug!(%element, "anchor target not laid out, dropping scroll request");
        return None;
    };
    let target = relative + view.scroll_offset() - view.header_inset();
    view.animate_to(target, ANCHOR_SCROLL_DURATION);
    perf::record(NavEvent::ScrollRequested { element, target });
    Some(target)
}

/// Bridges bus anchor requests to one view.
pub struct ScrollCoordinator<V: ScrollView + 'static> {
    bus: EventBus,
    view: Option<Weak<RefCell<V>>>,
    subscription: Option<SubscriptionId>,
}

impl<V: ScrollView + 'static> fmt::Debug for ScrollCoordinator<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScrollCoordinator")
            .field("subscription", &self.subscription)
            .finish_non_exhaustive()
    }
}

impl<V: ScrollView + 'static> ScrollCoordinator<V> {
    pub const fn new(bus: EventBus) -> Self {
        Self {
            bus,
            view: None,
            subscription: None,
        }
    }

    /// Subscribe on behalf of `view`. Re-attaching detaches first.
    ///
    /// The subscription holds only a weak reference, so a dropped view is
    /// never scrolled.
    pub fn attach(&mut self, view: &Rc<RefCell<V>>) {
        if self.detach() {
            tracing::debug!("re-attaching scroll coordinator");
        }
        let weak = Rc::downgrade(view);
        let listener = weak.clone();
        let id = self
            .bus
            .subscribe_anchor_requested(move |event: &AnchorRequested| {
                let Some(view) = listener.upgrade() else {
                    tracing::debug!("view dropped, ignoring anchor request");
                    return;
                };
                let Ok(mut view) = view.try_borrow_mut() else {
                    tracing::warn!(target = %event.target, "view busy, dropping anchor request");
                    return;
                };
                scroll_to_element(&mut *view, event.target);
            });
        self.view = Some(weak);
        self.subscription = Some(id);
    }

    /// Cancel the subscription. Returns false if nothing was attached.
    pub fn detach(&mut self) -> bool {
        self.view = None;
        self.subscription
            .take()
            .is_some_and(|id| self.bus.unsubscribe(id))
    }

    pub const fn is_attached(&self) -> bool {
        self.subscription.is_some()
    }

    /// Advance the attached view's animation.
    ///
    /// Publishes a [`PositionReport`] when an animation settles.
    pub fn tick(&self, now: Instant) -> ScrollStep {
        let Some(view) = self.view.as_ref().and_then(Weak::upgrade) else {
            return ScrollStep::Idle;
        };
        let step = view.borrow_mut().advance(now);
        if let ScrollStep::Settled(offset) = step {
            perf::record(NavEvent::ScrollSettled { offset });
            self.bus.publish_position_report(PositionReport { offset });
        }
        step
    }
}

impl<V: ScrollView + 'static> Drop for ScrollCoordinator<V> {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::bus::Stream;
    use crate::document::{BuildHooks, StyleConfig, build};
    use crate::ui::viewport::Viewport;

    struct NoLinks;

    impl BuildHooks for NoLinks {
        fn link(&mut self, _href: &str, _handle: ElementHandle) {}
    }

    fn long_tree() -> RenderTree {
        let mut md = String::new();
        for i in 1..=30 {
            md.push_str(&format!("## Heading {i}\n\nBody {i}\n\n"));
        }
        build(&md, &StyleConfig::default(), None, &mut NoLinks)
    }

    fn heading(tree: &RenderTree, n: usize) -> ElementHandle {
        tree.headings().nth(n - 1).unwrap().handle()
    }

    fn settle(coordinator: &ScrollCoordinator<Viewport>, start: Instant) -> Vec<ScrollStep> {
        let mut steps = Vec::new();
        let mut now = start;
        for _ in 0..64 {
            let step = coordinator.tick(now);
            steps.push(step);
            if !matches!(step, ScrollStep::Moving(_)) {
                break;
            }
            now += Duration::from_millis(16);
        }
        steps
    }

    #[test]
    fn test_anchor_request_scrolls_to_element_minus_inset() {
        let tree = long_tree();
        let bus = EventBus::new();
        let view = Rc::new(RefCell::new(Viewport::new(80, 10, 0).with_header_inset(1)));
        view.borrow_mut().install(&tree);
        let mut coordinator = ScrollCoordinator::new(bus.clone());
        coordinator.attach(&view);

        let target = heading(&tree, 5);
        let line = tree.element(target).unwrap().lines().start;
        bus.publish_anchor_requested(AnchorRequested { target });
        let steps = settle(&coordinator, Instant::now());

        assert_eq!(steps.last(), Some(&ScrollStep::Settled((line - 1) as f64)));
        assert_eq!(view.borrow().offset(), line - 1);
    }

    #[test]
    fn test_latest_request_supersedes_in_flight_animation() {
        let tree = long_tree();
        let bus = EventBus::new();
        let view = Rc::new(RefCell::new(Viewport::new(80, 10, 0)));
        view.borrow_mut().install(&tree);
        let mut coordinator = ScrollCoordinator::new(bus.clone());
        coordinator.attach(&view);

        let settled = Rc::new(RefCell::new(Vec::new()));
        let s = settled.clone();
        bus.subscribe_position_report(move |e| s.borrow_mut().push(e.offset));

        let first = heading(&tree, 10);
        let second = heading(&tree, 20);
        let second_line = tree.element(second).unwrap().lines().start;

        let t0 = Instant::now();
        bus.publish_anchor_requested(AnchorRequested { target: first });
        coordinator.tick(t0);
        coordinator.tick(t0 + Duration::from_millis(50));
        bus.publish_anchor_requested(AnchorRequested { target: second });
        settle(&coordinator, t0 + Duration::from_millis(50));

        assert_eq!(view.borrow().offset(), second_line);
        assert_eq!(*settled.borrow(), vec![second_line as f64]);
    }

    #[test]
    fn test_detached_coordinator_ignores_requests() {
        let tree = long_tree();
        let bus = EventBus::new();
        let view = Rc::new(RefCell::new(Viewport::new(80, 10, 0)));
        view.borrow_mut().install(&tree);
        let mut coordinator = ScrollCoordinator::new(bus.clone());
        coordinator.attach(&view);
        assert!(coordinator.detach());
        assert!(!coordinator.detach());

        bus.publish_anchor_requested(AnchorRequested {
            target: heading(&tree, 3),
        });
        assert_eq!(coordinator.tick(Instant::now()), ScrollStep::Idle);
        assert!(!view.borrow().is_animating());
        assert_eq!(view.borrow().offset(), 0);
        assert_eq!(bus.subscriber_count(Stream::AnchorRequested), 0);
    }

    #[test]
    fn test_unlaid_out_element_is_dropped() {
        let tree = long_tree();
        let other = long_tree();
        let bus = EventBus::new();
        let view = Rc::new(RefCell::new(Viewport::new(80, 10, 0)));
        view.borrow_mut().install(&tree);
        let mut coordinator = ScrollCoordinator::new(bus.clone());
        coordinator.attach(&view);

        bus.publish_anchor_requested(AnchorRequested {
            target: heading(&other, 3),
        });
        assert!(!view.borrow().is_animating());
    }

    #[test]
    fn test_dropped_view_is_never_touched() {
        let tree = long_tree();
        let bus = EventBus::new();
        let view = Rc::new(RefCell::new(Viewport::new(80, 10, 0)));
        view.borrow_mut().install(&tree);
        let mut coordinator = ScrollCoordinator::new(bus.clone());
        coordinator.attach(&view);
        drop(view);

        bus.publish_anchor_requested(AnchorRequested {
            target: heading(&tree, 3),
        });
        assert_eq!(coordinator.tick(Instant::now()), ScrollStep::Idle);
    }

    #[test]
    fn test_reattach_keeps_single_subscription() {
        let bus = EventBus::new();
        let view = Rc::new(RefCell::new(Viewport::new(80, 10, 0)));
        let mut coordinator = ScrollCoordinator::new(bus.clone());
        coordinator.attach(&view);
        coordinator.attach(&view);
        assert_eq!(bus.subscriber_count(Stream::AnchorRequested), 1);
        drop(coordinator);
        assert_eq!(bus.subscriber_count(Stream::AnchorRequested), 0);
    }

    #[test]
    fn test_scroll_to_element_uses_view_geometry() {
        struct FixedView {
            animated_to: Cell<Option<f64>>,
        }

        impl ScrollView for FixedView {
            fn element_offset(&self, _element: ElementHandle) -> Option<f64> {
                Some(40.0)
            }
            fn scroll_offset(&self) -> f64 {
                100.0
            }
            fn header_inset(&self) -> f64 {
                12.0
            }
            fn animate_to(&mut self, offset: f64, duration: Duration) {
                assert_eq!(duration, ANCHOR_SCROLL_DURATION);
                self.animated_to.set(Some(offset));
            }
            fn advance(&mut self, _now: Instant) -> ScrollStep {
                ScrollStep::Idle
            }
            fn install(&mut self, _tree: &RenderTree) {}
        }

        let tree = long_tree();
        let mut view = FixedView {
            animated_to: Cell::new(None),
        };
        let target = scroll_to_element(&mut view, heading(&tree, 1));
        assert_eq!(target, Some(128.0));
        assert_eq!(view.animated_to.get(), Some(128.0));
    }
}
