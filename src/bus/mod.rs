//! Broadcast event bus between link handlers and scroll owners.
//!
//! Links are activated deep inside a render tree that has no reference to
//! the view that owns scrolling. Handlers publish on the bus; the view's
//! [`ScrollCoordinator`](crate::scroll::ScrollCoordinator) subscribes.
//!
//! Delivery is synchronous and single-threaded. Every live subscriber of a
//! stream sees every event of that stream, in publish order. An event
//! published from inside a subscriber callback is queued and delivered once
//! the current delivery finishes, so per-publisher order always holds.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use crate::document::ElementHandle;

/// A link asked for its target element to be scrolled into view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnchorRequested {
    pub target: ElementHandle,
}

/// A view reported where it settled after scrolling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionReport {
    pub offset: f64,
}

/// Selects one of the bus streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    AnchorRequested,
    PositionReport,
}

/// Token returned by `subscribe_*`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener<E> = Rc<dyn Fn(&E)>;

#[derive(Debug, Clone, Copy)]
enum Event {
    AnchorRequested(AnchorRequested),
    PositionReport(PositionReport),
}

struct BusState {
    next_id: u64,
    anchor_requested: Vec<(SubscriptionId, Listener<AnchorRequested>)>,
    position_report: Vec<(SubscriptionId, Listener<PositionReport>)>,
    queue: VecDeque<Event>,
    delivering: bool,
}

impl BusState {
    fn allocate_id(&mut self) -> SubscriptionId {
        self.next_id += 1;
        SubscriptionId(self.next_id)
    }

    fn is_subscribed(&self, id: SubscriptionId) -> bool {
        self.anchor_requested.iter().any(|(sub, _)| *sub == id)
            || self.position_report.iter().any(|(sub, _)| *sub == id)
    }
}

/// Shared broadcast bus. Cloning yields another handle to the same bus.
#[derive(Clone)]
pub struct EventBus {
    state: Rc<RefCell<BusState>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("EventBus")
            .field("anchor_requested", &state.anchor_requested.len())
            .field("position_report", &state.position_report.len())
            .field("queued", &state.queue.len())
            .finish()
    }
}

/// Resets the delivering flag even if a listener panics.
struct DeliveryGuard<'a>(&'a RefCell<BusState>);

impl Drop for DeliveryGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.0.borrow_mut();
        state.delivering = false;
        state.queue.clear();
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(BusState {
                next_id: 0,
                anchor_requested: Vec::new(),
                position_report: Vec::new(),
                queue: VecDeque::new(),
                delivering: false,
            })),
        }
    }

    /// Publish-only handle for producers.
    pub fn publisher(&self) -> BusPublisher {
        BusPublisher { bus: self.clone() }
    }

    pub fn subscribe_anchor_requested(
        &self,
        listener: impl Fn(&AnchorRequested) + 'static,
    ) -> SubscriptionId {
        let mut state = self.state.borrow_mut();
        let id = state.allocate_id();
        state.anchor_requested.push((id, Rc::new(listener)));
        tracing::trace!(?id, "subscribed to anchor requests");
        id
    }

    pub fn subscribe_position_report(
        &self,
        listener: impl Fn(&PositionReport) + 'static,
    ) -> SubscriptionId {
        let mut state = self.state.borrow_mut();
        let id = state.allocate_id();
        state.position_report.push((id, Rc::new(listener)));
        tracing::trace!(?id, "subscribed to position reports");
        id
    }

    /// Remove a subscription. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut state = self.state.borrow_mut();
        let before = state.anchor_requested.len() + state.position_report.len();
        state.anchor_requested.retain(|(sub, _)| *sub != id);
        state.position_report.retain(|(sub, _)| *sub != id);
        let removed = before != state.anchor_requested.len() + state.position_report.len();
        if removed {
            tracing::trace!(?id, "unsubscribed");
        }
        removed
    }

    pub fn subscriber_count(&self, stream: Stream) -> usize {
        let state = self.state.borrow();
        match stream {
            Stream::AnchorRequested => state.anchor_requested.len(),
            Stream::PositionReport => state.position_report.len(),
        }
    }

    pub fn publish_anchor_requested(&self, event: AnchorRequested) {
        self.publish(Event::AnchorRequested(event));
    }

    pub fn publish_position_report(&self, event: PositionReport) {
        self.publish(Event::PositionReport(event));
    }

    fn publish(&self, event: Event) {
        {
            let mut state = self.state.borrow_mut();
            state.queue.push_back(event);
            if state.delivering {
                return;
            }
            state.delivering = true;
        }

        let _guard = DeliveryGuard(&self.state);
        loop {
            let Some(event) = self.state.borrow_mut().queue.pop_front() else {
                break;
            };
            match event {
                Event::AnchorRequested(event) => {
                    let listeners = self.state.borrow().anchor_requested.clone();
                    self.deliver(&listeners, &event);
                }
                Event::PositionReport(event) => {
                    let listeners = self.state.borrow().position_report.clone();
                    self.deliver(&listeners, &event);
                }
            }
        }
    }

    fn deliver<E: 'static>(&self, listeners: &[(SubscriptionId, Listener<E>)], event: &E) {
        for (id, listener) in listeners {
            // A listener removed earlier in this delivery must not fire.
            if self.state.borrow().is_subscribed(*id) {
                listener(event);
            }
        }
    }
}

/// Publish-only view of an [`EventBus`].
#[derive(Clone, Debug)]
pub struct BusPublisher {
    bus: EventBus,
}

impl BusPublisher {
    pub fn publish_anchor_requested(&self, event: AnchorRequested) {
        self.bus.publish_anchor_requested(event);
    }

    pub fn publish_position_report(&self, event: PositionReport) {
        self.bus.publish_position_report(event);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use super::*;
    use crate::document::{ElementKind, RenderTree, TreeId};

    fn handles(count: usize) -> Vec<ElementHandle> {
        let mut tree = RenderTree::new(TreeId::next(), String::new());
        (0..count)
            .map(|_| tree.push_element(ElementKind::Paragraph, 0..0, None))
            .collect()
    }

    #[test]
    fn test_every_subscriber_receives_every_event() {
        let bus = EventBus::new();
        let a = Rc::new(RefCell::new(Vec::new()));
        let b = Rc::new(RefCell::new(Vec::new()));
        let (a2, b2) = (a.clone(), b.clone());
        bus.subscribe_anchor_requested(move |e| a2.borrow_mut().push(e.target));
        bus.subscribe_anchor_requested(move |e| b2.borrow_mut().push(e.target));

        let targets = handles(3);
        for target in &targets {
            bus.publish_anchor_requested(AnchorRequested { target: *target });
        }

        assert_eq!(*a.borrow(), targets);
        assert_eq!(*b.borrow(), targets);
    }

    #[test]
    fn test_streams_are_independent() {
        let bus = EventBus::new();
        let anchors = Rc::new(Cell::new(0));
        let positions = Rc::new(Cell::new(0));
        let (a, p) = (anchors.clone(), positions.clone());
        bus.subscribe_anchor_requested(move |_| a.set(a.get() + 1));
        bus.subscribe_position_report(move |_| p.set(p.get() + 1));

        bus.publish_position_report(PositionReport { offset: 3.0 });
        assert_eq!(anchors.get(), 0);
        assert_eq!(positions.get(), 1);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let bus = EventBus::new();
        let id = bus.subscribe_position_report(|_| {});
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        assert_eq!(bus.subscriber_count(Stream::PositionReport), 0);
    }

    #[test]
    fn test_unsubscribed_listener_is_not_called() {
        let bus = EventBus::new();
        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        let id = bus.subscribe_position_report(move |_| h.set(h.get() + 1));
        bus.unsubscribe(id);
        bus.publish_position_report(PositionReport { offset: 0.0 });
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn test_listener_removed_mid_delivery_does_not_fire() {
        let bus = EventBus::new();
        let second_hits = Rc::new(Cell::new(0));
        let second_id = Rc::new(Cell::new(None));

        let bus2 = bus.clone();
        let sid = second_id.clone();
        bus.subscribe_position_report(move |_| {
            if let Some(id) = sid.get() {
                bus2.unsubscribe(id);
            }
        });
        let h = second_hits.clone();
        second_id.set(Some(bus.subscribe_position_report(move |_| h.set(h.get() + 1))));

        bus.publish_position_report(PositionReport { offset: 1.0 });
        assert_eq!(second_hits.get(), 0);
    }

    #[test]
    fn test_reentrant_publish_is_queued_in_order() {
        let bus = EventBus::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let bus2 = bus.clone();
        bus.subscribe_position_report(move |e| {
            if e.offset < 1.0 {
                bus2.publish_position_report(PositionReport { offset: 1.0 });
            }
        });
        let s = seen.clone();
        bus.subscribe_position_report(move |e| s.borrow_mut().push(e.offset));

        bus.publish_position_report(PositionReport { offset: 0.0 });
        assert_eq!(*seen.borrow(), vec![0.0, 1.0]);
    }

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        let bus = EventBus::new();
        let target = handles(1)[0];
        bus.publisher()
            .publish_anchor_requested(AnchorRequested { target });
        assert_eq!(bus.subscriber_count(Stream::AnchorRequested), 0);
    }
}
