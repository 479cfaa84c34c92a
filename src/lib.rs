// Only allow lints that are either transitive-dependency noise or
// genuinely opinionated style choices that don't indicate real issues.
#![allow(
    // Transitive dependency version mismatches we can't control
    clippy::multiple_crate_versions,
    // module_name_repetitions is pure style preference (e.g. anchor::AnchorMap)
    clippy::module_name_repetitions
)]

//! # Markjump
//!
//! In-document anchor navigation for rendered markdown.
//!
//! Markjump renders markdown into a tree of line-based elements and lets a
//! link such as `[Setup](#setup)` scroll the containing view to the element
//! it names:
//! - Anchor ids from heading slugs, explicit `{#id}` suffixes and HTML anchors
//! - One handler per link, released when the document is re-rendered
//! - A broadcast event bus between links and the view that scrolls
//! - Eased, overridable scroll animation with a fixed-header inset
//!
//! ## Architecture
//!
//! A render pass flows leaves-first:
//! - **Build**: comrak AST to [`document::RenderTree`]
//! - **Index**: [`anchor::AnchorMap`] from anchor id to element
//! - **Wire**: a [`link::LinkInteractionHandler`] per link element
//! - **Scroll**: [`scroll::ScrollCoordinator`] turns bus events into animation
//!
//! ## Modules
//!
//! - [`anchor`]: Anchor id derivation and lookup
//! - [`bus`]: Anchor request and position report streams
//! - [`config`]: Saved default flags
//! - [`document`]: Markdown parsing and render tree
//! - [`link`]: Link activation handlers
//! - [`scroll`]: Scroll coordination and animation
//! - [`session`]: Render pass lifecycle
//! - [`ui`]: Viewport

pub mod anchor;
pub mod bus;
pub mod config;
pub mod document;
pub mod link;
pub mod perf;
pub mod scroll;
pub mod session;
pub mod ui;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::anchor::AnchorMap;
    pub use crate::bus::{AnchorRequested, EventBus, PositionReport};
    pub use crate::document::{ElementHandle, RenderTree, StyleConfig};
    pub use crate::link::{LinkInteractionHandler, LinkOutcome};
    pub use crate::scroll::{ScrollCoordinator, ScrollStep, ScrollView};
    pub use crate::session::{DocumentView, RenderSession, SessionError, ViewState};
    pub use crate::ui::viewport::Viewport;
}
