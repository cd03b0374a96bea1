//! # tandem-engine — document model for collaborative text editing
//!
//! The network-free core of Tandem: a structural rich-text tree, the
//! offset↔location position mapper, local change detection, and the
//! apply algorithms that replay edits into the tree.
//!
//! ## Data flow
//!
//! ```text
//! user input
//!     │
//!     ▼
//! EditorSurface ── mutates ──► DocTree
//!     │                          ▲
//!     │ diff(prev, current)      │ apply_insert / apply_delete
//!     ▼                          │
//! TextEdit ──────────────────────┘   (remote edits enter here)
//! ```
//!
//! Everything speaks flattened character offsets, where a break marker
//! counts as exactly one unit. The [`position`] module is the only place
//! that translates between offsets and tree locations.
//!
//! ## Modules
//!
//! - [`tree`] — run/marker document tree
//! - [`position`] — offset ↔ structural location mapping
//! - [`diff`] — prefix/suffix local change detector
//! - [`op`] — `TextEdit`, `Operation`, `Origin`
//! - [`apply`] — insert/delete application
//! - [`editor`] — editing surface adapter

pub mod apply;
pub mod diff;
pub mod editor;
pub mod op;
pub mod position;
pub mod tree;

pub use apply::{apply_delete, apply_edit, apply_insert};
pub use diff::diff;
pub use editor::{EditorSurface, InputEvent};
pub use op::{Operation, Origin, TextEdit};
pub use position::{locate, resolve, Location};
pub use tree::{DocTree, Node};
