// Profile editing pipeline.
// Pure pieces (validation, completeness, merge) are shared by every write path;
// optimistic commits, debounced auto-save and inline field editing run inside
// a per-user EditSession owned by ProfileService.

pub mod autosave;
pub mod completeness;
pub mod events;
pub mod handlers;
pub mod inline_edit;
pub mod merge;
pub mod optimistic;
pub mod service;
pub mod session;
pub mod store;
pub mod validation;
