//! Full-text search entry points.
//!
//! # Responsibility
//! - Expose query APIs backed by the SQLite FTS5 post index.
//! - Keep search result shaping inside core.

pub mod fts;
