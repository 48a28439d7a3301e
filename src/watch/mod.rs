// src/watch/mod.rs

//! File watching.
//!
//! This module is responsible for:
//! - Compiling watch rules into the include/exclude predicate (`filter`).
//! - Keeping one non-recursive `notify` subscription per accepted directory,
//!   following directories as they appear and vanish (`watcher`).
//!
//! It does **not** debounce; raw events go to `crate::collect`.

pub mod filter;
pub mod watcher;

pub use filter::{WatchFilter, WatchPredicate};
pub use watcher::{FsEvent, FsEventKind, RecursiveWatcher, WatchEvent};
