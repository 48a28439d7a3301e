// src/diff/mod.rs

//! Content-fingerprint diffing.
//!
//! The client hashes what changed and asks the server which of those files
//! it already holds; the server answers from an mtime-validated LFU cache.

pub mod cache;
pub mod client;
pub mod engine;
pub mod fingerprint;

pub use cache::FingerprintCache;
pub use client::{fingerprint_changes, retain_differing};
pub use engine::DiffEngine;
pub use fingerprint::{fingerprint_bytes, fingerprint_file};
