//! # Thread Harvest Core
//!
//! Pure logic for Thread Harvest: dynamic record access, canonical views,
//! content fingerprints, and the deterministic storage layout.
//!
//! This crate contains no tokio, HTTP, or filesystem I/O. Everything here is
//! a function of its inputs, which is what makes repeated harvest runs
//! idempotent: the same content always lands under the same directory with
//! the same fingerprint.

pub mod canonical;
pub mod fingerprint;
pub mod layout;
pub mod models;
pub mod record;
