//! API route definitions
//!
//! REST endpoints for proposing renames from a directory scan and for
//! executing confirmed batches, plus health probes.

pub mod health;
pub mod rename;
