//! Shared utilities for the OBR crates.
//!
//! This crate provides the cross-cutting concerns used by the other OBR
//! crates: the unified error type and decoding of compressed repository
//! documents.

pub mod compression;
pub mod errors;
