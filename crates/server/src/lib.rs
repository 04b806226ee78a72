//! HTTP layer over `paperscan-core`.
//!
//! Thin by design: handlers validate the wire shape, delegate to
//! [`paperscan_core::CoreContext`], and map core errors to status codes.

pub mod api;
