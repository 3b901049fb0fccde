//! Integration tests module
//!
//! End-to-end tests for the coordinator, driving the router through
//! in-memory connection channels, the HTTP routes through tower, and
//! the socket transport over a live listener.

pub mod api_test;
pub mod dispatch_test;
pub mod fixtures;
pub mod search_test;
