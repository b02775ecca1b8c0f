//! Integration test suite for catalog-calc
//!
//! End-to-end tests through the public API and the `catcalc` binary.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **recalculation**: items with child components, catalogs, cache invalidation
//! - **composition**: slot moves and composition validation on a snapshot
//! - **properties**: property tests for ordering and cycle detection
//! - **cli**: the `catcalc` commands

mod common;

mod cli;
mod composition;
mod properties;
mod recalculation;
