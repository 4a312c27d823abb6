//! fleetcheck: post-deployment health verifier for containerized service fleets.
//!
//! After a test run, checks that every registered service instance exists,
//! exited cleanly, and logged no failure signatures, then reduces the evidence
//! to a single pass/fail verdict and process exit code.

pub mod backend;
pub mod config;
pub mod detector;
pub mod error;
pub mod registry;
pub mod report;
pub mod verifier;

pub use error::*;
