//! Container run lifecycle for dojo.
//!
//! The [`driver`] module starts, watches, stops and cleans up the containers
//! of one run. The [`supervisor`] drives a driver from the process entry
//! point and turns OS signals into graceful stops or forced kills.

#![allow(unsafe_code)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod context;
pub mod driver;
pub mod env;
pub mod files;
pub mod inspect;
pub mod latch;
pub mod process;
pub mod shell;
pub mod supervisor;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
