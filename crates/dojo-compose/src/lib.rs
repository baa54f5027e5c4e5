//! # dojo-compose
//!
//! Everything dojo needs to know about docker-compose that does not involve
//! running it:
//! - **File**: validation of the user's compose file.
//! - **Overlay**: the generated `<file>.dojo` override file.
//! - **Ps**: parsing of `docker-compose ps` output, legacy table and JSON.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod file;
pub mod overlay;
pub mod ps;
