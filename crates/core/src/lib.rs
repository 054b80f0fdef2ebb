//! litehub core: paginated git and GitHub primitives for tool-call gateways.
//!
//! # Modules
//!
//! - [`cursor`]: Opaque continuation tokens (never fail to decode)
//! - [`page`]: Slicing ordered collections into bounded pages
//! - [`validate`]: Caller-input checks performed before any I/O
//! - [`exec`]: The single external-command primitive
//! - [`envelope`]: `gh api -i` output parsing (status, headers, body)
//! - [`cache`]: ETag revalidation cache
//! - [`backoff`]: Bounded retry on rate limiting
//! - [`git`]: Local repository service
//! - [`github`]: Remote hosting service (pull requests, issues, timelines)
//! - `testing` (feature `testing`): Scripted runner and recording sleeper for tests

pub mod backoff;
pub mod cache;
pub mod cursor;
pub mod envelope;
pub mod error;
pub mod exec;
pub mod git;
pub mod github;
pub mod page;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod validate;

pub use error::{Error, Result};
