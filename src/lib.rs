//! The library code for the `annals` static site generator, which publishes a
//! chronological archive of messages as paginated HTML plus RSS and Atom
//! feeds. The architecture can be broken down into three distinct steps:
//!
//! 1. Pulling months, days, and messages from an ordered data source
//!    ([`crate::archive`])
//! 2. Walking each month page by page ([`crate::paginate`]) while recording
//!    where every message lands ([`crate::replies`]) and which messages are
//!    most recent ([`crate::feed`])
//! 3. Rendering pages to disk ([`crate::render`], [`crate::publish`]),
//!    skipping output that a previous build already produced
//!    ([`crate::incremental`])
//!
//! [`crate::build`] ties the steps together. Page filenames depend only on a
//! message's position within its month, so a rebuild with the same data
//! produces the same files whether pages are walked oldest-first or
//! newest-first; this is what lets incremental builds reuse full pages.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]

pub mod archive;
pub mod build;
pub mod config;
pub mod feed;
pub mod incremental;
pub mod minify;
pub mod paginate;
pub mod publish;
pub mod render;
pub mod replies;
pub mod timeline;
