//! pxload: bulk loader for a product analytics platform.
//!
//! Maps delimited rows onto typed, nested records and upserts them row by
//! row over a retrying HTTP client, isolating per-row failures.

pub mod cli;
pub mod core;
pub mod transport;
