//! Knowledge base API client and tree traversal.
//!
//! This crate provides:
//! - [`Origin`] — user URL → scheme + host prefix for every API call
//! - [`KbClient`] — typed fetches of the home, category, and article documents
//! - [`walk`] — depth-first flattening of the tree into articles with category paths
//! - [`fetch_details`] — bounded, order-preserving article detail fetching

pub mod client;
pub mod details;
pub mod origin;
pub mod walker;

pub use client::{HOME_PATH, KbClient, build_http_client};
pub use details::fetch_details;
pub use origin::Origin;
pub use walker::{WalkStats, walk, walk_with_stats};
