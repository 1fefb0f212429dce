//! Binary encoding of the payloads exchanged between cluster members.
//!
//! - `buffer`: big-endian reader/writer primitives.
//! - `filter_tags`: attribute keys identifying each payload kind.
//! - `sub_covering_filter`: subscription-pattern summaries and statistics.
//! - `attributes`: sequence-numbered attribute payloads (retained stats,
//!   monitoring status, removed servers, server info, forwarding endpoint).

pub mod attributes;
pub mod buffer;
pub mod filter_tags;
pub mod sub_covering_filter;

pub use sub_covering_filter::{ATTR_VERSION, STORE_VERSION};
