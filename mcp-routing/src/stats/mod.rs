//! Retained-message and monitoring statistics.
//!
//! - `local_retained` / `local_monitoring`: this node's own statistics,
//!   published to peers once the node is started and recovered.
//! - `global_retained`: cache of the statistics peers have published, with
//!   a single-block export for external queries.
//! - `publisher`: collaborator traits and the attribute-encoding publisher.

pub mod global_retained;
pub mod local_monitoring;
pub mod local_retained;
pub(crate) mod publish_gates;
pub mod publisher;

use bytes::Bytes;
use std::collections::BTreeMap;

/// This node's retained statistics, one opaque blob per server UID.
pub type RetainedStatsMap = BTreeMap<String, Bytes>;

/// One server's opaque retained-message statistics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetainedStatsItem {
    pub uid: String,
    pub data: Bytes,
}

impl RetainedStatsItem {
    pub fn new(uid: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            uid: uid.into(),
            data: data.into(),
        }
    }

    pub fn data_len(&self) -> usize {
        self.data.len()
    }
}

/// A peer's published retained statistics, replaced wholesale on update.
pub type RetainedStatsVector = Vec<RetainedStatsItem>;
