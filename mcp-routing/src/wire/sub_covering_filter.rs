//! Codec for wildcard subscription-pattern summaries and per-peer statistics.
//!
//! Layout (big-endian):
//!
//! ```text
//! SubscriptionPattern     u16 n, n x u16 plus-location, u16 hash-location, u16 last-level
//! RemoteSubscriptionStats i32 num-on-bloom-filter, i32 num-on-topic-tree,
//!                         i32 k, k x (SubscriptionPattern, i32 frequency),
//!                         i32 m, m x (SubscriptionPattern, i32 frequency)
//! ```
//!
//! Every call takes the wire format version; version 1 is the only one today.

use crate::error::{ClusterError, ClusterResult};
use crate::wire::buffer::{WireReader, WireWriter, INT16_LEN, INT32_LEN};
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Version of the attribute payloads exchanged between peers.
pub const ATTR_VERSION: u16 = 1;
/// Version of the records persisted to the store.
pub const STORE_VERSION: u16 = 1;

const MIN_PATTERN_LEN: usize = 3 * INT16_LEN;
const MIN_PATTERN_ENTRY_LEN: usize = MIN_PATTERN_LEN + INT32_LEN;

/// Compact shape of a wildcard subscription.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionPattern {
    plus_locations: Vec<u16>,
    hash_location: u16,
    last_level: u16,
}

impl SubscriptionPattern {
    pub fn new(
        plus_locations: Vec<u16>,
        hash_location: u16,
        last_level: u16,
    ) -> ClusterResult<Self> {
        if plus_locations.len() > usize::from(u16::MAX) {
            return Err(ClusterError::Error(format!(
                "subscription pattern has {} plus locations, at most {} allowed",
                plus_locations.len(),
                u16::MAX
            )));
        }
        Ok(Self {
            plus_locations,
            hash_location,
            last_level,
        })
    }

    pub fn plus_locations(&self) -> &[u16] {
        &self.plus_locations
    }

    pub fn hash_location(&self) -> u16 {
        self.hash_location
    }

    pub fn last_level(&self) -> u16 {
        self.last_level
    }
}

impl Display for SubscriptionPattern {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "+{:?} #{} L{}",
            self.plus_locations, self.hash_location, self.last_level
        )
    }
}

/// One entry of a top-K pattern list.
///
/// The pattern slot is nullable: lists are assembled by the local wildcard
/// subscription bookkeeping before every slot is resolved, and the encoder
/// rejects an unresolved slot with [`ClusterError::NullArgument`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatternFrequency {
    pub pattern: Option<Arc<SubscriptionPattern>>,
    pub frequency: u32,
}

impl PatternFrequency {
    pub fn new(pattern: SubscriptionPattern, frequency: u32) -> Self {
        Self {
            pattern: Some(Arc::new(pattern)),
            frequency,
        }
    }
}

/// A peer's wildcard-subscription summary.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RemoteSubscriptionStats {
    pub wildcard_subscriptions_num_on_bloom_filter: u32,
    pub wildcard_subscriptions_num_on_topic_tree: u32,
    pub topic_tree_top: Vec<PatternFrequency>,
    pub bloom_filter_bottom: Vec<PatternFrequency>,
}

pub struct SubCoveringFilterWireFormat;

impl SubCoveringFilterWireFormat {
    pub fn write_subscription_pattern(
        _wire_format_ver: u16,
        pattern: &SubscriptionPattern,
        writer: &mut WireWriter,
    ) {
        // The constructor bounds the list length to u16.
        writer.put_u16(pattern.plus_locations.len() as u16);
        for location in &pattern.plus_locations {
            writer.put_u16(*location);
        }
        writer.put_u16(pattern.hash_location);
        writer.put_u16(pattern.last_level);
    }

    pub fn read_subscription_pattern(
        _wire_format_ver: u16,
        reader: &mut WireReader,
    ) -> ClusterResult<SubscriptionPattern> {
        let num_plus = reader.get_u16_count(INT16_LEN, "plus locations")?;
        let mut plus_locations = Vec::with_capacity(num_plus);
        for _ in 0..num_plus {
            plus_locations.push(reader.get_u16()?);
        }
        let hash_location = reader.get_u16()?;
        let last_level = reader.get_u16()?;
        Ok(SubscriptionPattern {
            plus_locations,
            hash_location,
            last_level,
        })
    }

    /// Encodes `stats`, or fails without writing anything if any pattern slot is empty.
    pub fn write_subscription_stats(
        wire_format_ver: u16,
        stats: &RemoteSubscriptionStats,
        writer: &mut WireWriter,
    ) -> ClusterResult<()> {
        let top_len = checked_list_len(&stats.topic_tree_top, "topic_tree_top")?;
        let bottom_len = checked_list_len(&stats.bloom_filter_bottom, "bloom_filter_bottom")?;

        writer.put_i32(stats.wildcard_subscriptions_num_on_bloom_filter as i32);
        writer.put_i32(stats.wildcard_subscriptions_num_on_topic_tree as i32);
        writer.put_i32(top_len);
        write_pattern_list(wire_format_ver, &stats.topic_tree_top, writer);
        writer.put_i32(bottom_len);
        write_pattern_list(wire_format_ver, &stats.bloom_filter_bottom, writer);
        Ok(())
    }

    pub fn read_subscription_stats(
        wire_format_ver: u16,
        reader: &mut WireReader,
    ) -> ClusterResult<RemoteSubscriptionStats> {
        let wildcard_subscriptions_num_on_bloom_filter = reader.get_i32()? as u32;
        let wildcard_subscriptions_num_on_topic_tree = reader.get_i32()? as u32;
        let topic_tree_top = read_pattern_list(wire_format_ver, reader, "topic_tree_top")?;
        let bloom_filter_bottom =
            read_pattern_list(wire_format_ver, reader, "bloom_filter_bottom")?;
        Ok(RemoteSubscriptionStats {
            wildcard_subscriptions_num_on_bloom_filter,
            wildcard_subscriptions_num_on_topic_tree,
            topic_tree_top,
            bloom_filter_bottom,
        })
    }
}

fn checked_list_len(list: &[PatternFrequency], name: &'static str) -> ClusterResult<i32> {
    if list.iter().any(|entry| entry.pattern.is_none()) {
        return Err(ClusterError::NullArgument(name));
    }
    i32::try_from(list.len())
        .map_err(|_| ClusterError::Error(format!("{name} has {} entries", list.len())))
}

fn write_pattern_list(wire_format_ver: u16, list: &[PatternFrequency], writer: &mut WireWriter) {
    for entry in list {
        if let Some(pattern) = &entry.pattern {
            SubCoveringFilterWireFormat::write_subscription_pattern(
                wire_format_ver,
                pattern,
                writer,
            );
            writer.put_i32(entry.frequency as i32);
        }
    }
}

fn read_pattern_list(
    wire_format_ver: u16,
    reader: &mut WireReader,
    name: &str,
) -> ClusterResult<Vec<PatternFrequency>> {
    let count = reader.get_count(MIN_PATTERN_ENTRY_LEN, name)?;
    let mut list = Vec::with_capacity(count);
    for _ in 0..count {
        let pattern = SubCoveringFilterWireFormat::read_subscription_pattern(wire_format_ver, reader)?;
        let frequency = reader.get_i32()? as u32;
        list.push(PatternFrequency::new(pattern, frequency));
    }
    Ok(list)
}
