/********************************************************************************
 * Copyright (c) 2026 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

//! Cache of the retained statistics published by peers.
//!
//! A lookup flattens one peer's statistics into a single self-describing
//! block that the caller owns and releases with one call. Block layout, all
//! integers little-endian, offsets relative to the block start:
//!
//! ```text
//! header       u32 num_stats, u32 reserved
//! descriptors  num_stats x (u32 uid_offset, u32 uid_len, u32 data_offset, u32 data_len)
//! items        per item: data, uid, NUL, zero padding to the next 8-byte boundary
//! ```
//!
//! The header and every descriptor are multiples of 8 bytes, so each item's
//! data starts 8-byte aligned.

use crate::error::{ClusterError, ClusterResult};
use crate::handles::ClusterHandle;
use crate::stats::{RetainedStatsItem, RetainedStatsVector};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::{debug, info, trace};

const GLOBAL_RETAINED_STATS_TAG: &str = "GlobalRetainedStatsManager:";
const GLOBAL_RETAINED_STATS_FN_CHANGE_TAG: &str = "on_retained_stats_change:";
const GLOBAL_RETAINED_STATS_FN_REMOVE_TAG: &str = "on_retained_stats_remove:";
const GLOBAL_RETAINED_STATS_FN_LOOKUP_TAG: &str = "lookup_retained_stats:";

pub const EXPORT_HEADER_LEN: usize = 8;
pub const EXPORT_DESCRIPTOR_LEN: usize = 16;
pub const EXPORT_ALIGNMENT: usize = 8;

fn align8(len: usize) -> Option<usize> {
    len.checked_add(EXPORT_ALIGNMENT - 1)
        .map(|padded| padded & !(EXPORT_ALIGNMENT - 1))
}

fn too_large(size: usize) -> ClusterError {
    ClusterError::Error(format!("retained stats export of {size}+ bytes exceeds u32 offsets"))
}

/// Bytes needed to export `items`:
/// `8 + 16 * n + sum(align8(data_len + uid_len + 1))`.
pub fn export_block_size(items: &[RetainedStatsItem]) -> ClusterResult<usize> {
    let mut size = items
        .len()
        .checked_mul(EXPORT_DESCRIPTOR_LEN)
        .and_then(|descriptors| descriptors.checked_add(EXPORT_HEADER_LEN))
        .ok_or_else(|| too_large(usize::MAX))?;
    for item in items {
        let item_len = item
            .data_len()
            .checked_add(item.uid.len())
            .and_then(|len| len.checked_add(1))
            .and_then(align8)
            .ok_or_else(|| too_large(size))?;
        size = size.checked_add(item_len).ok_or_else(|| too_large(size))?;
    }
    if u32::try_from(size).is_err() {
        return Err(too_large(size));
    }
    Ok(size)
}

fn put_u32(block: &mut Vec<u8>, value: usize) {
    // Callers only pass values below the block size, which fits u32.
    block.extend_from_slice(&(value as u32).to_le_bytes());
}

fn build_export_block(items: &[RetainedStatsItem]) -> ClusterResult<Vec<u8>> {
    let size = export_block_size(items)?;
    let mut block = Vec::new();
    block
        .try_reserve_exact(size)
        .map_err(|_| ClusterError::AllocateError(size))?;

    put_u32(&mut block, items.len());
    put_u32(&mut block, 0);

    let mut offset = EXPORT_HEADER_LEN + items.len() * EXPORT_DESCRIPTOR_LEN;
    for item in items {
        let data_offset = offset;
        let uid_offset = data_offset + item.data_len();
        put_u32(&mut block, uid_offset);
        put_u32(&mut block, item.uid.len());
        put_u32(&mut block, data_offset);
        put_u32(&mut block, item.data_len());
        offset = align8(uid_offset + item.uid.len() + 1).ok_or_else(|| too_large(offset))?;
    }

    for item in items {
        block.extend_from_slice(&item.data);
        block.extend_from_slice(item.uid.as_bytes());
        block.push(0);
        let padded = align8(block.len()).ok_or_else(|| too_large(block.len()))?;
        block.resize(padded, 0);
    }

    if block.len() != size {
        return Err(ClusterError::Error(format!(
            "retained stats export wrote {} bytes, sized {size}",
            block.len()
        )));
    }
    Ok(block)
}

/// One item read back out of an export block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetainedStatsEntry<'a> {
    pub uid: &'a str,
    pub data: &'a [u8],
}

/// An exported copy of one peer's retained statistics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetainedStatsLookup {
    block: Vec<u8>,
}

impl RetainedStatsLookup {
    fn read_u32(&self, at: usize) -> Option<usize> {
        let raw = self.block.get(at..at + 4)?;
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(raw);
        Some(u32::from_le_bytes(bytes) as usize)
    }

    pub fn len(&self) -> usize {
        self.read_u32(0).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<RetainedStatsEntry<'_>> {
        if index >= self.len() {
            return None;
        }
        let at = EXPORT_HEADER_LEN + index * EXPORT_DESCRIPTOR_LEN;
        let uid_offset = self.read_u32(at)?;
        let uid_len = self.read_u32(at + 4)?;
        let data_offset = self.read_u32(at + 8)?;
        let data_len = self.read_u32(at + 12)?;
        let uid = self.block.get(uid_offset..uid_offset + uid_len)?;
        Some(RetainedStatsEntry {
            uid: std::str::from_utf8(uid).ok()?,
            data: self.block.get(data_offset..data_offset + data_len)?,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = RetainedStatsEntry<'_>> {
        (0..self.len()).filter_map(|index| self.get(index))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.block
    }

    pub fn byte_len(&self) -> usize {
        self.block.len()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.block
    }
}

/// Per-peer retained statistics keyed by server UID.
pub struct GlobalRetainedStatsManager {
    name: String,
    stats: Mutex<HashMap<String, RetainedStatsVector>>,
}

impl GlobalRetainedStatsManager {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            stats: Mutex::new(HashMap::new()),
        }
    }

    /// Replaces the vector stored for `uid`.
    pub fn on_retained_stats_change(
        &self,
        node: ClusterHandle,
        uid: &str,
        stats: RetainedStatsVector,
    ) -> ClusterResult<()> {
        if uid.is_empty() {
            return Err(ClusterError::NullArgument("uid"));
        }
        debug!(
            "{}:{}:{} {node} uid={uid} items={}",
            self.name,
            GLOBAL_RETAINED_STATS_TAG,
            GLOBAL_RETAINED_STATS_FN_CHANGE_TAG,
            stats.len()
        );
        self.stats.lock().insert(uid.to_string(), stats);
        Ok(())
    }

    pub fn on_retained_stats_remove(&self, node: ClusterHandle, uid: &str) -> ClusterResult<()> {
        if uid.is_empty() {
            return Err(ClusterError::NullArgument("uid"));
        }
        let removed = self.stats.lock().remove(uid).is_some();
        debug!(
            "{}:{}:{} {node} uid={uid} removed={removed}",
            self.name, GLOBAL_RETAINED_STATS_TAG, GLOBAL_RETAINED_STATS_FN_REMOVE_TAG
        );
        Ok(())
    }

    /// Exports the statistics stored for `uid`. An unknown UID is `Ok(None)`.
    pub fn lookup_retained_stats(&self, uid: &str) -> ClusterResult<Option<RetainedStatsLookup>> {
        let stats = self.stats.lock();
        let Some(items) = stats.get(uid) else {
            trace!(
                "{}:{}:{} uid={uid} not found",
                self.name,
                GLOBAL_RETAINED_STATS_TAG,
                GLOBAL_RETAINED_STATS_FN_LOOKUP_TAG
            );
            return Ok(None);
        };
        let block = build_export_block(items)?;
        Ok(Some(RetainedStatsLookup { block }))
    }

    /// Releases a block returned by [`GlobalRetainedStatsManager::lookup_retained_stats`].
    pub fn free_retained_stats(&self, lookup: Option<RetainedStatsLookup>) {
        drop(lookup);
    }

    pub fn contains(&self, uid: &str) -> bool {
        self.stats.lock().contains_key(uid)
    }

    pub fn len(&self) -> usize {
        self.stats.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.lock().is_empty()
    }

    pub fn close(&self) {
        let mut stats = self.stats.lock();
        info!(
            "{}:{} closing, dropping {} peers",
            self.name,
            GLOBAL_RETAINED_STATS_TAG,
            stats.len()
        );
        stats.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::{
        align8, build_export_block, export_block_size, GlobalRetainedStatsManager,
        EXPORT_DESCRIPTOR_LEN, EXPORT_HEADER_LEN,
    };
    use crate::error::ClusterError;
    use crate::handles::ClusterHandle;
    use crate::stats::RetainedStatsItem;
    use bytes::Bytes;

    fn items(layout: &[(&str, usize)]) -> Vec<RetainedStatsItem> {
        layout.iter()
            .map(|(uid, len)| RetainedStatsItem::new(*uid, vec![0xAB; *len]))
            .collect()
    }

    fn expected_size(items: &[RetainedStatsItem]) -> usize {
        EXPORT_HEADER_LEN
            + items.len() * EXPORT_DESCRIPTOR_LEN
            + items
                .iter()
                .map(|item| (item.data_len() + item.uid.len() + 1 + 7) / 8 * 8)
                .sum::<usize>()
    }

    #[test]
    fn align8_rounds_up() {
        assert_eq!(align8(0), Some(0));
        assert_eq!(align8(1), Some(8));
        assert_eq!(align8(8), Some(8));
        assert_eq!(align8(9), Some(16));
        assert_eq!(align8(usize::MAX), None);
    }

    #[test]
    fn computed_size_matches_bytes_written() {
        let cases = [
            items(&[]),
            items(&[("u", 0)]),
            items(&[("uid-1", 3), ("uid-22", 8), ("", 13)]),
            items(&[("abcdefg", 0), ("x", 7), ("yy", 6), ("zzz", 64)]),
        ];

        for case in cases {
            let size = export_block_size(&case).expect("size");
            let block = build_export_block(&case).expect("block");
            assert_eq!(size, expected_size(&case));
            assert_eq!(block.len(), size);
        }
    }

    #[test]
    fn payloads_are_eight_byte_aligned_and_uids_nul_terminated() {
        let case = items(&[("a", 1), ("bb", 9), ("ccc", 0)]);
        let manager = GlobalRetainedStatsManager::new("test");
        manager
            .on_retained_stats_change(ClusterHandle(1), "peer", case.clone())
            .expect("change");

        let lookup = manager
            .lookup_retained_stats("peer")
            .expect("lookup")
            .expect("found");
        let bytes = lookup.as_bytes();
        for index in 0..lookup.len() {
            let at = EXPORT_HEADER_LEN + index * EXPORT_DESCRIPTOR_LEN;
            let field = |offset: usize| {
                u32::from_le_bytes([
                    bytes[at + offset],
                    bytes[at + offset + 1],
                    bytes[at + offset + 2],
                    bytes[at + offset + 3],
                ]) as usize
            };
            let (uid_offset, uid_len, data_offset) = (field(0), field(4), field(8));
            assert_eq!(data_offset % 8, 0);
            assert_eq!(bytes[uid_offset + uid_len], 0);
        }

        let entries: Vec<_> = lookup.iter().collect();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1].uid, "bb");
        assert_eq!(entries[1].data, &[0xAB; 9][..]);
        assert!(entries[2].data.is_empty());
    }

    #[test]
    fn three_item_lookup_end_to_end() {
        let manager = GlobalRetainedStatsManager::new("test");
        let stats = items(&[("t1", 5), ("t2", 16), ("t3", 2)]);
        manager
            .on_retained_stats_change(ClusterHandle(9), "peer1", stats.clone())
            .expect("change");

        let lookup = manager
            .lookup_retained_stats("peer1")
            .expect("lookup")
            .expect("found");

        assert_eq!(lookup.len(), 3);
        assert_eq!(lookup.byte_len(), expected_size(&stats));
        assert_eq!(lookup.get(0).map(|entry| entry.uid), Some("t1"));
        assert!(lookup.get(3).is_none());
        manager.free_retained_stats(Some(lookup));
        manager.free_retained_stats(None);
    }

    #[test]
    fn unknown_uid_is_not_found_rather_than_error() {
        let manager = GlobalRetainedStatsManager::new("test");
        assert_eq!(manager.lookup_retained_stats("nobody"), Ok(None));
    }

    #[test]
    fn change_replaces_wholesale_and_remove_erases() {
        let manager = GlobalRetainedStatsManager::new("test");
        manager
            .on_retained_stats_change(ClusterHandle(1), "peer", items(&[("a", 1), ("b", 1)]))
            .expect("first");
        manager
            .on_retained_stats_change(ClusterHandle(1), "peer", items(&[("c", 4)]))
            .expect("second");

        let lookup = manager
            .lookup_retained_stats("peer")
            .expect("lookup")
            .expect("found");
        assert_eq!(lookup.len(), 1);
        assert_eq!(lookup.get(0).map(|entry| entry.uid), Some("c"));

        manager
            .on_retained_stats_remove(ClusterHandle(1), "peer")
            .expect("remove");
        manager
            .on_retained_stats_remove(ClusterHandle(1), "peer")
            .expect("remove absent");
        assert!(!manager.contains("peer"));
        assert_eq!(
            manager.on_retained_stats_remove(ClusterHandle(1), ""),
            Err(ClusterError::NullArgument("uid"))
        );
    }

    #[test]
    fn change_and_remove_release_prior_vectors() {
        let manager = GlobalRetainedStatsManager::new("test");
        let first = Bytes::from(vec![1u8; 12]);
        let second = Bytes::from(vec![2u8; 20]);

        manager
            .on_retained_stats_change(
                ClusterHandle(1),
                "peer",
                vec![RetainedStatsItem::new("a", first.clone())],
            )
            .expect("first");
        assert!(!first.is_unique());

        manager
            .on_retained_stats_change(
                ClusterHandle(1),
                "peer",
                vec![RetainedStatsItem::new("b", second.clone())],
            )
            .expect("replace");
        assert!(first.is_unique(), "replaced vector was released");
        assert!(!second.is_unique());

        manager
            .on_retained_stats_remove(ClusterHandle(1), "peer")
            .expect("remove");
        assert!(second.is_unique(), "removed vector was released");
    }

    #[test]
    fn close_drops_every_peer() {
        let manager = GlobalRetainedStatsManager::new("test");
        manager
            .on_retained_stats_change(ClusterHandle(1), "a", items(&[("x", 1)]))
            .expect("a");
        manager
            .on_retained_stats_change(ClusterHandle(2), "b", Vec::new())
            .expect("b");
        assert_eq!(manager.len(), 2);

        manager.close();
        assert!(manager.is_empty());
    }
}
