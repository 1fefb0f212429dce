//! Tombstone set of servers permanently removed from the cluster view.

use crate::error::{ClusterError, ClusterResult};
use crate::membership::remote_server_record::RemoteServerRecord;
use crate::wire::buffer::{WireReader, WireWriter, INT64_LEN, MIN_STRING_LEN};
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use tracing::trace;

const REMOVED_SERVERS_TAG: &str = "RemovedServers:";
const REMOVED_SERVERS_FN_ADD_TAG: &str = "add:";

const MIN_RECORD_LEN: usize = MIN_STRING_LEN + INT64_LEN;

/// Removed servers keyed by UID, keeping the highest incarnation seen.
///
/// Wire layout: `int32 count`, then `count x (string uid, int64 incarnation)`
/// in UID order.
///
/// The type is not internally synchronized; concurrent writers must be
/// serialized by the owner.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RemovedServers {
    servers: BTreeSet<RemoteServerRecord>,
}

impl RemovedServers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `uid`, or raises its incarnation. Returns whether the set changed.
    pub fn add(&mut self, server_uid: &str, incarnation_number: i64) -> bool {
        self.add_record(RemoteServerRecord::new(
            server_uid,
            String::new(),
            incarnation_number,
        ))
    }

    /// Same as [`RemovedServers::add`], keeping the record's name.
    pub fn add_record(&mut self, record: RemoteServerRecord) -> bool {
        match self.servers.get(record.server_uid()) {
            Some(existing) if existing.incarnation_number() >= record.incarnation_number() => {
                false
            }
            Some(existing) => {
                trace!(
                    "{REMOVED_SERVERS_TAG}:{REMOVED_SERVERS_FN_ADD_TAG} {} incarnation {} -> {}",
                    record.server_uid(),
                    existing.incarnation_number(),
                    record.incarnation_number()
                );
                self.servers.replace(record);
                true
            }
            None => {
                trace!(
                    "{REMOVED_SERVERS_TAG}:{REMOVED_SERVERS_FN_ADD_TAG} new tombstone {record}"
                );
                self.servers.insert(record)
            }
        }
    }

    pub fn write(&self, _wire_format_ver: u16, writer: &mut WireWriter) -> ClusterResult<()> {
        let count = i32::try_from(self.servers.len()).map_err(|_| {
            ClusterError::Error(format!("{} removed servers", self.servers.len()))
        })?;
        writer.put_i32(count);
        for record in &self.servers {
            writer.put_string(record.server_uid())?;
            writer.put_i64(record.incarnation_number());
        }
        Ok(())
    }

    /// Folds a serialized list into the set. Returns whether anything changed.
    ///
    /// The whole list is decoded before any record is applied, so a malformed
    /// payload leaves the set untouched.
    pub fn read_add(&mut self, wire_format_ver: u16, reader: &mut WireReader) -> ClusterResult<bool> {
        let records = Self::read_records(wire_format_ver, reader)?;
        let mut changed = false;
        for (uid, incarnation) in records {
            changed |= self.add(&uid, incarnation);
        }
        Ok(changed)
    }

    /// Like [`RemovedServers::read_add`], and appends to `new_servers` every
    /// UID that was absent before it was added.
    pub fn read_merge(
        &mut self,
        wire_format_ver: u16,
        reader: &mut WireReader,
        new_servers: &mut Vec<String>,
    ) -> ClusterResult<bool> {
        let records = Self::read_records(wire_format_ver, reader)?;
        let mut changed = false;
        for (uid, incarnation) in records {
            if !self.contains(&uid) {
                new_servers.push(uid.clone());
            }
            changed |= self.add(&uid, incarnation);
        }
        Ok(changed)
    }

    fn read_records(_wire_format_ver: u16, reader: &mut WireReader) -> ClusterResult<Vec<(String, i64)>> {
        let count = reader.get_count(MIN_RECORD_LEN, "removed servers")?;
        let mut records = Vec::with_capacity(count);
        for _ in 0..count {
            let uid = reader.get_string()?;
            let incarnation = reader.get_i64()?;
            records.push((uid, incarnation));
        }
        Ok(records)
    }

    pub fn contains(&self, server_uid: &str) -> bool {
        self.servers.contains(server_uid)
    }

    pub fn get(&self, server_uid: &str) -> Option<&RemoteServerRecord> {
        self.servers.get(server_uid)
    }

    /// Appends a copy of every record to `out`.
    pub fn export_to(&self, out: &mut Vec<RemoteServerRecord>) {
        out.extend(self.servers.iter().cloned());
    }

    pub fn iter(&self) -> impl Iterator<Item = &RemoteServerRecord> {
        self.servers.iter()
    }

    pub fn clear(&mut self) {
        self.servers.clear();
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

impl Display for RemovedServers {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "RemovedServers[{}]{{", self.servers.len())?;
        for (i, record) in self.servers.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}:{}", record.server_uid(), record.incarnation_number())?;
        }
        write!(f, "}}")
    }
}
