//! Attribute payloads published under the keys in [`crate::wire::filter_tags`].
//!
//! Every payload except the local server info starts with an `int64`
//! sequence number; receivers apply a payload only if its sequence number is
//! newer than the last one applied for the same peer and kind.

use crate::error::{ClusterError, ClusterResult};
use crate::membership::remote_server_record::RemoteServerRecord;
use crate::membership::removed_servers::RemovedServers;
use crate::stats::local_monitoring::{HaStatus, HealthStatus};
use crate::stats::{RetainedStatsItem, RetainedStatsVector};
use crate::wire::buffer::{WireReader, WireWriter, INT32_LEN, INT64_LEN, MIN_STRING_LEN};
use crate::wire::sub_covering_filter::{RemoteSubscriptionStats, SubCoveringFilterWireFormat};
use crate::wire::ATTR_VERSION;
use bytes::Bytes;

const MIN_RETAINED_ITEM_LEN: usize = MIN_STRING_LEN + INT32_LEN;
const MIN_RESTORED_RECORD_LEN: usize = 2 * MIN_STRING_LEN + INT64_LEN;

/// Splits the leading sequence number off a received payload.
pub fn read_sqn(payload: Bytes) -> ClusterResult<(i64, WireReader)> {
    let mut reader = WireReader::new(payload);
    let sqn = reader.get_i64()?;
    Ok((sqn, reader))
}

/// `sqn, uint32 n, n x (string uid, uint32 len, bytes)`
pub fn encode_retained_stats<'a, I>(sqn: i64, items: I) -> ClusterResult<Bytes>
where
    I: IntoIterator<Item = (&'a str, &'a [u8])>,
    I::IntoIter: ExactSizeIterator,
{
    let items = items.into_iter();
    let count = u32::try_from(items.len())
        .map_err(|_| ClusterError::Error(format!("{} retained stats entries", items.len())))?;
    let mut writer = WireWriter::new();
    writer.put_i64(sqn);
    writer.put_u32(count);
    for (uid, data) in items {
        let len = u32::try_from(data.len())
            .map_err(|_| ClusterError::Error(format!("retained stats for {uid} too large")))?;
        writer.put_string(uid)?;
        writer.put_u32(len);
        writer.put_bytes(data);
    }
    Ok(writer.freeze())
}

pub fn read_retained_stats(reader: &mut WireReader) -> ClusterResult<RetainedStatsVector> {
    let count = reader.get_u32_count(MIN_RETAINED_ITEM_LEN, "retained stats")?;
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        let uid = reader.get_string()?;
        let len = reader.get_u32()? as usize;
        let data = reader.get_bytes(len)?;
        items.push(RetainedStatsItem { uid, data });
    }
    Ok(items)
}

/// `sqn, u8 health, u8 ha`
pub fn encode_monitoring_status(sqn: i64, health: HealthStatus, ha: HaStatus) -> Bytes {
    let mut writer = WireWriter::with_capacity(INT64_LEN + 2);
    writer.put_i64(sqn);
    writer.put_u8(health as u8);
    writer.put_u8(ha as u8);
    writer.freeze()
}

pub fn read_monitoring_status(reader: &mut WireReader) -> ClusterResult<(HealthStatus, HaStatus)> {
    let health = reader.get_u8()?;
    let health = HealthStatus::from_u8(health)
        .ok_or_else(|| ClusterError::decode(format!("unknown health status {health}")))?;
    let ha = reader.get_u8()?;
    let ha = HaStatus::from_u8(ha)
        .ok_or_else(|| ClusterError::decode(format!("unknown HA status {ha}")))?;
    Ok((health, ha))
}

/// `sqn` followed by the [`RemovedServers`] list.
pub fn encode_removed_servers(sqn: i64, removed: &RemovedServers) -> ClusterResult<Bytes> {
    let mut writer = WireWriter::new();
    writer.put_i64(sqn);
    removed.write(ATTR_VERSION, &mut writer)?;
    Ok(writer.freeze())
}

/// `sqn, int32 n, n x (string uid, string name, int64 incarnation)`
pub fn encode_restored_not_in_view(
    sqn: i64,
    records: &[RemoteServerRecord],
) -> ClusterResult<Bytes> {
    let count = i32::try_from(records.len())
        .map_err(|_| ClusterError::Error(format!("{} restored records", records.len())))?;
    let mut writer = WireWriter::new();
    writer.put_i64(sqn);
    writer.put_i32(count);
    for record in records {
        writer.put_string(record.server_uid())?;
        writer.put_string(record.server_name())?;
        writer.put_i64(record.incarnation_number());
    }
    Ok(writer.freeze())
}

pub fn read_restored_not_in_view(reader: &mut WireReader) -> ClusterResult<Vec<RemoteServerRecord>> {
    let count = reader.get_count(MIN_RESTORED_RECORD_LEN, "restored not in view")?;
    let mut records = Vec::with_capacity(count);
    for _ in 0..count {
        let uid = reader.get_string()?;
        let name = reader.get_string()?;
        let incarnation = reader.get_i64()?;
        records.push(RemoteServerRecord::new(uid, name, incarnation));
    }
    Ok(records)
}

/// `sqn` followed by the [`RemoteSubscriptionStats`] layout.
pub fn encode_subscription_stats(sqn: i64, stats: &RemoteSubscriptionStats) -> ClusterResult<Bytes> {
    let mut writer = WireWriter::new();
    writer.put_i64(sqn);
    SubCoveringFilterWireFormat::write_subscription_stats(ATTR_VERSION, stats, &mut writer)?;
    Ok(writer.freeze())
}

pub fn read_subscription_stats(reader: &mut WireReader) -> ClusterResult<RemoteSubscriptionStats> {
    SubCoveringFilterWireFormat::read_subscription_stats(ATTR_VERSION, reader)
}

/// Protocol versions and name a server advertises when it joins.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalServerInfo {
    pub supported_version: i16,
    pub used_version: i16,
    pub server_name: String,
}

impl LocalServerInfo {
    pub fn encode(&self) -> ClusterResult<Bytes> {
        let mut writer = WireWriter::new();
        writer.put_i16(self.supported_version);
        writer.put_i16(self.used_version);
        writer.put_string(&self.server_name)?;
        Ok(writer.freeze())
    }

    pub fn decode(payload: Bytes) -> ClusterResult<Self> {
        let mut reader = WireReader::new(payload);
        Ok(Self {
            supported_version: reader.get_i16()?,
            used_version: reader.get_i16()?,
            server_name: reader.get_string()?,
        })
    }
}

/// Address peers use to open a forwarding channel to this server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForwardingEndpoint {
    pub address: String,
    pub port: u16,
    pub use_tls: bool,
}

impl ForwardingEndpoint {
    /// `string address, int16 port, bool use_tls`; the port travels as its
    /// 16-bit pattern.
    pub fn encode(&self) -> ClusterResult<Bytes> {
        let mut writer = WireWriter::new();
        writer.put_string(&self.address)?;
        writer.put_u16(self.port);
        writer.put_bool(self.use_tls);
        Ok(writer.freeze())
    }

    pub fn decode(payload: Bytes) -> ClusterResult<Self> {
        let mut reader = WireReader::new(payload);
        Ok(Self {
            address: reader.get_string()?,
            port: reader.get_u16()?,
            use_tls: reader.get_bool()?,
        })
    }
}
