//! Attribute keys under which payloads are exchanged between cluster members.
//!
//! The strings are part of the interop contract with peers and must not change.

pub const BF_EXACT_SUB: &str = "_BF_E";
pub const BF_WILDCARD_SUB: &str = "_BF_W";
pub const BF_BASE_SUFFIX: &str = "_B";
pub const BF_UPDATE_SUFFIX: &str = "_U";

pub const BF_EXACT_SUB_BASE: &str = "_BF_E_B";
pub const BF_EXACT_SUB_UPDATE: &str = "_BF_E_U";
pub const BF_WILDCARD_SUB_BASE: &str = "_BF_W_B";
pub const BF_WILDCARD_SUB_UPDATE: &str = "_BF_W_U";

pub const BF_WILDCARD_SUBSCRIPTION_PATTERN_BASE: &str = "_BF_WCSP_B";
pub const BF_WILDCARD_SUBSCRIPTION_PATTERN_UPDATE: &str = "_BF_WCSP_U";

pub const RCF_BASE: &str = "_RCF_B";
pub const RCF_UPDATE: &str = "_RCF_U";

pub const WCSUB_STATS: &str = "_WCS_STATS";
pub const FWD_ENDPOINT: &str = "_FWD_EP";
pub const LOCAL_SERVER_INFO: &str = "_LSI";
pub const RETAINED_STATS: &str = "_RET_STATS";
pub const MONITORING_STATUS: &str = "_MON_STATUS";
pub const REMOVED_SERVERS_LIST: &str = "_RSL";
pub const RESTORED_NOT_IN_VIEW: &str = "_RNIV";

/// Payload kind identified by an attribute key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FilterTag {
    ExactSubBase,
    ExactSubUpdate(u32),
    WildcardSubBase,
    WildcardSubUpdate(u32),
    SubscriptionPatternBase,
    SubscriptionPatternUpdate(u32),
    RetainedCoveringFilterBase,
    RetainedCoveringFilterUpdate(u32),
    WildcardSubStats,
    ForwardingEndpoint,
    LocalServerInfo,
    RetainedStats,
    MonitoringStatus,
    RemovedServersList,
    RestoredNotInView,
}

impl FilterTag {
    /// Classifies an attribute key.
    ///
    /// Update keys carry a decimal sequence suffix (e.g. `_BF_E_U7`). Longer
    /// tags are matched before their prefixes.
    pub fn classify(key: &str) -> Option<FilterTag> {
        let exact = match key {
            BF_EXACT_SUB_BASE => Some(FilterTag::ExactSubBase),
            BF_WILDCARD_SUB_BASE => Some(FilterTag::WildcardSubBase),
            BF_WILDCARD_SUBSCRIPTION_PATTERN_BASE => Some(FilterTag::SubscriptionPatternBase),
            RCF_BASE => Some(FilterTag::RetainedCoveringFilterBase),
            WCSUB_STATS => Some(FilterTag::WildcardSubStats),
            FWD_ENDPOINT => Some(FilterTag::ForwardingEndpoint),
            LOCAL_SERVER_INFO => Some(FilterTag::LocalServerInfo),
            RETAINED_STATS => Some(FilterTag::RetainedStats),
            MONITORING_STATUS => Some(FilterTag::MonitoringStatus),
            REMOVED_SERVERS_LIST => Some(FilterTag::RemovedServersList),
            RESTORED_NOT_IN_VIEW => Some(FilterTag::RestoredNotInView),
            _ => None,
        };
        if exact.is_some() {
            return exact;
        }

        let updates: [(&str, fn(u32) -> FilterTag); 4] = [
            (
                BF_WILDCARD_SUBSCRIPTION_PATTERN_UPDATE,
                FilterTag::SubscriptionPatternUpdate,
            ),
            (BF_EXACT_SUB_UPDATE, FilterTag::ExactSubUpdate),
            (BF_WILDCARD_SUB_UPDATE, FilterTag::WildcardSubUpdate),
            (RCF_UPDATE, FilterTag::RetainedCoveringFilterUpdate),
        ];
        updates.iter().find_map(|&(prefix, make)| {
            key.strip_prefix(prefix)
                .and_then(|suffix| suffix.parse::<u32>().ok())
                .map(make)
        })
    }

    /// Builds the attribute key for a numbered update.
    pub fn update_key(prefix: &str, update_num: u32) -> String {
        format!("{prefix}{update_num}")
    }
}

/// Composes a bloom-filter base key, e.g. `_BF_E` + `_B`.
pub fn bloom_filter_base_key(tag: &str) -> String {
    format!("{tag}{BF_BASE_SUFFIX}")
}

/// Composes a bloom-filter update key, e.g. `_BF_W` + `_U` + `3`.
pub fn bloom_filter_update_key(tag: &str, update_num: u32) -> String {
    format!("{tag}{BF_UPDATE_SUFFIX}{update_num}")
}
