//! Identity and incarnation of a cluster peer.

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};

/// A peer's `(uid, name, incarnation)` triple.
///
/// Equality, ordering and hashing look at the UID only, so a set of records
/// answers "is this UID known" regardless of incarnation. `Borrow<str>` lets
/// such a set be probed with a bare UID.
#[derive(Clone, Debug, Default)]
pub struct RemoteServerRecord {
    server_uid: String,
    server_name: String,
    incarnation_number: i64,
}

impl RemoteServerRecord {
    pub fn new(
        server_uid: impl Into<String>,
        server_name: impl Into<String>,
        incarnation_number: i64,
    ) -> Self {
        Self {
            server_uid: server_uid.into(),
            server_name: server_name.into(),
            incarnation_number,
        }
    }

    /// A record usable only as a lookup key.
    pub fn key(server_uid: impl Into<String>) -> Self {
        Self::new(server_uid, String::new(), 0)
    }

    pub fn server_uid(&self) -> &str {
        &self.server_uid
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn incarnation_number(&self) -> i64 {
        self.incarnation_number
    }
}

impl PartialEq for RemoteServerRecord {
    fn eq(&self, other: &Self) -> bool {
        self.server_uid == other.server_uid
    }
}

impl Eq for RemoteServerRecord {}

impl PartialOrd for RemoteServerRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RemoteServerRecord {
    fn cmp(&self, other: &Self) -> Ordering {
        self.server_uid.cmp(&other.server_uid)
    }
}

impl Hash for RemoteServerRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.server_uid.hash(state);
    }
}

impl Borrow<str> for RemoteServerRecord {
    fn borrow(&self) -> &str {
        &self.server_uid
    }
}

impl Display for RemoteServerRecord {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "uid={} name={} inc={}",
            self.server_uid, self.server_name, self.incarnation_number
        )
    }
}
