//! Opaque handles identifying a remote server to each subsystem.

use std::fmt::{Display, Formatter};

macro_rules! opaque_handle {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($label, "#{}"), self.0)
            }
        }
    };
}

opaque_handle!(
    /// Cluster-side handle of a remote server, assigned by the membership layer.
    ClusterHandle,
    "cluster"
);
opaque_handle!(
    /// Protocol-side handle, returned by the protocol callback on create.
    ProtocolHandle,
    "protocol"
);
opaque_handle!(
    /// Engine-side handle of a remote server.
    EngineHandle,
    "engine"
);
