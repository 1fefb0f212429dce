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

//! # mcp-routing
//!
//! `mcp-routing` is the control plane of a messaging-broker cluster member:
//! it tracks which servers were removed from the cluster, gossips this
//! node's retained-message statistics and health to its peers, caches what
//! the peers gossip back, and tells the protocol layer when forwarding
//! channels to peers must be created or torn down.
//!
//! Typical usage goes through [`ClusterControlPlane`], which wires every
//! component from a [`ControlPlaneConfig`] and an [`AttributeSink`] standing
//! in for the membership service.
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use bytes::Bytes;
//! use mcp_routing::{
//!     AttributeSink, ClusterControlPlane, ClusterResult, ControlPlaneConfig, PublishScheduler,
//! };
//!
//! struct DiscardSink;
//!
//! impl AttributeSink for DiscardSink {
//!     fn set_attribute(&self, _key: &str, _value: Bytes) -> ClusterResult<()> {
//!         Ok(())
//!     }
//! }
//!
//! struct NoTimers;
//!
//! impl PublishScheduler for NoTimers {
//!     fn schedule_publish_retained_task(&self, _delay: Duration) -> ClusterResult<()> {
//!         Ok(())
//!     }
//!
//!     fn schedule_publish_monitoring_task(&self, _delay: Duration) -> ClusterResult<()> {
//!         Ok(())
//!     }
//! }
//!
//! let config = ControlPlaneConfig::new("uid-a", "broker-a");
//! let plane = ClusterControlPlane::new(config, Arc::new(DiscardSink), Arc::new(NoTimers)).unwrap();
//!
//! plane.start(None).unwrap();
//! plane.recovery_completed().unwrap();
//! plane.update_retained_stats("uid-b", Some(&b"stats"[..])).unwrap();
//! assert!(plane.add_removed_server("uid-c", 3).unwrap());
//! plane.close();
//! ```
//!
//! ## Internal architecture map
//!
//! - Facade: [`ClusterControlPlane`] and its configuration
//! - Membership: removed servers, view notifications, peer attribute delivery
//! - Wire: big-endian codecs for every gossiped attribute
//! - Stats: local and global retained statistics, local monitoring status
//! - Forwarding: protocol-layer notifications for forwarding channels
//! - Runtime: tokio-backed publish timers and the view notification thread
//!
//! ## Observability model
//!
//! The crate uses `tracing` for logs/events. Every component takes an
//! instance name at construction and prefixes its events with it. Library
//! code never installs a global subscriber; binaries and tests do that at
//! their boundary. [`LogListener`] feeds numeric-level records from embedded
//! components into the same `tracing` stream.

pub mod config;
pub use config::ControlPlaneConfig;

mod control_plane;
pub use control_plane::{ClusterControlPlane, PeerUpdate};

pub mod error;
pub use error::{ClusterError, ClusterResult};

pub mod forwarding;
pub mod handles;
pub use handles::{ClusterHandle, EngineHandle, ProtocolHandle};

pub mod membership;
pub mod observability;
pub use observability::LogListener;

pub mod runtime;
pub mod stats;
pub use stats::publisher::{
    AttributePublisher, AttributeSink, PublishScheduler, SubCoveringFilterPublisher,
};

pub mod wire;
