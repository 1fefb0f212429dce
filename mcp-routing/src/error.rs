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

//! Error taxonomy shared by every control-plane component.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type ClusterResult<T> = Result<T, ClusterError>;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ClusterError {
    /// A required argument was absent or empty.
    #[error("required argument `{0}` is missing")]
    NullArgument(&'static str),

    /// An optional collaborator was never registered.
    #[error("collaborator `{0}` is not registered")]
    NullPointer(&'static str),

    /// Allocation of an export block failed.
    #[error("unable to allocate {0} bytes")]
    AllocateError(usize),

    /// A wire payload could not be decoded.
    #[error("malformed wire payload: {0}")]
    Decode(String),

    /// The component (or a collaborator) has been closed.
    #[error("component is closed")]
    Closed,

    /// The local server UID was found on the removed servers list.
    #[error("local server `{0}` is on the removed servers list")]
    LocalServerRemoved(String),

    #[error("configuration error: {0}")]
    Config(String),

    /// Generic, unclassified failure.
    #[error("{0}")]
    Error(String),
}

impl ClusterError {
    pub(crate) fn decode(msg: impl Into<String>) -> Self {
        ClusterError::Decode(msg.into())
    }
}
