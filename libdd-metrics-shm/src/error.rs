// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::ids::{CounterId, MetricsId};
use crate::region::RegionError;

/// Errors surfaced while building a schema or attaching a group to its
/// region. Runtime counter operations are infallible; sampling reports
/// liveness through its boolean return instead of an error.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Unknown or conflicting type flags, an unresolvable counter size, or
    /// a duplicate counter id within one group.
    #[error("invalid counter schema: {0}")]
    InvalidSchema(String),

    /// The region carries a different metrics id than the caller's.
    #[error("metrics id mismatch in region: expected {expected}, found {found}")]
    RegionMismatch {
        expected: MetricsId,
        found: MetricsId,
    },

    /// Counter count, max instances, or an (id, flags) pair in the region
    /// differs from the caller's declared schema.
    #[error("schema mismatch in region: {0}")]
    SchemaMismatch(String),

    /// The backing region could not be created or attached.
    #[error(transparent)]
    Region(#[from] RegionError),

    #[error("counter {0} not found in group")]
    CounterNotFound(CounterId),

    #[error("index {0} out of range")]
    InvalidIndex(usize),
}
