// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Identifier types for metrics groups, counters, and instances.
//!
//! All three are 32-bit integers on the wire. Group and counter ids follow
//! the four-ASCII-byte convention: the human name is packed big-endian into
//! the id, so `"keys"` becomes `0x6b65_7973` and decodes back to `"keys"`.
//! Counter id 0 is reserved to mean "no related counter".

use std::fmt;

/// Packs a four-byte ASCII name into an id, big-endian.
///
/// Panics if `name` is not exactly four bytes; ids shorter or longer than
/// four characters have no defined wire representation.
fn pack_name(name: &str) -> i32 {
    let bytes = name.as_bytes();
    assert!(bytes.len() == 4, "metrics names are exactly 4 bytes: {name:?}");
    i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn unpack_name(id: i32) -> String {
    String::from_utf8_lossy(&id.to_be_bytes()).into_owned()
}

/// Identifies a metrics group. The four-character name doubles as the
/// shared-memory region name.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[repr(transparent)]
pub struct MetricsId(i32);

impl MetricsId {
    pub const fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    pub fn from_name(name: &str) -> Self {
        Self(pack_name(name))
    }

    pub const fn raw(self) -> i32 {
        self.0
    }

    /// The four-character name decoded from the id.
    pub fn name(self) -> String {
        unpack_name(self.0)
    }
}

impl fmt::Display for MetricsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Identifies one counter within a group.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[repr(transparent)]
pub struct CounterId(i32);

impl CounterId {
    /// The reserved "no related counter" id.
    pub const NULL: CounterId = CounterId(0);

    pub const fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    pub fn from_name(name: &str) -> Self {
        Self(pack_name(name))
    }

    pub const fn raw(self) -> i32 {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    pub fn name(self) -> String {
        unpack_name(self.0)
    }
}

impl fmt::Display for CounterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Identifies one instance slot within a multi-instance group. Unlike the
/// other ids, instance ids carry no name convention; producers pick them.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[repr(transparent)]
pub struct InstanceId(i32);

impl InstanceId {
    pub const fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> i32 {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
