// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Counter flags and the immutable per-counter schema entry.
//!
//! A counter's flags word packs three independent fields:
//!
//! - **type** (bits 0..=3, exactly one set): 32-bit integer, 64-bit
//!   integer, 8-byte text, or 8-byte identifier;
//! - **format** (bits 16..=19, at most one set; none means raw count):
//!   delta, rate, ratio, or timer;
//! - **modifiers** (bits 20+): [`CounterFlags::MONOTONIC`],
//!   [`CounterFlags::USE_PRIOR_VALUE`], [`CounterFlags::PCT`].
//!
//! On the wire a counter definition is a fixed 44-byte record: id, flags,
//! related id (i32, little-endian) and a 32-byte NUL-padded description.
//! The record size never varies with the description length.

use std::fmt;
use std::ops::BitOr;

use crate::error::MetricsError;
use crate::ids::CounterId;

/// Fixed size of one counter definition record in the region.
pub const COUNTER_DEF_RECORD_SIZE: usize = 44;

/// Bytes reserved for the description within a record.
pub const DESCRIPTION_SIZE: usize = 32;

const _: () = assert!(COUNTER_DEF_RECORD_SIZE == 3 * 4 + DESCRIPTION_SIZE);

/// The storage type of a counter cell.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CounterType {
    Int32,
    Int64,
    Text,
    /// An 8-byte identifier; stored like [`CounterType::Int64`] and
    /// conventionally displayed as 16 hex digits.
    Ident,
}

impl CounterType {
    /// Bytes the counter occupies within an instance slot.
    pub const fn size(self) -> usize {
        match self {
            CounterType::Int32 => 4,
            CounterType::Int64 | CounterType::Text | CounterType::Ident => 8,
        }
    }
}

/// How derivation transforms a raw sampled value.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CounterFormat {
    /// Raw value, unchanged.
    Count,
    /// v − v_prev between consecutive samples.
    Delta,
    /// (v − v_prev) · 1000 / Δt_ms, a per-second rate.
    Rate,
    /// v / v_related within one sample.
    Ratio,
    /// (v − v_prev) / Δt_ms over a monotonic millisecond counter: the
    /// fraction of wall time spent in the timed scope.
    Timer,
}

/// The packed flags word of one counter.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[repr(transparent)]
pub struct CounterFlags(i32);

impl CounterFlags {
    pub const TYPE_32BIT: CounterFlags = CounterFlags(0x0000_0001);
    pub const TYPE_64BIT: CounterFlags = CounterFlags(0x0000_0002);
    pub const TYPE_TEXT: CounterFlags = CounterFlags(0x0000_0004);
    pub const TYPE_IDENT: CounterFlags = CounterFlags(0x0000_0008);
    const TYPE_MASK: i32 = 0x0000_000f;

    pub const FORMAT_COUNT: CounterFlags = CounterFlags(0);
    pub const FORMAT_DELTA: CounterFlags = CounterFlags(0x0001_0000);
    pub const FORMAT_RATE: CounterFlags = CounterFlags(0x0002_0000);
    pub const FORMAT_RATIO: CounterFlags = CounterFlags(0x0004_0000);
    pub const FORMAT_TIMER: CounterFlags = CounterFlags(0x0008_0000);
    const FORMAT_MASK: i32 = 0x000f_0000;

    /// The counter never decreases; wide loads get torn-read recovery.
    pub const MONOTONIC: CounterFlags = CounterFlags(0x0010_0000);
    /// Derivation reads the preceding counter in schema order as its source.
    pub const USE_PRIOR_VALUE: CounterFlags = CounterFlags(0x0020_0000);
    /// Derivation multiplies the result by 100.
    pub const PCT: CounterFlags = CounterFlags(0x0040_0000);

    pub const fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> i32 {
        self.0
    }

    /// Decodes the type field. `None` when zero or multiple type bits are
    /// set.
    pub fn counter_type(self) -> Option<CounterType> {
        match self.0 & Self::TYPE_MASK {
            x if x == Self::TYPE_32BIT.0 => Some(CounterType::Int32),
            x if x == Self::TYPE_64BIT.0 => Some(CounterType::Int64),
            x if x == Self::TYPE_TEXT.0 => Some(CounterType::Text),
            x if x == Self::TYPE_IDENT.0 => Some(CounterType::Ident),
            _ => None,
        }
    }

    /// Decodes the format field. `None` when multiple format bits are set.
    pub fn format(self) -> Option<CounterFormat> {
        match self.0 & Self::FORMAT_MASK {
            0 => Some(CounterFormat::Count),
            x if x == Self::FORMAT_DELTA.0 => Some(CounterFormat::Delta),
            x if x == Self::FORMAT_RATE.0 => Some(CounterFormat::Rate),
            x if x == Self::FORMAT_RATIO.0 => Some(CounterFormat::Ratio),
            x if x == Self::FORMAT_TIMER.0 => Some(CounterFormat::Timer),
            _ => None,
        }
    }

    pub const fn is_monotonic(self) -> bool {
        self.0 & Self::MONOTONIC.0 != 0
    }

    pub const fn use_prior_value(self) -> bool {
        self.0 & Self::USE_PRIOR_VALUE.0 != 0
    }

    pub const fn is_pct(self) -> bool {
        self.0 & Self::PCT.0 != 0
    }
}

impl BitOr for CounterFlags {
    type Output = CounterFlags;

    fn bitor(self, rhs: CounterFlags) -> CounterFlags {
        CounterFlags(self.0 | rhs.0)
    }
}

impl fmt::Display for CounterFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// The immutable schema entry for one counter.
///
/// Built either from caller arguments on the producer path or parsed from a
/// region record on the observer path. Offsets and indices are assigned by
/// the owning group; once the group publishes, the definition never changes.
#[derive(Clone, Debug)]
pub struct CounterDef {
    id: CounterId,
    flags: CounterFlags,
    ty: CounterType,
    format: CounterFormat,
    description: String,
    index: usize,
    offset: usize,
    related_id: CounterId,
}

impl CounterDef {
    pub(crate) fn new(
        id: CounterId,
        description: &str,
        flags: CounterFlags,
        offset: usize,
        index: usize,
        related_id: CounterId,
    ) -> Result<Self, MetricsError> {
        let ty = flags.counter_type().ok_or_else(|| {
            MetricsError::InvalidSchema(format!("counter {id} has no single type bit in {flags}"))
        })?;
        let format = flags.format().ok_or_else(|| {
            MetricsError::InvalidSchema(format!(
                "counter {id} has multiple format bits in {flags}"
            ))
        })?;
        Ok(Self {
            id,
            flags,
            ty,
            format,
            description: description.to_owned(),
            index,
            offset,
            related_id,
        })
    }

    /// Parses the 44-byte record at the start of `record`. `offset` and
    /// `index` are recomputed by the caller; only id, flags, related id, and
    /// description live in the region.
    pub(crate) fn parse(
        record: &[u8],
        offset: usize,
        index: usize,
    ) -> Result<Self, MetricsError> {
        if record.len() < COUNTER_DEF_RECORD_SIZE {
            return Err(MetricsError::InvalidSchema(format!(
                "counter record truncated at {} bytes",
                record.len()
            )));
        }
        let id = CounterId::from_raw(read_i32_le(&record[0..4]));
        let flags = CounterFlags::from_raw(read_i32_le(&record[4..8]));
        let related_id = CounterId::from_raw(read_i32_le(&record[8..12]));
        let text = &record[12..12 + DESCRIPTION_SIZE];
        let end = text.iter().position(|&b| b == 0).unwrap_or(DESCRIPTION_SIZE);
        let description = String::from_utf8_lossy(&text[..end]).into_owned();
        Self::new(id, &description, flags, offset, index, related_id)
    }

    /// Writes the fixed 44-byte record into `out`. The description is
    /// truncated to 32 bytes and NUL-padded.
    pub(crate) fn store_to(&self, out: &mut [u8]) {
        out[0..4].copy_from_slice(&self.id.raw().to_le_bytes());
        out[4..8].copy_from_slice(&self.flags.raw().to_le_bytes());
        out[8..12].copy_from_slice(&self.related_id.raw().to_le_bytes());
        let text = &mut out[12..12 + DESCRIPTION_SIZE];
        text.fill(0);
        let bytes = self.description.as_bytes();
        let n = bytes.len().min(DESCRIPTION_SIZE);
        text[..n].copy_from_slice(&bytes[..n]);
    }

    pub fn id(&self) -> CounterId {
        self.id
    }

    /// The four-character name decoded from the id.
    pub fn name(&self) -> String {
        self.id.name()
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn flags(&self) -> CounterFlags {
        self.flags
    }

    pub fn counter_type(&self) -> CounterType {
        self.ty
    }

    pub fn format(&self) -> CounterFormat {
        self.format
    }

    /// Position within the group's schema order.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Byte offset of the counter's cell within an instance slot.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn related_id(&self) -> CounterId {
        self.related_id
    }

    /// Bytes the counter's cell occupies.
    pub fn counter_size(&self) -> usize {
        self.ty.size()
    }
}

fn read_i32_le(bytes: &[u8]) -> i32 {
    i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}
