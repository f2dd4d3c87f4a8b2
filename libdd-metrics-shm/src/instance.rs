// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! One row of counter cells within a group.
//!
//! An instance wraps a slot pointer and owns one typed counter view per
//! schema entry, in schema order. Instances that came from
//! [`MetricsGroup::alloc_instance`] zero their slot back on drop, returning
//! it to the pool.

use std::ptr;
use std::sync::atomic::{AtomicI32, Ordering};

use crate::clock::now_millis;
use crate::counter::{Counter, Counter32, Counter64, TextCounter};
use crate::error::MetricsError;
use crate::group::{MetricsGroup, INSTANCE_FLAG_LIVE};
use crate::ids::{CounterId, InstanceId};
use crate::sample::{Sample, Value};

pub struct MetricsInstance<'a> {
    group: &'a MetricsGroup,
    slot: *mut u8,
    counters: Vec<Counter<'a>>,
    cleanup_on_drop: bool,
}

impl<'a> MetricsInstance<'a> {
    pub(crate) fn new(group: &'a MetricsGroup, slot: *mut u8, cleanup_on_drop: bool) -> Self {
        let counters = group
            .counter_definitions()
            .iter()
            .map(|def| Counter::for_definition(def, unsafe { slot.add(def.offset()) }))
            .collect();
        Self {
            group,
            slot,
            counters,
            cleanup_on_drop,
        }
    }

    fn flags(&self) -> &AtomicI32 {
        unsafe { &*(self.slot as *const AtomicI32) }
    }

    pub fn is_alive(&self) -> bool {
        self.flags().load(Ordering::Acquire) & INSTANCE_FLAG_LIVE != 0
    }

    pub fn instance_id(&self) -> InstanceId {
        let id = unsafe { &*(self.slot.add(4) as *const AtomicI32) };
        InstanceId::from_raw(id.load(Ordering::Acquire))
    }

    pub fn counter_by_index(&self, index: usize) -> Result<&Counter<'a>, MetricsError> {
        self.counters
            .get(index)
            .ok_or(MetricsError::InvalidIndex(index))
    }

    pub fn counter_by_id(&self, id: CounterId) -> Result<&Counter<'a>, MetricsError> {
        self.group
            .lookup_index(id)
            .map(|index| &self.counters[index])
            .ok_or(MetricsError::CounterNotFound(id))
    }

    /// The 32-bit view for `id`; `CounterNotFound` when the id is absent or
    /// names a counter of another type.
    pub fn int32_counter_by_id(&self, id: CounterId) -> Result<&Counter32<'a>, MetricsError> {
        self.counter_by_id(id)?
            .as_int32()
            .ok_or(MetricsError::CounterNotFound(id))
    }

    pub fn int64_counter_by_id(&self, id: CounterId) -> Result<&Counter64<'a>, MetricsError> {
        self.counter_by_id(id)?
            .as_int64()
            .ok_or(MetricsError::CounterNotFound(id))
    }

    pub fn text_counter_by_id(&self, id: CounterId) -> Result<&TextCounter<'a>, MetricsError> {
        self.counter_by_id(id)?
            .as_text()
            .ok_or(MetricsError::CounterNotFound(id))
    }

    /// Reads every live counter into `out`. Counters whose definition names
    /// a related counter are derived, not sampled, and are skipped here.
    ///
    /// Returns false without touching `out` when the slot is not live.
    pub fn sample(&self, out: &mut Sample) -> bool {
        if !self.is_alive() {
            return false;
        }
        out.set_time(now_millis());
        for counter in &self.counters {
            let def = counter.definition();
            if !def.related_id().is_null() {
                continue;
            }
            let value = match counter {
                Counter::Text(text) => Value::Text(text.get()),
                other => Value::Float(other.as_double().unwrap_or(0.0)),
            };
            out.insert(def.id(), value);
        }
        true
    }
}

impl Drop for MetricsInstance<'_> {
    fn drop(&mut self) {
        if self.cleanup_on_drop {
            // Zero the id and cells first; releasing the LIVE bit last
            // keeps racing allocators out until the slot is clean.
            unsafe {
                ptr::write_bytes(self.slot.add(4), 0, self.group.instance_size() - 4);
            }
            self.flags().store(0, Ordering::Release);
        }
    }
}
