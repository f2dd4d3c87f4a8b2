// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The metrics group: schema owner and region layout orchestrator.
//!
//! # Region layout
//!
//! ```text
//! +-----------------+----------------------+--------------------------------+
//! | definition hdr  | counter definitions  | instance slots                 |
//! | 12 bytes        | 44 bytes x n         | instance_size x max_instances  |
//! +-----------------+----------------------+--------------------------------+
//! ```
//!
//! - **Definition header**: metrics_id, n_counters, max_instances (i32,
//!   little-endian).
//! - **Counter definition record**: id, flags, related_id, 32-byte
//!   NUL-padded description.
//! - **Instance slot**: flags word (bit 0 = LIVE), instance_id word, then
//!   counter cells in schema order, each sized by its type.
//!
//! Integers are explicitly little-endian; the id-to-name convention packs
//! big-endian. Cross-endian attach is unsupported.
//!
//! A group either publishes this layout into a region it created, or
//! attaches to an existing region and validates its declared schema against
//! it (producer restart), or attaches with no declared schema and loads the
//! counter definitions from the region (observer).

use std::collections::HashMap;
use std::ptr;
use std::sync::atomic::{fence, AtomicI32, Ordering};

use tracing::trace;

use crate::definition::{CounterDef, CounterFlags, COUNTER_DEF_RECORD_SIZE};
use crate::error::MetricsError;
use crate::ids::{CounterId, InstanceId, MetricsId};
use crate::instance::MetricsInstance;
use crate::region::{NamedRegion, OpenMode};

/// Bytes of the definition header: metrics_id, n_counters, max_instances.
pub const DEFINITION_HEADER_SIZE: usize = 12;

/// Bytes of an instance slot header: flags word and instance_id word.
pub const INSTANCE_HEADER_SIZE: usize = 8;

/// Bit 0 of a slot's flags word: the slot is allocated.
pub const INSTANCE_FLAG_LIVE: i32 = 0x0000_0001;

/// An ordered set of counter definitions plus the instance slots that hold
/// their cells, published under a four-character metrics name.
pub struct MetricsGroup {
    metrics_id: MetricsId,
    name: String,
    max_instances: usize,
    defs: Vec<CounterDef>,
    by_id: HashMap<CounterId, usize>,
    definition_size: usize,
    instance_size: usize,
    region: Option<NamedRegion>,
}

impl MetricsGroup {
    /// A group identified by id. `max_instances` of 1 makes a
    /// single-instance group; more makes a fixed pool.
    pub fn new(metrics_id: MetricsId, max_instances: usize) -> Self {
        assert!(max_instances >= 1, "groups have at least one instance slot");
        Self {
            metrics_id,
            name: metrics_id.name(),
            max_instances,
            defs: Vec::new(),
            by_id: HashMap::new(),
            definition_size: DEFINITION_HEADER_SIZE,
            instance_size: INSTANCE_HEADER_SIZE,
            region: None,
        }
    }

    /// A group identified by its four-character name.
    pub fn with_name(name: &str, max_instances: usize) -> Self {
        Self::new(MetricsId::from_name(name), max_instances)
    }

    pub fn metrics_id(&self) -> MetricsId {
        self.metrics_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_instances(&self) -> usize {
        self.max_instances
    }

    /// Bytes of one instance slot: header plus all counter cells.
    pub fn instance_size(&self) -> usize {
        self.instance_size
    }

    /// Bytes of the schema block: header plus all definition records.
    pub fn definition_size(&self) -> usize {
        self.definition_size
    }

    fn total_size(&self) -> usize {
        self.definition_size + self.max_instances * self.instance_size
    }

    /// Appends a counter definition. Offsets and indices are assigned in
    /// declaration order; the order is part of the schema (derivation's
    /// `USE_PRIOR_VALUE` depends on it).
    pub fn define_counter(
        &mut self,
        id: CounterId,
        description: &str,
        flags: CounterFlags,
        related_id: CounterId,
    ) -> Result<&CounterDef, MetricsError> {
        assert!(
            self.region.is_none(),
            "counters must be defined before initialize()"
        );
        if self.by_id.contains_key(&id) {
            return Err(MetricsError::InvalidSchema(format!(
                "duplicate counter id {id}"
            )));
        }
        let index = self.defs.len();
        let def = CounterDef::new(id, description, flags, self.instance_size, index, related_id)?;
        self.definition_size += COUNTER_DEF_RECORD_SIZE;
        self.instance_size += def.counter_size();
        self.by_id.insert(id, index);
        self.defs.push(def);
        Ok(&self.defs[index])
    }

    /// [`define_counter`](Self::define_counter) with a four-character name.
    pub fn define_counter_named(
        &mut self,
        name: &str,
        description: &str,
        flags: CounterFlags,
        related_id: CounterId,
    ) -> Result<&CounterDef, MetricsError> {
        self.define_counter(CounterId::from_name(name), description, flags, related_id)
    }

    /// Opens the backing region and either publishes the declared schema
    /// (creator), validates it (attacher with declared counters), or loads
    /// the schema from the region (attacher with none).
    ///
    /// A group with no declared counters attaches strictly: it must not
    /// create an empty region under the observed name.
    pub fn initialize(&mut self) -> Result<(), MetricsError> {
        let mode = if self.defs.is_empty() {
            OpenMode::OpenExisting
        } else {
            OpenMode::OpenOrCreate
        };
        let mut region = NamedRegion::open(&self.name, self.total_size(), mode)?;

        if region.was_created() {
            self.publish(&mut region);
        } else {
            self.attach(&region)?;
        }

        self.region = Some(region);
        Ok(())
    }

    /// Creator path: zero the region and write the header and definition
    /// records, then fence so attachers that observe the header also
    /// observe the records.
    fn publish(&mut self, region: &mut NamedRegion) {
        let mem = region.as_slice_mut();
        mem.fill(0);

        mem[0..4].copy_from_slice(&self.metrics_id.raw().to_le_bytes());
        mem[4..8].copy_from_slice(&(self.defs.len() as i32).to_le_bytes());
        mem[8..12].copy_from_slice(&(self.max_instances as i32).to_le_bytes());

        for (i, def) in self.defs.iter().enumerate() {
            let at = DEFINITION_HEADER_SIZE + i * COUNTER_DEF_RECORD_SIZE;
            def.store_to(&mut mem[at..at + COUNTER_DEF_RECORD_SIZE]);
        }

        fence(Ordering::Release);
        trace!(
            "published schema for group {:?}: {} counters, {} instance slots",
            self.name,
            self.defs.len(),
            self.max_instances
        );
    }

    /// Attacher path: validate the declared schema against the region, or
    /// load the schema from it.
    fn attach(&mut self, region: &NamedRegion) -> Result<(), MetricsError> {
        fence(Ordering::Acquire);
        let mem = region.as_slice();
        if mem.len() < DEFINITION_HEADER_SIZE {
            return Err(MetricsError::SchemaMismatch(format!(
                "region holds {} bytes, too small for a definition header",
                mem.len()
            )));
        }

        let found = MetricsId::from_raw(read_i32_le(&mem[0..4]));
        if found != self.metrics_id {
            return Err(MetricsError::RegionMismatch {
                expected: self.metrics_id,
                found,
            });
        }
        let n_counters = read_i32_le(&mem[4..8]);
        let max_instances = read_i32_le(&mem[8..12]);

        if self.defs.is_empty() {
            self.load_schema(mem, n_counters, max_instances)
        } else {
            self.validate_schema(mem, n_counters, max_instances)
        }
    }

    fn validate_schema(
        &self,
        mem: &[u8],
        n_counters: i32,
        max_instances: i32,
    ) -> Result<(), MetricsError> {
        if n_counters as usize != self.defs.len() {
            return Err(MetricsError::SchemaMismatch(format!(
                "region declares {n_counters} counters, caller declared {}",
                self.defs.len()
            )));
        }
        if max_instances as usize != self.max_instances {
            return Err(MetricsError::SchemaMismatch(format!(
                "region declares {max_instances} instance slots, caller declared {}",
                self.max_instances
            )));
        }
        if mem.len() < self.total_size() {
            return Err(MetricsError::SchemaMismatch(format!(
                "region holds {} bytes, schema needs {}",
                mem.len(),
                self.total_size()
            )));
        }

        for def in &self.defs {
            let at = DEFINITION_HEADER_SIZE + def.index() * COUNTER_DEF_RECORD_SIZE;
            let id = CounterId::from_raw(read_i32_le(&mem[at..at + 4]));
            let flags = CounterFlags::from_raw(read_i32_le(&mem[at + 4..at + 8]));
            if id != def.id() {
                return Err(MetricsError::SchemaMismatch(format!(
                    "counter {} in region where {} was declared",
                    id,
                    def.id()
                )));
            }
            if flags != def.flags() {
                return Err(MetricsError::SchemaMismatch(format!(
                    "counter {} has flags {flags} in region, {} declared",
                    def.id(),
                    def.flags()
                )));
            }
        }

        trace!("validated schema for group {:?} against region", self.name);
        Ok(())
    }

    fn load_schema(
        &mut self,
        mem: &[u8],
        n_counters: i32,
        max_instances: i32,
    ) -> Result<(), MetricsError> {
        if n_counters <= 0 || max_instances <= 0 {
            return Err(MetricsError::SchemaMismatch(format!(
                "region declares {n_counters} counters and {max_instances} instance slots"
            )));
        }
        let n = n_counters as usize;
        if mem.len() < DEFINITION_HEADER_SIZE + n * COUNTER_DEF_RECORD_SIZE {
            return Err(MetricsError::SchemaMismatch(format!(
                "region holds {} bytes, too small for {n} counter records",
                mem.len()
            )));
        }

        self.max_instances = max_instances as usize;
        let mut offset = INSTANCE_HEADER_SIZE;
        for index in 0..n {
            let at = DEFINITION_HEADER_SIZE + index * COUNTER_DEF_RECORD_SIZE;
            let def = CounterDef::parse(&mem[at..at + COUNTER_DEF_RECORD_SIZE], offset, index)?;
            if self.by_id.contains_key(&def.id()) {
                return Err(MetricsError::InvalidSchema(format!(
                    "duplicate counter id {} in region",
                    def.id()
                )));
            }
            offset += def.counter_size();
            self.definition_size += COUNTER_DEF_RECORD_SIZE;
            self.instance_size += def.counter_size();
            self.by_id.insert(def.id(), index);
            self.defs.push(def);
        }

        if mem.len() < self.total_size() {
            return Err(MetricsError::SchemaMismatch(format!(
                "region holds {} bytes, loaded schema needs {}",
                mem.len(),
                self.total_size()
            )));
        }

        trace!(
            "loaded schema for group {:?} from region: {} counters, {} instance slots",
            self.name,
            self.defs.len(),
            self.max_instances
        );
        Ok(())
    }

    pub fn counter_definitions(&self) -> &[CounterDef] {
        &self.defs
    }

    pub fn definition(&self, index: usize) -> Result<&CounterDef, MetricsError> {
        self.defs.get(index).ok_or(MetricsError::InvalidIndex(index))
    }

    pub fn definition_by_id(&self, id: CounterId) -> Result<&CounterDef, MetricsError> {
        self.lookup_index(id)
            .map(|i| &self.defs[i])
            .ok_or(MetricsError::CounterNotFound(id))
    }

    pub(crate) fn lookup_index(&self, id: CounterId) -> Option<usize> {
        self.by_id.get(&id).copied()
    }

    fn region(&self) -> &NamedRegion {
        match &self.region {
            Some(region) => region,
            None => panic!("metrics group {:?} is not initialized", self.name),
        }
    }

    fn slot_ptr(&self, index: usize) -> *mut u8 {
        debug_assert!(index < self.max_instances);
        unsafe {
            self.region()
                .as_ptr()
                .add(self.definition_size + index * self.instance_size)
        }
    }

    fn slot_flags(&self, slot: *mut u8) -> &AtomicI32 {
        unsafe { &*(slot as *const AtomicI32) }
    }

    fn slot_id(&self, slot: *mut u8) -> &AtomicI32 {
        unsafe { &*(slot.add(4) as *const AtomicI32) }
    }

    /// The sole instance of a single-instance group. First use marks the
    /// slot LIVE with the metrics id as instance id; later calls (from this
    /// or any other process) see the live slot and never re-zero it.
    pub fn get_instance(&self) -> MetricsInstance<'_> {
        assert!(
            self.max_instances == 1,
            "get_instance() is for single-instance groups"
        );
        let slot = self.slot_ptr(0);
        let flags = self.slot_flags(slot);
        if flags.load(Ordering::Acquire) & INSTANCE_FLAG_LIVE == 0 {
            unsafe {
                ptr::write_bytes(slot, 0, self.instance_size);
            }
            self.slot_id(slot).store(self.metrics_id.raw(), Ordering::Relaxed);
            flags.store(INSTANCE_FLAG_LIVE, Ordering::Release);
        } else {
            debug_assert_eq!(
                self.slot_id(slot).load(Ordering::Relaxed),
                self.metrics_id.raw()
            );
        }
        MetricsInstance::new(self, slot, false)
    }

    /// Claims the first free slot of a multi-instance group, zeroes its
    /// cells, and stamps `instance_id`. The returned handle zeroes the slot
    /// back on drop. `None` when every slot is live.
    pub fn alloc_instance(&self, instance_id: InstanceId) -> Option<MetricsInstance<'_>> {
        assert!(
            self.max_instances > 1,
            "alloc_instance() is for multi-instance groups"
        );
        for index in 0..self.max_instances {
            let slot = self.slot_ptr(index);
            let flags = self.slot_flags(slot);
            if flags.load(Ordering::Acquire) & INSTANCE_FLAG_LIVE != 0 {
                continue;
            }
            // Claim before zeroing so a racing allocator cannot adopt the
            // same slot.
            if flags.fetch_or(INSTANCE_FLAG_LIVE, Ordering::AcqRel) & INSTANCE_FLAG_LIVE != 0 {
                continue;
            }
            unsafe {
                ptr::write_bytes(slot.add(4), 0, self.instance_size - 4);
            }
            self.slot_id(slot).store(instance_id.raw(), Ordering::Release);
            return Some(MetricsInstance::new(self, slot, true));
        }
        None
    }

    /// The slot at `index` of a multi-instance group, live or not. Never
    /// mutates the slot; callers check [`MetricsInstance::is_alive`].
    pub fn get_instance_by_index(
        &self,
        index: usize,
    ) -> Result<MetricsInstance<'_>, MetricsError> {
        assert!(
            self.max_instances > 1,
            "get_instance_by_index() is for multi-instance groups"
        );
        if index >= self.max_instances {
            return Err(MetricsError::InvalidIndex(index));
        }
        Ok(MetricsInstance::new(self, self.slot_ptr(index), false))
    }
}

fn read_i32_le(bytes: &[u8]) -> i32 {
    i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}
