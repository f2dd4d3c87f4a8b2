// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Cross-process performance counters over named shared memory.
//!
//! A producer declares a group of counters, publishes the schema into a
//! named shared-memory region, and updates counter cells during normal
//! work. Observers attach to the region by its four-character name,
//! discover the schema from the self-describing header, and sample values
//! at their own cadence. Reads and writes are wait-free: producers never
//! block to publish, observers never block to sample.
//!
//! ```no_run
//! use libdd_metrics_shm::{CounterFlags, CounterId, MetricsGroup, Sample};
//!
//! # fn main() -> Result<(), libdd_metrics_shm::MetricsError> {
//! // Producer: declare, publish, update.
//! let mut group = MetricsGroup::with_name("keys", 1);
//! group.define_counter_named("kcnt", "Keys Pressed", CounterFlags::TYPE_32BIT, CounterId::NULL)?;
//! group.define_counter_named(
//!     "keyr",
//!     "Keys Pressed /sec",
//!     CounterFlags::TYPE_32BIT | CounterFlags::FORMAT_RATE,
//!     CounterId::from_name("kcnt"),
//! )?;
//! group.initialize()?;
//!
//! let instance = group.get_instance();
//! instance.int32_counter_by_id(CounterId::from_name("kcnt"))?.increment();
//!
//! // Observer (usually another process): attach, sample, derive.
//! let mut observer = MetricsGroup::with_name("keys", 1);
//! observer.initialize()?;
//! let remote = observer.get_instance();
//! let previous = Sample::new();
//! let mut current = Sample::new();
//! if remote.sample(&mut current) {
//!     current.format(&observer, &previous);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! The region is cooperative: any attached process can write any cell, and
//! the library does not police the producer/observer convention. Schema
//! mismatches between a declared group and an existing region are fatal at
//! [`MetricsGroup::initialize`]; there is no in-place schema evolution.

mod clock;
mod counter;
mod definition;
mod error;
mod group;
mod ids;
mod instance;
mod region;
mod sample;
mod timer;

pub use clock::now_millis;
pub use counter::{Counter, Counter32, Counter64, TextCounter, TEXT_CELL_SIZE};
pub use definition::{
    CounterDef, CounterFlags, CounterFormat, CounterType, COUNTER_DEF_RECORD_SIZE,
    DESCRIPTION_SIZE,
};
pub use error::MetricsError;
pub use group::{
    MetricsGroup, DEFINITION_HEADER_SIZE, INSTANCE_FLAG_LIVE, INSTANCE_HEADER_SIZE,
};
pub use ids::{CounterId, InstanceId, MetricsId};
pub use instance::MetricsInstance;
pub use region::{NamedRegion, OpenMode, RegionError};
pub use sample::{Sample, Value};
pub use timer::ScopeTimer;
