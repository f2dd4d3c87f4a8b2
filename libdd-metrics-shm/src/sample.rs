// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Timestamped samples and the derivation pass.
//!
//! A sample is a mapping from counter id to a raw value, stamped with the
//! monotonic time it was taken. Derivation ([`Sample::format`]) rewrites
//! raw values into their display form (counts, deltas, per-second rates,
//! ratios, and percent-of-wall-time figures) using the previous sample as
//! the earlier point. Cells are read independently, so a sample is not an
//! atomic snapshot; deriving over consecutive samples absorbs the per-cell
//! skew.

use std::collections::HashMap;
use std::fmt;

use crate::definition::{CounterFormat, CounterType};
use crate::group::MetricsGroup;
use crate::ids::CounterId;

/// A sampled or derived value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Int32(i32),
    Int64(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int32(v) => v.fmt(f),
            Value::Int64(v) => v.fmt(f),
            Value::Float(v) => v.fmt(f),
            Value::Text(v) => v.fmt(f),
        }
    }
}

/// A timestamped id-to-value mapping read from one instance.
#[derive(Clone, Debug, Default)]
pub struct Sample {
    time: i64,
    values: HashMap<CounterId, Value>,
}

impl Sample {
    pub fn new() -> Self {
        Self::default()
    }

    /// Milliseconds on the monotonic clock when the sample was taken.
    pub fn time(&self) -> i64 {
        self.time
    }

    pub fn set_time(&mut self, millis: i64) {
        self.time = millis;
    }

    pub fn insert(&mut self, id: CounterId, value: Value) {
        self.values.insert(id, value);
    }

    pub fn get(&self, id: CounterId) -> Option<&Value> {
        self.values.get(&id)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Missing and non-float values read as 0.0 during derivation.
    fn value_as_f64(&self, id: CounterId) -> f64 {
        match self.values.get(&id) {
            Some(Value::Float(v)) => *v,
            _ => 0.0,
        }
    }

    /// Derives display values in place, walking the schema in declaration
    /// order. `previous` is the earlier snapshot; with an empty `previous`
    /// there is no second point and raw values stay untouched.
    ///
    /// Call this at most once per sample: afterwards the sample holds
    /// derived values, and deriving a derivation is meaningless.
    ///
    /// The caller is responsible for sampling at distinct times; with
    /// `time == previous.time`, rate and timer formats divide by zero and
    /// yield IEEE infinities or NaN.
    pub fn format(&mut self, group: &MetricsGroup, previous: &Sample) {
        for def in group.counter_definitions() {
            if def.counter_type() == CounterType::Text {
                continue;
            }
            if previous.is_empty() {
                continue;
            }

            // The source id: normally the counter itself, but
            // USE_PRIOR_VALUE reads the preceding counter in schema order.
            let mut src = def.id();
            if def.flags().use_prior_value() && def.index() > 0 {
                if let Ok(prior) = group.definition(def.index() - 1) {
                    src = prior.id();
                }
            }

            let related = def.related_id();
            let (value, prev_value) = if def.format() == CounterFormat::Ratio {
                // Ratios are computed within this sample alone.
                (self.value_as_f64(src), 0.0)
            } else {
                let key = if related.is_null() { src } else { related };
                (self.value_as_f64(key), previous.value_as_f64(key))
            };

            let elapsed_ms = (self.time - previous.time) as f64;
            let mut value = match def.format() {
                CounterFormat::Count => value,
                CounterFormat::Delta => value - prev_value,
                CounterFormat::Rate => (value - prev_value) * 1000.0 / elapsed_ms,
                // The rate formula normalized by the counter's millisecond
                // unit: the fraction of wall time accumulated in the scope.
                CounterFormat::Timer => (value - prev_value) / elapsed_ms,
                CounterFormat::Ratio => {
                    let denominator = self.value_as_f64(related);
                    if denominator != 0.0 {
                        value / denominator
                    } else {
                        0.0
                    }
                }
            };

            if def.flags().is_pct() {
                value *= 100.0;
            }

            // Derived results live under the defined counter's id, not the
            // source id.
            self.values.insert(def.id(), Value::Float(value));
        }
    }
}
