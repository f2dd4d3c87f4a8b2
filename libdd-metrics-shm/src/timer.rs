// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::clock::now_millis;
use crate::counter::Counter64;

/// Scoped accumulation of elapsed wall time into a 64-bit counter.
///
/// Records the monotonic clock on construction and adds the elapsed
/// milliseconds to the counter on drop. Pair it with a counter sampled
/// through the timer format to surface percent-of-wall-time figures.
pub struct ScopeTimer<'a, 'g> {
    counter: &'a Counter64<'g>,
    start_ms: i64,
}

impl<'a, 'g> ScopeTimer<'a, 'g> {
    pub fn new(counter: &'a Counter64<'g>) -> Self {
        Self {
            counter,
            start_ms: now_millis(),
        }
    }
}

impl Drop for ScopeTimer<'_, '_> {
    fn drop(&mut self) {
        self.counter.add(now_millis() - self.start_ms);
    }
}
