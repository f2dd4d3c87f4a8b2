// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// Monotonic wall-clock in milliseconds. Sample timestamps and scope timers
/// share this source so derived rates line up.
pub fn now_millis() -> i64 {
    #[allow(clippy::unwrap_used)]
    let now = nix::time::clock_gettime(nix::time::ClockId::CLOCK_MONOTONIC).unwrap();
    Duration::from(now).as_millis() as i64
}
