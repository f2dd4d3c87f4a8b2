// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Demo producer: publishes a keystroke-style counter group and drives it
//! with a synthetic workload. Point `metrics-view` at the same name to
//! watch the counters move.

use std::thread;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{command, Arg};
use libdd_metrics_shm::{CounterFlags as F, CounterId, MetricsGroup, ScopeTimer};
use tracing::{debug, info};

fn id(name: &str) -> CounterId {
    CounterId::from_name(name)
}

fn build_group(name: &str) -> anyhow::Result<MetricsGroup> {
    let mut group = MetricsGroup::with_name(name, 1);
    group.define_counter_named("chra", "Number of A Keys", F::TYPE_32BIT, CounterId::NULL)?;
    group.define_counter_named("chrb", "Number of B Keys", F::TYPE_32BIT, CounterId::NULL)?;
    group.define_counter_named("chrc", "Number of C Keys", F::TYPE_32BIT, CounterId::NULL)?;
    group.define_counter_named("vowl", "Vowel Keys Pressed", F::TYPE_32BIT, CounterId::NULL)?;
    group.define_counter_named(
        "pvwl",
        "Pct. Vowel Keys",
        F::TYPE_32BIT | F::FORMAT_RATIO | F::USE_PRIOR_VALUE | F::PCT,
        id("kcnt"),
    )?;
    group.define_counter_named(
        "dvwl",
        "Delta Vowel Keys Pressed",
        F::TYPE_32BIT | F::FORMAT_DELTA,
        id("vowl"),
    )?;
    group.define_counter_named(
        "vwlr",
        "Vowel Keys Pressed /sec",
        F::TYPE_32BIT | F::FORMAT_RATE,
        id("vowl"),
    )?;
    group.define_counter_named("kcnt", "Keys Pressed", F::TYPE_32BIT, CounterId::NULL)?;
    group.define_counter_named(
        "keyr",
        "Keys Pressed /sec",
        F::TYPE_32BIT | F::FORMAT_RATE,
        id("kcnt"),
    )?;
    group.define_counter_named("labl", "Producer Label", F::TYPE_TEXT, CounterId::NULL)?;
    group.define_counter_named(
        "ptim",
        "Print Time",
        F::TYPE_64BIT | F::MONOTONIC,
        CounterId::NULL,
    )?;
    group.define_counter_named(
        "ptmd",
        "Delta Print Time",
        F::TYPE_64BIT | F::FORMAT_DELTA,
        id("ptim"),
    )?;
    group.define_counter_named(
        "ptmr",
        "Pct Print Time",
        F::TYPE_64BIT | F::FORMAT_TIMER | F::PCT,
        id("ptim"),
    )?;
    Ok(group)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let matches = command!()
        .about("Publish a demo counter group and drive it with synthetic keystrokes")
        .arg(
            Arg::new("name")
                .long("name")
                .default_value("keys")
                .help("Four-character metrics group name"),
        )
        .arg(
            Arg::new("interval")
                .long("interval-ms")
                .value_parser(clap::value_parser!(u64))
                .default_value("20")
                .help("Milliseconds between synthetic keystrokes"),
        )
        .arg(
            Arg::new("count")
                .long("count")
                .value_parser(clap::value_parser!(u64))
                .default_value("0")
                .help("Keystrokes to produce before exiting (0 = run until killed)"),
        )
        .get_matches();

    let name: &String = matches.get_one("name").context("name is defaulted")?;
    if name.len() != 4 || !name.is_ascii() {
        bail!("metrics names are exactly four ASCII characters: {name:?}");
    }
    let interval = Duration::from_millis(*matches.get_one::<u64>("interval").unwrap_or(&20));
    let count: u64 = *matches.get_one("count").unwrap_or(&0);

    let mut group = build_group(name)?;
    group.initialize()?;
    info!("publishing group {:?}; watch it with: metrics-view {}", name, name);

    let instance = group.get_instance();
    let a_counter = instance.int32_counter_by_id(id("chra"))?;
    let b_counter = instance.int32_counter_by_id(id("chrb"))?;
    let c_counter = instance.int32_counter_by_id(id("chrc"))?;
    let vowel_counter = instance.int32_counter_by_id(id("vowl"))?;
    let key_counter = instance.int32_counter_by_id(id("kcnt"))?;
    let print_time = instance.int64_counter_by_id(id("ptim"))?;
    instance.text_counter_by_id(id("labl"))?.set("demo");

    // Keystrokes come from a little LCG rather than a keyboard.
    let mut state: u32 = 0x2545_f491;
    let mut produced: u64 = 0;
    loop {
        state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        let key = b'a' + ((state >> 24) % 26) as u8;

        match key {
            b'a' => {
                a_counter.increment();
            }
            b'b' => {
                b_counter.increment();
            }
            b'c' => {
                c_counter.increment();
            }
            _ => {}
        }
        if matches!(key, b'a' | b'e' | b'i' | b'o' | b'u') {
            vowel_counter.increment();
        }
        key_counter.increment();

        {
            // The scope the ptmr timer reports on.
            let _timer = ScopeTimer::new(print_time);
            debug!("key {}", key as char);
            thread::sleep(Duration::from_millis((state % 3) as u64));
        }

        produced += 1;
        if count != 0 && produced >= count {
            break;
        }
        thread::sleep(interval);
    }

    info!("produced {produced} keystrokes, exiting");
    Ok(())
}
