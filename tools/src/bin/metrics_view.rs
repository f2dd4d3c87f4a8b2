// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Demo observer: attaches to a metrics group by name, discovers the
//! schema from the region, and prints formatted samples once per interval.
//! Retries the attach until a producer publishes the group.

use std::thread;
use std::time::Duration;

use anyhow::bail;
use clap::{command, Arg};
use libdd_metrics_shm::{
    CounterType, MetricsGroup, MetricsInstance, Sample, Value,
};
use tracing::{info, warn};

fn attach(name: &str) -> MetricsGroup {
    loop {
        let mut group = MetricsGroup::with_name(name, 1);
        match group.initialize() {
            Ok(()) => return group,
            Err(e) => {
                warn!("cannot attach to group {name:?} yet: {e}");
                thread::sleep(Duration::from_secs(1));
            }
        }
    }
}

fn render(group: &MetricsGroup, sample: &Sample) {
    for def in group.counter_definitions() {
        let line = match sample.get(def.id()) {
            // Identifiers read as 16 hex digits.
            Some(Value::Float(v)) if def.counter_type() == CounterType::Ident => {
                format!("{:016x}", *v as i64)
            }
            Some(value) => value.to_string(),
            None => "-".to_string(),
        };
        println!("{} = {line}", def.name());
    }
    println!();
}

fn watch_instance(
    group: &MetricsGroup,
    instance: &MetricsInstance<'_>,
    previous: &mut Sample,
) {
    let mut current = Sample::new();
    if !instance.sample(&mut current) {
        return;
    }
    let mut display = current.clone();
    display.format(group, previous);
    render(group, &display);
    // Keep the raw snapshot: derivation always runs over two raw points.
    *previous = current;
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let matches = command!()
        .about("Attach to a metrics group and print formatted samples")
        .arg(
            Arg::new("name")
                .required(true)
                .help("Four-character metrics group name"),
        )
        .arg(
            Arg::new("interval")
                .long("interval-ms")
                .value_parser(clap::value_parser!(u64))
                .default_value("1000")
                .help("Milliseconds between samples"),
        )
        .get_matches();

    let name: &String = match matches.get_one("name") {
        Some(name) => name,
        None => bail!("a metrics group name is required"),
    };
    if name.len() != 4 || !name.is_ascii() {
        bail!("metrics names are exactly four ASCII characters: {name:?}");
    }
    let interval = Duration::from_millis(*matches.get_one::<u64>("interval").unwrap_or(&1000));

    let group = attach(name);
    info!(
        "attached to group {:?}: {} counters, {} instance slots",
        name,
        group.counter_definitions().len(),
        group.max_instances()
    );
    for def in group.counter_definitions() {
        println!("{}  {}", def.name(), def.description());
    }
    println!();

    if group.max_instances() == 1 {
        let instance = group.get_instance();
        let mut previous = Sample::new();
        loop {
            thread::sleep(interval);
            watch_instance(&group, &instance, &mut previous);
        }
    } else {
        let mut previous = vec![Sample::new(); group.max_instances()];
        loop {
            thread::sleep(interval);
            for index in 0..group.max_instances() {
                let instance = group.get_instance_by_index(index)?;
                if instance.is_alive() {
                    println!("instance {} (slot {index})", instance.instance_id());
                    watch_instance(&group, &instance, &mut previous[index]);
                }
            }
        }
    }
}
