// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! End-to-end scenarios over real shared memory: publish, attach, update,
//! sample, derive. Region names fold in the pid so parallel test runs
//! cannot collide, and every test clears its name up front in case an
//! earlier run crashed without cleanup.

#![cfg(unix)]

use libdd_metrics_shm::{
    CounterFlags as F, CounterId, InstanceId, MetricsGroup, NamedRegion, Sample, Value,
};

fn id(name: &str) -> CounterId {
    CounterId::from_name(name)
}

fn shm_name(tag: char) -> String {
    let pid = std::process::id();
    let a = b'a' + (pid % 26) as u8;
    let b = b'a' + ((pid / 26) % 26) as u8;
    format!("s{tag}{}{}", a as char, b as char)
}

fn keystroke_group(name: &str) -> MetricsGroup {
    let mut group = MetricsGroup::with_name(name, 1);
    group
        .define_counter_named("kcnt", "Keys Pressed", F::TYPE_32BIT, CounterId::NULL)
        .unwrap();
    group
        .define_counter_named("vowl", "Vowel Keys Pressed", F::TYPE_32BIT, CounterId::NULL)
        .unwrap();
    group
        .define_counter_named(
            "pvwl",
            "Pct. Vowel Keys",
            F::TYPE_32BIT | F::FORMAT_RATIO | F::USE_PRIOR_VALUE | F::PCT,
            id("kcnt"),
        )
        .unwrap();
    group
}

/// S1: single-instance counts and a prior-value ratio, producer and
/// observer reading the same cells.
#[test]
#[cfg_attr(miri, ignore)]
fn single_instance_count_and_ratio() {
    let name = shm_name('1');
    NamedRegion::unlink(&name);

    let mut group = keystroke_group(&name);
    group.initialize().unwrap();
    let instance = group.get_instance();

    let kcnt = instance.int32_counter_by_id(id("kcnt")).unwrap();
    let vowl = instance.int32_counter_by_id(id("vowl")).unwrap();

    for _ in 0..10 {
        kcnt.increment();
    }
    for _ in 0..3 {
        vowl.increment();
    }
    let mut s1 = Sample::new();
    assert!(instance.sample(&mut s1));
    assert_eq!(s1.get(id("kcnt")), Some(&Value::Float(10.0)));
    // Derived counters are skipped during collection.
    assert_eq!(s1.get(id("pvwl")), None);

    for _ in 0..10 {
        kcnt.increment();
    }
    for _ in 0..2 {
        vowl.increment();
    }
    let mut s2 = Sample::new();
    assert!(instance.sample(&mut s2));
    s2.format(&group, &s1);

    assert_eq!(s2.get(id("kcnt")), Some(&Value::Float(20.0)));
    assert_eq!(s2.get(id("vowl")), Some(&Value::Float(5.0)));
    assert_eq!(s2.get(id("pvwl")), Some(&Value::Float(25.0)));

    // An observer attaching by name alone sees the same raw values.
    let mut observer = MetricsGroup::with_name(&name, 1);
    observer.initialize().unwrap();
    let remote = observer.get_instance();
    let mut seen = Sample::new();
    assert!(remote.sample(&mut seen));
    assert_eq!(seen.get(id("kcnt")), Some(&Value::Float(20.0)));
    assert_eq!(seen.get(id("vowl")), Some(&Value::Float(5.0)));
}

/// S2/S3: rate and delta derived from cells sampled through shared memory,
/// with the inter-sample interval pinned rather than slept.
#[test]
#[cfg_attr(miri, ignore)]
fn rate_and_delta_over_shared_cells() {
    let name = shm_name('2');
    NamedRegion::unlink(&name);

    let mut group = MetricsGroup::with_name(&name, 1);
    group
        .define_counter_named("vowl", "Vowel Keys Pressed", F::TYPE_32BIT, CounterId::NULL)
        .unwrap();
    group
        .define_counter_named(
            "dvwl",
            "Delta Vowel Keys Pressed",
            F::TYPE_32BIT | F::FORMAT_DELTA,
            id("vowl"),
        )
        .unwrap();
    group
        .define_counter_named(
            "vwlr",
            "Vowel Keys Pressed /sec",
            F::TYPE_32BIT | F::FORMAT_RATE,
            id("vowl"),
        )
        .unwrap();
    group.initialize().unwrap();
    let instance = group.get_instance();
    let vowl = instance.int32_counter_by_id(id("vowl")).unwrap();

    vowl.set(7);
    let mut s1 = Sample::new();
    assert!(instance.sample(&mut s1));

    vowl.set(22);
    let mut s2 = Sample::new();
    assert!(instance.sample(&mut s2));

    // Pin the window at exactly one second; format is pure in the times.
    s2.set_time(s1.time() + 1000);
    s2.format(&group, &s1);

    assert_eq!(s2.get(id("dvwl")), Some(&Value::Float(15.0)));
    assert_eq!(s2.get(id("vwlr")), Some(&Value::Float(15.0)));
}

/// S4: a monotonic millisecond counter surfaced as percent of wall time.
#[test]
#[cfg_attr(miri, ignore)]
fn timer_percent_of_wall_time() {
    let name = shm_name('4');
    NamedRegion::unlink(&name);

    let mut group = MetricsGroup::with_name(&name, 1);
    group
        .define_counter_named(
            "ptim",
            "Print Time",
            F::TYPE_64BIT | F::MONOTONIC,
            CounterId::NULL,
        )
        .unwrap();
    group
        .define_counter_named(
            "ptmr",
            "Pct Print Time",
            F::TYPE_64BIT | F::FORMAT_TIMER | F::PCT,
            id("ptim"),
        )
        .unwrap();
    group.initialize().unwrap();
    let instance = group.get_instance();
    let ptim = instance.int64_counter_by_id(id("ptim")).unwrap();

    ptim.set(4_000);
    let mut s1 = Sample::new();
    assert!(instance.sample(&mut s1));

    ptim.add(250);
    let mut s2 = Sample::new();
    assert!(instance.sample(&mut s2));
    s2.set_time(s1.time() + 1000);
    s2.format(&group, &s1);

    // 250 ms in the scope over a 1000 ms window.
    assert_eq!(s2.get(id("ptmr")), Some(&Value::Float(25.0)));
}

/// S5: a fixed pool of instance slots: exhaustion, release, reuse.
#[test]
#[cfg_attr(miri, ignore)]
fn multi_instance_allocation_and_reuse() {
    let name = shm_name('5');
    NamedRegion::unlink(&name);

    let mut group = MetricsGroup::with_name(&name, 3);
    group
        .define_counter_named("wrkr", "Worker Requests", F::TYPE_32BIT, CounterId::NULL)
        .unwrap();
    group.initialize().unwrap();

    let first = group.alloc_instance(InstanceId::from_raw(101)).unwrap();
    let second = group.alloc_instance(InstanceId::from_raw(102)).unwrap();
    let third = group.alloc_instance(InstanceId::from_raw(103)).unwrap();
    assert!(group.alloc_instance(InstanceId::from_raw(999)).is_none());

    first.int32_counter_by_id(id("wrkr")).unwrap().set(11);
    second.int32_counter_by_id(id("wrkr")).unwrap().set(22);
    third.int32_counter_by_id(id("wrkr")).unwrap().set(33);

    // Releasing the middle slot zeroes it and frees it for reuse.
    drop(second);
    let slot1 = group.get_instance_by_index(1).unwrap();
    assert!(!slot1.is_alive());
    assert_eq!(slot1.int32_counter_by_id(id("wrkr")).unwrap().get(), 0);
    drop(slot1);

    let replacement = group.alloc_instance(InstanceId::from_raw(104)).unwrap();
    assert_eq!(replacement.instance_id().raw(), 104);

    // The neighbors were untouched throughout.
    assert_eq!(first.instance_id().raw(), 101);
    assert_eq!(first.int32_counter_by_id(id("wrkr")).unwrap().get(), 11);
    assert_eq!(third.instance_id().raw(), 103);
    assert_eq!(third.int32_counter_by_id(id("wrkr")).unwrap().get(), 33);

    let slot1 = group.get_instance_by_index(1).unwrap();
    assert!(slot1.is_alive());
    assert_eq!(slot1.instance_id().raw(), 104);

    assert!(matches!(group.get_instance_by_index(3), Err(_)));
}

/// S6: an observer recovers a five-counter schema from the region alone; a
/// conflicting schema is rejected.
#[test]
#[cfg_attr(miri, ignore)]
fn attach_and_load_five_counters() {
    let name = shm_name('6');
    NamedRegion::unlink(&name);

    let mut producer = MetricsGroup::with_name(&name, 1);
    producer
        .define_counter_named("kcnt", "Keys Pressed", F::TYPE_32BIT, CounterId::NULL)
        .unwrap();
    producer
        .define_counter_named("vowl", "Vowel Keys Pressed", F::TYPE_32BIT, CounterId::NULL)
        .unwrap();
    producer
        .define_counter_named(
            "ptim",
            "Print Time",
            F::TYPE_64BIT | F::MONOTONIC,
            CounterId::NULL,
        )
        .unwrap();
    producer
        .define_counter_named("labl", "Producer Label", F::TYPE_TEXT, CounterId::NULL)
        .unwrap();
    producer
        .define_counter_named(
            "keyr",
            "Keys Pressed /sec",
            F::TYPE_32BIT | F::FORMAT_RATE,
            id("kcnt"),
        )
        .unwrap();
    producer.initialize().unwrap();

    let mut observer = MetricsGroup::with_name(&name, 1);
    observer.initialize().unwrap();

    assert_eq!(observer.counter_definitions().len(), 5);
    for (mine, theirs) in producer
        .counter_definitions()
        .iter()
        .zip(observer.counter_definitions())
    {
        assert_eq!(mine.id(), theirs.id());
        assert_eq!(mine.flags(), theirs.flags());
        assert_eq!(mine.related_id(), theirs.related_id());
        assert_eq!(mine.description(), theirs.description());
        assert_eq!(mine.index(), theirs.index());
        assert_eq!(mine.offset(), theirs.offset());
    }

    let mut conflicting = MetricsGroup::with_name(&name, 1);
    conflicting
        .define_counter_named("kcnt", "Keys Pressed", F::TYPE_64BIT, CounterId::NULL)
        .unwrap();
    conflicting
        .define_counter_named("vowl", "Vowel Keys Pressed", F::TYPE_32BIT, CounterId::NULL)
        .unwrap();
    conflicting
        .define_counter_named(
            "ptim",
            "Print Time",
            F::TYPE_64BIT | F::MONOTONIC,
            CounterId::NULL,
        )
        .unwrap();
    conflicting
        .define_counter_named("labl", "Producer Label", F::TYPE_TEXT, CounterId::NULL)
        .unwrap();
    conflicting
        .define_counter_named(
            "keyr",
            "Keys Pressed /sec",
            F::TYPE_32BIT | F::FORMAT_RATE,
            id("kcnt"),
        )
        .unwrap();
    assert!(matches!(
        conflicting.initialize(),
        Err(libdd_metrics_shm::MetricsError::SchemaMismatch(_))
    ));
}

/// Every producer increment is visible to a reader that runs afterwards:
/// concurrent writers through independently attached groups never lose an
/// increment.
#[test]
#[cfg_attr(miri, ignore)]
fn concurrent_increments_are_conserved() {
    const THREADS: usize = 4;
    const PER_THREAD: i32 = 10_000;

    let name = shm_name('c');
    NamedRegion::unlink(&name);

    let mut group = keystroke_group(&name);
    group.initialize().unwrap();
    // Make the slot live before the writers race for it.
    let instance = group.get_instance();

    std::thread::scope(|scope| {
        for _ in 0..THREADS {
            let name = name.clone();
            scope.spawn(move || {
                let mut writer = keystroke_group(&name);
                writer.initialize().unwrap();
                let instance = writer.get_instance();
                let kcnt = instance.int32_counter_by_id(id("kcnt")).unwrap();
                for _ in 0..PER_THREAD {
                    kcnt.increment();
                }
            });
        }
    });

    let kcnt = instance.int32_counter_by_id(id("kcnt")).unwrap();
    assert_eq!(kcnt.get(), THREADS as i32 * PER_THREAD);
}

/// Same conservation for a 64-bit counter that the layout leaves 4-byte
/// aligned (an odd number of 32-bit cells ahead of it, odd slot index), so
/// the split lo/hi add path is the one under test.
#[test]
#[cfg_attr(miri, ignore)]
fn concurrent_unaligned_64bit_adds_are_conserved() {
    const THREADS: usize = 4;
    const PER_THREAD: i64 = 10_000;

    let name = shm_name('u');
    NamedRegion::unlink(&name);

    let build = || {
        let mut group = MetricsGroup::with_name(&name, 2);
        group
            .define_counter_named("kcnt", "Keys Pressed", F::TYPE_32BIT, CounterId::NULL)
            .unwrap();
        group
            .define_counter_named(
                "ptim",
                "Print Time",
                F::TYPE_64BIT | F::MONOTONIC,
                CounterId::NULL,
            )
            .unwrap();
        group
    };

    let mut group = build();
    group.initialize().unwrap();
    let _first = group.alloc_instance(InstanceId::from_raw(1)).unwrap();
    let second = group.alloc_instance(InstanceId::from_raw(2)).unwrap();

    std::thread::scope(|scope| {
        for _ in 0..THREADS {
            let mut writer = build();
            scope.spawn(move || {
                writer.initialize().unwrap();
                let instance = writer.get_instance_by_index(1).unwrap();
                let ptim = instance.int64_counter_by_id(id("ptim")).unwrap();
                for _ in 0..PER_THREAD {
                    // Straddle the lo-word boundary often enough to
                    // exercise the carry.
                    ptim.add(0x4000_0000);
                }
            });
        }
    });

    let ptim = second.int64_counter_by_id(id("ptim")).unwrap();
    assert_eq!(ptim.get(), THREADS as i64 * PER_THREAD * 0x4000_0000);
}

/// Two `get_instance` calls hand out the same slot and never re-zero it.
#[test]
#[cfg_attr(miri, ignore)]
fn get_instance_is_idempotent() {
    let name = shm_name('i');
    NamedRegion::unlink(&name);

    let mut group = keystroke_group(&name);
    group.initialize().unwrap();

    let first = group.get_instance();
    first.int32_counter_by_id(id("kcnt")).unwrap().set(77);

    let second = group.get_instance();
    assert_eq!(second.int32_counter_by_id(id("kcnt")).unwrap().get(), 77);
    assert_eq!(first.instance_id(), second.instance_id());

    // Dropping non-allocated handles does not release the slot either.
    drop(second);
    assert!(first.is_alive());
    assert_eq!(first.int32_counter_by_id(id("kcnt")).unwrap().get(), 77);
}

/// Sampling a dead slot reports false and leaves the output untouched.
#[test]
#[cfg_attr(miri, ignore)]
fn sampling_dead_slot_leaves_output_untouched() {
    let name = shm_name('d');
    NamedRegion::unlink(&name);

    let mut group = MetricsGroup::with_name(&name, 2);
    group
        .define_counter_named("wrkr", "Worker Requests", F::TYPE_32BIT, CounterId::NULL)
        .unwrap();
    group.initialize().unwrap();

    let dead = group.get_instance_by_index(0).unwrap();
    assert!(!dead.is_alive());

    let mut out = Sample::new();
    out.set_time(123_456);
    out.insert(id("prev"), Value::Float(9.0));
    assert!(!dead.sample(&mut out));
    assert_eq!(out.time(), 123_456);
    assert_eq!(out.len(), 1);
    assert_eq!(out.get(id("prev")), Some(&Value::Float(9.0)));
}

/// Derivation is a pure function of (sample, previous, schema).
#[test]
#[cfg_attr(miri, ignore)]
fn derivation_is_deterministic() {
    let name = shm_name('p');
    NamedRegion::unlink(&name);

    let mut group = keystroke_group(&name);
    group.initialize().unwrap();
    let instance = group.get_instance();
    instance.int32_counter_by_id(id("kcnt")).unwrap().set(40);
    instance.int32_counter_by_id(id("vowl")).unwrap().set(10);

    let mut prev = Sample::new();
    assert!(instance.sample(&mut prev));
    instance.int32_counter_by_id(id("kcnt")).unwrap().set(80);

    let mut a = Sample::new();
    assert!(instance.sample(&mut a));
    let mut b = a.clone();

    a.format(&group, &prev);
    b.format(&group, &prev);
    for def in group.counter_definitions() {
        assert_eq!(a.get(def.id()), b.get(def.id()));
    }
}

/// The region is exactly as large as the layout arithmetic says.
#[test]
#[cfg_attr(miri, ignore)]
fn region_size_matches_layout() {
    let name = shm_name('z');
    NamedRegion::unlink(&name);

    let mut group = MetricsGroup::with_name(&name, 3);
    group
        .define_counter_named("kcnt", "Keys Pressed", F::TYPE_32BIT, CounterId::NULL)
        .unwrap();
    group
        .define_counter_named(
            "ptim",
            "Print Time",
            F::TYPE_64BIT | F::MONOTONIC,
            CounterId::NULL,
        )
        .unwrap();
    group
        .define_counter_named("labl", "Producer Label", F::TYPE_TEXT, CounterId::NULL)
        .unwrap();
    group.initialize().unwrap();

    // 12 + 3*44 + 3 * (8 + 4 + 8 + 8)
    assert_eq!(group.definition_size(), 12 + 3 * 44);
    assert_eq!(group.instance_size(), 28);
    let expected = group.definition_size() + group.max_instances() * group.instance_size();
    assert_eq!(expected, 144 + 84);

    let observer_region = NamedRegion::open(
        &name,
        expected,
        libdd_metrics_shm::OpenMode::OpenExisting,
    )
    .unwrap();
    assert_eq!(observer_region.size(), expected);
}
