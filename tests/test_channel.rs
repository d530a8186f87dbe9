// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Channel lifecycle: create, open, close, ref counting, events.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use shmchan::{
    Channel, ErrorKind, Operation, Outcome, RecordingSink, RetryPolicy, Scope,
};

static COUNTER: AtomicUsize = AtomicUsize::new(0);

fn unique_name(prefix: &str) -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_ch_{n}_{}", std::process::id())
}

// ========== Create / Open ==========

#[test]
fn create_then_open_sees_writes() {
    let name = unique_name("chan");
    Channel::clear_storage(&name, Scope::Local);

    let a = Channel::create(&name, 2048, Scope::Local).expect("create");
    assert!(a.is_creator());
    assert_eq!(a.capacity(), 2048);
    a.map_view(0, 1024).unwrap().write(b"hello from a").unwrap();

    let b = Channel::open(&name, Scope::Local).expect("open");
    assert!(!b.is_creator());
    assert_eq!(b.capacity(), 2048);
    let bytes = b.map_view(0, 1024).unwrap().read().unwrap();
    assert_eq!(&bytes[..12], b"hello from a");
    assert!(bytes[12..].iter().all(|&x| x == 0));
}

#[test]
fn open_missing_is_not_found() {
    let name = unique_name("missing");
    Channel::clear_storage(&name, Scope::Local);

    let err = Channel::open(&name, Scope::Local).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(err.is_retryable());
    assert!(err.to_string().contains(&name));
}

#[test]
fn second_create_same_capacity_shares_region() {
    let name = unique_name("twice");
    Channel::clear_storage(&name, Scope::Local);

    let first = Channel::create(&name, 4096, Scope::Local).unwrap();
    first.map_view(100, 8).unwrap().write(b"original").unwrap();

    let second = Channel::create(&name, 4096, Scope::Local).unwrap();
    assert!(first.is_creator());
    assert!(!second.is_creator());
    assert_eq!(second.map_view(100, 8).unwrap().read().unwrap(), b"original");
}

#[test]
fn second_create_other_capacity_is_already_exists() {
    let name = unique_name("mismatch");
    Channel::clear_storage(&name, Scope::Local);

    let _first = Channel::create(&name, 4096, Scope::Local).unwrap();
    let err = Channel::create(&name, 8192, Scope::Local).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    assert!(err.to_string().contains("4096"));
}

#[test]
fn create_exclusive_refuses_existing() {
    let name = unique_name("excl");
    Channel::clear_storage(&name, Scope::Local);

    let _first = Channel::create_exclusive(&name, 1024, Scope::Local).unwrap();
    let err = Channel::create_exclusive(&name, 1024, Scope::Local).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
}

#[test]
fn invalid_arguments_rejected() {
    let err = Channel::create("", 1024, Scope::Local).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let err = Channel::create("a/b", 1024, Scope::Local).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let err = Channel::create(&unique_name("zero"), 0, Scope::Local).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn scopes_do_not_alias() {
    let name = unique_name("scoped");
    Channel::clear_storage(&name, Scope::Local);
    Channel::clear_storage(&name, Scope::Global);

    let _local = Channel::create(&name, 1024, Scope::Local).unwrap();
    let err = Channel::open(&name, Scope::Global).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

// ========== Close / ref counting ==========

#[test]
fn close_then_anything_is_closed() {
    let name = unique_name("close");
    Channel::clear_storage(&name, Scope::Local);

    let mut ch = Channel::create(&name, 1024, Scope::Local).unwrap();
    ch.close().unwrap();
    assert!(ch.is_closed());

    assert_eq!(ch.map_view(0, 16).unwrap_err().kind(), ErrorKind::Closed);
    assert_eq!(ch.ref_count().unwrap_err().kind(), ErrorKind::Closed);
    assert_eq!(ch.close().unwrap_err().kind(), ErrorKind::Closed);
}

#[test]
fn views_outlive_closed_channel() {
    let name = unique_name("outlive");
    Channel::clear_storage(&name, Scope::Local);

    let mut ch = Channel::create(&name, 1024, Scope::Local).unwrap();
    let view = ch.map_view(0, 64).unwrap();
    ch.close().unwrap();

    view.write(b"still here").unwrap();
    assert_eq!(&view.read().unwrap()[..10], b"still here");
}

#[cfg(unix)]
#[test]
fn last_release_removes_name() {
    let name = unique_name("last");
    Channel::clear_storage(&name, Scope::Local);

    let a = Channel::create(&name, 1024, Scope::Local).unwrap();
    let b = Channel::open(&name, Scope::Local).unwrap();
    assert_eq!(a.ref_count().unwrap(), 2);
    drop(a);
    assert_eq!(b.ref_count().unwrap(), 1);
    drop(b);

    let err = Channel::open(&name, Scope::Local).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[cfg(unix)]
#[test]
fn open_during_teardown_never_splits_the_region() {
    let name = unique_name("teardown");
    Channel::clear_storage(&name, Scope::Local);
    let stop = Arc::new(AtomicBool::new(false));

    let churn = {
        let name = name.clone();
        let stop = stop.clone();
        thread::spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                if let Ok(ch) = Channel::create(&name, 4096, Scope::Local) {
                    drop(ch);
                }
            }
        })
    };

    let deadline = Instant::now() + Duration::from_secs(2);
    let mut checked = 0u32;
    let mut tag = 0u64;
    while Instant::now() < deadline {
        let Ok(b) = Channel::open(&name, Scope::Local) else {
            continue;
        };
        let c = Channel::create(&name, 4096, Scope::Local).unwrap();
        tag += 1;
        c.map_view(0, 8).unwrap().write(&tag.to_le_bytes()).unwrap();
        assert_eq!(
            b.map_view(0, 8).unwrap().read().unwrap(),
            tag.to_le_bytes(),
            "open and create diverged after {checked} rounds (c.is_creator = {})",
            c.is_creator()
        );
        checked += 1;
    }

    stop.store(true, Ordering::Relaxed);
    churn.join().unwrap();
    Channel::clear_storage(&name, Scope::Local);
}

#[test]
fn oversized_capacity_is_resource_exhausted() {
    let name = unique_name("huge");
    Channel::clear_storage(&name, Scope::Local);

    let err = Channel::create(&name, usize::MAX, Scope::Local).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
    assert_eq!(
        Channel::open(&name, Scope::Local).unwrap_err().kind(),
        ErrorKind::NotFound
    );
}

// Passes the size check but cannot be mapped: the name must not linger.
#[cfg(all(target_os = "linux", target_pointer_width = "64"))]
#[test]
fn unmappable_capacity_releases_name() {
    let name = unique_name("unmappable");
    Channel::clear_storage(&name, Scope::Local);

    let err = Channel::create(&name, 1 << 62, Scope::Local).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
    assert!(err.os_code().is_some());
    assert_eq!(
        Channel::open(&name, Scope::Local).unwrap_err().kind(),
        ErrorKind::NotFound
    );
}

// ========== open_with_retry ==========

#[test]
fn retry_gives_up_with_not_found() {
    let name = unique_name("giveup");
    Channel::clear_storage(&name, Scope::Local);

    let policy = RetryPolicy {
        attempts: 3,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(2),
    };
    let err = Channel::open_with_retry(&name, Scope::Local, &policy).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn retry_finds_late_creator() {
    let name = unique_name("late");
    Channel::clear_storage(&name, Scope::Local);

    let creator_name = name.clone();
    let creator = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        let ch = Channel::create(&creator_name, 1024, Scope::Local).unwrap();
        thread::sleep(Duration::from_millis(500));
        drop(ch);
    });

    let policy = RetryPolicy {
        attempts: 50,
        initial_backoff: Duration::from_millis(5),
        max_backoff: Duration::from_millis(20),
    };
    let ch = Channel::open_with_retry(&name, Scope::Local, &policy).expect("open after retry");
    assert_eq!(ch.capacity(), 1024);
    drop(ch);
    creator.join().unwrap();
}

#[test]
fn retry_delays_double_up_to_max() {
    let policy = RetryPolicy {
        attempts: 6,
        initial_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(50),
    };
    let delays: Vec<u64> = policy.delays().map(|d| d.as_millis() as u64).collect();
    assert_eq!(delays, [10, 20, 40, 50, 50]);
    assert_eq!(RetryPolicy::none().delays().count(), 0);
}

#[test]
fn retry_sleeps_roughly_the_budget() {
    let name = unique_name("budget");
    Channel::clear_storage(&name, Scope::Local);

    let policy = RetryPolicy {
        attempts: 4,
        initial_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(20),
    };
    let start = Instant::now();
    let _ = Channel::open_with_retry(&name, Scope::Local, &policy);
    // 10 + 20 + 20
    assert!(start.elapsed() >= Duration::from_millis(50));
}

// ========== Events ==========

#[test]
fn every_operation_emits_an_event() {
    let name = unique_name("events");
    Channel::clear_storage(&name, Scope::Local);
    let sink = Arc::new(RecordingSink::new());

    let mut ch = Channel::builder(&name)
        .sink(sink.clone())
        .create(2048)
        .unwrap();
    let mut view = ch.map_view(1024, 1024).unwrap();
    view.write(b"x").unwrap();
    view.read().unwrap();
    assert!(view.write(&[0u8; 2000]).is_err());
    view.unmap();
    view.unmap();
    assert!(ch.map_view(2000, 100).is_err());
    ch.close().unwrap();

    let ops: Vec<(Operation, Outcome)> =
        sink.take().iter().map(|e| (e.op, e.outcome)).collect();
    assert_eq!(
        ops,
        [
            (Operation::Create, Outcome::Ok),
            (Operation::MapView, Outcome::Ok),
            (Operation::Write, Outcome::Ok),
            (Operation::Read, Outcome::Ok),
            (Operation::Write, Outcome::Failed(ErrorKind::PayloadTooLarge)),
            (Operation::UnmapView, Outcome::Ok),
            (Operation::MapView, Outcome::Failed(ErrorKind::InvalidRange)),
            (Operation::Close, Outcome::Ok),
        ]
    );
}

#[test]
fn failed_open_is_reported_to_sink() {
    let name = unique_name("evmiss");
    Channel::clear_storage(&name, Scope::Local);
    let sink = Arc::new(RecordingSink::new());

    let _ = Channel::builder(&name).sink(sink.clone()).open();
    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].op, Operation::Open);
    assert_eq!(events[0].name, name);
    assert_eq!(events[0].outcome, Outcome::Failed(ErrorKind::NotFound));
}
