// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Named locks and guarded views.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use shmchan::{Channel, Encoding, GuardedView, NamedLock, Scope};

static COUNTER: AtomicUsize = AtomicUsize::new(0);

fn unique_name(prefix: &str) -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_l_{n}_{}", std::process::id())
}

#[test]
fn lock_unlock() {
    let name = unique_name("basic");
    NamedLock::clear_storage(&name, Scope::Local);

    let lock = NamedLock::open(&name, Scope::Local).expect("open");
    assert_eq!(lock.name(), name);
    lock.lock().unwrap();
    lock.unlock().unwrap();
    assert!(lock.try_lock().unwrap());
    lock.unlock().unwrap();
}

#[test]
fn try_lock_fails_while_held_elsewhere() {
    let name = unique_name("contend");
    NamedLock::clear_storage(&name, Scope::Local);

    let lock = NamedLock::open(&name, Scope::Local).unwrap();
    lock.lock().unwrap();

    let other = name.clone();
    let got = thread::spawn(move || {
        let lock = NamedLock::open(&other, Scope::Local).unwrap();
        let got = lock.try_lock().unwrap();
        if got {
            lock.unlock().unwrap();
        }
        got
    })
    .join()
    .unwrap();
    assert!(!got);
    lock.unlock().unwrap();
}

#[test]
fn invalid_lock_name_rejected() {
    assert!(NamedLock::open("bad\\name", Scope::Local).is_err());
}

#[test]
fn guarded_view_serialises_writers() {
    let name = unique_name("guarded");
    Channel::clear_storage(&name, Scope::Local);
    let channel = Channel::create(&name, 1024, Scope::Local).unwrap();
    NamedLock::clear_storage(&NamedLock::channel_lock_name(&name), Scope::Local);

    const THREADS: usize = 4;
    const ROUNDS: usize = 200;
    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let name = name.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let channel = Channel::open(&name, Scope::Local).unwrap();
                let lock = NamedLock::for_channel(&channel).unwrap();
                let view = channel.map_view(0, 64).unwrap();
                let fill = [i as u8 + 1; 64];
                barrier.wait();
                for _ in 0..ROUNDS {
                    let guard = GuardedView::new(&view, &lock).unwrap();
                    guard.write(&fill).unwrap();
                    let seen = guard.read().unwrap();
                    // Nobody else can write between our write and read.
                    assert!(seen.iter().all(|&b| b == i as u8 + 1));
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    drop(channel);
}

#[test]
fn guard_releases_on_drop() {
    let name = unique_name("release");
    Channel::clear_storage(&name, Scope::Local);
    let channel = Channel::create(&name, 256, Scope::Local).unwrap();
    NamedLock::clear_storage(&NamedLock::channel_lock_name(&name), Scope::Local);
    let lock = NamedLock::for_channel(&channel).unwrap();
    let view = channel.map_view(0, 128).unwrap();

    {
        let guard = GuardedView::new(&view, &lock).unwrap();
        guard.write_text("locked write", Encoding::Utf8Nul).unwrap();
        assert_eq!(guard.read_text(Encoding::Utf8Nul).unwrap(), "locked write");
    }

    let guard = GuardedView::try_new(&view, &lock).unwrap();
    assert!(guard.is_some());
}
