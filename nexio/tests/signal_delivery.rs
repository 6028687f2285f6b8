// Copyright (c) 2026 nexio contributors. Licensed under Apache License, Version 2.0.

#![cfg(unix)]

use nexio::context::{Config, ExecutionContext};
use nexio::error::Error;
use nexio::signal::SignalWait;
use nexio::task::spawn;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

// The signal registry is a process-wide singleton (see `nexio::signal`), so these
// tests must not run concurrently with each other within this binary.
#[test]
#[serial_test::serial]
fn self_raised_signal_wakes_a_waiting_task() {
    let ctx = ExecutionContext::new(Config::default());
    let dispatcher = ctx.dispatcher();
    let delivered = Arc::new(AtomicBool::new(false));
    let delivered_for_task = delivered.clone();

    let watch = SignalWait::new(&dispatcher, signal_hook::consts::SIGUSR2);
    let watch_for_task = watch.clone();
    spawn(&dispatcher, async move {
        watch_for_task.wait().await.expect("signal wait should resolve");
        delivered_for_task.store(true, Ordering::Release);
    });

    let raiser_dispatcher = dispatcher.clone();
    spawn(&raiser_dispatcher, async move {
        let settle = nexio::timer::Timer::new(&raiser_dispatcher);
        settle.expires_after(Duration::from_millis(20));
        let _ = settle.wait().await;
        signal_hook::low_level::raise(signal_hook::consts::SIGUSR2).expect("raise should succeed");
    });

    ctx.run_for(Duration::from_secs(2));

    assert!(delivered.load(Ordering::Acquire), "signal wait never resolved");
}

#[test]
#[serial_test::serial]
fn canceling_a_signal_watch_stops_new_deliveries_from_being_observed() {
    let ctx = ExecutionContext::new(Config::default());
    let dispatcher = ctx.dispatcher();

    let watch = SignalWait::new(&dispatcher, signal_hook::consts::SIGUSR1);
    watch.cancel();

    signal_hook::low_level::raise(signal_hook::consts::SIGUSR1).expect("raise should succeed");

    let resolved = Arc::new(AtomicBool::new(false));
    let resolved_for_task = resolved.clone();
    let watch_for_task = watch.clone();
    spawn(&dispatcher, async move {
        match watch_for_task.wait().await {
            Err(Error::Canceled) => resolved_for_task.store(true, Ordering::Release),
            other => panic!("expected a canceled watch to resolve Canceled, got {other:?}"),
        }
    });

    ctx.run_for(Duration::from_millis(200));

    assert!(resolved.load(Ordering::Acquire), "a canceled watch should still resolve its in-flight wait, with Canceled");
}

#[test]
#[serial_test::serial]
fn canceling_a_signal_watch_wakes_a_task_already_suspended_in_wait() {
    let ctx = ExecutionContext::new(Config::default());
    let dispatcher = ctx.dispatcher();

    let watch = SignalWait::new(&dispatcher, signal_hook::consts::SIGUSR2);
    let watch_for_task = watch.clone();
    let canceled = Arc::new(AtomicBool::new(false));
    let canceled_for_task = canceled.clone();

    // Unlike `canceling_a_signal_watch_stops_new_deliveries_from_being_observed`, the
    // task below is already parked inside `.wait()` (it never observes `cleared` on
    // its own first poll) before `cancel()` runs - this exercises the wake-on-cancel
    // path rather than the already-cleared-before-poll path.
    spawn(&dispatcher, async move {
        match watch_for_task.wait().await {
            Err(Error::Canceled) => canceled_for_task.store(true, Ordering::Release),
            other => panic!("expected a mid-wait cancel to resolve Canceled, got {other:?}"),
        }
    });

    let cancel_dispatcher = dispatcher.clone();
    spawn(&cancel_dispatcher, async move {
        let settle = nexio::timer::Timer::new(&cancel_dispatcher);
        settle.expires_after(Duration::from_millis(20));
        let _ = settle.wait().await;
        watch.cancel();
    });

    ctx.run_for(Duration::from_secs(2));

    assert!(canceled.load(Ordering::Acquire), "a task suspended in wait() was never woken by cancel()");
}
