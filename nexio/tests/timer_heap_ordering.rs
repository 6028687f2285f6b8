// Copyright (c) 2026 nexio contributors. Licensed under Apache License, Version 2.0.

use nexio::context::{Config, ExecutionContext};
use nexio::task::spawn;
use nexio::timer::Timer;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[test]
fn timers_armed_out_of_order_resolve_in_deadline_order() {
    let ctx = ExecutionContext::new(Config::default());
    let dispatcher = ctx.dispatcher();
    let order = Arc::new(Mutex::new(Vec::new()));

    let deadlines = [(3, 30), (1, 10), (2, 20), (4, 40)];
    for (label, millis) in deadlines {
        let dispatcher = dispatcher.clone();
        let order = order.clone();
        spawn(&dispatcher, async move {
            let timer = Timer::new(&dispatcher);
            timer.expires_after(Duration::from_millis(millis));
            timer.wait().await.expect("timer should fire");
            order.lock().unwrap().push(label);
        });
    }

    ctx.run_for(Duration::from_secs(2));

    assert_eq!(*order.lock().unwrap(), vec![1, 2, 3, 4]);
}

#[test]
fn rearming_a_timer_replaces_its_deadline_for_an_in_flight_wait() {
    let ctx = ExecutionContext::new(Config::default());
    let dispatcher = ctx.dispatcher();
    let fired_at = Arc::new(Mutex::new(None));
    let fired_at_for_task = fired_at.clone();

    let timer = Timer::new(&dispatcher);
    timer.expires_after(Duration::from_millis(500));

    let wait_dispatcher = dispatcher.clone();
    let waiting_timer = timer.clone();
    spawn(&wait_dispatcher, async move {
        let started = std::time::Instant::now();
        waiting_timer.wait().await.expect("timer should fire");
        *fired_at_for_task.lock().unwrap() = Some(started.elapsed());
    });

    let rearm_dispatcher = dispatcher.clone();
    let rearm_timer = timer.clone();
    spawn(&rearm_dispatcher, async move {
        let settle = Timer::new(&rearm_dispatcher);
        settle.expires_after(Duration::from_millis(20));
        settle.wait().await.expect("settle timer should fire");
        rearm_timer.expires_after(Duration::from_millis(10));
    });

    ctx.run_for(Duration::from_secs(2));

    let elapsed = fired_at.lock().unwrap().expect("waiting task did not finish");
    assert!(elapsed < Duration::from_millis(500), "expected the rearm to shorten the wait, took {elapsed:?}");
}
