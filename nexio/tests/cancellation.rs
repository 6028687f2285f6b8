// Copyright (c) 2026 nexio contributors. Licensed under Apache License, Version 2.0.

use nexio::context::{Config, ExecutionContext};
use nexio::error::Error;
use nexio::stop_token::StopSource;
use nexio::task::spawn;
use nexio::timer::Timer;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[test]
fn stop_token_cancels_a_long_wait_without_waiting_for_its_deadline() {
    let ctx = ExecutionContext::new(Config::default());
    let dispatcher = ctx.dispatcher();
    let stop_source = StopSource::new();

    let outcome = Arc::new(Mutex::new(None));
    let outcome_for_task = outcome.clone();
    let stop_token = stop_source.token();
    let task_dispatcher = dispatcher.clone();
    spawn(&dispatcher, async move {
        let timer = Timer::new(&task_dispatcher);
        timer.expires_after(Duration::from_secs(3600));
        let result = timer.wait().with_stop(stop_token).await;
        *outcome_for_task.lock().unwrap() = Some(result);
    });

    let stopper_dispatcher = dispatcher.clone();
    spawn(&dispatcher, async move {
        let settle = Timer::new(&stopper_dispatcher);
        settle.expires_after(Duration::from_millis(10));
        let _ = settle.wait().await;
        stop_source.stop();
    });

    ctx.run_for(Duration::from_secs(2));

    let result = outcome.lock().unwrap().take().expect("task did not finish");
    assert!(matches!(result, Err(Error::Canceled)), "expected Canceled, got {result:?}");
}

#[test]
fn already_stopped_token_cancels_immediately() {
    let ctx = ExecutionContext::new(Config::default());
    let dispatcher = ctx.dispatcher();
    let stop_source = StopSource::new();
    stop_source.stop();
    let stop_token = stop_source.token();

    let outcome = Arc::new(Mutex::new(None));
    let outcome_for_task = outcome.clone();
    let task_dispatcher = dispatcher.clone();
    spawn(&dispatcher, async move {
        let timer = Timer::new(&task_dispatcher);
        timer.expires_after(Duration::from_secs(3600));
        let result = timer.wait().with_stop(stop_token).await;
        *outcome_for_task.lock().unwrap() = Some(result);
    });

    ctx.run_for(Duration::from_millis(200));

    let result = outcome.lock().unwrap().take().expect("task did not finish");
    assert!(matches!(result, Err(Error::Canceled)));
}
