// Copyright (c) 2026 nexio contributors. Licensed under Apache License, Version 2.0.

use nexio::context::{Config, ExecutionContext};
use nexio::error::Error;
use nexio::net::{Listener, Stream};
use nexio::task::spawn;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[test]
fn echo_server_round_trips_data() {
    let ctx = ExecutionContext::new(Config::default());
    let dispatcher = ctx.dispatcher();

    let listener = Listener::bind(&dispatcher, "127.0.0.1:0".parse().unwrap()).expect("bind");
    let addr = listener.local_addr().expect("local_addr");

    spawn(&dispatcher, async move {
        let (mut conn, _peer) = listener.accept().await.expect("accept");
        let mut buf = [0_u8; 64];
        let n = conn.read_some(&mut buf).await.expect("read");
        conn.write_some(&buf[..n]).await.expect("write");
    });

    let received = Arc::new(Mutex::new(Vec::new()));
    let received_for_client = received.clone();
    let client_dispatcher = dispatcher.clone();
    spawn(&dispatcher, async move {
        let mut client = Stream::connect(&client_dispatcher, addr).await.expect("connect");
        client.write_some(b"hello").await.expect("write");
        let mut buf = [0_u8; 64];
        let n = client.read_some(&mut buf).await.expect("read");
        received_for_client.lock().unwrap().extend_from_slice(&buf[..n]);
    });

    ctx.run_for(Duration::from_secs(2));
    assert_eq!(&received.lock().unwrap()[..], b"hello");
}

#[test]
fn read_exact_and_write_all_handle_short_operations() {
    let ctx = ExecutionContext::new(Config::default());
    let dispatcher = ctx.dispatcher();

    let listener = Listener::bind(&dispatcher, "127.0.0.1:0".parse().unwrap()).expect("bind");
    let addr = listener.local_addr().expect("local_addr");

    let payload = vec![7_u8; 64 * 1024];
    let server_payload = payload.clone();
    spawn(&dispatcher, async move {
        let (mut conn, _peer) = listener.accept().await.expect("accept");
        nexio::net::write_all(&mut conn, &server_payload).await.expect("write_all");
    });

    let received = Arc::new(Mutex::new(vec![0_u8; payload.len()]));
    let received_for_client = received.clone();
    let client_dispatcher = dispatcher.clone();
    let expected_len = payload.len();
    spawn(&dispatcher, async move {
        let mut client = Stream::connect(&client_dispatcher, addr).await.expect("connect");
        let mut buf = vec![0_u8; expected_len];
        nexio::net::read_exact(&mut client, &mut buf).await.expect("read_exact");
        *received_for_client.lock().unwrap() = buf;
    });

    ctx.run_for(Duration::from_secs(5));
    assert_eq!(*received.lock().unwrap(), payload);
}

#[test]
fn read_some_after_peer_closes_observes_eof() {
    let ctx = ExecutionContext::new(Config::default());
    let dispatcher = ctx.dispatcher();

    let listener = Listener::bind(&dispatcher, "127.0.0.1:0".parse().unwrap()).expect("bind");
    let addr = listener.local_addr().expect("local_addr");

    spawn(&dispatcher, async move {
        let (conn, _peer) = listener.accept().await.expect("accept");
        // Drop the server-side half immediately; the client should observe a clean
        // close rather than a read that hangs or returns `Ok(0)`.
        drop(conn);
    });

    let saw_eof = Arc::new(AtomicBool::new(false));
    let saw_eof_for_client = saw_eof.clone();
    let client_dispatcher = dispatcher.clone();
    spawn(&dispatcher, async move {
        let mut client = Stream::connect(&client_dispatcher, addr).await.expect("connect");
        let mut buf = [0_u8; 64];
        match client.read_some(&mut buf).await {
            Err(Error::Eof) => saw_eof_for_client.store(true, Ordering::Release),
            other => panic!("expected Eof after the peer closed, got {other:?}"),
        }
    });

    ctx.run_for(Duration::from_secs(2));
    assert!(saw_eof.load(Ordering::Acquire), "read_some never observed eof after the peer closed");
}
