//! Integration tests for framewire.
//!
//! Each test runs a real `Engine` on a loopback port and talks to it with
//! the `Client`.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use framewire::codec::HeaderValues;
use framewire::handler::SharedHandler;
use framewire::protocol::FixedHeader;
use framewire::trace::SpanContext;
use framewire::{handler, Client, CodeError, Engine, FramewireError};

const ECHO: i64 = 42;

fn echo() -> SharedHandler {
    handler(|ctx| {
        Box::pin(async move {
            let body: Value = ctx.read_json()?;
            ctx.write(ctx.message_id(), &body).await
        })
    })
}

/// Start `engine` on an ephemeral port; returns its address and serve task.
async fn start(
    engine: &Engine,
) -> (
    std::net::SocketAddr,
    tokio::task::JoinHandle<framewire::Result<()>>,
) {
    let listener = engine.bind().await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = engine.clone();
    let task = tokio::spawn(async move { server.serve(listener).await });
    (addr, task)
}

fn local_engine() -> Engine {
    Engine::builder().addr("127.0.0.1:0").build().unwrap()
}

async fn wait_for<F: Fn() -> bool>(cond: F) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Header values and body come back unchanged from an echo handler.
#[tokio::test]
async fn test_echo_round_trip() {
    let engine = local_engine();
    engine.register(ECHO, [echo()]);
    let (addr, _task) = start(&engine).await;

    let mut client = Client::connect(addr).await.unwrap();
    let mut values = HeaderValues::new();
    values.insert("k".into(), json!("v"));

    let reply = client.call(ECHO, &values, &json!({"x": 1})).await.unwrap();
    assert_eq!(reply.message_id(), ECHO);
    assert_eq!(reply.header.values.get("k"), Some(&json!("v")));
    assert_eq!(reply.body_json::<Value>().unwrap(), json!({"x": 1}));

    engine.shutdown();
}

/// Middleware wraps the handler in onion order across the wire.
#[tokio::test]
async fn test_middleware_onion_over_the_wire() {
    let log = Arc::new(Mutex::new(Vec::<String>::new()));

    let around = |name: &'static str| -> SharedHandler {
        let log = Arc::clone(&log);
        handler(move |ctx| {
            let log = Arc::clone(&log);
            Box::pin(async move {
                log.lock().push(format!("{name}-in"));
                ctx.next().await?;
                log.lock().push(format!("{name}-out"));
                Ok(())
            })
        })
    };

    let engine = local_engine();
    engine.use_middleware(around("a"));
    let mut api = engine.group();
    api.use_middleware(around("b"));

    let inner = Arc::clone(&log);
    api.register(
        7,
        [handler(move |ctx| {
            let log = Arc::clone(&inner);
            Box::pin(async move {
                log.lock().push("c".to_string());
                ctx.write(7, "done").await
            })
        })],
    );
    let (addr, _task) = start(&engine).await;

    let mut client = Client::connect(addr).await.unwrap();
    let reply = client.call(7, &HeaderValues::new(), &Value::Null).await.unwrap();
    assert_eq!(reply.body_json::<String>().unwrap(), "done");

    // The reply is written before the chain unwinds.
    wait_for(|| log.lock().len() == 5).await;
    assert_eq!(*log.lock(), ["a-in", "b-in", "c", "b-out", "a-out"]);

    engine.shutdown();
}

/// A frame with no registered chain gets no reply; the connection lives on.
#[tokio::test]
async fn test_unregistered_message_id_is_ignored() {
    let engine = local_engine();
    engine.register(ECHO, [echo()]);
    let (addr, _task) = start(&engine).await;

    let mut client = Client::connect(addr).await.unwrap();
    client
        .send(999, &HeaderValues::new(), &json!("nobody home"))
        .await
        .unwrap();

    let reply = client
        .call(ECHO, &HeaderValues::new(), &json!("still here"))
        .await
        .unwrap();
    assert_eq!(reply.message_id(), ECHO);
    assert_eq!(reply.body_json::<String>().unwrap(), "still here");

    engine.shutdown();
}

/// A traced request yields a child span; a traced reply carries it back.
#[tokio::test]
async fn test_trace_propagates_through_handler() {
    let engine = local_engine();
    let seen = Arc::new(Mutex::new(None::<SpanContext>));
    let seen_in = Arc::clone(&seen);
    engine.register(
        5,
        [handler(move |ctx| {
            let seen = Arc::clone(&seen_in);
            Box::pin(async move {
                *seen.lock() = ctx.span().cloned();
                ctx.with_trace(true);
                ctx.write(5, &true).await
            })
        })],
    );
    let (addr, _task) = start(&engine).await;

    let mut client = Client::connect(addr).await.unwrap();
    let mut root = SpanContext::new_root();
    root.set_baggage("tenant", "acme");
    client
        .send_traced(5, &HeaderValues::new(), &Value::Null, &root)
        .await
        .unwrap();

    let reply = client.recv().await.unwrap().unwrap();
    assert!(reply.header.trace);

    let server_span = seen.lock().clone().expect("request span");
    assert_eq!(server_span.trace_id, root.trace_id);
    assert_eq!(server_span.parent_id, root.span_id);
    assert_eq!(server_span.baggage.get("tenant").map(String::as_str), Some("acme"));

    // Client side starts a child of the carrier it received.
    let reply_span = reply.span.expect("reply span");
    assert_eq!(reply_span.trace_id, root.trace_id);
    assert_eq!(reply_span.parent_id, server_span.span_id);

    engine.shutdown();
}

/// Application errors are sent as a frame and do not close the connection.
#[tokio::test]
async fn test_application_error_response() {
    let engine = local_engine();
    engine.register(
        10,
        [handler(|ctx| {
            Box::pin(async move {
                let err = CodeError::new(404, "not found");
                ctx.write_error(11, &err).await?;
                Err(FramewireError::Application(err))
            })
        })],
    );
    engine.register(ECHO, [echo()]);
    let (addr, _task) = start(&engine).await;

    let mut client = Client::connect(addr).await.unwrap();
    let reply = client.call(10, &HeaderValues::new(), &Value::Null).await.unwrap();
    assert_eq!(reply.message_id(), 11);
    assert_eq!(
        reply.body_json::<CodeError>().unwrap(),
        CodeError::new(404, "not found")
    );

    let reply = client.call(ECHO, &HeaderValues::new(), &json!(1)).await.unwrap();
    assert_eq!(reply.body_json::<i64>().unwrap(), 1);

    engine.shutdown();
}

/// A truncated frame tears the connection down.
#[tokio::test]
async fn test_truncated_frame_closes_connection() {
    let engine = local_engine();
    let (addr, _task) = start(&engine).await;

    let mut raw = TcpStream::connect(addr).await.unwrap();
    wait_for(|| engine.active_connections() == 1).await;

    raw.write_all(&FixedHeader::new(0, 10, 1).encode()).await.unwrap();
    raw.write_all(b"{\"a\"").await.unwrap();
    raw.shutdown().await.unwrap();

    wait_for(|| engine.active_connections() == 0).await;
    engine.shutdown();
}

/// Shutdown cancels live connections and ends the accept loop.
#[tokio::test]
async fn test_shutdown_closes_connections_and_stops_accepting() {
    let engine = local_engine();
    engine.register(ECHO, [echo()]);
    let (addr, task) = start(&engine).await;

    let mut first = Client::connect(addr).await.unwrap();
    let mut second = Client::connect(addr).await.unwrap();
    first.call(ECHO, &HeaderValues::new(), &json!(1)).await.unwrap();
    second.call(ECHO, &HeaderValues::new(), &json!(2)).await.unwrap();
    assert_eq!(engine.active_connections(), 2);

    engine.shutdown();
    assert_eq!(engine.active_connections(), 0);
    assert!(engine.is_stopped());

    let served = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("serve did not return after shutdown")
        .unwrap();
    assert!(served.is_ok());

    for client in [&mut first, &mut second] {
        let next = tokio::time::timeout(Duration::from_secs(5), client.recv())
            .await
            .expect("connection not closed after shutdown");
        assert!(matches!(next, Ok(None) | Err(FramewireError::Io(_))));
    }

    // Listener is gone.
    assert!(Client::connect(addr).await.is_err());
}

/// Shutdown empties the live set at once, even while a frame is mid-dispatch.
#[tokio::test]
async fn test_shutdown_counts_zero_while_dispatch_finishes() {
    let started = Arc::new(tokio::sync::Notify::new());
    let release = Arc::new(tokio::sync::Notify::new());
    let finished = Arc::new(Mutex::new(false));

    let engine = local_engine();
    let (started_in, release_in, finished_in) =
        (Arc::clone(&started), Arc::clone(&release), Arc::clone(&finished));
    engine.register(
        8,
        [handler(move |ctx| {
            let (started, release, finished) = (
                Arc::clone(&started_in),
                Arc::clone(&release_in),
                Arc::clone(&finished_in),
            );
            Box::pin(async move {
                started.notify_one();
                release.notified().await;
                assert!(ctx.scope().is_cancelled());
                *finished.lock() = true;
                Ok(())
            })
        })],
    );
    let (addr, _task) = start(&engine).await;

    let client = Client::connect(addr).await.unwrap();
    client.send(8, &HeaderValues::new(), &Value::Null).await.unwrap();
    started.notified().await;

    engine.shutdown();
    assert_eq!(engine.active_connections(), 0);
    assert!(!*finished.lock());

    release.notify_one();
    wait_for(|| *finished.lock()).await;
}

/// Many clients are served concurrently, each strictly in order.
#[tokio::test]
async fn test_concurrent_clients() {
    let engine = local_engine();
    engine.register(ECHO, [echo()]);
    let (addr, _task) = start(&engine).await;

    let tasks: Vec<_> = (0..8)
        .map(|c| {
            tokio::spawn(async move {
                let mut client = Client::connect(addr).await.unwrap();
                for n in 0..20 {
                    let body = json!({"client": c, "n": n});
                    let reply = client.call(ECHO, &HeaderValues::new(), &body).await.unwrap();
                    assert_eq!(reply.body_json::<Value>().unwrap(), body);
                }
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap();
    }
    engine.shutdown();
}

/// Duplicate registration is a configuration error.
#[test]
fn test_duplicate_registration() {
    let engine = Engine::new();
    engine.register(ECHO, [echo()]);

    let group = engine.group();
    assert!(matches!(
        group.try_register(ECHO, [echo()]),
        Err(FramewireError::DuplicateRoute(ECHO))
    ));
}
