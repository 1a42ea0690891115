//! End-to-end dispatch over a real listener.

use std::sync::Arc;

use axum::http::{header, StatusCode};
use serde_json::{json, Value};
use upload_dispatch::body::{read_body, BodyKind, Payload};
use upload_dispatch::http::{Context, Dispatcher, ErrorTranslator, Failure, Reply};
use upload_dispatch::observability::{ChannelSink, Diagnostic};
use upload_dispatch::routing::RouteTable;
use url::Url;

mod common;

#[tokio::test]
async fn exact_route_answers_with_handler_result() {
    let routes = RouteTable::builder()
        .get("/r", |_cx| async { Ok(Some(Reply::text("OK"))) })
        .build();
    let (mut server, addr) = common::start(routes).await;

    let response = reqwest::get(common::url(addr, "/r")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(response.text().await.unwrap(), "OK");

    let missing = reqwest::get(common::url(addr, "/r/")).await.unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn failing_middleware_stops_the_walk() {
    let routes = RouteTable::builder()
        .middleware(|cx: Context| async move {
            match cx.request.header(header::AUTHORIZATION) {
                Some(_) => Ok(None),
                None => Err(Failure::http(StatusCode::UNAUTHORIZED, "authorization required")),
            }
        })
        .get("/p", |_cx| async { Ok(Some(Reply::text("private"))) })
        .build();
    let (mut server, addr) = common::start(routes).await;
    let client = reqwest::Client::new();

    let denied = client.get(common::url(addr, "/p")).send().await.unwrap();
    assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);
    let body: Value = denied.json().await.unwrap();
    assert_eq!(body, json!({ "error": "unauthorized", "message": "authorization required" }));

    let allowed = client
        .get(common::url(addr, "/p"))
        .bearer_auth("token")
        .send()
        .await
        .unwrap();
    assert_eq!(allowed.text().await.unwrap(), "private");

    server.stop().await.unwrap();
}

#[tokio::test]
async fn repeated_query_keys_are_coalesced() {
    let routes = RouteTable::builder()
        .get("/q", |cx: Context| async move {
            let query = serde_json::to_value(&*cx.query).map_err(Failure::opaque)?;
            Ok(Some(Reply::json(json!({ "path": &*cx.pathname, "query": query }))))
        })
        .build();
    let (mut server, addr) = common::start(routes).await;

    let body: Value = reqwest::get(common::url(addr, "/q?a=1&a=2&a=3&b=x%20y"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(
        body,
        json!({ "path": "/q", "query": { "a": ["1", "2", "3"], "b": "x y" } })
    );

    server.stop().await.unwrap();
}

#[tokio::test]
async fn structured_body_is_echoed() {
    let routes = RouteTable::builder()
        .post("/echo", |cx: Context| async move {
            match read_body(&cx.request, 1024, BodyKind::Structured).await? {
                Payload::Structured(value) => Ok(Some(Reply::json(value))),
                other => Ok(Some(Reply::text(format!("{other:?}")))),
            }
        })
        .build();
    let (mut server, addr) = common::start(routes).await;

    let body: Value = reqwest::Client::new()
        .post(common::url(addr, "/echo"))
        .json(&json!({ "hello": ["world"] }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!({ "hello": ["world"] }));

    server.stop().await.unwrap();
}

#[tokio::test]
async fn oversized_body_is_rejected_and_connection_closed() {
    let routes = RouteTable::builder()
        .post("/echo", |cx: Context| async move {
            read_body(&cx.request, 1024, BodyKind::Raw).await?;
            Ok(Some(Reply::text("accepted")))
        })
        .build();
    let (mut server, addr) = common::start(routes).await;

    let response = common::raw_exchange(
        addr,
        b"POST /echo HTTP/1.1\r\nHost: localhost\r\nContent-Length: 4096\r\n\r\n",
    )
    .await;
    assert!(response.starts_with("HTTP/1.1 413"), "{response}");
    assert!(response.to_ascii_lowercase().contains("connection: close"), "{response}");
    assert!(response.contains("entity_too_large"), "{response}");

    server.stop().await.unwrap();
}

#[tokio::test]
async fn failures_are_reported_to_diagnostics() {
    let (sink, mut events) = ChannelSink::new();
    let routes = RouteTable::builder()
        .get("/boom", |_cx| async {
            Err(Failure::opaque(std::io::Error::other("disk on fire")))
        })
        .build();
    let dispatcher = Dispatcher::new(routes, Url::parse("http://localhost").unwrap())
        .with_diagnostics(Arc::new(sink));
    let (mut server, addr) = common::start_with(dispatcher).await;

    let response = reqwest::get(common::url(addr, "/boom")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "internal_error");

    match events.recv().await.unwrap() {
        Diagnostic::ClientRequestFailed {
            status_code,
            response,
            stack,
        } => {
            assert_eq!(status_code, 500);
            assert_eq!(response, body);
            assert!(stack.contains("disk on fire"));
        }
        other => panic!("unexpected event {other:?}"),
    }

    server.stop().await.unwrap();
}

#[tokio::test]
async fn translator_panic_drops_the_connection() {
    let routes = RouteTable::builder()
        .get("/fail", |_cx| async { Err(Failure::http(StatusCode::CONFLICT, "conflict")) })
        .get("/ok", |_cx| async { Ok(Some(Reply::text("OK"))) })
        .build();
    let dispatcher = Dispatcher::new(routes, Url::parse("http://localhost").unwrap())
        .with_translator(ErrorTranslator::new().rule(|_| panic!("translator bug")));
    let (mut server, addr) = common::start_with(dispatcher).await;

    let response = common::raw_exchange(
        addr,
        b"GET /fail HTTP/1.1\r\nHost: localhost\r\n\r\n",
    )
    .await;
    assert!(response.is_empty(), "{response}");

    let healthy = reqwest::get(common::url(addr, "/ok")).await.unwrap();
    assert_eq!(healthy.text().await.unwrap(), "OK");

    server.stop().await.unwrap();
}
