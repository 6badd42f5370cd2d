/*
 * http_integration.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * Integration test for the request engine. Performs two real HTTPS GETs to a
 * public server on one engine and verifies the full request/response cycle,
 * including TLS, response parsing and keep-alive reuse of the connection.
 *
 * Run with:
 *   cargo test -p histofeed_core --test http_integration -- --ignored --nocapture
 */

use histofeed_core::config::{EngineConfig, Verbosity};
use histofeed_core::protocol::http::{BufferingHandler, Request, RequestEngine};

#[tokio::test]
#[ignore] // requires network
async fn get_twice_over_one_tls_connection() {
    let host = "example.com";
    let config = EngineConfig {
        verbosity: Verbosity::Verbose,
        ..Default::default()
    };
    let engine = RequestEngine::from_config(config);

    println!("=== HTTPS keep-alive integration test ===");
    for round in 1..=2 {
        let mut h = BufferingHandler::new();
        engine.submit(&Request::get(host, 443, "/"), &mut h).await;

        println!("\n--- Response {} ---", round);
        for (name, value) in &h.headers {
            println!("{}: {}", name, value);
        }
        println!("Body length: {} bytes", h.body.len());

        assert!(h.is_done(), "done should have been called");
        assert!(h.error().is_none(), "request should not fail: {:?}", h.error());
        let body = String::from_utf8_lossy(&h.body);
        assert!(body.contains("<html"), "body should be HTML");
    }

    assert_eq!(engine.stash().idle_count(), 1, "connection should be cached");
    println!("\n=== PASS ===");
}
