use serde_json::json;
use std::time::Instant;
use tracing::{info_span, warn, Instrument};

use request_log_pipeline::context::with_request_id;
use request_log_pipeline::{configure_from_env, get_logger};

/// Simulates a handful of concurrent requests, each with its own request
/// id, logging through both a `Logger` handle and plain `tracing` macros.
#[tokio::main]
async fn main() {
    if let Err(e) = configure_from_env() {
        eprintln!("logging setup failed: {}", e);
        std::process::exit(1);
    }

    let log = get_logger("demo.server");
    log.info("starting service", json!({"requests": 4}));

    let start = Instant::now();
    let mut handles = Vec::new();
    for n in 0..4u32 {
        let request_id = format!("req-{n}");
        let span = info_span!("request", trace_id = n as u64 + 1000);
        handles.push(tokio::spawn(
            with_request_id(request_id, async move {
                let log = get_logger("demo.routes.projects");
                request_log_pipeline::info!(log, "listing projects", user_id = n);
                if n % 2 == 1 {
                    warn!(target: "demo.storage", attempt = 1, "storage call retried");
                }
                log.info("request finished", ());
            })
            .instrument(span),
        ));
    }
    for handle in handles {
        if let Err(e) = handle.await {
            eprintln!("request task failed: {}", e);
        }
    }

    log.info(
        "shutdown",
        json!({"elapsed_ms": start.elapsed().as_millis() as u64}),
    );
}
