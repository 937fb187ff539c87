//! retry-probe
//!
//! Sends one HTTP request through the retry layer and prints what the caller
//! would see: the status line, headers and body of the final response, or the
//! final error.
//!
//! ```text
//! retry-probe http://127.0.0.1:8080/items --max-attempts 5
//! retry-probe http://127.0.0.1:8080/orders -X POST --data '{"qty":1}' --force-retry
//! retry-probe http://127.0.0.1:8080/blob -X PUT --body-file ./payload.bin --timeout-ms 2000
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use http::{Method, Request, Uri};
use http_body_util::BodyExt;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tower::{Layer, ServiceExt};

use http_retry::config::{load_config, ClientConfig};
use http_retry::lifecycle::signals::cancel_on_ctrl_c;
use http_retry::observability::logging;
use http_retry::resilience::RetryPolicyBuilder;
use http_retry::{CallContext, RetryBody, RetryLayer, RetryRequestExt};

#[derive(Parser)]
#[command(name = "retry-probe", version)]
#[command(about = "Send one HTTP request through the retry layer", long_about = None)]
struct Cli {
    /// Target URL (plain http).
    url: Uri,

    /// Request method.
    #[arg(short = 'X', long, default_value = "GET")]
    method: Method,

    /// Request body given inline.
    #[arg(short, long, conflicts_with = "body_file")]
    data: Option<String>,

    /// Request body read from a file; replayed by seeking back on each attempt.
    #[arg(long)]
    body_file: Option<PathBuf>,

    /// TOML configuration file. Defaults are used when absent.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `retries.max_attempts`.
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Override `timeouts.request_ms`. 0 disables the deadline.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Retry even if the method is not idempotent.
    #[arg(long)]
    force_retry: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ClientConfig::default(),
    };

    logging::init(&config.observability)?;

    let mut builder = RetryPolicyBuilder::from_config(&config.retries)
        .metrics_enabled(config.observability.metrics_enabled);
    if let Some(max_attempts) = cli.max_attempts {
        builder = builder.max_attempts(max_attempts);
    }
    let policy = builder.build()?;

    let timeout_ms = cli.timeout_ms.unwrap_or(config.timeouts.request_ms);

    tracing::info!(
        method = %cli.method,
        url = %cli.url,
        max_attempts = policy.max_attempts(),
        timeout_ms,
        "retry-probe v0.1.0 starting"
    );

    let body = match (cli.data, &cli.body_file) {
        (Some(data), _) => RetryBody::from(data),
        (None, Some(path)) => RetryBody::from_reader(tokio::fs::File::open(path).await?),
        (None, None) => RetryBody::empty(),
    };

    let mut ctx = CallContext::new();
    if timeout_ms > 0 {
        ctx = ctx.with_timeout(Duration::from_millis(timeout_ms));
    }
    let _ctrl_c = cancel_on_ctrl_c(ctx.token().clone());

    let mut req = Request::builder()
        .method(cli.method)
        .uri(cli.url)
        .body(body)?
        .with_call_context(ctx);
    if cli.force_retry {
        req = req.force_retry();
    }

    let client = Client::builder(TokioExecutor::new()).build_http::<RetryBody>();
    let svc = RetryLayer::new(policy).layer(client);

    let resp = svc.oneshot(req).await?;

    println!("{:?} {}", resp.version(), resp.status());
    for (name, value) in resp.headers() {
        println!("{}: {}", name, value.to_str().unwrap_or("<binary>"));
    }
    println!();

    let body = resp.into_body().collect().await?.to_bytes();
    println!("{}", String::from_utf8_lossy(&body));

    Ok(())
}
