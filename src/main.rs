use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Builder;
use tracing::{debug, info, warn};

use advisor_client::cli::Cli;
use advisor_client::credentials::FileTokenStore;
use advisor_client::http::ApiClient;
use advisor_client::state::RetryTracker;

fn main() -> Result<()> {
    // A single request at a time; a small pool is plenty
    let num_cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2);
    let worker_threads = std::cmp::min(num_cpus, 4);

    let runtime = Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()
        .context("Failed to create Tokio runtime")?;

    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    // Logs go to stderr so stdout carries only the response body
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let retry_config = cli.retry_config()?;

    let mut client = ApiClient::new(cli.base_url.as_str(), Duration::from_millis(cli.timeout_ms))?
        .with_retry_config(retry_config);
    if let Some(path) = &cli.token_file {
        client = client.with_credentials(Arc::new(FileTokenStore::new(path)));
    }

    let tracker = Arc::new(RetryTracker::new(client.retry_config().max_retries));
    let cancel = tracker.start();

    let mut updates = tracker.subscribe();
    let reporter = tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let state = updates.borrow_and_update().clone();
            if state.is_retrying && state.attempt_count > 0 {
                eprintln!("{}", state.status_message);
            }
        }
    });

    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling request");
            interrupt.cancel();
        }
    });

    let mut request = client
        .request(cli.command.method(), cli.command.path())
        .observer(&*tracker)
        .cancel_on(cancel);
    if let Some(data) = cli.command.data() {
        let body: serde_json::Value =
            serde_json::from_str(data).context("--data is not valid JSON")?;
        request = request.json(&body);
    }

    info!("{} {}{}", cli.command.method(), client.base_url(), cli.command.path());

    let outcome = if cli.json {
        let result = request.send_json().await;
        tracker.settle(&result);
        match result? {
            Some(payload) => println!("{}", payload),
            None => println!("null"),
        }
        Ok(())
    } else {
        let result = request.send().await;
        tracker.settle(&result);
        let response = result?;
        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read response body")?;
        eprintln!("{}", status);
        println!("{}", body);
        if status.is_success() {
            Ok(())
        } else {
            Err(anyhow!("Server responded with {}", status))
        }
    };

    reporter.abort();
    if let Some(message) = tracker.snapshot().last_error {
        debug!("Last error: {}", message);
    }
    outcome
}
