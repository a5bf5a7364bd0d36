mod config;
mod server;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use imgbench_middleware::{MiddlewareFactory, Transport};
use imgbench_params::{
    FileParameterSource, InMemoryParameterSource, OverlayParameterSource, ParameterSource,
};
use imgbench_workers::{
    spin, ImagePublisher, Metrics, NodeContext, Shutdown, SpinOutcome, TimerQueue,
};
use tracing::{error, info, warn};

use config::Args;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    info!(
        name = %args.name,
        topic = %args.topic,
        subject_prefix = ?args.subject_prefix,
        transport = %args.transport,
        params = ?args.params,
        queue_depth = args.queue_depth,
        "image-publisher starting"
    );

    let shutdown = Shutdown::new();
    tokio::spawn(listen_for_signals(shutdown.clone()));

    let metrics = Arc::new(Metrics::new().context("failed to register metrics")?);
    if let Some(addr) = args.metrics_addr {
        let metrics = metrics.clone();
        tokio::spawn(async move {
            if let Err(e) = server::run_server(addr, metrics).await {
                error!(%addr, error = %e, "health/metrics server failed");
            }
        });
    }

    let transport = MiddlewareFactory::create_transport(args.transport, args.nats_url())
        .await
        .context("failed to create transport")?;
    let source = build_source(&args)?;

    let ctx = NodeContext::new(transport.clone(), shutdown.clone(), metrics)
        .with_subjects(args.subjects());
    let mut timers = TimerQueue::new();
    let mut node = ImagePublisher::create(
        &args.name,
        &args.topic,
        source.as_ref(),
        &args.publisher_options(),
        ctx,
        &mut timers,
    )
    .await
    .context("failed to start publisher")?;

    let outcome = spin(&mut node, &mut timers, &shutdown).await;
    if let Err(e) = transport.flush().await {
        warn!(error = %e, "failed to flush transport");
    }

    match outcome {
        SpinOutcome::Shutdown => info!(
            published = node.published(),
            state = %node.state(),
            "image-publisher stopped"
        ),
        SpinOutcome::Idle => warn!(
            published = node.published(),
            state = %node.state(),
            "no timers left, stopping"
        ),
    }
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "imgbench=info,image_publisher=info".into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Parameter file when given, built-in defaults otherwise, with `--param`
/// values layered on top.
fn build_source(args: &Args) -> anyhow::Result<Box<dyn ParameterSource>> {
    let base: Box<dyn ParameterSource> = match &args.params {
        Some(path) => Box::new(FileParameterSource::new(path).with_namespace(args.name.as_str())),
        None => Box::new(InMemoryParameterSource::new()),
    };
    let overrides = args.overrides().context("invalid --param override")?;
    if overrides.is_empty() {
        return Ok(base);
    }
    Ok(Box::new(OverlayParameterSource::new(base, overrides)))
}

/// Request shutdown on SIGTERM or ctrl-c
async fn listen_for_signals(shutdown: Shutdown) {
    wait_for_signal().await;
    if shutdown.request() {
        info!("shutdown requested by signal");
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            warn!(error = %e, "failed to listen for SIGTERM, ctrl-c only");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => info!("SIGTERM received"),
        _ = tokio::signal::ctrl_c() => info!("ctrl-c received"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("ctrl-c received");
    }
}
