//! Butler application binary - composition root.
//!
//! Ties the engine to a simulated home for a single request:
//! 1. Load configuration from TOML
//! 2. Build breakers, retry policy, planner client and executor
//! 3. Start the confirmation sweeper and the notification pool
//! 4. Run the request, print the plan, optionally answer its confirmation
//! 5. Stop the sweeper and drain pending notifications

mod cli;
mod sim;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use butler_core::ButlerConfig;
use butler_engine::backend::{DEVICE_GATEWAY, PLANNER};
use butler_engine::{
    ActionPlanner, CircuitBreaker, ConfirmationStore, ConfirmationSweeper, Executor,
    NotificationPool, PlannerClient, Request, RetryPolicy, SafetyPolicy, TrustGate,
};

use cli::CliArgs;
use sim::{LogNotifier, Scenario};

/// Upper bound on waiting for queued notifications at exit.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    let config_path = args.resolve_config_path();
    let config = ButlerConfig::load_or_default(&config_path);

    let log_level = args.resolve_log_level(&config.general.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!(config = %config_path.display(), "Butler starting");

    let scenario = match args.scenario {
        Some(ref path) => Scenario::load(path)?,
        None => Scenario::default(),
    };

    // Resilience: one breaker per dependency, shared retry policy.
    let retry = RetryPolicy::from_config(&config.retry);
    let planner_breaker = Arc::new(CircuitBreaker::from_config(PLANNER, &config.breaker));
    let gateway_breaker = Arc::new(CircuitBreaker::from_config(DEVICE_GATEWAY, &config.breaker));

    let mut planner = PlannerClient::new(
        Arc::new(scenario.planner()),
        Arc::clone(&planner_breaker),
        retry.clone(),
        config.planner.timeout(),
    );
    if config.planner.fallback_enabled {
        if let Some(fallback) = scenario.fallback() {
            planner = planner.with_fallback(Arc::new(fallback));
        }
    }

    let executor = Executor::new(
        Arc::new(scenario.gateway()),
        Arc::new(scenario.directory()),
        SafetyPolicy::new(&config.safety),
        Arc::clone(&gateway_breaker),
        retry,
        config.gateway.timeout(),
    );

    let confirmations = Arc::new(ConfirmationStore::new(config.confirmation.ttl()));
    let notifications = Arc::new(NotificationPool::new(
        Arc::new(LogNotifier),
        config.notifications.max_in_flight,
        config.notifications.max_per_minute,
    ));

    let shutdown = CancellationToken::new();
    let sweeper = ConfirmationSweeper::new(
        Arc::clone(&confirmations),
        config.confirmation.sweep_interval(),
    );
    let sweeper_handle = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { sweeper.run(shutdown).await })
    };

    let engine = ActionPlanner::new(
        config.engine.clone(),
        planner,
        TrustGate::new(&config.trust),
        executor,
        Arc::clone(&confirmations),
        Arc::clone(&notifications),
    );

    let mut request = Request::new(&args.request, &args.identity);
    if let Some(ref location) = args.location {
        request = request.with_location(location);
    }

    // Ctrl-C cancels the request in flight.
    let cancel = shutdown.child_token();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupt received, cancelling request");
                cancel.cancel();
            }
        })
    };

    let plan = engine.handle(&request, &cancel).await;
    println!("{}", serde_json::to_string_pretty(&plan)?);

    if args.confirm {
        let answer = match engine.confirm(&request.identity).await {
            Some(result) => serde_json::to_value(&result)?,
            None => serde_json::json!({ "confirmed": false, "reason": "nothing awaiting confirmation" }),
        };
        println!("{}", serde_json::to_string_pretty(&answer)?);
    } else if args.reject {
        let rejected = engine.reject(&request.identity);
        println!("{}", serde_json::to_string_pretty(&serde_json::json!({ "rejected": rejected }))?);
    }

    tracing::info!(
        planner_breaker = %planner_breaker.state(),
        gateway_breaker = %gateway_breaker.state(),
        "Request finished"
    );

    ctrl_c.abort();
    shutdown.cancel();
    if let Err(e) = sweeper_handle.await {
        tracing::warn!(error = %e, "Confirmation sweeper task failed");
    }
    if tokio::time::timeout(DRAIN_TIMEOUT, notifications.drain()).await.is_err() {
        tracing::warn!("Notifications still pending at exit, aborting");
        notifications.shutdown();
    }

    tracing::info!("Butler shut down");
    Ok(())
}
