use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use course_gate::config::Args;
use course_gate::load_balancer::health_checker;
use course_gate::{AppState, router};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    if args.log_format == "json" {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let addr = args.bind_addr()?;
    let state = Arc::new(AppState::from_args(&args)?);

    // expired client windows are evicted even without further traffic
    let sweeper = state.guards.spawn_sweeper(args.sweep_every());

    let health_task = tokio::spawn(health_checker(
        Arc::clone(&state.load_balancer),
        state.client.clone(),
        args.health_every(),
    ));

    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        %addr,
        rate_limit = args.rate_limit,
        rate_window_ms = args.rate_window_ms,
        route_limits = args.route_limits.len(),
        peer_fallback = args.peer_fallback,
        "course-gate ready",
    );

    let served = axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;

    health_task.abort();
    drop(sweeper);
    tracing::info!("course-gate shut down");

    served.map_err(Into::into)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        return std::future::pending().await;
    }
    tracing::info!("shutdown signal received");
}
