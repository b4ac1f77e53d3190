use anyhow::{bail, Context, Result};
use axum::serve;
use gridlogin::core::config::Config;
use gridlogin::core::startup::replay_accounts;
use gridlogin::core::state::AppState;
use gridlogin::core::{routes, tracing_init};
use gridlogin::metrics::collector::Metrics;
use gridlogin::stores::account_store::AccountStore;
use gridlogin::stores::presence_registry::PresenceRegistry;
use gridlogin::utils::time::current_timestamp;
use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, UnixListener};
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{debug, error, info, warn, Level};

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    let config_path = if args.len() > 1 {
        PathBuf::from(&args[1])
    } else {
        PathBuf::from("config.toml")
    };

    // Load and validate configuration
    let config = Config::from_file(&config_path)
        .context(format!(
            "Failed to load configuration from '{}'. \
            If this is your first time running the login service, copy config.example.toml to config.toml and adjust the values.",
            config_path.display()
        ))?;

    tracing_init::init_tracing(&config.logging)?;

    // Build Tokio runtime with configured number of threads
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.server.num_threads)
        .enable_all()
        .build()
        .context("Failed to build Tokio runtime")?;

    runtime.block_on(async_main(config, config_path))
}

async fn async_main(config: Config, config_path: PathBuf) -> Result<()> {
    info!(
        config_path = %config_path.display(),
        port = ?config.server.port,
        unix_socket = ?config.server.unix_socket,
        num_threads = config.server.num_threads,
        data_dir = %config.storage.data_dir.display(),
        log_level = %config.logging.level,
        log_format = %config.logging.format,
        "Grid login service starting"
    );

    let state = AppState::from_config(config.clone())?;

    info!("Replaying account journal");
    replay_accounts(&state)?;

    spawn_sweep_task(
        Arc::clone(&state.presence),
        Arc::clone(&state.metrics),
        config.presence.sweep_interval,
    );

    info!(
        sweep_interval_seconds = config.presence.sweep_interval,
        stale_after_seconds = config.presence.stale_after,
        eviction_grace_seconds = config.presence.eviction_grace,
        "Presence sweep task started"
    );

    info!(
        accounts = state.accounts.len(),
        providers = ?state.bus.provider_names(),
        first_circuit_code = config.presence.first_circuit_code,
        grid = %config.grid.grid_name,
        "Grid login service startup complete"
    );

    let presence = Arc::clone(&state.presence);

    // Build the router with middleware
    let app = routes::build_router(Arc::new(state)).layer(
        ServiceBuilder::new().layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        ),
    );

    let tcp_handle = if let Some(port) = config.server.port {
        let addr = format!("0.0.0.0:{}", port);
        info!(address = %addr, "Starting TCP listener");

        let listener = TcpListener::bind(&addr)
            .await
            .context(format!("Failed to bind TCP listener to {}", addr))?;

        info!(address = %addr, "TCP listener bound successfully");

        let app_clone = app.clone();
        Some(tokio::spawn(async move {
            serve(listener, app_clone.into_make_service())
                .with_graceful_shutdown(shutdown_signal())
                .await
                .context("TCP server error")
        }))
    } else {
        None
    };

    let unix_handle = if let Some(unix_socket) = &config.server.unix_socket {
        info!(path = %unix_socket.display(), "Starting Unix socket listener");

        // Remove existing socket file if it exists
        if unix_socket.exists() {
            std::fs::remove_file(unix_socket).context(format!(
                "Failed to remove existing Unix socket: {}",
                unix_socket.display()
            ))?;
        }

        let listener = UnixListener::bind(unix_socket).context(format!(
            "Failed to bind Unix socket listener to {}",
            unix_socket.display()
        ))?;

        info!(path = %unix_socket.display(), "Unix socket listener bound successfully");

        let mut make_service = app.into_make_service();
        Some(tokio::spawn(async move {
            use tower::Service;

            let shutdown = shutdown_signal();
            tokio::pin!(shutdown);

            loop {
                let (socket, _remote_addr) = tokio::select! {
                    accepted = listener.accept() => match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            error!(error = %e, "Failed to accept Unix socket connection");
                            continue;
                        }
                    },
                    _ = &mut shutdown => break,
                };

                let tower_service = match make_service.call(&socket).await {
                    Ok(svc) => svc,
                    Err(infallible) => match infallible {},
                };

                tokio::spawn(async move {
                    let socket = hyper_util::rt::TokioIo::new(socket);

                    let hyper_service = hyper::service::service_fn(
                        move |request: hyper::Request<hyper::body::Incoming>| {
                            tower_service.clone().call(request)
                        },
                    );

                    if let Err(err) = hyper_util::server::conn::auto::Builder::new(
                        hyper_util::rt::TokioExecutor::new(),
                    )
                    .serve_connection_with_upgrades(socket, hyper_service)
                    .await
                    {
                        error!(error = %err, "Error serving Unix socket connection");
                    }
                });
            }

            Ok::<(), anyhow::Error>(())
        }))
    } else {
        None
    };

    info!("HTTP server(s) started, waiting for shutdown signal");

    match (tcp_handle, unix_handle) {
        (Some(tcp), Some(unix)) => {
            tokio::select! {
                result = tcp => report_server_exit("TCP", result),
                result = unix => report_server_exit("Unix socket", result),
            }
        }
        (Some(tcp), None) => report_server_exit("TCP", tcp.await),
        (None, Some(unix)) => report_server_exit("Unix socket", unix.await),
        (None, None) => {
            error!("No listeners configured");
            bail!("No listeners configured");
        }
    }

    let dropped = presence.len();
    presence.close();
    info!(dropped_presences = dropped, "Shutting down gracefully");

    Ok(())
}

fn report_server_exit(kind: &str, result: Result<Result<()>, tokio::task::JoinError>) {
    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(listener = kind, error = %e, "Server stopped with an error"),
        Err(e) => error!(listener = kind, error = %e, "Server task failed"),
    }
}

/// Spawn a background task that periodically sweeps stale presences.
///
/// Each sweep runs on the blocking pool. A sweep still running when the next
/// tick fires causes that tick to be skipped.
fn spawn_sweep_task(presence: Arc<PresenceRegistry>, metrics: Arc<Metrics>, sweep_interval: u64) {
    tokio::spawn(async move {
        let period = Duration::from_secs(sweep_interval);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let running = Arc::new(AtomicBool::new(false));

        loop {
            interval.tick().await;

            if running.swap(true, Ordering::AcqRel) {
                warn!("Previous presence sweep still running, skipping tick");
                continue;
            }

            debug!("Running presence sweep");
            let registry = Arc::clone(&presence);
            let counters = Arc::clone(&metrics);
            let flag = Arc::clone(&running);

            let sweep = tokio::spawn(async move {
                let outcome =
                    tokio::task::spawn_blocking(move || registry.sweep(current_timestamp())).await;
                flag.store(false, Ordering::Release);

                match outcome {
                    Ok(report) => {
                        counters.record_sweep(&report);
                        Some(report)
                    }
                    Err(e) => {
                        error!(error = %e, "Presence sweep panicked");
                        None
                    }
                }
            });

            match tokio::time::timeout(period, sweep).await {
                Ok(Ok(Some(report))) => {
                    if report.scheduled > 0 {
                        spawn_reaper(
                            Arc::clone(&presence),
                            Arc::clone(&metrics),
                            presence.policy().eviction_grace,
                        );
                    }

                    if report.removed + report.scheduled + report.vetoed > 0 {
                        info!(
                            removed = report.removed,
                            scheduled = report.scheduled,
                            vetoed = report.vetoed,
                            active_presences = presence.len(),
                            "Presence sweep completed"
                        );
                    } else {
                        debug!("Presence sweep completed, no stale presences found");
                    }
                }
                Ok(Ok(None)) => {}
                Ok(Err(e)) => error!(error = %e, "Presence sweep task failed"),
                Err(_) => warn!(
                    sweep_interval_seconds = sweep_interval,
                    "Presence sweep overran its interval"
                ),
            }
        }
    });
}

/// Remove presences once their eviction grace has elapsed
fn spawn_reaper(presence: Arc<PresenceRegistry>, metrics: Arc<Metrics>, grace: i64) {
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(grace.max(0) as u64)).await;

        match tokio::task::spawn_blocking(move || presence.reap(current_timestamp())).await {
            Ok(removed) => {
                metrics.add_evictions(removed);
                if removed > 0 {
                    debug!(removed, "Grace period elapsed, presences removed");
                }
            }
            Err(e) => error!(error = %e, "Presence reaper failed"),
        }
    });
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }

    info!("Shutdown signal received, starting graceful shutdown");
}
