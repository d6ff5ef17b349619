//! Long-running daemon binary: wires the Monitor Loop, Supervisor Loop,
//! Federation Poller, and Control API together under one PID file and
//! one cancellation token. Configuration comes entirely from the
//! environment (§9 non-goal: no CLI flag parsing).

use overcode::api::routes::{build_router, ApiState};
use overcode::config::Config;
use overcode::federation::FederationPoller;
use overcode::monitor::MonitorLoop;
use overcode::notifier::{NotifyMode, Notifier};
use overcode::pidfile::PidFile;
use overcode::registry::Registry;
use overcode::state_dir::StateDir;
use overcode::supervisor::{filter_candidates, should_launch, Candidate, SupervisorState};
use colored::Colorize;
use overcode_mux::TmuxAdapter;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env()?;
    println!("{} {}", "overcode".bright_cyan().bold(), format!("group={} port={}", config.multiplexer_group, config.control_api_port).bright_white());
    tracing::info!(group = %config.multiplexer_group, port = config.control_api_port, "starting overcode daemon");

    let state_dir = StateDir::new(&config.state_dir, &config.multiplexer_group);
    state_dir.ensure().await?;

    let _pid_file = PidFile::acquire(&state_dir.monitor_daemon_pid())?;

    let mux: Arc<dyn overcode_mux::MultiplexerAdapter> = Arc::new(TmuxAdapter::new().await?);
    let registry = Arc::new(Registry::new(mux.clone(), config.multiplexer_group.clone(), state_dir.clone()));
    registry.load().await;

    let cancel = CancellationToken::new();
    let (bell_tx, bell_rx) = async_channel::unbounded();
    let (tick_tx, _tick_rx) = async_channel::unbounded();

    let supervisor = Arc::new(SupervisorState::new(config.min_launch_interval_s));
    let monitor = Arc::new(MonitorLoop::new(registry.clone(), mux.clone(), config.clone(), state_dir.clone(), supervisor.clone(), bell_tx, tick_tx));
    let federation = Arc::new(FederationPoller::new(registry.clone(), &config));
    let notifier = Arc::new(Notifier::new(NotifyMode::Both, 60.0));
    let supervisor_enabled = Arc::new(AtomicBool::new(true));

    let api_state = ApiState {
        registry: registry.clone(),
        mux: mux.clone(),
        config: config.clone(),
        state_dir: state_dir.clone(),
        federation: federation.clone(),
        monitor: monitor.clone(),
        supervisor: supervisor.clone(),
        supervisor_enabled: supervisor_enabled.clone(),
    };
    let router = build_router(api_state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.control_api_port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    overcode::state_dir::write_atomic(&state_dir.web_server_port(), config.control_api_port.to_string().as_bytes()).await.ok();

    let monitor_task = {
        let monitor = monitor.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { monitor.run(cancel).await })
    };

    let bell_task = {
        let notifier = notifier.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    Ok(bell) = bell_rx.recv() => {
                        let now = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default().as_secs_f64();
                        notifier.notify_waiting(&bell.newly_waiting, now).await;
                    }
                }
            }
        })
    };

    let supervisor_task = {
        let registry = registry.clone();
        let mux = mux.clone();
        let config = config.clone();
        let supervisor = supervisor.clone();
        let supervisor_enabled = supervisor_enabled.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(config.tick_interval_s.max(1)));
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = interval.tick() => {
                        if !supervisor_enabled.load(Ordering::SeqCst) {
                            continue;
                        }
                        let now = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default().as_secs_f64();
                        let sessions = registry.non_terminated_local();
                        let candidates: Vec<Candidate> = sessions
                            .iter()
                            .map(|s| Candidate {
                                name: s.name.clone(),
                                status: s.status,
                                is_asleep: s.is_asleep,
                                is_remediation_agent: s.name == "overcode-remediation",
                                standing_orders: s.standing_orders.clone(),
                                repo: s.repo.clone(),
                                multiplexer_window: s.multiplexer_window.clone(),
                            })
                            .collect();
                        let filtered = filter_candidates(&candidates);
                        let (launch, reason) = should_launch(&filtered, supervisor.is_remediation_running());
                        if launch {
                            tracing::info!(reason, "launching remediation agent");
                            if let Err(e) = supervisor
                                .launch(&registry, &mux, &config.multiplexer_group, &config.agent_command, &config.state_dir, &filtered, now)
                                .await
                            {
                                tracing::warn!(error = %e, "failed to launch remediation agent");
                            }
                        }
                        supervisor
                            .track(&registry, &mux, &config.multiplexer_group, &config.intervention_phrases.action, &config.intervention_phrases.no_action, now)
                            .await;
                    }
                }
            }
        })
    };

    let federation_task = {
        let federation = federation.clone();
        let interval_s = config.tick_interval_s;
        let cancel = cancel.clone();
        tokio::spawn(async move { federation.run(interval_s, cancel).await })
    };

    let server_task = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { cancel.cancelled().await })
                .await
                .ok();
        })
    };

    let retention_task = {
        let registry = registry.clone();
        let state_dir = state_dir.clone();
        let retention_hours = config.terminated_retention_hours as f64;
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(3600));
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = interval.tick() => {
                        let now = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default().as_secs_f64();
                        let removed = registry.purge_terminated_older_than(retention_hours, now).await;
                        if removed > 0 {
                            tracing::info!(removed, "garbage-collected terminated sessions past retention horizon");
                        }
                        if let Err(e) = overcode::history::clear_older_than(&state_dir, retention_hours).await {
                            tracing::warn!(error = %e, "failed to rotate status history");
                        }
                    }
                }
            }
        })
    };

    shutdown_signal().await;
    tracing::info!("shutdown signal received, draining tasks");
    cancel.cancel();
    tokio::time::timeout(std::time::Duration::from_secs(config.shutdown_grace_s), async {
        let _ = tokio::join!(monitor_task, supervisor_task, federation_task, server_task, bell_task, retention_task);
    })
    .await
    .ok();

    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = sigterm.recv() => {},
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
