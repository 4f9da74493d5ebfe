//! Dual-Environment Faucet
//!
//! Tops requesters up to configured target balances on either environment of
//! a dual-environment chain:
//!
//! 1. A bech32 address is served on Ledger-A with one multi-coin bank send
//! 2. A hex address is served on Ledger-B with one `atomicMultiSend` call
//! 3. Either transaction delivers every asset of the plan or none of them
//!
//! One operator key signs on both environments; its bech32 and hex addresses
//! are projections of the same 20 bytes.

use std::sync::Arc;
use std::time::Duration;

use dualchain_rs::redact::redact_url;
use dualchain_rs::AddressTranslator;
use faucet::balances::{check_operator_funding, ChainBalances};
use faucet::config::Config;
use faucet::dispatcher::Dispatcher;
use faucet::executor::{LedgerAPath, LedgerBPath};
use faucet::metrics::Metrics;
use faucet::rate_limiter::RateLimiter;
use faucet::reconciler::{BalanceReconciler, BalanceSource};
use faucet::server::{self, AppState, ServiceStatus, SharedStatus};
use faucet::session::OperatorSession;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> eyre::Result<()> {
    init_logging();

    info!("Starting Dual-Environment Faucet");

    let config = Config::load()?;
    info!(
        ledger_a_lcd = %redact_url(&config.ledger_a.lcd_url),
        ledger_b_rpc = %redact_url(&config.ledger_b.rpc_url),
        atomic_contract = %config.ledger_b.atomic_contract,
        assets = config.assets.len(),
        window_secs = config.rate_limit.window_secs,
        quota = config.rate_limit.quota,
        "Configuration loaded"
    );

    let key = config.operator.load_key()?;
    let session = Arc::new(OperatorSession::new(key, &config.ledger_a.prefix)?);
    info!(
        ledger_a = %session.ledger_a_address(),
        ledger_b = %session.ledger_b_address(),
        "Operator key loaded"
    );

    let ledger_a = Arc::new(LedgerAPath::connect(&config, &session)?);
    let ledger_b = Arc::new(LedgerBPath::connect(&config, &session)?);
    // Refuse to run against the wrong network
    ledger_b.verify_chain_id().await?;
    if let Err(e) = ledger_b.verify_contract_operator().await {
        warn!(error = %e, "Could not confirm the atomic contract's operator");
    }

    let balances: Arc<dyn BalanceSource> = Arc::new(ChainBalances::connect(&config)?);
    let metrics = Arc::new(Metrics::new());
    let limiter = Arc::new(RateLimiter::from_config(&config.rate_limit));
    let assets = Arc::new(config.assets.clone());
    let translator = AddressTranslator::new(config.ledger_a.prefix.clone());

    let dispatcher = Arc::new(Dispatcher::new(
        translator.clone(),
        limiter.clone(),
        BalanceReconciler::new(balances.clone(), config.timeouts.query_timeout()),
        session.clone(),
        ledger_a,
        ledger_b,
        assets.clone(),
        metrics.clone(),
    ));

    let status: SharedStatus = Arc::new(RwLock::new(ServiceStatus::default()));

    // Operator funding for /readyz
    {
        let status = status.clone();
        let metrics = metrics.clone();
        let operator = translator.normalize(session.ledger_a_address())?;
        let interval = Duration::from_secs(config.server.readiness_interval_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let report = check_operator_funding(balances.as_ref(), &operator, &assets).await;
                let mut status = status.write().await;
                match report {
                    Ok(report) => {
                        if !report.ready {
                            warn!(shortfalls = ?report.shortfalls, "Operator underfunded");
                        }
                        metrics.operator_funded.set(i64::from(report.ready));
                        status.funding = Some(report);
                        status.funding_error = None;
                    }
                    Err(e) => {
                        warn!(error = %e, "Operator funding check failed");
                        metrics.operator_funded.set(0);
                        status.funding_error = Some(format!("{:#}", e));
                    }
                }
            }
        });
    }

    // Idle rate-limit windows
    {
        let limiter = limiter.clone();
        let interval = Duration::from_secs(config.rate_limit.sweep_interval_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let evicted = limiter.sweep();
                if evicted > 0 {
                    debug!(evicted, tracked = limiter.tracked(), "Swept idle rate-limit windows");
                }
            }
        });
    }

    let state = AppState {
        dispatcher,
        status,
        metrics,
    };

    if let Err(e) = server::start_server(
        &config.server.bind_address,
        config.server.port,
        state,
        wait_for_shutdown_signal(),
    )
    .await
    {
        error!(error = %e, "Server error");
        return Err(e);
    }

    info!("Dual-Environment Faucet stopped");
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,dual_faucet=debug,faucet=debug"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_target(true))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true))
            .with(filter)
            .init();
    }
}

async fn wait_for_shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown");
        }
    }
}
