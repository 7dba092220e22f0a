use clap::Parser;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use storefront_payments::adapters::{
    PostgresPurchaseRepository, PostgresStorefrontRepository, PostgresTransactionRepository,
};
use storefront_payments::cli::{self, Cli, Commands, DbCommands, TxCommands};
use storefront_payments::config::{Config, LogFormat};
use storefront_payments::gateway::{PaymentGateway, WebpayClient};
use storefront_payments::health::{DependencyChecker, GatewayChecker, PostgresChecker};
use storefront_payments::notifications::{HttpMailer, LogMailer, Mailer};
use storefront_payments::ports::TransactionRepository;
use storefront_payments::services::{
    CheckoutPages, DownloadTokenSigner, PendingSweeper, ReturnReconciler, SideEffectDispatcher,
    SideEffectWorker, TransactionInitiator,
};
use storefront_payments::{create_app, cors_layer, db, startup, AppState};

/// How long shutdown waits for queued confirmation emails.
const SIDE_EFFECT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    init_tracing(config.log_format);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Db(DbCommands::Migrate) => cli::handle_db_migrate(&config).await,
        Commands::Tx(TxCommands::SweepPending { older_than_minutes }) => {
            cli::handle_tx_sweep_pending(&config, older_than_minutes).await
        }
        Commands::Config => cli::handle_config_validate(&config),
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let pool = db::create_pool(&config).await?;
    db::run_migrations(&pool, Path::new(db::MIGRATIONS_DIR)).await?;
    tracing::info!("Database migrations completed");

    let report = startup::validate_environment(&config, &pool).await;
    report.print();
    if !report.is_valid() {
        anyhow::bail!("startup validation failed");
    }

    let transactions: Arc<dyn TransactionRepository> =
        Arc::new(PostgresTransactionRepository::new(pool.clone()));
    let purchases = Arc::new(PostgresPurchaseRepository::new(pool.clone()));
    let storefront = Arc::new(PostgresStorefrontRepository::new(pool.clone()));

    let gateway_client = WebpayClient::new(
        config.gateway.base_url.clone(),
        config.gateway.commerce_code.clone(),
        config.gateway.api_key.clone(),
    );
    let gateway: Arc<dyn PaymentGateway> = Arc::new(gateway_client.clone());
    tracing::info!(url = %config.gateway.base_url, "Payment gateway client initialized");

    let mailer: Arc<dyn Mailer> = match &config.mail {
        Some(mail) => Arc::new(HttpMailer::new(
            mail.api_url.clone(),
            mail.api_key.clone(),
            mail.from.clone(),
        )),
        None => {
            tracing::warn!("No mail API configured; confirmations are logged only");
            Arc::new(LogMailer)
        }
    };

    let signer = DownloadTokenSigner::new(
        config.download_token_secret.clone(),
        chrono::Duration::seconds(config.download_token_ttl_secs as i64),
    );

    let worker = SideEffectWorker::new(
        storefront.clone(),
        storefront.clone(),
        mailer,
        signer.clone(),
        config.public_base_url.clone(),
    );
    let (dispatcher, worker_handle) =
        SideEffectDispatcher::start(worker, config.side_effect_queue_capacity);

    let initiator = TransactionInitiator::new(
        transactions.clone(),
        purchases.clone(),
        storefront.clone(),
        gateway.clone(),
        &config.public_base_url,
    );
    let reconciler = ReturnReconciler::new(
        transactions.clone(),
        storefront,
        gateway,
        dispatcher,
        CheckoutPages::new(&config.frontend_base_url),
    );

    let sweeper_handle = config.pending_sweep_interval_secs.map(|secs| {
        PendingSweeper::new(
            transactions.clone(),
            chrono::Duration::minutes(config.pending_ttl_minutes),
        )
        .spawn_periodic(Duration::from_secs(secs))
    });

    let health_checkers: Vec<Arc<dyn DependencyChecker>> = vec![
        Arc::new(PostgresChecker::new(pool.clone())),
        Arc::new(GatewayChecker::new(gateway_client)),
    ];

    let state = AppState {
        initiator: Arc::new(initiator),
        reconciler: Arc::new(reconciler),
        transactions,
        purchases,
        download_signer: signer,
        download_base_url: config.download_base_url.clone(),
        health_checkers: Arc::new(health_checkers),
        start_time: Instant::now(),
    };

    let app = create_app(state).layer(cors_layer(&config.cors_allowed_origins));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router (and with it the last dispatcher handle) is gone now, so the
    // worker finishes once the queue is empty.
    if let Some(handle) = sweeper_handle {
        handle.abort();
    }
    match tokio::time::timeout(SIDE_EFFECT_DRAIN_TIMEOUT, worker_handle).await {
        Ok(_) => tracing::info!("Side-effect queue drained"),
        Err(_) => tracing::warn!("Timed out draining side-effect queue"),
    }

    pool.close().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
