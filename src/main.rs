use std::sync::Arc;

use tokio::signal;
use tracing::info;

use erp_order_sync as agent;

use agent::auth::OAuthTokenProvider;
use agent::crm::{CrmClient, CrmSettings};
use agent::source::SqlSourceProvider;
use agent::{SyncOrchestrator, SyncScheduler, SyncSettings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = agent::config::load_config()?;
    agent::config::init_tracing(&cfg.log_level, cfg.log_json);

    let source = SqlSourceProvider::connect(&cfg.source_database_url, cfg.source_query.clone())
        .await?;
    let auth = OAuthTokenProvider::new(&cfg)?;
    let crm = CrmClient::new(CrmSettings::from_config(&cfg)?)?;

    let settings = SyncSettings {
        external_id_field: cfg.external_id_field.clone(),
        default_pricebook_external_id: cfg.default_pricebook_external_id.clone(),
        auto_assign_pricebook: cfg.auto_assign_pricebook,
    };

    let orchestrator = Arc::new(SyncOrchestrator::new(
        Arc::new(auth),
        Arc::new(source),
        crm,
        settings,
    ));
    let scheduler = SyncScheduler::new(orchestrator, cfg.poll_interval());

    info!(
        interval_secs = cfg.poll_interval_secs,
        environment = %cfg.environment,
        "erp-order-sync started"
    );

    scheduler.run(shutdown_signal()).await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
