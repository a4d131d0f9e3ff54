use ethers::signers::Signer;
use ethers::types::Address;
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use share_market::application::handlers::trade_handler;
use share_market::config::MarketConfig;
use share_market::domain::repositories::wallet::WalletProvider;
use share_market::domain::services::trade_workflow::TradeWorkflow;
use share_market::domain::value_objects::ether_amount::EtherAmount;
use share_market::infrastructure::in_memory_ledger::InMemoryLedger;
use share_market::infrastructure::in_memory_wallet::InMemoryWallet;
use share_market::infrastructure::local_wallet::{parse_signer, LocalWalletProvider};
use share_market::secrets::{load_signer_key, SecretConfig};

const MAX_REQUEST_BODY_BYTES: usize = 16 * 1024;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "share_market=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = MarketConfig::from_env();
    info!(
        rpc = %config.rpc_url,
        contract = ?config.contract_address,
        chain_id = config.chain_id,
        simulate = config.simulate,
        "Share market client starting"
    );

    let wallet: Arc<dyn WalletProvider> = if config.simulate {
        Arc::new(simulated_wallet(&config).await)
    } else {
        let key = load_signer_key(&SecretConfig::default())?;
        Arc::new(LocalWalletProvider::connect(&config, &key).await?)
    };

    let workflow = Arc::new(TradeWorkflow::new(wallet));
    match workflow.connect().await {
        Ok(account) => info!(%account, "Session ready"),
        Err(e) => warn!("Initial connect failed, POST /session/connect to retry: {}", e),
    }

    let app = trade_handler::router(workflow.clone())
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http());

    info!("Listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    let server = axum::serve(listener, app);

    let shutdown_signal = async move {
        let ctrl_c = async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received Ctrl+C signal"),
                Err(e) => error!("Failed to install Ctrl+C handler: {}", e),
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sig) => {
                    sig.recv().await;
                    info!("Received SIGTERM signal");
                }
                Err(e) => error!("Failed to install SIGTERM handler: {}", e),
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    };

    server.with_graceful_shutdown(shutdown_signal).await?;

    workflow.disconnect().await;
    info!("Shutdown complete");
    Ok(())
}

/// In-memory ledger with a funded account. The account comes from the signer
/// key when one is configured.
async fn simulated_wallet(config: &MarketConfig) -> InMemoryWallet {
    let account = match load_signer_key(&SecretConfig::default())
        .ok()
        .and_then(|key| parse_signer(&key, config.chain_id).ok())
    {
        Some(signer) => signer.address(),
        None => {
            warn!("No signer key configured, simulating with a fixed account");
            Address::from_low_u64_be(0x5ea1)
        }
    };

    let ledger = InMemoryLedger::new(config.initial_supply);
    ledger
        .fund(account, EtherAmount::from_whole_units(config.simulated_funds))
        .await;
    info!(
        %account,
        supply = config.initial_supply,
        funds = config.simulated_funds,
        "Simulated ledger ready"
    );
    InMemoryWallet::new(ledger, account)
}
