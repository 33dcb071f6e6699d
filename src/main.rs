use epayco_gateway::api::{self, AppState};
use epayco_gateway::config::Config;
use epayco_gateway::database::payment_transaction_repository::PaymentTransactionRepository;
use epayco_gateway::database::webhook_repository::WebhookRepository;
use epayco_gateway::database::{health_check, init_pool, PoolConfig};
use epayco_gateway::payments::providers::EpaycoClient;
use epayco_gateway::payments::reconciler::NotificationReconciler;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let config = Config::from_env()?;
    init_logging(config.logging.json);

    tracing::info!("Starting ePayco gateway");
    tracing::info!("Environment: {}", config.server.environment);
    tracing::info!("ePayco API: {}", config.epayco.api_base_url);

    let pool = init_pool(
        &config.database.url,
        Some(PoolConfig {
            max_connections: config.database.max_connections,
            ..Default::default()
        }),
    )
    .await?;
    health_check(&pool).await?;

    let transactions = Arc::new(PaymentTransactionRepository::new(pool.clone()));
    let events = Arc::new(WebhookRepository::new(pool));
    let lookup = Arc::new(EpaycoClient::new(config.epayco.client_config())?);

    let state = AppState {
        transactions: transactions.clone(),
        orders: transactions.clone(),
        lookup,
        reconciler: NotificationReconciler::new(
            transactions,
            events,
            config.epayco.reject_invalid_parameters,
        ),
        base_url: config.server.base_url.clone(),
        environment: config.server.environment.clone(),
        lookup_api: config.epayco.api_base_url.clone(),
    };

    let app = api::router(state);

    let host: std::net::IpAddr = config.server.host.parse()?;
    let addr = SocketAddr::from((host, config.server.port));
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
