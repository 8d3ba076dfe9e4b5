use dotenvy::dotenv;
use std::sync::Arc;
use tokio::net::TcpListener;

use boxoffice_server::config::Config;
use boxoffice_server::engine::{OrderEngine, PaymentProviderRegistry};
use boxoffice_server::routes::create_routes;
use boxoffice_server::store::EventStore;

#[tokio::main]
async fn main() {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    let store = Arc::new(EventStore::new());
    let engine = Arc::new(OrderEngine::new(
        store,
        PaymentProviderRegistry::with_defaults(),
        config.lock_config(),
    ));

    let app = create_routes(engine);

    tracing::info!("🎟️ Box office running at http://{}", config.bind_addr);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app).await.expect("Server failed");
}
