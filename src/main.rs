use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use dosetrack::access::{AllowAll, LogNotifier};
use dosetrack::api::router::api_router;
use dosetrack::api::types::ApiContext;
use dosetrack::db::sqlite::open_database;
use dosetrack::{config, tasks};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("dosetrack starting v{}", config::APP_VERSION);

    let data_dir = config::data_dir();
    std::fs::create_dir_all(&data_dir).expect("cannot create data directory");
    let db_path = config::db_path();

    // Open once up front so migration failures abort before anything starts
    open_database(&db_path).expect("database initialization failed");

    let notifier: Arc<dyn dosetrack::access::Notifier> = Arc::new(LogNotifier);
    let _generation = tasks::generation::start(db_path.clone());
    let _sweep = tasks::missed_sweep::start(db_path.clone(), notifier.clone());
    let _reset = tasks::daily_reset::start(db_path.clone());

    let ctx = ApiContext::new(db_path, Arc::new(AllowAll), notifier);
    let app = api_router(ctx);

    let addr = config::bind_addr();
    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("cannot bind listen address");
    axum::serve(listener, app)
        .await
        .expect("server error");
}
