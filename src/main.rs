use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use classbook::config::Config;
use classbook::services::cloud_pg::PgCloudStore;
use classbook::services::cloud_store::MemoryCloudStore;
use classbook::{db, routes, AppState, CloudBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let store = match &config.database_url {
        Some(url) => {
            let pool = db::create_pool(url).await?;
            db::run_migrations(&pool).await?;
            info!("Database connected and migrations applied");
            CloudBackend::Postgres(PgCloudStore::new(pool))
        }
        None => {
            warn!("DATABASE_URL not set; documents are kept in memory and lost on restart");
            CloudBackend::Memory(MemoryCloudStore::new())
        }
    };

    // Without CORS_ORIGIN any origin may call the API (local development).
    let cors_origin = match &config.cors_origin {
        Some(origin) => AllowOrigin::exact(HeaderValue::from_str(origin)?),
        None => AllowOrigin::any(),
    };
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::PUT, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .allow_origin(cors_origin);

    let state = AppState::new(store, config.jwt_secret.clone());
    let app = routes::router(state)
        .layer(cors)
        .layer(DefaultBodyLimit::max(config.body_limit_bytes));

    let addr = format!("{}:{}", config.host, config.port);
    info!("classbook sync API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
