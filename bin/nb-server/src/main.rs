//! Notebase Server
//!
//! Session, user and note REST APIs on MySQL with a Redis list cache.
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `NB_API_PORT` | `8080` | HTTP API port |
//! | `NB_DATABASE_URL` | `mysql://root@localhost:3306/notebase` | MySQL connection URL |
//! | `NB_DB_MAX_CONNECTIONS` | `10` | MySQL pool size |
//! | `NB_REDIS_URL` | `redis://127.0.0.1:6379` | Redis connection URL |
//! | `NB_NOTES_CACHE_TTL_SECS` | `3600` | Note page cache lifetime |
//! | `NB_COOKIE_SECURE` | `false` | Mark the refresh cookie `Secure` |
//! | `NB_INIT_SCHEMA` | `true` | Create tables on startup |
//! | `JWT_SECRET` | - | Access token secret (required) |
//! | `REFRESH_JWT_SECRET` | - | Refresh token secret (required) |
//! | `NB_LOG_FORMAT` | `text` | `text` or `json` |
//! | `NB_BOOTSTRAP_EMAIL` | - | Email of an initial account to create if missing |
//! | `NB_BOOTSTRAP_PASSWORD` | - | Password of that account |
//! | `RUST_LOG` | `info` | Log level |

use std::sync::Arc;

use anyhow::Result;
use sqlx::mysql::MySqlPoolOptions;
use tokio::{net::TcpListener, signal};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use nb_platform::api::{self, NotebaseApiDoc, NotesState, UsersState};
use nb_platform::cache::RedisNoteCache;
use nb_platform::config::LogFormat;
use nb_platform::persistence::{MySqlTransactionSource, SavePipeline, TransactionContext};
use nb_platform::repository::{MySqlNoteRepository, MySqlUserRepository};
use nb_platform::service::{
    AuthGate, NoteService, PasswordService, SystemClock, TokenService, UserService,
};
use nb_platform::PlatformConfig;

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = PlatformConfig::from_env()?;
    init_logging(config.log_format);

    info!(?config, "Starting Notebase Server");

    // MySQL
    let pool = MySqlPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await?;
    info!("Connected to MySQL");

    let user_repo = Arc::new(MySqlUserRepository::new(pool.clone()));
    let note_repo = Arc::new(MySqlNoteRepository::new(pool.clone()));
    if config.init_schema {
        user_repo.init_schema().await?;
        note_repo.init_schema().await?;
        info!("Database schema initialized");
    }

    // Redis
    let cache = Arc::new(RedisNoteCache::connect(&config.redis_url).await?);
    info!(redis_url = %config.redis_url, "Connected to Redis");

    // Services
    let transactions = TransactionContext::new(Arc::new(MySqlTransactionSource::new(pool.clone())));
    let pipeline = SavePipeline::new(transactions);
    let tokens = Arc::new(TokenService::new(
        &config.jwt_secret,
        &config.refresh_jwt_secret,
        Arc::new(SystemClock),
    )?);
    let gate = Arc::new(AuthGate::new(tokens.clone(), user_repo.clone()));
    let user_service = Arc::new(UserService::new(
        user_repo,
        tokens,
        Arc::new(PasswordService::new()),
        pipeline.clone(),
    ));
    if let (Some(email), Some(password)) = (&config.bootstrap_email, &config.bootstrap_password) {
        let created = TransactionContext::scope(user_service.ensure_bootstrap_user(email, password)).await?;
        if created.is_none() {
            info!("Bootstrap user already present");
        }
    }

    let note_service = Arc::new(NoteService::new(
        note_repo,
        cache,
        pipeline,
        config.notes_cache_ttl_secs,
    ));

    let app = api::router(
        gate,
        UsersState {
            user_service,
            cookie_secure: config.cookie_secure,
        },
        NotesState { note_service },
    )
    .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", NotebaseApiDoc::openapi()))
    .layer(TraceLayer::new_for_http())
    .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any));

    let addr = format!("0.0.0.0:{}", config.api_port);
    let listener = TcpListener::bind(&addr).await?;
    info!("API server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.close().await;
    info!("Notebase Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received...");
}
