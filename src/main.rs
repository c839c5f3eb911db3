use session_gate::{
    AppState, IdentityProvider,
    config::{AppConfig, Env},
    create_router,
    identity::{BackendIdentitySource, DemoIdentitySource, IdentitySourceState},
    repository::{PostgresProfileRepository, ProfileRepositoryState, RestProfileRepository},
    session::{SessionClientState, SupabaseSessionClient},
};
use sqlx::postgres::PgPoolOptions;
use std::{process::ExitCode, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Loads configuration, initializes logging, builds the identity source, activates the
/// provider and serves the navigation API until Ctrl-C.
#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {e}");
            return ExitCode::FAILURE;
        }
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "session_gate=debug,tower_http=info,axum=trace".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "FATAL: server stopped");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let (source, sessions) = build_identity_source(&config).await?;

    let provider = IdentityProvider::new(source, config.resolution_timeout);
    provider.activate();

    let bind_addr = config.bind_addr.clone();
    let app_state = AppState {
        provider: provider.clone(),
        sessions,
        config,
    };
    let app = create_router(app_state);

    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!("Listening on {}", bind_addr);
    tracing::info!("API Documentation (Swagger UI) available at /swagger-ui");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        })
        .await?;

    provider.shutdown();
    Ok(())
}

/// build_identity_source
///
/// The demo switch lives here and nowhere else: when the backend is not configured the
/// provider gets the fixture source and no session client exists at all.
async fn build_identity_source(
    config: &AppConfig,
) -> Result<(IdentitySourceState, Option<SessionClientState>), Box<dyn std::error::Error>> {
    let (Some(url), Some(anon_key), true) = (
        config.supabase_url.as_deref(),
        config.supabase_anon_key.as_deref(),
        config.backend_configured(),
    ) else {
        tracing::warn!(
            fixture = ?config.demo_identity,
            "backend not configured, serving the demo identity"
        );
        let source = Arc::new(DemoIdentitySource::new(config.demo_identity)) as IdentitySourceState;
        return Ok((source, None));
    };

    let profiles: ProfileRepositoryState = match &config.database_url {
        Some(db_url) => {
            let pool = PgPoolOptions::new().max_connections(5).connect(db_url).await?;
            tracing::info!("reading profiles from Postgres");
            Arc::new(PostgresProfileRepository::new(pool))
        }
        None => {
            tracing::info!("reading profiles through the REST gateway");
            Arc::new(RestProfileRepository::new(url, anon_key))
        }
    };

    let sessions =
        Arc::new(SupabaseSessionClient::new(config.session_file.clone(), &config.jwt_secret)) as SessionClientState;
    let source = Arc::new(BackendIdentitySource::new(sessions.clone(), profiles)) as IdentitySourceState;

    Ok((source, Some(sessions)))
}
