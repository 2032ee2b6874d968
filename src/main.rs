use std::sync::Arc;

use anyhow::Context;
use tower_http::cors::CorsLayer;

use trip_planner::config::{AppConfig, DbLocation, IdentityConfig};
use trip_planner::identity::{IdentityProvider, StaticIdentity, SupabaseIdentity};
use trip_planner::llm::create_provider;
use trip_planner::mailer::{MailTransport, SmtpMailer};
use trip_planner::questionnaire::{
    QuestionnaireRouteState, RecommendationRequester, SessionDeps, SessionRegistry,
    questionnaire_routes, spawn_sweep_task,
};
use trip_planner::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        anyhow::bail!("Failed to install rustls crypto provider");
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env().context("Invalid configuration")?;

    eprintln!("✈️  Trip Planner v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {} ({:?})", config.llm.model, config.llm.backend);
    eprintln!("   API: http://0.0.0.0:{}/api/questionnaire", config.port);

    // ── LLM ──────────────────────────────────────────────────────────────
    let llm = create_provider(&config.llm)?;
    let requester = Arc::new(RecommendationRequester::new(llm, config.requester.clone()));

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = match &config.db {
        DbLocation::Memory => {
            eprintln!("   Database: in-memory");
            Arc::new(LibSqlBackend::new_memory().await?)
        }
        DbLocation::File(path) => {
            let backend = LibSqlBackend::new_local(path)
                .await
                .with_context(|| format!("Failed to open database at {}", path.display()))?;
            eprintln!("   Database: {}", path.display());
            Arc::new(backend)
        }
    };

    // ── Identity ─────────────────────────────────────────────────────────
    let identity: Arc<dyn IdentityProvider> = match &config.identity {
        IdentityConfig::Supabase { url, anon_key } => {
            eprintln!("   Auth: Supabase ({url})");
            Arc::new(SupabaseIdentity::new(
                url.clone(),
                anon_key.clone(),
                config.sessions.call_timeout,
            ))
        }
        IdentityConfig::Static { user_id: Some(user) } => {
            eprintln!("   Auth: fixed local user '{user}'");
            Arc::new(StaticIdentity::signed_in(user.clone(), None))
        }
        IdentityConfig::Static { user_id: None } => {
            eprintln!("   Auth: none (submissions will be rejected)");
            Arc::new(StaticIdentity::anonymous())
        }
    };

    // ── Mailer ───────────────────────────────────────────────────────────
    let mailer: Option<Arc<dyn MailTransport>> = match config.mailer.clone() {
        Some(mailer_config) => {
            eprintln!("   E-mail: {}:{}", mailer_config.smtp_host, mailer_config.smtp_port);
            Some(Arc::new(SmtpMailer::new(mailer_config)))
        }
        None => {
            eprintln!("   E-mail: disabled");
            None
        }
    };

    let registry = SessionRegistry::new(
        SessionDeps {
            identity,
            db,
            requester,
        },
        config.sessions.clone(),
    );
    let _sweep_handle = spawn_sweep_task(registry.clone());
    let app = questionnaire_routes(QuestionnaireRouteState { registry, mailer })
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.port))?;
    tracing::info!(port = config.port, "Trip planner listening");
    axum::serve(listener, app).await?;

    Ok(())
}
