use actix_cors::Cors;
use actix_web::{web, App, HttpServer, middleware};
use profile_discovery::config::{LoggingSettings, Settings};
use profile_discovery::core::{MatchingEngine, PromptBuilder};
use profile_discovery::routes::{self, handle_json_payload_error, search::AppState};
use profile_discovery::services::{
    CachedProfileStore, ChatCompletionsBackend, ProfileStore, ReasoningClient, SupabaseProfileStore,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, error};
use tracing_subscriber::EnvFilter;

fn init_logging(settings: &LoggingSettings) {
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    match settings.format.as_str() {
        "pretty" => subscriber.pretty().init(),
        "compact" => subscriber.compact().init(),
        _ => subscriber.json().init(),
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    let settings = Settings::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;

    init_logging(&settings.logging);

    info!("Starting profile discovery service...");

    // Profile store, optionally behind a time-bounded snapshot cache
    let supabase = SupabaseProfileStore::new(&settings.store).map_err(|e| {
        error!("Failed to create profile store client: {}", e);
        std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
    })?;

    let store: Arc<dyn ProfileStore> = match settings.cache.snapshot_ttl_secs {
        0 => Arc::new(supabase),
        ttl => {
            info!("Profile snapshot cache enabled (TTL: {}s)", ttl);
            Arc::new(CachedProfileStore::new(supabase, Duration::from_secs(ttl)))
        }
    };

    info!("Profile store initialized (table: {})", settings.store.table);

    if settings.reasoning.api_key.is_empty() {
        error!("No reasoning backend API key configured (set GROQ_API_KEY)");
    }

    let backend = ChatCompletionsBackend::new(&settings.reasoning).map_err(|e| {
        error!("Failed to create reasoning backend client: {}", e);
        std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
    })?;

    let policy = settings.reasoning.retry_policy();
    info!(
        "Reasoning backend initialized (model: {}, timeout: {:?}, retries: {})",
        backend.model(),
        policy.attempt_timeout,
        policy.max_retries
    );

    let engine = MatchingEngine::new(
        store.clone(),
        ReasoningClient::new(Arc::new(backend), policy),
        PromptBuilder::new(settings.prompt.max_corpus_bytes),
    );

    let app_state = AppState {
        engine,
        store,
        request_deadline: Duration::from_secs(settings.server.request_deadline_secs),
    };

    // Configure HTTP server
    let host = settings.server.host.clone();
    let port = settings.server.port;
    let workers = settings.server.workers.unwrap_or(4);

    info!("Starting HTTP server on {}:{}", host, port);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::JsonConfig::default().error_handler(handle_json_payload_error))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(routes::configure_routes)
    })
    .workers(workers)
    .bind((host, port))?
    .run()
    .await
}
