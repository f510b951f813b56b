use std::sync::Arc;
use std::time::Duration;

use actix_cors::Cors;
use actix_web::{middleware::Compress, web, App, HttpServer};
use anyhow::Context;
use tracing::{info, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

use pixerra::config::Config;
use pixerra::openapi::ApiDoc;
use pixerra::rate_limit::{InMemoryRateLimiter, RateLimiterFacade};
use pixerra::repo::{inmem::InMemRepo, Repo};
use pixerra::storage::build_object_store;
use pixerra::{configure, telemetry, AppState, SecurityHeaders};

#[cfg(feature = "postgres-store")]
async fn connect_postgres(url: &str) -> anyhow::Result<Arc<dyn Repo>> {
    use pixerra::repo::pg::PgRepo;
    use sqlx::postgres::PgPoolOptions;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await
        .context("connecting to DATABASE_URL")?;
    let repo = PgRepo::new(pool);
    repo.migrate().await.context("running migrations")?;
    info!("Using Postgres repository backend");
    Ok(Arc::new(repo))
}

async fn build_repo(cfg: &Config) -> anyhow::Result<Arc<dyn Repo>> {
    if let Some(url) = cfg.database_url.as_deref() {
        #[cfg(feature = "postgres-store")]
        return connect_postgres(url).await;
        #[cfg(not(feature = "postgres-store"))]
        tracing::warn!("DATABASE_URL is set but the postgres-store feature is disabled; ignoring {url}");
    }
    let snapshot = cfg.data_dir.join("state.json");
    info!("Using in-memory repository backend (snapshot '{}')", snapshot.display());
    Ok(Arc::new(InMemRepo::with_snapshot(snapshot)))
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load .env automatically only in debug builds; production sets the environment externally.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    // Structured logging initialisation
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Bootstrapping Pixerra server");

    let cfg = Config::from_env().context("invalid configuration")?;
    telemetry::install();

    let repo = build_repo(&cfg).await?;
    let store = build_object_store(&cfg).await?;
    let rate_limiter = cfg
        .rate_limits
        .clone()
        .map(|rl| RateLimiterFacade::new(InMemoryRateLimiter::new(true), rl));
    if let Some(rl) = rate_limiter.clone() {
        let window = rl.cfg.longest_window();
        actix_web::rt::spawn(async move {
            let mut tick = actix_web::rt::time::interval(Duration::from_secs(600));
            loop {
                tick.tick().await;
                rl.limiter.prune(window);
            }
        });
    }

    let state = AppState { repo, store, rate_limiter };
    let security = SecurityHeaders::from_config(&cfg);
    let frontend_url = cfg.frontend_url.clone();
    let openapi = ApiDoc::openapi();
    info!("OpenAPI spec generated");

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&frontend_url)
            // local dev frontends
            .allowed_origin("http://localhost:3000")
            .allowed_origin("http://127.0.0.1:3000")
            .allow_any_header()
            .allowed_methods(["GET", "POST", "OPTIONS"])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(security.clone())
            .wrap(cors)
            .app_data(web::Data::new(state.clone()))
            .configure(configure)
            .service(SwaggerUi::new("/docs/{_:.*}").url("/docs/openapi.json", openapi.clone()))
    })
    .bind((cfg.bind_addr.as_str(), cfg.port))?;

    info!("Listening on http://{}:{}", cfg.bind_addr, cfg.port);

    server.run().await?;
    Ok(())
}
