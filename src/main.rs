use actix_cors::Cors;
use actix_web::{middleware::Compress, web, App, HttpServer};
use anyhow::Context;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

use yatube::auth::{Identify, JwtKeys};
use yatube::cache::PageCache;
use yatube::config::AppConfig;
use yatube::openapi::ApiDoc;
use yatube::repo::Repo;
use yatube::routes::{self, AppState};
use yatube::security::SecurityHeaders;
use yatube::storage::build_media_store;

#[cfg(not(any(feature = "inmem-store", feature = "postgres-store")))]
compile_error!("enable the `inmem-store` or `postgres-store` feature");

#[cfg(feature = "postgres-store")]
async fn build_repo(cfg: &AppConfig) -> anyhow::Result<Arc<dyn Repo>> {
    use sqlx::postgres::PgPoolOptions;
    use yatube::repo::pg::PgRepo;

    let url = cfg.database_url.as_deref().context("DATABASE_URL must be set for postgres-store")?;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(url)
        .await
        .context("connecting to Postgres")?;
    let repo = PgRepo::new(pool);
    repo.migrate().await.context("running migrations")?;
    info!("Using Postgres repository backend");
    Ok(Arc::new(repo))
}

#[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
async fn build_repo(cfg: &AppConfig) -> anyhow::Result<Arc<dyn Repo>> {
    use yatube::repo::inmem::InMemRepo;

    let snapshot = cfg.data_dir.join("state.json");
    info!("Using in-memory repository backend (snapshot {})", snapshot.display());
    Ok(Arc::new(InMemRepo::with_snapshot(snapshot)))
}

fn cors(frontend_url: Option<&str>) -> Cors {
    let mut c = Cors::default()
        // local dev servers
        .allowed_origin("http://localhost:5173")
        .allowed_origin("http://127.0.0.1:5173")
        .allowed_origin("http://localhost:3000")
        .allow_any_header()
        .allowed_methods(["GET", "POST", "DELETE", "OPTIONS"])
        .supports_credentials()
        .max_age(3600);
    if let Some(front) = frontend_url {
        c = c.allowed_origin(front);
    }
    c
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // .env is a dev convenience; release builds take the real environment.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    let cfg = match AppConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Bootstrapping yatube server");
    info!("Frontend URL: {}", cfg.frontend_url.as_deref().unwrap_or("(none)"));

    let repo = build_repo(&cfg).await?;
    let media = build_media_store(&cfg).await?;
    let state = AppState {
        repo,
        media,
        cache: PageCache::new(cfg.index_cache_ttl),
        keys: JwtKeys::new(&cfg.jwt_secret),
        bootstrap_admins: cfg.bootstrap_admins.clone(),
    };
    info!("Index page cache TTL: {}s", cfg.index_cache_ttl.as_secs());

    let openapi = ApiDoc::openapi();
    let security = SecurityHeaders::from_config(&cfg);
    let frontend_url = cfg.frontend_url.clone();

    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(Identify)
            .wrap(cors(frontend_url.as_deref()))
            .wrap(security)
            .wrap(Compress::default())
            .wrap(TracingLogger::default())
            .configure(routes::config)
            .service(SwaggerUi::new("/docs/{_:.*}").url("/docs/openapi.json", openapi.clone()))
            .default_service(web::route().to(routes::not_found))
    })
    .bind(cfg.bind_addr.as_str())
    .with_context(|| format!("binding {}", cfg.bind_addr))?;

    info!("Listening on http://{}", cfg.bind_addr);

    server.run().await?;
    Ok(())
}
