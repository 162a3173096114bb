use axum::Router;
use http::{header, Method};
use std::{env, sync::Arc};
use tokio::net::TcpListener;
use tower_http::{cors::{AllowOrigin, Any, CorsLayer}, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod db;
mod engine;
mod generator;
mod level;
mod models;
mod routes;
mod session;
mod store;

use config::Config;
use generator::{DisabledGenerator, OpenAiGenerator, QuestionGenerator};
use routes::AppState;
use store::{AssignmentStore, MemoryStore, ScoreStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            env::var("RUST_LOG").unwrap_or_else(|_| "purificoin_quiz=info,axum=info".into())
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = Config::from_env();

    let (assignments, scores): (Arc<dyn AssignmentStore>, Arc<dyn ScoreStore>) =
        match &cfg.database_url {
            Some(url) => {
                let pool = db::connect(url).await?;
                sqlx::migrate!("./migrations").run(&pool).await?;
                let pg = Arc::new(db::PgStore::new(pool));
                (pg.clone() as Arc<dyn AssignmentStore>, pg as Arc<dyn ScoreStore>)
            }
            None => {
                tracing::warn!("DATABASE_URL not set, assignments and scores are kept in memory");
                let mem = Arc::new(MemoryStore::new());
                (mem.clone() as Arc<dyn AssignmentStore>, mem as Arc<dyn ScoreStore>)
            }
        };

    let generator: Arc<dyn QuestionGenerator> = match &cfg.openai_api_key {
        Some(key) => Arc::new(OpenAiGenerator::new(
            key,
            cfg.openai_base_url.clone(),
            cfg.openai_model.clone(),
        )?),
        None => {
            tracing::warn!("OPENAI_API_KEY not set, question generation is disabled");
            Arc::new(DisabledGenerator)
        }
    };

    let app = Router::new()
        .merge(routes::router(AppState::new(
            assignments,
            scores,
            generator,
            cfg.session_idle_timeout,
        )))
        .layer(TraceLayer::new_for_http())
        .layer(cors(&cfg));

    let addr = format!("0.0.0.0:{}", cfg.port);
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("listening on http://0.0.0.0:{}", cfg.port);

    axum::serve(listener, app).await?;
    Ok(())
}

fn cors(cfg: &Config) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
    if cfg.allowed_origins.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(AllowOrigin::list(cfg.allowed_origins.clone()))
    }
}
