use axum::Router;
use reqwest::Url;
use sqlx::SqlitePool;
use tera::Tera;
use tower_cookies::CookieManagerLayer;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;
use router::{api_router, app_router};
use std::sync::Arc;
mod config;
use config::Config;
mod data;
use data::{repository::ConversationRepository, users::UserRepository};
mod error;
mod knowledge;
use knowledge::{size::format_size, KnowledgeClient};
mod middleware;
use middleware::extract_user;

pub struct AppState {
    tera: Tera,
    config: Config,
    conversation_repo: ConversationRepository,
    user_repo: UserRepository,
    knowledge: KnowledgeClient,
}

impl AppState {
    fn new(pool: Arc<SqlitePool>, tera: Tera, config: Config, knowledge: KnowledgeClient) -> Self {
        AppState {
            conversation_repo: ConversationRepository { pool: pool.clone() },
            user_repo: UserRepository { pool },
            tera,
            config,
            knowledge,
        }
    }
}

fn build_app(state: Arc<AppState>) -> Router {
    let static_files = ServeDir::new(&state.config.assets_dir);

    Router::new()
        .nest_service("/assets", static_files)
        .nest("/api", api_router(state.clone()))
        .merge(app_router(state.clone()))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            extract_user,
        ))
        .layer(CookieManagerLayer::new())
        .layer(TraceLayer::new_for_http())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bitty=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let pool = data::connect(&config.database_path)
        .await
        .expect("can't connect to database");

    let tera = match Tera::new(&config.templates_glob) {
        Ok(t) => t,
        Err(e) => {
            tracing::error!("template parsing error(s): {}", e);
            std::process::exit(1);
        }
    };

    let service_url = Url::parse(&config.knowledge.service_url())
        .expect("knowledge service host/port must form a valid url");
    let knowledge_client = KnowledgeClient::new(service_url).expect("can't build http client");

    tracing::info!(
        "knowledge service at {}, max upload {}",
        config.knowledge.service_url(),
        format_size(config.knowledge.max_upload_size())
    );

    let addr = config.bind_address;
    let state = Arc::new(AppState::new(pool, tera, config, knowledge_client));
    let app = build_app(state);

    tracing::info!("listening on {}", addr);
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .expect("server error");
}
