mod config;
mod delivery;
mod domain;
mod repository;
mod telemetry;
mod usecase;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::State,
    middleware,
    routing::{get, post, put},
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::config::{AppConfig, StoreBackend};
use crate::delivery::http::v1::middleware::auth_middleware;
use crate::delivery::http::v1::movies::{
    create_movie, delete_movie, get_movie, list_movie_reviews, list_movies, update_movie,
};
use crate::delivery::http::v1::reviews::{
    create_review, delete_review, get_review, list_user_reviews, update_review,
};
use crate::repository::memory::InMemoryStore;
use crate::repository::postgres::{PostgresMovieRepository, PostgresReviewStore, create_pool};
use crate::repository::store::{AppMovieRepository, AppReviewStore};
use crate::usecase::jwt::JwtService;
use crate::usecase::movies::MoviesUseCase;
use crate::usecase::reviews::ReviewsUseCase;

pub struct AppState {
    pub movies_usecase: MoviesUseCase<AppMovieRepository>,
    pub reviews_usecase: ReviewsUseCase<AppReviewStore, AppMovieRepository>,
    pub jwt_service: JwtService,
    pub metrics_handle: PrometheusHandle,
}

impl AppState {
    fn in_memory(
        store: InMemoryStore,
        jwt_service: JwtService,
        metrics_handle: PrometheusHandle,
    ) -> Self {
        Self {
            movies_usecase: MoviesUseCase::new(AppMovieRepository::Memory(store.clone())),
            reviews_usecase: ReviewsUseCase::new(
                AppReviewStore::Memory(store.clone()),
                AppMovieRepository::Memory(store),
            ),
            jwt_service,
            metrics_handle,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if config.telemetry_enabled {
        let telemetry_config = telemetry::TelemetryConfig::from(&config);
        telemetry::init_telemetry_with_subscriber(&telemetry_config, env_filter)
            .map_err(anyhow::Error::from_boxed)?;
    } else {
        telemetry::init_subscriber_without_telemetry(env_filter);
    }

    tracing::info!("starting the movie ratings service");

    let metrics_handle = PrometheusBuilder::new().install_recorder()?;
    metrics_process::Collector::default().describe();
    tracing::info!("prometheus metrics initialized");

    tracing::info!(
        telemetry_enabled = config.telemetry_enabled,
        store_backend = ?config.store_backend,
        "config loaded"
    );

    let jwt_service = JwtService::new(config.jwt_secret.clone());

    let state = match config.store_backend {
        StoreBackend::Postgres => {
            let database_url = config.database_url.as_deref().ok_or_else(|| {
                anyhow::anyhow!("DATABASE_URL is required for the postgres store backend")
            })?;

            let pool = create_pool(
                database_url,
                config.database_max_connections,
                Duration::from_secs(config.database_acquire_timeout_secs),
            )
            .await?;
            tracing::info!("database pool created");

            sqlx::migrate!().run(&pool).await?;
            tracing::info!("database migrations applied");

            AppState {
                movies_usecase: MoviesUseCase::new(AppMovieRepository::Postgres(
                    PostgresMovieRepository::new(pool.clone()),
                )),
                reviews_usecase: ReviewsUseCase::new(
                    AppReviewStore::Postgres(PostgresReviewStore::new(pool.clone())),
                    AppMovieRepository::Postgres(PostgresMovieRepository::new(pool)),
                ),
                jwt_service,
                metrics_handle,
            }
        }
        StoreBackend::Memory => {
            tracing::warn!("using the in-memory store, data will not survive a restart");
            AppState::in_memory(InMemoryStore::new(), jwt_service, metrics_handle)
        }
    };

    let router = build_router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(bind_addr = %config.bind_addr, "movie ratings service running");
    axum::serve(listener, router).await?;

    Ok(())
}

fn build_router(shared_state: Arc<AppState>) -> Router {
    let public_api = Router::new()
        .route("/api/v1/movies", get(list_movies))
        .route("/api/v1/movies/{id}", get(get_movie))
        .route("/api/v1/movies/{id}/reviews", get(list_movie_reviews))
        .route("/api/v1/reviews/{id}", get(get_review));

    let protected_api = Router::new()
        .route("/api/v1/movies", post(create_movie))
        .route(
            "/api/v1/movies/{id}",
            put(update_movie).delete(delete_movie),
        )
        .route("/api/v1/reviews", post(create_review))
        .route(
            "/api/v1/reviews/{id}",
            put(update_review).delete(delete_review),
        )
        .route("/api/v1/users/{user_id}/reviews", get(list_user_reviews))
        .layer(middleware::from_fn_with_state(
            shared_state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .merge(public_api)
        .merge(protected_api)
        .layer(TraceLayer::new_for_http())
        .with_state(shared_state)
}

async fn metrics(State(state): State<Arc<AppState>>) -> String {
    metrics_process::Collector::default().collect();
    state.metrics_handle.render()
}

#[tracing::instrument]
async fn healthz() -> &'static str {
    "OK"
}
