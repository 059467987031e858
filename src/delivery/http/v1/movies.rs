use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::AppState;
use crate::delivery::http::v1::middleware::AuthenticatedUser;
use crate::delivery::http::v1::reviews::{ReviewListQuery, ReviewResponse};
use crate::domain::movie::{Movie, MovieFilter, MoviePatch, NewMovie};
use crate::domain::page::{Page, PageRequest};
use crate::usecase::error::UsecaseError;

#[derive(Debug, Serialize)]
pub struct MovieResponse {
    pub id: Uuid,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub genre: String,
    pub release_date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub director: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<i32>,
    pub average_rating: f64,
    pub total_reviews: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Deserialize, Validate)]
pub struct CreateMovieRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub genre: String,
    pub release_date: NaiveDate,
    #[validate(length(max = 200))]
    pub director: Option<String>,
    #[validate(range(min = 1))]
    pub duration_minutes: Option<i32>,
}

#[derive(Deserialize, Validate)]
pub struct UpdateMovieRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub genre: Option<String>,
    pub release_date: Option<NaiveDate>,
    #[validate(length(max = 200))]
    pub director: Option<String>,
    #[validate(range(min = 1))]
    pub duration_minutes: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct MovieListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub genre: Option<String>,
    pub release_year: Option<i32>,
    pub min_rating: Option<f64>,
    pub max_rating: Option<f64>,
    pub search: Option<String>,
}

fn movie_to_response(m: Movie) -> MovieResponse {
    MovieResponse {
        id: m.id,
        title: m.title,
        description: m.description,
        genre: m.genre,
        release_date: m.release_date,
        director: m.director,
        duration_minutes: m.duration_minutes,
        average_rating: m.average_rating,
        total_reviews: m.total_reviews,
        created_at: m.created_at,
        updated_at: m.updated_at,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[tracing::instrument(skip(state))]
pub async fn list_movies(
    State(state): State<Arc<AppState>>,
    Query(params): Query<MovieListQuery>,
) -> Result<impl IntoResponse, UsecaseError> {
    tracing::debug!("handling list movies request");

    let filter = MovieFilter {
        genre: non_empty(params.genre),
        release_year: params.release_year,
        min_rating: params.min_rating,
        max_rating: params.max_rating,
        search: non_empty(params.search),
    };
    let request = PageRequest::new(params.page, params.limit);

    let page: Page<MovieResponse> = state
        .movies_usecase
        .list_movies(filter, request)
        .await?
        .map(movie_to_response);

    tracing::debug!(
        count = page.items.len(),
        total = page.total_items,
        "movies listed successfully"
    );
    Ok((StatusCode::OK, Json(page)))
}

#[tracing::instrument(skip(state), fields(movie_id = %movie_id))]
pub async fn get_movie(
    State(state): State<Arc<AppState>>,
    Path(movie_id): Path<Uuid>,
) -> Result<impl IntoResponse, UsecaseError> {
    tracing::debug!("handling get movie request");

    let movie = state.movies_usecase.get_movie(movie_id).await?;

    Ok((StatusCode::OK, Json(movie_to_response(movie))))
}

#[tracing::instrument(skip(state, payload), fields(user_id = %user.user_id))]
pub async fn create_movie(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(payload): Json<CreateMovieRequest>,
) -> Result<impl IntoResponse, UsecaseError> {
    tracing::debug!("handling create movie request");

    if let Err(validation_errors) = payload.validate() {
        tracing::warn!(user_id = %user.user_id, ?validation_errors, "validation failed");
        return Err(UsecaseError::Validation(format!("{:?}", validation_errors)));
    }

    let movie = state
        .movies_usecase
        .create_movie(NewMovie {
            title: payload.title,
            description: payload.description,
            genre: payload.genre,
            release_date: payload.release_date,
            director: payload.director,
            duration_minutes: payload.duration_minutes,
        })
        .await?;

    tracing::debug!(movie_id = %movie.id, "movie created successfully");
    Ok((StatusCode::CREATED, Json(movie_to_response(movie))))
}

#[tracing::instrument(skip(state, payload), fields(user_id = %user.user_id, movie_id = %movie_id))]
pub async fn update_movie(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(movie_id): Path<Uuid>,
    Json(payload): Json<UpdateMovieRequest>,
) -> Result<impl IntoResponse, UsecaseError> {
    tracing::debug!("handling update movie request");

    if let Err(validation_errors) = payload.validate() {
        tracing::warn!(user_id = %user.user_id, ?validation_errors, "validation failed");
        return Err(UsecaseError::Validation(format!("{:?}", validation_errors)));
    }

    let movie = state
        .movies_usecase
        .update_movie(
            movie_id,
            MoviePatch {
                title: payload.title,
                description: payload.description,
                genre: payload.genre,
                release_date: payload.release_date,
                director: payload.director,
                duration_minutes: payload.duration_minutes,
            },
        )
        .await?;

    Ok((StatusCode::OK, Json(movie_to_response(movie))))
}

#[tracing::instrument(skip(state), fields(user_id = %user.user_id, movie_id = %movie_id))]
pub async fn delete_movie(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(movie_id): Path<Uuid>,
) -> Result<impl IntoResponse, UsecaseError> {
    tracing::debug!("handling delete movie request");

    state.movies_usecase.delete_movie(movie_id).await?;

    tracing::debug!(movie_id = %movie_id, "movie deleted successfully");
    Ok(StatusCode::NO_CONTENT)
}

#[tracing::instrument(skip(state), fields(movie_id = %movie_id))]
pub async fn list_movie_reviews(
    State(state): State<Arc<AppState>>,
    Path(movie_id): Path<Uuid>,
    Query(params): Query<ReviewListQuery>,
) -> Result<impl IntoResponse, UsecaseError> {
    tracing::debug!("handling list movie reviews request");

    let page: Page<ReviewResponse> = state
        .reviews_usecase
        .list_movie_reviews(movie_id, PageRequest::new(params.page, params.limit))
        .await?
        .map(ReviewResponse::from);

    Ok((StatusCode::OK, Json(page)))
}
