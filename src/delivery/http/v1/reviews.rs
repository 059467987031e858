use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::AppState;
use crate::delivery::http::v1::middleware::AuthenticatedUser;
use crate::domain::page::{Page, PageRequest};
use crate::domain::rating::RatingAggregate;
use crate::domain::review::Review;
use crate::usecase::error::UsecaseError;
use crate::usecase::reviews::{ReviewChange, ReviewUpdate};

#[derive(Debug, Serialize)]
pub struct ReviewResponse {
    pub id: Uuid,
    pub movie_id: Uuid,
    pub user_id: Uuid,
    pub rating: i16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Review> for ReviewResponse {
    fn from(r: Review) -> Self {
        Self {
            id: r.id,
            movie_id: r.movie_id,
            user_id: r.user_id,
            rating: r.rating,
            comment: r.comment,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

/// A review together with the movie aggregate it produced.
#[derive(Debug, Serialize)]
pub struct ReviewChangeResponse {
    pub review: ReviewResponse,
    pub movie_rating: RatingAggregate,
}

impl From<ReviewChange> for ReviewChangeResponse {
    fn from(change: ReviewChange) -> Self {
        Self {
            review: change.review.into(),
            movie_rating: change.aggregate,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeleteReviewResponse {
    pub movie_rating: RatingAggregate,
}

#[derive(Deserialize, Validate)]
pub struct CreateReviewRequest {
    pub movie_id: Uuid,
    #[validate(range(min = 1, max = 5))]
    pub rating: i16,
    /// Length is checked after trimming, by the use case.
    pub comment: Option<String>,
}

#[derive(Deserialize, Validate)]
pub struct UpdateReviewRequest {
    #[validate(range(min = 1, max = 5))]
    pub rating: Option<i16>,
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[tracing::instrument(
    skip(state, payload),
    fields(user_id = %user.user_id, movie_id = %payload.movie_id)
)]
pub async fn create_review(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(payload): Json<CreateReviewRequest>,
) -> Result<impl IntoResponse, UsecaseError> {
    tracing::debug!("handling create review request");

    if let Err(validation_errors) = payload.validate() {
        tracing::warn!(user_id = %user.user_id, ?validation_errors, "validation failed");
        return Err(UsecaseError::Validation(format!("{:?}", validation_errors)));
    }

    let change = state
        .reviews_usecase
        .create_review(user.user_id, payload.movie_id, payload.rating, payload.comment)
        .await?;

    tracing::debug!(review_id = %change.review.id, "review created successfully");
    Ok((StatusCode::CREATED, Json(ReviewChangeResponse::from(change))))
}

#[tracing::instrument(skip(state), fields(review_id = %review_id))]
pub async fn get_review(
    State(state): State<Arc<AppState>>,
    Path(review_id): Path<Uuid>,
) -> Result<impl IntoResponse, UsecaseError> {
    tracing::debug!("handling get review request");

    let review = state.reviews_usecase.get_review(review_id).await?;

    Ok((StatusCode::OK, Json(ReviewResponse::from(review))))
}

#[tracing::instrument(
    skip(state, payload),
    fields(user_id = %user.user_id, review_id = %review_id)
)]
pub async fn update_review(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(review_id): Path<Uuid>,
    Json(payload): Json<UpdateReviewRequest>,
) -> Result<impl IntoResponse, UsecaseError> {
    tracing::debug!("handling update review request");

    if let Err(validation_errors) = payload.validate() {
        tracing::warn!(user_id = %user.user_id, ?validation_errors, "validation failed");
        return Err(UsecaseError::Validation(format!("{:?}", validation_errors)));
    }

    let change = state
        .reviews_usecase
        .update_review(
            user.user_id,
            review_id,
            ReviewUpdate {
                rating: payload.rating,
                comment: payload.comment,
            },
        )
        .await?;

    Ok((StatusCode::OK, Json(ReviewChangeResponse::from(change))))
}

#[tracing::instrument(skip(state), fields(user_id = %user.user_id, review_id = %review_id))]
pub async fn delete_review(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(review_id): Path<Uuid>,
) -> Result<impl IntoResponse, UsecaseError> {
    tracing::debug!("handling delete review request");

    let movie_rating = state
        .reviews_usecase
        .delete_review(user.user_id, review_id)
        .await?;

    tracing::debug!(review_id = %review_id, "review deleted successfully");
    Ok((StatusCode::OK, Json(DeleteReviewResponse { movie_rating })))
}

#[tracing::instrument(skip(state), fields(caller_id = %user.user_id, user_id = %user_id))]
pub async fn list_user_reviews(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(user_id): Path<Uuid>,
    Query(params): Query<ReviewListQuery>,
) -> Result<impl IntoResponse, UsecaseError> {
    tracing::debug!("handling list user reviews request");

    let page: Page<ReviewResponse> = state
        .reviews_usecase
        .list_user_reviews(user.user_id, user_id, PageRequest::new(params.page, params.limit))
        .await?
        .map(ReviewResponse::from);

    Ok((StatusCode::OK, Json(page)))
}
