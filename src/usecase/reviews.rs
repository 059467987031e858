use uuid::Uuid;

use crate::domain::page::{Page, PageRequest};
use crate::domain::rating::{MAX_RATING, MIN_RATING, RatingAggregate, is_valid_rating};
use crate::domain::review::{
    MAX_COMMENT_LEN, Review, ReviewPatch, is_valid_comment, normalize_comment,
};
use crate::repository::errors::RepositoryError;
use crate::usecase::contracts::{MovieRepository, ReviewStore, ReviewTransaction};
use crate::usecase::error::UsecaseError;

pub const MAX_REVIEWS_PAGE_SIZE: i64 = 50;

/// A review together with the aggregate of its movie after the change.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewChange {
    pub review: Review,
    pub aggregate: RatingAggregate,
}

/// Client-side review edit, before normalization.
#[derive(Debug, Clone, Default)]
pub struct ReviewUpdate {
    pub rating: Option<i16>,
    pub comment: Option<String>,
}

/// Owns every review mutation and keeps `average_rating` / `total_reviews`
/// of the affected movie in step with its reviews. Each mutation and the
/// recompute it triggers run in one store transaction.
pub struct ReviewsUseCase<S, M>
where
    S: ReviewStore,
    M: MovieRepository,
{
    review_store: S,
    movie_repository: M,
}

fn check_rating(rating: i16) -> Result<(), UsecaseError> {
    if !is_valid_rating(rating) {
        return Err(UsecaseError::Validation(format!(
            "Rating must be between {} and {}",
            MIN_RATING, MAX_RATING
        )));
    }
    Ok(())
}

fn check_comment(comment: Option<&str>) -> Result<(), UsecaseError> {
    if !is_valid_comment(comment) {
        return Err(UsecaseError::Validation(format!(
            "Comment must be at most {} characters",
            MAX_COMMENT_LEN
        )));
    }
    Ok(())
}

fn movie_not_found(e: RepositoryError) -> UsecaseError {
    match e {
        RepositoryError::NotFound => UsecaseError::NotFound("Movie".to_string()),
        other => other.into(),
    }
}

fn review_not_found(e: RepositoryError) -> UsecaseError {
    match e {
        RepositoryError::NotFound => UsecaseError::NotFound("Review".to_string()),
        other => other.into(),
    }
}

fn record_rejection(error: &UsecaseError) {
    let reason = match error {
        UsecaseError::Validation(_) => "validation",
        UsecaseError::NotFound(_) => "not_found",
        UsecaseError::DuplicateReview => "duplicate",
        UsecaseError::Forbidden(_) => "forbidden",
        UsecaseError::StoreUnavailable(_) => "store_unavailable",
    };
    metrics::counter!("reviews_rejected_total", "reason" => reason).increment(1);
}

impl<S, M> ReviewsUseCase<S, M>
where
    S: ReviewStore,
    M: MovieRepository,
{
    pub fn new(review_store: S, movie_repository: M) -> Self {
        Self {
            review_store,
            movie_repository,
        }
    }

    /// Commits on success and rolls back otherwise.
    async fn finish<T>(tx: S::Tx, result: Result<T, UsecaseError>) -> Result<T, UsecaseError> {
        match result {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_error) = tx.rollback().await {
                    tracing::error!(error = %rollback_error, "failed to roll back transaction");
                }
                record_rejection(&e);
                Err(e)
            }
        }
    }

    async fn recompute_in(tx: &mut S::Tx, movie_id: Uuid) -> Result<RatingAggregate, UsecaseError> {
        let ratings = tx.list_ratings(movie_id).await?;
        let aggregate = RatingAggregate::from_ratings(&ratings);

        tx.update_aggregate(movie_id, aggregate)
            .await
            .map_err(movie_not_found)?;

        metrics::counter!("rating_recomputes_total").increment(1);
        tracing::debug!(
            movie_id = %movie_id,
            average = aggregate.average_rating,
            total = aggregate.total_reviews,
            "rating aggregate recomputed"
        );
        Ok(aggregate)
    }

    async fn lock_movie(tx: &mut S::Tx, movie_id: Uuid) -> Result<(), UsecaseError> {
        tx.lock_movie(movie_id)
            .await?
            .ok_or_else(|| UsecaseError::NotFound("Movie".to_string()))?;
        Ok(())
    }

    /// Checks that `review_id` exists and belongs to `user_id`, returning its movie.
    async fn owned_review(
        tx: &mut S::Tx,
        user_id: Uuid,
        review_id: Uuid,
        action: &str,
    ) -> Result<Uuid, UsecaseError> {
        let review = tx
            .find_review(review_id)
            .await?
            .ok_or_else(|| UsecaseError::NotFound("Review".to_string()))?;

        if !review.is_owned_by(user_id) {
            tracing::warn!(
                review_id = %review_id,
                user_id = %user_id,
                action,
                "unauthorized review access attempt"
            );
            return Err(UsecaseError::Forbidden(format!(
                "Not authorized to {} this review",
                action
            )));
        }
        Ok(review.movie_id)
    }

    async fn locked_review(tx: &mut S::Tx, review_id: Uuid) -> Result<Review, UsecaseError> {
        tx.lock_review(review_id)
            .await?
            .ok_or_else(|| UsecaseError::NotFound("Review".to_string()))
    }

    #[tracing::instrument(skip(self), fields(movie_id = %movie_id))]
    pub async fn recompute_aggregate(
        &self,
        movie_id: Uuid,
    ) -> Result<RatingAggregate, UsecaseError> {
        tracing::debug!("recomputing rating aggregate");

        let mut tx = self.review_store.begin().await?;
        let result: Result<RatingAggregate, UsecaseError> = async {
            Self::lock_movie(&mut tx, movie_id).await?;
            Self::recompute_in(&mut tx, movie_id).await
        }
        .await;

        Self::finish(tx, result).await
    }

    #[tracing::instrument(
        skip(self, comment),
        fields(user_id = %user_id, movie_id = %movie_id, rating_value = rating)
    )]
    pub async fn create_review(
        &self,
        user_id: Uuid,
        movie_id: Uuid,
        rating: i16,
        comment: Option<String>,
    ) -> Result<ReviewChange, UsecaseError> {
        tracing::debug!("creating review");

        let comment = normalize_comment(comment);
        if let Err(e) = check_rating(rating).and_then(|_| check_comment(comment.as_deref())) {
            record_rejection(&e);
            return Err(e);
        }

        let mut tx = self.review_store.begin().await?;
        let result: Result<ReviewChange, UsecaseError> = async {
            Self::lock_movie(&mut tx, movie_id).await?;

            if tx.find_by_user_and_movie(user_id, movie_id).await?.is_some() {
                tracing::warn!(
                    user_id = %user_id,
                    movie_id = %movie_id,
                    "duplicate review rejected"
                );
                return Err(UsecaseError::DuplicateReview);
            }

            let review = Review::new(movie_id, user_id, rating, comment);
            // a unique violation here means a concurrent insert won the race
            tx.create_review(&review).await?;

            let aggregate = Self::recompute_in(&mut tx, movie_id).await?;
            Ok(ReviewChange { review, aggregate })
        }
        .await;

        let change = Self::finish(tx, result).await?;

        metrics::counter!("reviews_created_total").increment(1);
        tracing::info!(
            review_id = %change.review.id,
            movie_id = %movie_id,
            average = change.aggregate.average_rating,
            total = change.aggregate.total_reviews,
            "review created successfully"
        );
        Ok(change)
    }

    #[tracing::instrument(skip(self, update), fields(user_id = %user_id, review_id = %review_id))]
    pub async fn update_review(
        &self,
        user_id: Uuid,
        review_id: Uuid,
        update: ReviewUpdate,
    ) -> Result<ReviewChange, UsecaseError> {
        tracing::debug!("updating review");

        let patch = ReviewPatch {
            rating: update.rating,
            comment: update.comment.map(|c| normalize_comment(Some(c))),
        };
        let validation = patch
            .rating
            .map_or(Ok(()), check_rating)
            .and_then(|_| check_comment(patch.comment.as_ref().and_then(|c| c.as_deref())));
        if let Err(e) = validation {
            record_rejection(&e);
            return Err(e);
        }

        let mut tx = self.review_store.begin().await?;
        let result: Result<ReviewChange, UsecaseError> = async {
            let movie_id = Self::owned_review(&mut tx, user_id, review_id, "update").await?;

            let movie = tx
                .lock_movie(movie_id)
                .await?
                .ok_or_else(|| UsecaseError::NotFound("Movie".to_string()))?;

            // the first read predates the movie lock and may miss a committed edit
            let mut review = Self::locked_review(&mut tx, review_id).await?;
            let rating_changed = review.apply(patch);
            tx.update_review(&review).await.map_err(review_not_found)?;

            let aggregate = if rating_changed {
                Self::recompute_in(&mut tx, review.movie_id).await?
            } else {
                movie.aggregate()
            };
            Ok(ReviewChange { review, aggregate })
        }
        .await;

        let change = Self::finish(tx, result).await?;

        tracing::info!(
            review_id = %review_id,
            rating = change.review.rating,
            "review updated successfully"
        );
        Ok(change)
    }

    #[tracing::instrument(skip(self), fields(user_id = %user_id, review_id = %review_id))]
    pub async fn delete_review(
        &self,
        user_id: Uuid,
        review_id: Uuid,
    ) -> Result<RatingAggregate, UsecaseError> {
        tracing::debug!("deleting review");

        let mut tx = self.review_store.begin().await?;
        let result: Result<RatingAggregate, UsecaseError> = async {
            let movie_id = Self::owned_review(&mut tx, user_id, review_id, "delete").await?;

            Self::lock_movie(&mut tx, movie_id).await?;
            Self::locked_review(&mut tx, review_id).await?;
            tx.delete_review(review_id).await.map_err(review_not_found)?;

            Self::recompute_in(&mut tx, movie_id).await
        }
        .await;

        let aggregate = Self::finish(tx, result).await?;

        metrics::counter!("reviews_deleted_total").increment(1);
        tracing::info!(
            review_id = %review_id,
            total = aggregate.total_reviews,
            "review deleted successfully"
        );
        Ok(aggregate)
    }

    #[tracing::instrument(skip(self), fields(review_id = %review_id))]
    pub async fn get_review(&self, review_id: Uuid) -> Result<Review, UsecaseError> {
        tracing::debug!("getting review");

        self.review_store
            .find_by_id(review_id)
            .await?
            .ok_or_else(|| UsecaseError::NotFound("Review".to_string()))
    }

    #[tracing::instrument(
        skip(self),
        fields(movie_id = %movie_id, page = request.page, limit = request.limit)
    )]
    pub async fn list_movie_reviews(
        &self,
        movie_id: Uuid,
        request: PageRequest,
    ) -> Result<Page<Review>, UsecaseError> {
        tracing::debug!("listing movie reviews");

        request
            .validate(MAX_REVIEWS_PAGE_SIZE)
            .map_err(UsecaseError::Validation)?;

        self.movie_repository
            .find_by_id(movie_id)
            .await?
            .ok_or_else(|| UsecaseError::NotFound("Movie".to_string()))?;

        let total = self.review_store.count_by_movie(movie_id).await?;
        let reviews = self
            .review_store
            .list_by_movie(movie_id, request.limit, request.offset())
            .await?;

        tracing::debug!(
            movie_id = %movie_id,
            count = reviews.len(),
            total,
            "retrieved movie reviews"
        );
        Ok(Page::new(reviews, request, total))
    }

    #[tracing::instrument(skip(self), fields(caller_id = %caller_id, user_id = %user_id))]
    pub async fn list_user_reviews(
        &self,
        caller_id: Uuid,
        user_id: Uuid,
        request: PageRequest,
    ) -> Result<Page<Review>, UsecaseError> {
        tracing::debug!("listing user reviews");

        if caller_id != user_id {
            tracing::warn!("attempt to list another user's reviews");
            return Err(UsecaseError::Forbidden("Access denied".to_string()));
        }
        request
            .validate(MAX_REVIEWS_PAGE_SIZE)
            .map_err(UsecaseError::Validation)?;

        let total = self.review_store.count_by_user(user_id).await?;
        let reviews = self
            .review_store
            .list_by_user(user_id, request.limit, request.offset())
            .await?;

        tracing::debug!(user_id = %user_id, count = reviews.len(), total, "retrieved user reviews");
        Ok(Page::new(reviews, request, total))
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use futures::future::join_all;
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::domain::movie::{Movie, NewMovie};
    use crate::repository::memory::{FailPoint, InMemoryStore, InMemoryTransaction};

    type TestUseCase = ReviewsUseCase<InMemoryStore, InMemoryStore>;

    /// Answers unlocked reads of one review with a copy taken before a
    /// concurrent edit committed, as a plain read under read committed can.
    struct LaggingStore {
        inner: InMemoryStore,
        snapshot: Review,
    }

    struct LaggingTransaction {
        inner: InMemoryTransaction,
        snapshot: Review,
    }

    impl ReviewStore for LaggingStore {
        type Tx = LaggingTransaction;

        async fn begin(&self) -> Result<LaggingTransaction, RepositoryError> {
            Ok(LaggingTransaction {
                inner: self.inner.begin().await?,
                snapshot: self.snapshot.clone(),
            })
        }

        async fn find_by_id(&self, id: Uuid) -> Result<Option<Review>, RepositoryError> {
            ReviewStore::find_by_id(&self.inner, id).await
        }

        async fn list_by_movie(
            &self,
            movie_id: Uuid,
            limit: i64,
            offset: i64,
        ) -> Result<Vec<Review>, RepositoryError> {
            self.inner.list_by_movie(movie_id, limit, offset).await
        }

        async fn count_by_movie(&self, movie_id: Uuid) -> Result<i64, RepositoryError> {
            self.inner.count_by_movie(movie_id).await
        }

        async fn list_by_user(
            &self,
            user_id: Uuid,
            limit: i64,
            offset: i64,
        ) -> Result<Vec<Review>, RepositoryError> {
            self.inner.list_by_user(user_id, limit, offset).await
        }

        async fn count_by_user(&self, user_id: Uuid) -> Result<i64, RepositoryError> {
            self.inner.count_by_user(user_id).await
        }
    }

    impl ReviewTransaction for LaggingTransaction {
        async fn lock_movie(&mut self, movie_id: Uuid) -> Result<Option<Movie>, RepositoryError> {
            self.inner.lock_movie(movie_id).await
        }

        async fn find_review(&mut self, id: Uuid) -> Result<Option<Review>, RepositoryError> {
            if id == self.snapshot.id {
                return Ok(Some(self.snapshot.clone()));
            }
            self.inner.find_review(id).await
        }

        async fn lock_review(&mut self, id: Uuid) -> Result<Option<Review>, RepositoryError> {
            self.inner.lock_review(id).await
        }

        async fn find_by_user_and_movie(
            &mut self,
            user_id: Uuid,
            movie_id: Uuid,
        ) -> Result<Option<Review>, RepositoryError> {
            self.inner.find_by_user_and_movie(user_id, movie_id).await
        }

        async fn list_ratings(&mut self, movie_id: Uuid) -> Result<Vec<i16>, RepositoryError> {
            self.inner.list_ratings(movie_id).await
        }

        async fn create_review(&mut self, review: &Review) -> Result<(), RepositoryError> {
            self.inner.create_review(review).await
        }

        async fn update_review(&mut self, review: &Review) -> Result<(), RepositoryError> {
            self.inner.update_review(review).await
        }

        async fn delete_review(&mut self, id: Uuid) -> Result<(), RepositoryError> {
            self.inner.delete_review(id).await
        }

        async fn update_aggregate(
            &mut self,
            movie_id: Uuid,
            aggregate: RatingAggregate,
        ) -> Result<(), RepositoryError> {
            self.inner.update_aggregate(movie_id, aggregate).await
        }

        async fn commit(self) -> Result<(), RepositoryError> {
            self.inner.commit().await
        }

        async fn rollback(self) -> Result<(), RepositoryError> {
            self.inner.rollback().await
        }
    }

    /// Creates a 4 from another user and a 5 from `user_id`, then lowers the
    /// 5 to a 3. Returns the review as it looked before the edit.
    async fn review_edited_after_snapshot(
        usecase: &TestUseCase,
        movie_id: Uuid,
        user_id: Uuid,
    ) -> Review {
        usecase.create_review(Uuid::new_v4(), movie_id, 4, None).await.unwrap();
        let snapshot = usecase.create_review(user_id, movie_id, 5, None).await.unwrap().review;
        usecase
            .update_review(user_id, snapshot.id, rating_update(3))
            .await
            .unwrap();
        snapshot
    }

    async fn setup() -> (TestUseCase, InMemoryStore, Movie) {
        let store = InMemoryStore::new();
        let movie = Movie::new(NewMovie {
            title: "Heat".to_string(),
            description: None,
            genre: "Crime".to_string(),
            release_date: NaiveDate::from_ymd_opt(1995, 12, 15).unwrap(),
            director: Some("Michael Mann".to_string()),
            duration_minutes: Some(170),
        });
        MovieRepository::create(&store, &movie).await.unwrap();

        let usecase = ReviewsUseCase::new(store.clone(), store.clone());
        (usecase, store, movie)
    }

    fn rating_update(rating: i16) -> ReviewUpdate {
        ReviewUpdate {
            rating: Some(rating),
            comment: None,
        }
    }

    async fn assert_aggregate_consistent(store: &InMemoryStore, movie_id: Uuid) {
        let expected = expected_aggregate(store, movie_id).await;
        assert_eq!(stored_aggregate(store, movie_id).await, expected);
    }

    async fn stored_aggregate(store: &InMemoryStore, movie_id: Uuid) -> RatingAggregate {
        MovieRepository::find_by_id(store, movie_id)
            .await
            .unwrap()
            .unwrap()
            .aggregate()
    }

    /// Aggregate the movie should carry according to its current reviews.
    async fn expected_aggregate(store: &InMemoryStore, movie_id: Uuid) -> RatingAggregate {
        let reviews = store.list_by_movie(movie_id, i64::MAX, 0).await.unwrap();
        let ratings: Vec<i16> = reviews.iter().map(|r| r.rating).collect();
        RatingAggregate::from_ratings(&ratings)
    }

    #[tokio::test]
    async fn test_create_review_updates_aggregate() {
        let (usecase, store, movie) = setup().await;
        let user_id = Uuid::new_v4();

        let change = usecase
            .create_review(user_id, movie.id, 4, Some("  Tense  ".to_string()))
            .await
            .unwrap();

        assert_eq!(change.review.movie_id, movie.id);
        assert_eq!(change.review.user_id, user_id);
        assert_eq!(change.review.comment.as_deref(), Some("Tense"));
        assert_eq!(change.aggregate.average_rating, 4.0);
        assert_eq!(change.aggregate.total_reviews, 1);
        assert_eq!(stored_aggregate(&store, movie.id).await, change.aggregate);
    }

    #[tokio::test]
    async fn test_rating_scenario_create_update_delete() {
        let (usecase, store, movie) = setup().await;
        let (alice, bob, carol) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        let first_five = usecase.create_review(alice, movie.id, 5, None).await.unwrap();
        usecase.create_review(bob, movie.id, 5, None).await.unwrap();
        let four = usecase.create_review(carol, movie.id, 4, None).await.unwrap();

        let aggregate = stored_aggregate(&store, movie.id).await;
        assert_eq!(aggregate.average_rating, 4.67);
        assert_eq!(aggregate.total_reviews, 3);

        let change = usecase
            .update_review(carol, four.review.id, rating_update(2))
            .await
            .unwrap();
        assert_eq!(change.aggregate.average_rating, 4.0);
        assert_eq!(change.aggregate.total_reviews, 3);
        assert_eq!(stored_aggregate(&store, movie.id).await, change.aggregate);

        let aggregate = usecase.delete_review(alice, first_five.review.id).await.unwrap();
        assert_eq!(aggregate.average_rating, 3.5);
        assert_eq!(aggregate.total_reviews, 2);
        assert_eq!(stored_aggregate(&store, movie.id).await, aggregate);
    }

    #[tokio::test]
    async fn test_duplicate_review_rejected_without_write() {
        let (usecase, store, movie) = setup().await;
        let user_id = Uuid::new_v4();

        usecase.create_review(user_id, movie.id, 5, None).await.unwrap();
        let before = stored_aggregate(&store, movie.id).await;

        let result = usecase.create_review(user_id, movie.id, 1, None).await;

        assert!(matches!(result, Err(UsecaseError::DuplicateReview)));
        assert_eq!(stored_aggregate(&store, movie.id).await, before);
        assert_eq!(store.count_by_movie(movie.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_creates_for_same_pair_admit_one() {
        let (usecase, store, movie) = setup().await;
        let user_id = Uuid::new_v4();

        let attempts = (1..=5).map(|rating| usecase.create_review(user_id, movie.id, rating, None));
        let results = join_all(attempts).await;

        let succeeded = results.iter().filter(|r| r.is_ok()).count();
        let duplicates = results
            .iter()
            .filter(|r| matches!(r, Err(UsecaseError::DuplicateReview)))
            .count();
        assert_eq!(succeeded, 1);
        assert_eq!(duplicates, 4);
        assert_eq!(store.count_by_movie(movie.id).await.unwrap(), 1);
        assert_eq!(stored_aggregate(&store, movie.id).await.total_reviews, 1);
    }

    #[tokio::test]
    async fn test_deleting_only_review_resets_aggregate() {
        let (usecase, store, movie) = setup().await;
        let user_id = Uuid::new_v4();

        let change = usecase.create_review(user_id, movie.id, 3, None).await.unwrap();
        let aggregate = usecase.delete_review(user_id, change.review.id).await.unwrap();

        assert_eq!(aggregate, RatingAggregate::default());
        let stored = stored_aggregate(&store, movie.id).await;
        assert_eq!(stored.average_rating, 0.0);
        assert_eq!(stored.total_reviews, 0);
    }

    #[tokio::test]
    async fn test_create_review_invalid_rating() {
        let (usecase, store, movie) = setup().await;

        for rating in [0, 6, -1] {
            let result = usecase.create_review(Uuid::new_v4(), movie.id, rating, None).await;
            let err = assert_err!(result);
            assert!(matches!(err, UsecaseError::Validation(_)));
            assert!(err.to_string().contains("between 1 and 5"));
        }
        assert_eq!(store.count_by_movie(movie.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_create_review_comment_too_long() {
        let (usecase, store, movie) = setup().await;

        let result = usecase
            .create_review(Uuid::new_v4(), movie.id, 4, Some("x".repeat(MAX_COMMENT_LEN + 1)))
            .await;

        assert!(matches!(result, Err(UsecaseError::Validation(_))));
        assert_eq!(store.count_by_movie(movie.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_create_review_movie_not_found() {
        let (usecase, _store, _movie) = setup().await;

        let result = usecase.create_review(Uuid::new_v4(), Uuid::new_v4(), 4, None).await;

        let err = assert_err!(result);
        assert!(matches!(err, UsecaseError::NotFound(_)));
        assert!(err.to_string().contains("Movie"));
    }

    #[tokio::test]
    async fn test_failed_recompute_rolls_back_insert() {
        let (usecase, store, movie) = setup().await;
        store.fail_on(FailPoint::UpdateAggregate).await;

        let result = usecase.create_review(Uuid::new_v4(), movie.id, 5, None).await;

        assert!(matches!(result, Err(UsecaseError::StoreUnavailable(_))));
        assert_eq!(store.count_by_movie(movie.id).await.unwrap(), 0);
        assert_eq!(stored_aggregate(&store, movie.id).await, RatingAggregate::default());
    }

    #[tokio::test]
    async fn test_failed_commit_leaves_store_untouched() {
        let (usecase, store, movie) = setup().await;
        let user_id = Uuid::new_v4();
        let change = usecase.create_review(user_id, movie.id, 5, None).await.unwrap();
        store.fail_on(FailPoint::Commit).await;

        let result = usecase.delete_review(user_id, change.review.id).await;

        assert!(matches!(result, Err(UsecaseError::StoreUnavailable(_))));
        assert_ok!(usecase.get_review(change.review.id).await);
        assert_eq!(stored_aggregate(&store, movie.id).await.total_reviews, 1);
    }

    #[tokio::test]
    async fn test_unavailable_store_on_begin() {
        let (usecase, store, movie) = setup().await;
        store.fail_on(FailPoint::Begin).await;

        let result = usecase.create_review(Uuid::new_v4(), movie.id, 5, None).await;

        assert!(matches!(result, Err(UsecaseError::StoreUnavailable(_))));
    }

    #[tokio::test]
    async fn test_update_review_forbidden_for_non_owner() {
        let (usecase, store, movie) = setup().await;
        let owner = Uuid::new_v4();
        let change = usecase.create_review(owner, movie.id, 5, None).await.unwrap();

        let result = usecase
            .update_review(Uuid::new_v4(), change.review.id, rating_update(1))
            .await;

        assert!(matches!(result, Err(UsecaseError::Forbidden(_))));
        let stored = usecase.get_review(change.review.id).await.unwrap();
        assert_eq!(stored.rating, 5);
        assert_eq!(stored_aggregate(&store, movie.id).await.average_rating, 5.0);
    }

    #[tokio::test]
    async fn test_update_review_not_found() {
        let (usecase, _store, _movie) = setup().await;

        let result = usecase
            .update_review(Uuid::new_v4(), Uuid::new_v4(), rating_update(3))
            .await;

        assert!(matches!(result, Err(UsecaseError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_update_review_validates_patch() {
        let (usecase, _store, movie) = setup().await;
        let user_id = Uuid::new_v4();
        let change = usecase.create_review(user_id, movie.id, 5, None).await.unwrap();

        let result = usecase
            .update_review(user_id, change.review.id, rating_update(9))
            .await;
        assert!(matches!(result, Err(UsecaseError::Validation(_))));

        let result = usecase
            .update_review(
                user_id,
                change.review.id,
                ReviewUpdate { rating: None, comment: Some("y".repeat(MAX_COMMENT_LEN + 1)) },
            )
            .await;
        assert!(matches!(result, Err(UsecaseError::Validation(_))));
    }

    #[tokio::test]
    async fn test_comment_only_update_skips_recompute() {
        let (usecase, store, movie) = setup().await;
        let user_id = Uuid::new_v4();
        let change = usecase.create_review(user_id, movie.id, 4, None).await.unwrap();
        // would fail the update if the aggregate were rewritten
        store.fail_on(FailPoint::UpdateAggregate).await;

        let updated = usecase
            .update_review(
                user_id,
                change.review.id,
                ReviewUpdate { rating: Some(4), comment: Some("On second viewing".to_string()) },
            )
            .await
            .unwrap();

        assert_eq!(updated.review.comment.as_deref(), Some("On second viewing"));
        assert_eq!(updated.aggregate, change.aggregate);
    }

    #[tokio::test]
    async fn test_empty_comment_clears_existing_comment() {
        let (usecase, _store, movie) = setup().await;
        let user_id = Uuid::new_v4();
        let change = usecase
            .create_review(user_id, movie.id, 4, Some("Good".to_string()))
            .await
            .unwrap();

        let updated = usecase
            .update_review(
                user_id,
                change.review.id,
                ReviewUpdate {
                    rating: None,
                    comment: Some("  ".to_string()),
                },
            )
            .await
            .unwrap();

        assert!(updated.review.comment.is_none());
    }

    #[tokio::test]
    async fn test_delete_review_forbidden_for_non_owner() {
        let (usecase, store, movie) = setup().await;
        let change = usecase.create_review(Uuid::new_v4(), movie.id, 2, None).await.unwrap();

        let result = usecase.delete_review(Uuid::new_v4(), change.review.id).await;

        assert!(matches!(result, Err(UsecaseError::Forbidden(_))));
        assert_eq!(store.count_by_movie(movie.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failed_delete_recompute_keeps_review() {
        let (usecase, store, movie) = setup().await;
        let user_id = Uuid::new_v4();
        let change = usecase.create_review(user_id, movie.id, 2, None).await.unwrap();
        store.fail_on(FailPoint::UpdateAggregate).await;

        let result = usecase.delete_review(user_id, change.review.id).await;

        assert!(matches!(result, Err(UsecaseError::StoreUnavailable(_))));
        assert_eq!(store.count_by_movie(movie.id).await.unwrap(), 1);
        assert_eq!(stored_aggregate(&store, movie.id).await, change.aggregate);
    }

    #[tokio::test]
    async fn test_recompute_repairs_stale_aggregate() {
        let (usecase, store, movie) = setup().await;
        usecase.create_review(Uuid::new_v4(), movie.id, 1, None).await.unwrap();
        usecase.create_review(Uuid::new_v4(), movie.id, 2, None).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.update_aggregate(movie.id, RatingAggregate { average_rating: 5.0, total_reviews: 40 })
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let aggregate = usecase.recompute_aggregate(movie.id).await.unwrap();

        assert_eq!(aggregate.average_rating, 1.5);
        assert_eq!(aggregate.total_reviews, 2);
        assert_eq!(stored_aggregate(&store, movie.id).await, aggregate);
    }

    #[tokio::test]
    async fn test_recompute_unknown_movie() {
        let (usecase, _store, _movie) = setup().await;

        let result = usecase.recompute_aggregate(Uuid::new_v4()).await;

        assert!(matches!(result, Err(UsecaseError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_aggregate_tracks_mixed_mutations() {
        let (usecase, store, movie) = setup().await;
        let users: Vec<Uuid> = (0..8).map(|_| Uuid::new_v4()).collect();
        let mut review_ids = Vec::new();

        for (i, user_id) in users.iter().enumerate() {
            let rating = (i as i16 * 3) % 5 + 1;
            let change = usecase.create_review(*user_id, movie.id, rating, None).await.unwrap();
            review_ids.push(change.review.id);
            assert_aggregate_consistent(&store, movie.id).await;
        }

        for (i, (user_id, review_id)) in users.iter().zip(&review_ids).enumerate() {
            if i % 3 == 0 {
                usecase.delete_review(*user_id, *review_id).await.unwrap();
            } else {
                let rating = (i as i16 * 7) % 5 + 1;
                usecase
                    .update_review(*user_id, *review_id, rating_update(rating))
                    .await
                    .unwrap();
            }
            assert_aggregate_consistent(&store, movie.id).await;
        }

        assert_eq!(stored_aggregate(&store, movie.id).await.total_reviews, 5);
    }

    #[tokio::test]
    async fn test_list_movie_reviews_paginates() {
        let (usecase, _store, movie) = setup().await;
        for _ in 0..3 {
            usecase.create_review(Uuid::new_v4(), movie.id, 4, None).await.unwrap();
        }

        let page = usecase
            .list_movie_reviews(movie.id, PageRequest::new(Some(2), Some(2)))
            .await
            .unwrap();

        assert_eq!(page.items.len(), 1);
        assert_eq!(page.total_items, 3);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.current_page, 2);
    }

    #[tokio::test]
    async fn test_list_movie_reviews_rejects_large_page() {
        let (usecase, _store, movie) = setup().await;

        let result = usecase
            .list_movie_reviews(movie.id, PageRequest::new(None, Some(MAX_REVIEWS_PAGE_SIZE + 1)))
            .await;

        assert!(matches!(result, Err(UsecaseError::Validation(_))));
    }

    #[tokio::test]
    async fn test_list_movie_reviews_unknown_movie() {
        let (usecase, _store, _movie) = setup().await;

        let result = usecase.list_movie_reviews(Uuid::new_v4(), PageRequest::default()).await;

        assert!(matches!(result, Err(UsecaseError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_list_user_reviews_only_own() {
        let (usecase, _store, movie) = setup().await;
        let user_id = Uuid::new_v4();
        usecase.create_review(user_id, movie.id, 3, None).await.unwrap();

        let page = usecase
            .list_user_reviews(user_id, user_id, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].user_id, user_id);

        let result = usecase
            .list_user_reviews(Uuid::new_v4(), user_id, PageRequest::default())
            .await;
        assert!(matches!(result, Err(UsecaseError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_comment_update_keeps_rating_committed_after_first_read() {
        let (usecase, store, movie) = setup().await;
        let user_id = Uuid::new_v4();
        let snapshot = review_edited_after_snapshot(&usecase, movie.id, user_id).await;
        let lagging = ReviewsUseCase::new(
            LaggingStore { inner: store.clone(), snapshot: snapshot.clone() },
            store.clone(),
        );

        let change = lagging
            .update_review(
                user_id,
                snapshot.id,
                ReviewUpdate { rating: None, comment: Some("Grew on me".to_string()) },
            )
            .await
            .unwrap();

        assert_eq!(change.review.rating, 3);
        let stored = usecase.get_review(snapshot.id).await.unwrap();
        assert_eq!(stored.rating, 3);
        assert_eq!(stored.comment.as_deref(), Some("Grew on me"));
        assert_eq!(change.aggregate.average_rating, 3.5);
        assert_aggregate_consistent(&store, movie.id).await;
    }

    #[tokio::test]
    async fn test_rating_change_detected_against_latest_review_state() {
        let (usecase, store, movie) = setup().await;
        let user_id = Uuid::new_v4();
        let snapshot = review_edited_after_snapshot(&usecase, movie.id, user_id).await;
        let lagging = ReviewsUseCase::new(
            LaggingStore { inner: store.clone(), snapshot: snapshot.clone() },
            store.clone(),
        );

        // equal to the outdated copy, different from the stored rating
        let change = lagging
            .update_review(user_id, snapshot.id, rating_update(5))
            .await
            .unwrap();

        assert_eq!(change.aggregate.average_rating, 4.5);
        assert_aggregate_consistent(&store, movie.id).await;
    }

    #[tokio::test]
    async fn test_failed_recompute_rolls_back_rating_update() {
        let (usecase, store, movie) = setup().await;
        let user_id = Uuid::new_v4();
        usecase.create_review(Uuid::new_v4(), movie.id, 4, None).await.unwrap();
        let change = usecase.create_review(user_id, movie.id, 5, None).await.unwrap();
        store.fail_on(FailPoint::UpdateAggregate).await;

        let result = usecase
            .update_review(user_id, change.review.id, rating_update(1))
            .await;

        assert!(matches!(result, Err(UsecaseError::StoreUnavailable(_))));
        assert_eq!(usecase.get_review(change.review.id).await.unwrap().rating, 5);
        assert_eq!(stored_aggregate(&store, movie.id).await, change.aggregate);
    }

    #[tokio::test]
    async fn test_failed_review_write_rolls_back_update() {
        let (usecase, store, movie) = setup().await;
        let user_id = Uuid::new_v4();
        let change = usecase
            .create_review(user_id, movie.id, 2, Some("Slow".to_string()))
            .await
            .unwrap();
        store.fail_on(FailPoint::UpdateReview).await;

        let result = usecase
            .update_review(
                user_id,
                change.review.id,
                ReviewUpdate { rating: Some(4), comment: Some("Slow burn".to_string()) },
            )
            .await;

        assert!(matches!(result, Err(UsecaseError::StoreUnavailable(_))));
        let stored = usecase.get_review(change.review.id).await.unwrap();
        assert_eq!(stored.rating, 2);
        assert_eq!(stored.comment.as_deref(), Some("Slow"));
        assert_eq!(stored_aggregate(&store, movie.id).await, change.aggregate);
    }

    #[tokio::test]
    async fn test_failed_insert_leaves_no_review() {
        let (usecase, store, movie) = setup().await;
        let user_id = Uuid::new_v4();
        store.fail_on(FailPoint::CreateReview).await;

        let result = usecase.create_review(user_id, movie.id, 5, None).await;

        assert!(matches!(result, Err(UsecaseError::StoreUnavailable(_))));
        assert_eq!(store.count_by_movie(movie.id).await.unwrap(), 0);
        assert_ok!(usecase.create_review(user_id, movie.id, 5, None).await);
    }

    #[tokio::test]
    async fn test_failed_delete_keeps_review_and_aggregate() {
        let (usecase, store, movie) = setup().await;
        let user_id = Uuid::new_v4();
        let change = usecase.create_review(user_id, movie.id, 3, None).await.unwrap();
        store.fail_on(FailPoint::DeleteReview).await;

        let result = usecase.delete_review(user_id, change.review.id).await;

        assert!(matches!(result, Err(UsecaseError::StoreUnavailable(_))));
        assert_ok!(usecase.get_review(change.review.id).await);
        assert_eq!(stored_aggregate(&store, movie.id).await, change.aggregate);
    }

    #[tokio::test]
    async fn test_list_movie_reviews_rejects_page_past_offset_range() {
        let (usecase, _store, movie) = setup().await;

        let result = usecase
            .list_movie_reviews(
                movie.id,
                PageRequest::new(Some(i64::MAX), Some(MAX_REVIEWS_PAGE_SIZE)),
            )
            .await;

        let err = assert_err!(result);
        assert!(matches!(err, UsecaseError::Validation(_)));
    }

    #[tokio::test]
    async fn test_padded_comment_measured_after_trimming() {
        let (usecase, _store, movie) = setup().await;
        let comment = format!("   {}   ", "x".repeat(MAX_COMMENT_LEN));

        let change = usecase
            .create_review(Uuid::new_v4(), movie.id, 4, Some(comment))
            .await
            .unwrap();

        assert_eq!(change.review.comment.map(|c| c.chars().count()), Some(MAX_COMMENT_LEN));
    }
}
