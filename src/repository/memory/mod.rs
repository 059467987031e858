use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::{
    domain::movie::{Movie, MovieFilter},
    domain::rating::RatingAggregate,
    domain::review::Review,
    repository::errors::RepositoryError,
    usecase::contracts::{MovieRepository, ReviewStore, ReviewTransaction},
};

/// Store operations that can be made to fail once, for exercising rollback paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    Begin,
    CreateReview,
    UpdateReview,
    DeleteReview,
    UpdateAggregate,
    Commit,
}

#[derive(Debug, Clone, Default)]
struct Data {
    movies: HashMap<Uuid, Movie>,
    reviews: HashMap<Uuid, Review>,
}

#[derive(Debug, Default)]
struct Inner {
    data: Data,
    faults: HashSet<FailPoint>,
}

impl Inner {
    fn trip(&mut self, point: FailPoint) -> Result<(), RepositoryError> {
        if self.faults.remove(&point) {
            tracing::warn!(?point, "injected store fault");
            return Err(RepositoryError::Unavailable(format!("injected fault at {:?}", point)));
        }
        Ok(())
    }
}

/// Process-local store. A transaction holds the store lock for its whole
/// lifetime and works on a private copy that replaces the shared state on
/// commit, so transactions are serialized and all-or-nothing.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next call reaching `point` fail with `Unavailable`.
    #[cfg_attr(not(test), allow(dead_code))]
    pub async fn fail_on(&self, point: FailPoint) {
        self.inner.lock().await.faults.insert(point);
    }
}

fn newest_first(a: &Review, b: &Review) -> Ordering {
    b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id))
}

fn page<T>(items: Vec<T>, limit: i64, offset: i64) -> Vec<T> {
    items
        .into_iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .collect()
}

impl MovieRepository for InMemoryStore {
    #[tracing::instrument(skip(self, movie), fields(movie_id = %movie.id))]
    async fn create(&self, movie: &Movie) -> Result<(), RepositoryError> {
        let mut inner = self.inner.lock().await;
        if inner.data.movies.contains_key(&movie.id) {
            return Err(RepositoryError::Conflict(format!("movie {} already exists", movie.id)));
        }
        inner.data.movies.insert(movie.id, movie.clone());
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(movie_id = %id))]
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Movie>, RepositoryError> {
        Ok(self.inner.lock().await.data.movies.get(&id).cloned())
    }

    #[tracing::instrument(skip(self))]
    async fn list(
        &self,
        filter: &MovieFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Movie>, RepositoryError> {
        let inner = self.inner.lock().await;
        let mut movies: Vec<Movie> = inner
            .data
            .movies
            .values()
            .filter(|m| filter.matches(m))
            .cloned()
            .collect();
        movies.sort_by(|a, b| {
            b.average_rating
                .total_cmp(&a.average_rating)
                .then_with(|| a.title.cmp(&b.title))
        });
        Ok(page(movies, limit, offset))
    }

    #[tracing::instrument(skip(self))]
    async fn count(&self, filter: &MovieFilter) -> Result<i64, RepositoryError> {
        let inner = self.inner.lock().await;
        Ok(inner.data.movies.values().filter(|m| filter.matches(m)).count() as i64)
    }

    #[tracing::instrument(skip(self, movie), fields(movie_id = %movie.id))]
    async fn update_details(&self, movie: &Movie) -> Result<(), RepositoryError> {
        let mut inner = self.inner.lock().await;
        let stored = inner
            .data
            .movies
            .get_mut(&movie.id)
            .ok_or(RepositoryError::NotFound)?;

        let aggregate = stored.aggregate();
        *stored = movie.clone();
        stored.set_aggregate(aggregate);
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(movie_id = %id))]
    async fn delete(&self, id: Uuid) -> Result<(), RepositoryError> {
        let mut inner = self.inner.lock().await;
        if inner.data.movies.remove(&id).is_none() {
            return Err(RepositoryError::NotFound);
        }
        inner.data.reviews.retain(|_, r| r.movie_id != id);
        Ok(())
    }
}

impl ReviewStore for InMemoryStore {
    type Tx = InMemoryTransaction;

    #[tracing::instrument(skip(self))]
    async fn begin(&self) -> Result<InMemoryTransaction, RepositoryError> {
        let mut guard = self.inner.clone().lock_owned().await;
        guard.trip(FailPoint::Begin)?;
        let staged = guard.data.clone();
        Ok(InMemoryTransaction { guard, staged })
    }

    #[tracing::instrument(skip(self), fields(review_id = %id))]
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Review>, RepositoryError> {
        Ok(self.inner.lock().await.data.reviews.get(&id).cloned())
    }

    #[tracing::instrument(skip(self), fields(movie_id = %movie_id))]
    async fn list_by_movie(
        &self,
        movie_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Review>, RepositoryError> {
        let inner = self.inner.lock().await;
        let mut reviews: Vec<Review> = inner
            .data
            .reviews
            .values()
            .filter(|r| r.movie_id == movie_id)
            .cloned()
            .collect();
        reviews.sort_by(newest_first);
        Ok(page(reviews, limit, offset))
    }

    #[tracing::instrument(skip(self), fields(movie_id = %movie_id))]
    async fn count_by_movie(&self, movie_id: Uuid) -> Result<i64, RepositoryError> {
        let inner = self.inner.lock().await;
        Ok(inner.data.reviews.values().filter(|r| r.movie_id == movie_id).count() as i64)
    }

    #[tracing::instrument(skip(self), fields(user_id = %user_id))]
    async fn list_by_user(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Review>, RepositoryError> {
        let inner = self.inner.lock().await;
        let mut reviews: Vec<Review> = inner
            .data
            .reviews
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        reviews.sort_by(newest_first);
        Ok(page(reviews, limit, offset))
    }

    #[tracing::instrument(skip(self), fields(user_id = %user_id))]
    async fn count_by_user(&self, user_id: Uuid) -> Result<i64, RepositoryError> {
        let inner = self.inner.lock().await;
        Ok(inner.data.reviews.values().filter(|r| r.user_id == user_id).count() as i64)
    }
}

pub struct InMemoryTransaction {
    guard: OwnedMutexGuard<Inner>,
    staged: Data,
}

impl ReviewTransaction for InMemoryTransaction {
    async fn lock_movie(&mut self, movie_id: Uuid) -> Result<Option<Movie>, RepositoryError> {
        // the whole store is already held by this transaction
        Ok(self.staged.movies.get(&movie_id).cloned())
    }

    async fn find_review(&mut self, id: Uuid) -> Result<Option<Review>, RepositoryError> {
        Ok(self.staged.reviews.get(&id).cloned())
    }

    async fn lock_review(&mut self, id: Uuid) -> Result<Option<Review>, RepositoryError> {
        Ok(self.staged.reviews.get(&id).cloned())
    }

    async fn find_by_user_and_movie(
        &mut self,
        user_id: Uuid,
        movie_id: Uuid,
    ) -> Result<Option<Review>, RepositoryError> {
        Ok(self
            .staged
            .reviews
            .values()
            .find(|r| r.user_id == user_id && r.movie_id == movie_id)
            .cloned())
    }

    async fn list_ratings(&mut self, movie_id: Uuid) -> Result<Vec<i16>, RepositoryError> {
        Ok(self
            .staged
            .reviews
            .values()
            .filter(|r| r.movie_id == movie_id)
            .map(|r| r.rating)
            .collect())
    }

    async fn create_review(&mut self, review: &Review) -> Result<(), RepositoryError> {
        self.guard.trip(FailPoint::CreateReview)?;

        if !self.staged.movies.contains_key(&review.movie_id) {
            return Err(RepositoryError::DatabaseError(format!(
                "movie {} does not exist",
                review.movie_id
            )));
        }
        let duplicate = self
            .staged
            .reviews
            .values()
            .any(|r| r.user_id == review.user_id && r.movie_id == review.movie_id);
        if duplicate || self.staged.reviews.contains_key(&review.id) {
            return Err(RepositoryError::Conflict(format!(
                "review for user {} and movie {} already exists",
                review.user_id, review.movie_id
            )));
        }

        self.staged.reviews.insert(review.id, review.clone());
        Ok(())
    }

    async fn update_review(&mut self, review: &Review) -> Result<(), RepositoryError> {
        self.guard.trip(FailPoint::UpdateReview)?;

        let stored = self
            .staged
            .reviews
            .get_mut(&review.id)
            .ok_or(RepositoryError::NotFound)?;
        stored.rating = review.rating;
        stored.comment = review.comment.clone();
        stored.updated_at = review.updated_at;
        Ok(())
    }

    async fn delete_review(&mut self, id: Uuid) -> Result<(), RepositoryError> {
        self.guard.trip(FailPoint::DeleteReview)?;

        self.staged
            .reviews
            .remove(&id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    async fn update_aggregate(
        &mut self,
        movie_id: Uuid,
        aggregate: RatingAggregate,
    ) -> Result<(), RepositoryError> {
        self.guard.trip(FailPoint::UpdateAggregate)?;

        let movie = self
            .staged
            .movies
            .get_mut(&movie_id)
            .ok_or(RepositoryError::NotFound)?;
        movie.set_aggregate(aggregate);
        Ok(())
    }

    async fn commit(mut self) -> Result<(), RepositoryError> {
        self.guard.trip(FailPoint::Commit)?;
        self.guard.data = self.staged;
        Ok(())
    }

    async fn rollback(self) -> Result<(), RepositoryError> {
        Ok(())
    }
}
