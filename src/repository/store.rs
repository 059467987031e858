use uuid::Uuid;

use crate::{
    domain::movie::{Movie, MovieFilter},
    domain::rating::RatingAggregate,
    domain::review::Review,
    repository::errors::RepositoryError,
    repository::memory::{InMemoryStore, InMemoryTransaction},
    repository::postgres::{PostgresMovieRepository, PostgresReviewStore, PostgresReviewTransaction},
    usecase::contracts::{MovieRepository, ReviewStore, ReviewTransaction},
};

/// Movie storage selected at startup.
pub enum AppMovieRepository {
    Postgres(PostgresMovieRepository),
    Memory(InMemoryStore),
}

/// Review storage selected at startup.
pub enum AppReviewStore {
    Postgres(PostgresReviewStore),
    Memory(InMemoryStore),
}

pub enum AppReviewTransaction {
    Postgres(PostgresReviewTransaction),
    Memory(InMemoryTransaction),
}

macro_rules! dispatch {
    ($value:expr, $inner:ident => $call:expr) => {
        match $value {
            Self::Postgres($inner) => $call,
            Self::Memory($inner) => $call,
        }
    };
}

impl MovieRepository for AppMovieRepository {
    async fn create(&self, movie: &Movie) -> Result<(), RepositoryError> {
        dispatch!(self, repo => repo.create(movie).await)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Movie>, RepositoryError> {
        dispatch!(self, repo => MovieRepository::find_by_id(repo, id).await)
    }

    async fn list(
        &self,
        filter: &MovieFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Movie>, RepositoryError> {
        dispatch!(self, repo => repo.list(filter, limit, offset).await)
    }

    async fn count(&self, filter: &MovieFilter) -> Result<i64, RepositoryError> {
        dispatch!(self, repo => repo.count(filter).await)
    }

    async fn update_details(&self, movie: &Movie) -> Result<(), RepositoryError> {
        dispatch!(self, repo => repo.update_details(movie).await)
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepositoryError> {
        dispatch!(self, repo => repo.delete(id).await)
    }
}

impl ReviewStore for AppReviewStore {
    type Tx = AppReviewTransaction;

    async fn begin(&self) -> Result<AppReviewTransaction, RepositoryError> {
        match self {
            Self::Postgres(store) => store.begin().await.map(AppReviewTransaction::Postgres),
            Self::Memory(store) => store.begin().await.map(AppReviewTransaction::Memory),
        }
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Review>, RepositoryError> {
        dispatch!(self, store => ReviewStore::find_by_id(store, id).await)
    }

    async fn list_by_movie(
        &self,
        movie_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Review>, RepositoryError> {
        dispatch!(self, store => store.list_by_movie(movie_id, limit, offset).await)
    }

    async fn count_by_movie(&self, movie_id: Uuid) -> Result<i64, RepositoryError> {
        dispatch!(self, store => store.count_by_movie(movie_id).await)
    }

    async fn list_by_user(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Review>, RepositoryError> {
        dispatch!(self, store => store.list_by_user(user_id, limit, offset).await)
    }

    async fn count_by_user(&self, user_id: Uuid) -> Result<i64, RepositoryError> {
        dispatch!(self, store => store.count_by_user(user_id).await)
    }
}

impl ReviewTransaction for AppReviewTransaction {
    async fn lock_movie(&mut self, movie_id: Uuid) -> Result<Option<Movie>, RepositoryError> {
        dispatch!(self, tx => tx.lock_movie(movie_id).await)
    }

    async fn find_review(&mut self, id: Uuid) -> Result<Option<Review>, RepositoryError> {
        dispatch!(self, tx => tx.find_review(id).await)
    }

    async fn lock_review(&mut self, id: Uuid) -> Result<Option<Review>, RepositoryError> {
        dispatch!(self, tx => tx.lock_review(id).await)
    }

    async fn find_by_user_and_movie(
        &mut self,
        user_id: Uuid,
        movie_id: Uuid,
    ) -> Result<Option<Review>, RepositoryError> {
        dispatch!(self, tx => tx.find_by_user_and_movie(user_id, movie_id).await)
    }

    async fn list_ratings(&mut self, movie_id: Uuid) -> Result<Vec<i16>, RepositoryError> {
        dispatch!(self, tx => tx.list_ratings(movie_id).await)
    }

    async fn create_review(&mut self, review: &Review) -> Result<(), RepositoryError> {
        dispatch!(self, tx => tx.create_review(review).await)
    }

    async fn update_review(&mut self, review: &Review) -> Result<(), RepositoryError> {
        dispatch!(self, tx => tx.update_review(review).await)
    }

    async fn delete_review(&mut self, id: Uuid) -> Result<(), RepositoryError> {
        dispatch!(self, tx => tx.delete_review(id).await)
    }

    async fn update_aggregate(
        &mut self,
        movie_id: Uuid,
        aggregate: RatingAggregate,
    ) -> Result<(), RepositoryError> {
        dispatch!(self, tx => tx.update_aggregate(movie_id, aggregate).await)
    }

    async fn commit(self) -> Result<(), RepositoryError> {
        dispatch!(self, tx => tx.commit().await)
    }

    async fn rollback(self) -> Result<(), RepositoryError> {
        dispatch!(self, tx => tx.rollback().await)
    }
}
