use uuid::Uuid;

use crate::{
    domain::movie::{Movie, MovieFilter},
    domain::rating::RatingAggregate,
    domain::review::Review,
    repository::errors::RepositoryError,
};

#[cfg_attr(test, mockall::automock)]
pub trait MovieRepository: Send + Sync {
    async fn create(&self, movie: &Movie) -> Result<(), RepositoryError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Movie>, RepositoryError>;
    async fn list(
        &self,
        filter: &MovieFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Movie>, RepositoryError>;
    async fn count(&self, filter: &MovieFilter) -> Result<i64, RepositoryError>;
    /// Persists client-editable fields only; aggregate fields are left untouched.
    async fn update_details(&self, movie: &Movie) -> Result<(), RepositoryError>;
    /// Deletes the movie together with its reviews.
    async fn delete(&self, id: Uuid) -> Result<(), RepositoryError>;
}

/// Review persistence. Every mutation goes through a [`ReviewTransaction`].
pub trait ReviewStore: Send + Sync {
    type Tx: ReviewTransaction;

    async fn begin(&self) -> Result<Self::Tx, RepositoryError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Review>, RepositoryError>;
    async fn list_by_movie(
        &self,
        movie_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Review>, RepositoryError>;
    async fn count_by_movie(&self, movie_id: Uuid) -> Result<i64, RepositoryError>;
    async fn list_by_user(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Review>, RepositoryError>;
    async fn count_by_user(&self, user_id: Uuid) -> Result<i64, RepositoryError>;
}

/// A unit of work over reviews and movie aggregates. Writes become visible on
/// `commit`; dropping the transaction without committing discards them.
pub trait ReviewTransaction: Send {
    /// Loads the movie and holds it against concurrent review mutations until
    /// the transaction ends.
    async fn lock_movie(&mut self, movie_id: Uuid) -> Result<Option<Movie>, RepositoryError>;
    async fn find_review(&mut self, id: Uuid) -> Result<Option<Review>, RepositoryError>;
    /// Reads a review and holds its row until the transaction ends. Taken
    /// after `lock_movie`, so the movie lock always comes first.
    async fn lock_review(&mut self, id: Uuid) -> Result<Option<Review>, RepositoryError>;
    async fn find_by_user_and_movie(
        &mut self,
        user_id: Uuid,
        movie_id: Uuid,
    ) -> Result<Option<Review>, RepositoryError>;
    async fn list_ratings(&mut self, movie_id: Uuid) -> Result<Vec<i16>, RepositoryError>;
    async fn create_review(&mut self, review: &Review) -> Result<(), RepositoryError>;
    async fn update_review(&mut self, review: &Review) -> Result<(), RepositoryError>;
    async fn delete_review(&mut self, id: Uuid) -> Result<(), RepositoryError>;
    async fn update_aggregate(
        &mut self,
        movie_id: Uuid,
        aggregate: RatingAggregate,
    ) -> Result<(), RepositoryError>;
    async fn commit(self) -> Result<(), RepositoryError>;
    async fn rollback(self) -> Result<(), RepositoryError>;
}
