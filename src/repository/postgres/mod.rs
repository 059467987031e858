use std::time::Duration;

use sqlx::{PgPool, Postgres, Transaction, postgres::PgPoolOptions};
use uuid::Uuid;

use crate::{
    domain::movie::{Movie, MovieFilter},
    domain::rating::RatingAggregate,
    domain::review::Review,
    repository::errors::RepositoryError,
    usecase::contracts::{MovieRepository, ReviewStore, ReviewTransaction},
};

const MOVIE_COLUMNS: &str = r#"
    id, title, description, genre, release_date, director, duration_minutes,
    average_rating::float8 AS average_rating, total_reviews, created_at, updated_at
"#;

const MOVIE_FILTER: &str = r#"
    ($1::text IS NULL OR genre ILIKE '%' || $1 || '%')
    AND ($2::int4 IS NULL OR EXTRACT(YEAR FROM release_date)::int4 = $2)
    AND ($3::float8 IS NULL OR average_rating >= $3)
    AND ($4::float8 IS NULL OR average_rating <= $4)
    AND ($5::text IS NULL
         OR title ILIKE '%' || $5 || '%'
         OR description ILIKE '%' || $5 || '%'
         OR director ILIKE '%' || $5 || '%')
"#;

const REVIEW_COLUMNS: &str = "id, movie_id, user_id, rating, comment, created_at, updated_at";

pub struct PostgresMovieRepository {
    pool: PgPool,
}

impl PostgresMovieRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl MovieRepository for PostgresMovieRepository {
    #[tracing::instrument(skip(self, movie), fields(movie_id = %movie.id, title = %movie.title))]
    async fn create(&self, movie: &Movie) -> Result<(), RepositoryError> {
        tracing::debug!("creating movie");

        sqlx::query(
            r#"
            INSERT INTO movies
                (id, title, description, genre, release_date, director, duration_minutes,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(movie.id)
        .bind(&movie.title)
        .bind(&movie.description)
        .bind(&movie.genre)
        .bind(movie.release_date)
        .bind(&movie.director)
        .bind(movie.duration_minutes)
        .bind(movie.created_at)
        .bind(movie.updated_at)
        .execute(&self.pool)
        .await?;

        tracing::debug!(movie_id = %movie.id, "movie created successfully");
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(movie_id = %id))]
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Movie>, RepositoryError> {
        tracing::debug!("finding movie by id");

        let query = format!("SELECT {MOVIE_COLUMNS} FROM movies WHERE id = $1");
        let movie = sqlx::query_as::<_, Movie>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(movie)
    }

    #[tracing::instrument(skip(self), fields(?filter, %limit, %offset))]
    async fn list(
        &self,
        filter: &MovieFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Movie>, RepositoryError> {
        tracing::debug!("listing movies");

        let query = format!(
            r#"
            SELECT {MOVIE_COLUMNS}
            FROM movies
            WHERE {MOVIE_FILTER}
            ORDER BY average_rating DESC, title ASC
            LIMIT $6 OFFSET $7
            "#
        );

        let movies = sqlx::query_as::<_, Movie>(&query)
            .bind(filter.genre.as_deref())
            .bind(filter.release_year)
            .bind(filter.min_rating)
            .bind(filter.max_rating)
            .bind(filter.search.as_deref())
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        tracing::debug!(count = movies.len(), "listed movies");
        Ok(movies)
    }

    #[tracing::instrument(skip(self), fields(?filter))]
    async fn count(&self, filter: &MovieFilter) -> Result<i64, RepositoryError> {
        tracing::debug!("counting movies");

        let query = format!("SELECT COUNT(*) FROM movies WHERE {MOVIE_FILTER}");
        let count: (i64,) = sqlx::query_as(&query)
            .bind(filter.genre.as_deref())
            .bind(filter.release_year)
            .bind(filter.min_rating)
            .bind(filter.max_rating)
            .bind(filter.search.as_deref())
            .fetch_one(&self.pool)
            .await?;

        tracing::debug!(count = count.0, "counted movies");
        Ok(count.0)
    }

    #[tracing::instrument(skip(self, movie), fields(movie_id = %movie.id))]
    async fn update_details(&self, movie: &Movie) -> Result<(), RepositoryError> {
        tracing::debug!("updating movie details");

        let result = sqlx::query(
            r#"
            UPDATE movies
            SET title = $2, description = $3, genre = $4, release_date = $5,
                director = $6, duration_minutes = $7, updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(movie.id)
        .bind(&movie.title)
        .bind(&movie.description)
        .bind(&movie.genre)
        .bind(movie.release_date)
        .bind(&movie.director)
        .bind(movie.duration_minutes)
        .bind(movie.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        tracing::debug!(movie_id = %movie.id, "movie updated successfully");
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(movie_id = %id))]
    async fn delete(&self, id: Uuid) -> Result<(), RepositoryError> {
        tracing::debug!("deleting movie");

        // reviews go with it through ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM movies WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        tracing::debug!(movie_id = %id, "movie deleted successfully");
        Ok(())
    }
}

pub struct PostgresReviewStore {
    pool: PgPool,
}

impl PostgresReviewStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl ReviewStore for PostgresReviewStore {
    type Tx = PostgresReviewTransaction;

    #[tracing::instrument(skip(self))]
    async fn begin(&self) -> Result<PostgresReviewTransaction, RepositoryError> {
        let tx = self.pool.begin().await?;
        Ok(PostgresReviewTransaction { tx })
    }

    #[tracing::instrument(skip(self), fields(review_id = %id))]
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Review>, RepositoryError> {
        tracing::debug!("finding review by id");

        let query = format!("SELECT {REVIEW_COLUMNS} FROM reviews WHERE id = $1");
        let review = sqlx::query_as::<_, Review>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(review)
    }

    #[tracing::instrument(skip(self), fields(movie_id = %movie_id, %limit, %offset))]
    async fn list_by_movie(
        &self,
        movie_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Review>, RepositoryError> {
        tracing::debug!("listing reviews by movie");

        let query = format!(
            r#"
            SELECT {REVIEW_COLUMNS}
            FROM reviews
            WHERE movie_id = $1
            ORDER BY created_at DESC, id ASC
            LIMIT $2 OFFSET $3
            "#
        );
        let reviews = sqlx::query_as::<_, Review>(&query)
            .bind(movie_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        tracing::debug!(movie_id = %movie_id, count = reviews.len(), "found reviews");
        Ok(reviews)
    }

    #[tracing::instrument(skip(self), fields(movie_id = %movie_id))]
    async fn count_by_movie(&self, movie_id: Uuid) -> Result<i64, RepositoryError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM reviews WHERE movie_id = $1")
            .bind(movie_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count.0)
    }

    #[tracing::instrument(skip(self), fields(user_id = %user_id, %limit, %offset))]
    async fn list_by_user(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Review>, RepositoryError> {
        tracing::debug!("listing reviews by user");

        let query = format!(
            r#"
            SELECT {REVIEW_COLUMNS}
            FROM reviews
            WHERE user_id = $1
            ORDER BY created_at DESC, id ASC
            LIMIT $2 OFFSET $3
            "#
        );
        let reviews = sqlx::query_as::<_, Review>(&query)
            .bind(user_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        tracing::debug!(user_id = %user_id, count = reviews.len(), "found reviews");
        Ok(reviews)
    }

    #[tracing::instrument(skip(self), fields(user_id = %user_id))]
    async fn count_by_user(&self, user_id: Uuid) -> Result<i64, RepositoryError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM reviews WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count.0)
    }
}

/// Wraps a sqlx transaction; sqlx rolls it back when dropped uncommitted.
pub struct PostgresReviewTransaction {
    tx: Transaction<'static, Postgres>,
}

impl ReviewTransaction for PostgresReviewTransaction {
    #[tracing::instrument(skip(self), fields(movie_id = %movie_id))]
    async fn lock_movie(&mut self, movie_id: Uuid) -> Result<Option<Movie>, RepositoryError> {
        tracing::debug!("locking movie row");

        let query = format!("SELECT {MOVIE_COLUMNS} FROM movies WHERE id = $1 FOR UPDATE");
        let movie = sqlx::query_as::<_, Movie>(&query)
            .bind(movie_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(movie)
    }

    #[tracing::instrument(skip(self), fields(review_id = %id))]
    async fn find_review(&mut self, id: Uuid) -> Result<Option<Review>, RepositoryError> {
        let query = format!("SELECT {REVIEW_COLUMNS} FROM reviews WHERE id = $1");
        let review = sqlx::query_as::<_, Review>(&query)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(review)
    }

    #[tracing::instrument(skip(self), fields(review_id = %id))]
    async fn lock_review(&mut self, id: Uuid) -> Result<Option<Review>, RepositoryError> {
        tracing::debug!("locking review row");

        let query = format!("SELECT {REVIEW_COLUMNS} FROM reviews WHERE id = $1 FOR UPDATE");
        let review = sqlx::query_as::<_, Review>(&query)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(review)
    }

    #[tracing::instrument(skip(self), fields(user_id = %user_id, movie_id = %movie_id))]
    async fn find_by_user_and_movie(
        &mut self,
        user_id: Uuid,
        movie_id: Uuid,
    ) -> Result<Option<Review>, RepositoryError> {
        tracing::debug!("finding review by user and movie");

        let query =
            format!("SELECT {REVIEW_COLUMNS} FROM reviews WHERE user_id = $1 AND movie_id = $2");
        let review = sqlx::query_as::<_, Review>(&query)
            .bind(user_id)
            .bind(movie_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(review)
    }

    #[tracing::instrument(skip(self), fields(movie_id = %movie_id))]
    async fn list_ratings(&mut self, movie_id: Uuid) -> Result<Vec<i16>, RepositoryError> {
        let ratings: Vec<(i16,)> = sqlx::query_as("SELECT rating FROM reviews WHERE movie_id = $1")
            .bind(movie_id)
            .fetch_all(&mut *self.tx)
            .await?;

        Ok(ratings.into_iter().map(|(r,)| r).collect())
    }

    #[tracing::instrument(
        skip(self, review),
        fields(review_id = %review.id, movie_id = %review.movie_id, user_id = %review.user_id)
    )]
    async fn create_review(&mut self, review: &Review) -> Result<(), RepositoryError> {
        tracing::debug!("inserting review");

        sqlx::query(
            r#"
            INSERT INTO reviews (id, movie_id, user_id, rating, comment, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(review.id)
        .bind(review.movie_id)
        .bind(review.user_id)
        .bind(review.rating)
        .bind(&review.comment)
        .bind(review.created_at)
        .bind(review.updated_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self, review), fields(review_id = %review.id))]
    async fn update_review(&mut self, review: &Review) -> Result<(), RepositoryError> {
        tracing::debug!("updating review");

        let result = sqlx::query(
            r#"
            UPDATE reviews
            SET rating = $2, comment = $3, updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(review.id)
        .bind(review.rating)
        .bind(&review.comment)
        .bind(review.updated_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(review_id = %id))]
    async fn delete_review(&mut self, id: Uuid) -> Result<(), RepositoryError> {
        tracing::debug!("deleting review");

        let result = sqlx::query("DELETE FROM reviews WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    #[tracing::instrument(
        skip(self),
        fields(
            movie_id = %movie_id,
            average = aggregate.average_rating,
            total = aggregate.total_reviews
        )
    )]
    async fn update_aggregate(
        &mut self,
        movie_id: Uuid,
        aggregate: RatingAggregate,
    ) -> Result<(), RepositoryError> {
        tracing::debug!("writing rating aggregate");

        let result = sqlx::query(
            r#"
            UPDATE movies
            SET average_rating = ROUND($2::numeric, 2), total_reviews = $3
            WHERE id = $1
            "#,
        )
        .bind(movie_id)
        .bind(aggregate.average_rating)
        .bind(aggregate.total_reviews)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn commit(self) -> Result<(), RepositoryError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<(), RepositoryError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

pub async fn create_pool(
    database_url: &str,
    max_connections: u32,
    acquire_timeout: Duration,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(acquire_timeout)
        .connect(database_url)
        .await
}
