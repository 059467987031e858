use uuid::Uuid;

use crate::domain::movie::{Movie, MovieFilter, MoviePatch, NewMovie};
use crate::domain::page::{Page, PageRequest};
use crate::repository::errors::RepositoryError;
use crate::usecase::contracts::MovieRepository;
use crate::usecase::error::UsecaseError;

pub const MAX_MOVIES_PAGE_SIZE: i64 = 100;

pub struct MoviesUseCase<M>
where
    M: MovieRepository,
{
    movie_repository: M,
}

fn not_found(e: RepositoryError) -> UsecaseError {
    match e {
        RepositoryError::NotFound => UsecaseError::NotFound("Movie".to_string()),
        other => other.into(),
    }
}

impl<M> MoviesUseCase<M>
where
    M: MovieRepository,
{
    pub fn new(movie_repository: M) -> Self {
        Self { movie_repository }
    }

    #[tracing::instrument(skip(self, new_movie), fields(title = %new_movie.title))]
    pub async fn create_movie(&self, new_movie: NewMovie) -> Result<Movie, UsecaseError> {
        tracing::debug!("creating movie");

        let movie = Movie::new(new_movie);
        movie.validate().map_err(UsecaseError::Validation)?;

        self.movie_repository.create(&movie).await?;

        tracing::info!(movie_id = %movie.id, "movie created successfully");
        Ok(movie)
    }

    #[tracing::instrument(skip(self), fields(movie_id = %movie_id))]
    pub async fn get_movie(&self, movie_id: Uuid) -> Result<Movie, UsecaseError> {
        tracing::debug!("getting movie");

        self.movie_repository
            .find_by_id(movie_id)
            .await?
            .ok_or_else(|| UsecaseError::NotFound("Movie".to_string()))
    }

    #[tracing::instrument(skip(self), fields(page = request.page, limit = request.limit))]
    pub async fn list_movies(
        &self,
        filter: MovieFilter,
        request: PageRequest,
    ) -> Result<Page<Movie>, UsecaseError> {
        tracing::debug!(?filter, "listing movies");

        request
            .validate(MAX_MOVIES_PAGE_SIZE)
            .map_err(UsecaseError::Validation)?;

        let out_of_range = |r: f64| !(0.0..=5.0).contains(&r);
        if filter.min_rating.is_some_and(out_of_range)
            || filter.max_rating.is_some_and(out_of_range)
        {
            return Err(UsecaseError::Validation(
                "Rating filters must be between 0 and 5".to_string(),
            ));
        }

        let total = self.movie_repository.count(&filter).await?;
        let movies = self
            .movie_repository
            .list(&filter, request.limit, request.offset())
            .await?;

        tracing::debug!(count = movies.len(), total, "movies listed");
        Ok(Page::new(movies, request, total))
    }

    #[tracing::instrument(skip(self, patch), fields(movie_id = %movie_id))]
    pub async fn update_movie(
        &self,
        movie_id: Uuid,
        patch: MoviePatch,
    ) -> Result<Movie, UsecaseError> {
        tracing::debug!("updating movie");

        let mut movie = self.get_movie(movie_id).await?;
        movie.apply(patch);
        movie.validate().map_err(UsecaseError::Validation)?;

        self.movie_repository
            .update_details(&movie)
            .await
            .map_err(not_found)?;

        tracing::info!(movie_id = %movie_id, "movie updated successfully");
        Ok(movie)
    }

    #[tracing::instrument(skip(self), fields(movie_id = %movie_id))]
    pub async fn delete_movie(&self, movie_id: Uuid) -> Result<(), UsecaseError> {
        tracing::debug!("deleting movie");

        self.movie_repository
            .delete(movie_id)
            .await
            .map_err(not_found)?;

        tracing::info!(movie_id = %movie_id, "movie deleted successfully");
        Ok(())
    }
}
