use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::rating::RatingAggregate;

pub const MAX_TITLE_LEN: usize = 200;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Movie {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub genre: String,
    pub release_date: NaiveDate,
    pub director: Option<String>,
    pub duration_minutes: Option<i32>,
    pub average_rating: f64,
    pub total_reviews: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Client-supplied fields of a new movie. Aggregate fields are not part of it.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMovie {
    pub title: String,
    pub description: Option<String>,
    pub genre: String,
    pub release_date: NaiveDate,
    pub director: Option<String>,
    pub duration_minutes: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MoviePatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub genre: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub director: Option<String>,
    pub duration_minutes: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MovieFilter {
    pub genre: Option<String>,
    pub release_year: Option<i32>,
    pub min_rating: Option<f64>,
    pub max_rating: Option<f64>,
    pub search: Option<String>,
}

fn trimmed(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl Movie {
    pub fn new(new_movie: NewMovie) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: new_movie.title.trim().to_string(),
            description: trimmed(new_movie.description),
            genre: new_movie.genre.trim().to_string(),
            release_date: new_movie.release_date,
            director: trimmed(new_movie.director),
            duration_minutes: new_movie.duration_minutes,
            average_rating: 0.0,
            total_reviews: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies client-editable fields. An empty description or director clears it.
    pub fn apply(&mut self, patch: MoviePatch) {
        if let Some(title) = patch.title {
            self.title = title.trim().to_string();
        }
        if patch.description.is_some() {
            self.description = trimmed(patch.description);
        }
        if let Some(genre) = patch.genre {
            self.genre = genre.trim().to_string();
        }
        if let Some(release_date) = patch.release_date {
            self.release_date = release_date;
        }
        if patch.director.is_some() {
            self.director = trimmed(patch.director);
        }
        if let Some(duration) = patch.duration_minutes {
            self.duration_minutes = Some(duration);
        }
        self.updated_at = Utc::now();
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.title.is_empty() {
            return Err("title must not be empty".to_string());
        }
        if self.title.chars().count() > MAX_TITLE_LEN {
            return Err(format!("title must be at most {} characters", MAX_TITLE_LEN));
        }
        if self.genre.is_empty() {
            return Err("genre must not be empty".to_string());
        }
        if self.duration_minutes.is_some_and(|d| d < 1) {
            return Err("duration must be at least 1 minute".to_string());
        }
        Ok(())
    }

    pub fn aggregate(&self) -> RatingAggregate {
        RatingAggregate {
            average_rating: self.average_rating,
            total_reviews: self.total_reviews,
        }
    }

    pub fn set_aggregate(&mut self, aggregate: RatingAggregate) {
        self.average_rating = aggregate.average_rating;
        self.total_reviews = aggregate.total_reviews;
    }
}

impl MovieFilter {
    pub fn matches(&self, movie: &Movie) -> bool {
        fn contains(haystack: &str, needle: &str) -> bool {
            haystack.to_lowercase().contains(&needle.to_lowercase())
        }

        if let Some(genre) = &self.genre {
            if !contains(&movie.genre, genre) {
                return false;
            }
        }
        if let Some(year) = self.release_year {
            if movie.release_date.year() != year {
                return false;
            }
        }
        if self.min_rating.is_some_and(|min| movie.average_rating < min) {
            return false;
        }
        if self.max_rating.is_some_and(|max| movie.average_rating > max) {
            return false;
        }
        if let Some(search) = &self.search {
            let hit = contains(&movie.title, search)
                || movie.description.as_deref().is_some_and(|d| contains(d, search))
                || movie.director.as_deref().is_some_and(|d| contains(d, search));
            if !hit {
                return false;
            }
        }
        true
    }
}
