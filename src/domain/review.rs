use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MAX_COMMENT_LEN: usize = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Review {
    pub id: Uuid,
    pub movie_id: Uuid,
    pub user_id: Uuid,
    pub rating: i16,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Review {
    pub fn new(movie_id: Uuid, user_id: Uuid, rating: i16, comment: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            movie_id,
            user_id,
            rating,
            comment,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.user_id == user_id
    }

    /// Applies `patch` and reports whether the rating value changed.
    pub fn apply(&mut self, patch: ReviewPatch) -> bool {
        let mut rating_changed = false;
        if let Some(rating) = patch.rating {
            rating_changed = rating != self.rating;
            self.rating = rating;
        }
        if let Some(comment) = patch.comment {
            self.comment = comment;
        }
        self.updated_at = Utc::now();
        rating_changed
    }
}

/// Partial update of a review. `comment: Some(None)` clears the comment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReviewPatch {
    pub rating: Option<i16>,
    pub comment: Option<Option<String>>,
}

/// Trims a comment and drops it when nothing is left.
pub fn normalize_comment(comment: Option<String>) -> Option<String> {
    comment
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
}

pub fn is_valid_comment(comment: Option<&str>) -> bool {
    comment.is_none_or(|c| c.chars().count() <= MAX_COMMENT_LEN)
}
