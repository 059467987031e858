use serde::Serialize;

pub const MIN_RATING: i16 = 1;
pub const MAX_RATING: i16 = 5;

/// Derived rating statistics stored on a movie.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct RatingAggregate {
    pub average_rating: f64,
    pub total_reviews: i64,
}

impl RatingAggregate {
    /// Computes count and mean of `ratings`, the mean rounded half-up to two
    /// decimal places. An empty slice yields `0` / `0`.
    pub fn from_ratings(ratings: &[i16]) -> Self {
        let total = ratings.len() as i64;
        if total == 0 {
            return Self::default();
        }

        let sum: i64 = ratings.iter().map(|&r| i64::from(r)).sum();
        // floor(sum * 100 / total + 1/2) without leaving integer arithmetic
        let hundredths = (2 * sum * 100 + total) / (2 * total);

        Self {
            average_rating: hundredths as f64 / 100.0,
            total_reviews: total,
        }
    }
}

pub fn is_valid_rating(rating: i16) -> bool {
    (MIN_RATING..=MAX_RATING).contains(&rating)
}
