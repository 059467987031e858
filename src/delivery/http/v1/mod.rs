pub mod middleware;
pub mod movies;
pub mod reviews;
