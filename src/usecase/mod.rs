pub mod contracts;
pub mod error;
pub mod jwt;
pub mod movies;
pub mod reviews;
