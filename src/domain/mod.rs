pub mod movie;
pub mod page;
pub mod rating;
pub mod review;
