pub mod errors;
pub mod memory;
pub mod postgres;
pub mod store;
