pub mod client;
pub mod error;
pub mod resources;

pub use client::ApiClient;
pub use error::ApiError;
