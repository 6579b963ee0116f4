#![forbid(unsafe_code)]

pub mod api;
pub mod error;
pub mod http;

pub use api::{AuthApi, AuthResponse, AuthToken, GoalsApi, InMemoryApi};
pub use error::ApiError;
pub use http::{ApiConfig, HttpApi};
