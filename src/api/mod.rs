// Content backend collaborator: interface, REST implementation, wire types

pub mod client;
pub mod errors;
pub mod traits;
pub mod types;

#[cfg(test)]
pub mod mocks;

pub use client::RestModerationApi;
pub use errors::ApiError;
pub use traits::ModerationApi;
pub use types::{ApiResponse, ListPage, ListQuery, SortOrder};
