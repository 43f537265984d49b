pub mod controllers;
pub mod error;
pub mod mutations;
pub mod optimistic;
pub mod queries;
pub mod query;
#[cfg(test)]
mod testing;

pub use error::{ClientError, Result};
pub use query::{QueryClient, QueryConfig, QueryFilter, QueryKey, QueryName};
