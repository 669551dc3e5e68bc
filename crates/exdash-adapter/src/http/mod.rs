/*
[INPUT]:  HTTP client configuration and backend endpoints
[OUTPUT]: HTTP responses and typed backend results
[POS]:    HTTP layer - dashboard backend communication
[UPDATE]: When adding new endpoints or changing client behavior
*/

pub mod account;
pub mod client;
pub mod error;
pub mod stream;

pub use error::{DashboardError, Result};

pub use client::{ClientConfig, DashboardClient};
pub use stream::StreamBackend;
