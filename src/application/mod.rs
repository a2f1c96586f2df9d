// Application layer - use cases and orchestration over the domain and storage.

pub mod error;
pub mod reporting;
pub mod service;

pub use error::*;
pub use reporting::*;
pub use service::*;
