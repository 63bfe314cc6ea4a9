//! Shared response envelopes and pagination helpers for list endpoints.

pub mod pagination;
pub mod response;

pub use pagination::{Paginated, PaginationParams};
pub use response::{DataResponse, MessageResponse};
