use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

/// Common pagination query parameters for list endpoints
#[derive(Debug, Deserialize, ToSchema, IntoParams)]
pub struct PaginationParams {
    /// Page number, 1-based
    #[serde(default = "default_page")]
    pub page: u64,
    /// Items per page (max 100)
    #[serde(default = "default_per_page")]
    pub per_page: u64,
}

fn default_page() -> u64 {
    1
}

fn default_per_page() -> u64 {
    20
}
