use super::value_objects::EditionKey;

// ============================================================================
// Edition Business Rule Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EditionError {
    #[error("Edition needs both an artwork id and a size")]
    MissingIdentity,

    #[error("Edition limit must be positive, got {0}")]
    InvalidLimit(u32),

    #[error("Edition {key} has {sold} sold but a limit of {limit}")]
    SoldExceedsLimit { key: EditionKey, sold: u32, limit: u32 },

    #[error("Edition {key} cannot be limited to {limit}: {sold} already sold")]
    LimitBelowSold { key: EditionKey, limit: u32, sold: u32 },

    #[error("Edition {key} is sold out: requested {requested}, {remaining} remaining")]
    SoldOut { key: EditionKey, requested: u32, remaining: u32 },
}
