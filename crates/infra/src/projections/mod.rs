mod baskets;
mod orders;

pub use baskets::BasketDirectoryProjection;
pub use orders::{OrderBoardProjection, OrderReadModel};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("failed to deserialize event: {0}")]
    Deserialize(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}
