//! Domain error types.

use thiserror::Error;

use crate::stage::CartStage;

/// Errors produced by cart domain operations.
#[derive(Debug, Error)]
pub enum CartError {
    /// Bad client input, rejected before any side effect.
    #[error("validation error: {0}")]
    Validation(String),

    /// The cart's stage does not allow the requested transition.
    #[error("invalid stage transition: cannot {action} from {stage}")]
    InvalidStageTransition {
        stage: CartStage,
        action: &'static str,
    },
}
