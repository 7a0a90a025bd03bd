use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlanError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Please set {name} before recalculating")]
    MissingInput { name: &'static str },

    #[error("{name} must be a number, got {value:?}")]
    NonNumericInput { name: &'static str, value: String },

    #[error("Sell CPM must be greater than zero")]
    ZeroSellPrice,

    #[error("Line '{line_id}' not found")]
    LineNotFound { line_id: String },

    #[error("The totals row cannot be removed")]
    TotalsRowProtected,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PlanError {
    /// Fatal-input errors abort a pass before anything is written.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::MissingInput { .. } | Self::NonNumericInput { .. } | Self::ZeroSellPrice
        )
    }
}

pub type PlanResult<T> = Result<T, PlanError>;
