use crate::expression::QueryStage;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SloError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unexpected result type '{0}', expected vector")]
    UnexpectedResultType(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    #[error("failed to get {stage} results: {source}")]
    Stage {
        stage: QueryStage,
        #[source]
        source: Box<SloError>,
    },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl SloError {
    pub fn at_stage(stage: QueryStage, source: SloError) -> Self {
        SloError::Stage {
            stage,
            source: Box::new(source),
        }
    }

    /// Configuration problems never heal between attempts.
    pub fn is_retryable(&self) -> bool {
        match self {
            SloError::InvalidConfig(_) => false,
            SloError::Stage { source, .. } => source.is_retryable(),
            _ => true,
        }
    }
}

impl From<reqwest::Error> for SloError {
    fn from(err: reqwest::Error) -> Self {
        SloError::Transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SloError>;
