use thiserror::Error;

use crate::storage::StorageError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("invalid locator scheme in {0:?}: expected 's3://'")]
    InvalidLocatorScheme(String),
    #[error("invalid locator {0:?}: container and key are required")]
    InvalidLocator(String),
    #[error("failed to resolve a retrieval url: {0}")]
    ResolutionFailed(#[source] StorageError),
    #[error("malformed timestamp {0:?}: expected HH:MM:SS")]
    MalformedTimestamp(String),
    #[error("failed to fetch quiz content: {0}")]
    QuizFetchFailed(String),
    #[error("malformed quiz payload: {0}")]
    QuizPayloadMalformed(String),
    /// Non-200 status, undecodable body, or a run that did not succeed.
    #[error("workflow api error: {0}")]
    ExternalApiError(String),
    #[error("result item has no {0}")]
    MissingField(&'static str),
    #[error("question {index} out of range (quiz has {total})")]
    QuestionOutOfRange { index: usize, total: usize },
    #[error("no quiz rendered for item {0}")]
    QuizNotFound(usize),
}

pub type AppResult<T> = Result<T, AppError>;
