#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}
