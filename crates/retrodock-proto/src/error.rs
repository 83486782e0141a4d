use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("frame too large: {0}")]
    FrameTooLarge(usize),
    #[error("empty frame")]
    EmptyFrame,
    #[error("malformed JSON body: {0}")]
    Json(#[from] serde_json::Error),
}
