use crate::error::ApiError;
use crate::validation::TargetUrlError;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("already in queue")]
    AlreadyInQueue,

    #[error("queue storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("webhook does not exist [id: {id}]")]
    WebhookNotExist { id: i64 },

    #[error("hook task does not exist [id: {id}]")]
    HookTaskNotExist { id: i64 },

    #[error("hook task does not exist [hook_id: {hook_id}, uuid: {uuid}]")]
    HookTaskUuidNotExist { hook_id: i64, uuid: String },

    #[error("unknown hook type: {0}")]
    UnknownHookType(String),

    #[error("unsupported event: {0}")]
    UnsupportedEvent(String),

    #[error("invalid stored payload: {0}")]
    InvalidPayload(#[source] serde_json::Error),

    #[error("invalid webhook meta: {0}")]
    InvalidMeta(#[source] serde_json::Error),

    #[error("invalid http method: {0}")]
    InvalidHttpMethod(String),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error(transparent)]
    Db(#[from] sqlx::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HookError {
    pub fn is_not_exist(&self) -> bool {
        matches!(
            self,
            Self::WebhookNotExist { .. }
                | Self::HookTaskNotExist { .. }
                | Self::HookTaskUuidNotExist { .. }
        )
    }
}

impl From<TargetUrlError> for HookError {
    fn from(err: TargetUrlError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<HookError> for ApiError {
    fn from(err: HookError) -> Self {
        match err {
            HookError::WebhookNotExist { .. } => Self::NotFound("webhook".into()),
            HookError::HookTaskNotExist { .. } | HookError::HookTaskUuidNotExist { .. } => {
                Self::NotFound("hook task".into())
            }
            HookError::UnknownHookType(t) => Self::UnprocessableEntity(format!("invalid hook type: {t}")),
            HookError::Validation(msg) => Self::BadRequest(msg),
            HookError::InvalidHttpMethod(m) => Self::BadRequest(format!("invalid http method: {m}")),
            HookError::Db(e) => Self::from(e),
            HookError::Other(e) => Self::Internal(e),
            other => Self::Internal(other.into()),
        }
    }
}
