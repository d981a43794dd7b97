use domain::{DomainError, RepositoryError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApplicationError {
    /// 消息正文或显示名称不合法，调用方同步收到
    #[error("validation failed: {0}")]
    Validation(#[from] DomainError),
    /// 尚未设置显示名称
    #[error("no display name set")]
    Unauthenticated,
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
    /// 同一份草稿的提交仍在进行中
    #[error("submission already in flight")]
    SubmitPending,
    #[error("session closed")]
    SessionClosed,
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl ApplicationError {
    /// 创建基础设施错误
    pub fn infrastructure(message: impl Into<String>) -> Self {
        ApplicationError::Infrastructure(message.into())
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, ApplicationError::Validation(_))
    }
}
