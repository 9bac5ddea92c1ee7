// ==========================================
// 畜产品合规引擎 - 服务层错误类型
// ==========================================

use crate::domain::types::AlertStatus;
use crate::engine::error::EngineError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("参数校验失败: {0}")]
    Validation(String),

    #[error("记录未找到: {entity} id={id}")]
    NotFound { entity: String, id: String },

    /// 并发更新冲突, 需读取最新数据后重试
    #[error("并发冲突: {0}")]
    ConcurrencyConflict(String),

    #[error("非法状态迁移: {from} -> {to}")]
    IllegalTransition { from: AlertStatus, to: AlertStatus },

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Repository(RepositoryError),
}

impl From<RepositoryError> for ServiceError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => ServiceError::NotFound { entity, id },
            RepositoryError::OptimisticLockFailure { .. } => {
                ServiceError::ConcurrencyConflict(err.to_string())
            }
            RepositoryError::ValidationError(msg) => ServiceError::Validation(msg),
            RepositoryError::FieldValueError { field, message } => {
                ServiceError::Validation(format!("{}: {}", field, message))
            }
            other => ServiceError::Repository(other),
        }
    }
}

impl ServiceError {
    pub fn not_found(entity: &str, id: &str) -> Self {
        ServiceError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// 标识符非空校验
pub(crate) fn require_id(field: &str, value: &str) -> ServiceResult<()> {
    if value.trim().is_empty() {
        return Err(ServiceError::Validation(format!("{} 不能为空", field)));
    }
    Ok(())
}
