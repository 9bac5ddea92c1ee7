// ==========================================
// 畜产品合规引擎 - API层错误类型
// ==========================================
// 职责: 将服务/仓储层错误转换为调用方可处理的错误类别
// ==========================================

use crate::repository::error::RepositoryError;
use crate::services::error::ServiceError;
use thiserror::Error;

/// API层错误类型
/// 所有错误信息必须包含显式原因
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 业务规则错误
    // ==========================================
    #[error("数据验证失败: {0}")]
    ValidationError(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("无效的状态转换: from={from} to={to}")]
    InvalidStateTransition { from: String, to: String },

    // ==========================================
    // 并发控制错误
    // ==========================================
    /// 其他监管员已修改, 需刷新后重试
    #[error("并发冲突: {0}")]
    ConcurrencyConflict(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::OptimisticLockFailure {
                entity,
                id,
                expected,
                actual,
            } => ApiError::ConcurrencyConflict(format!(
                "{}({})已被其他用户修改（期望revision={}，实际revision={}）",
                entity, id, expected, actual
            )),
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::ValidationError(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::ValidationError(format!("外键约束违反: {}", msg))
            }
            RepositoryError::ValidationError(msg) => ApiError::ValidationError(msg),
            RepositoryError::FieldValueError { field, message } => {
                ApiError::ValidationError(format!("字段{}错误: {}", field, message))
            }
            RepositoryError::SerializationError(e) => ApiError::InternalError(e.to_string()),
        }
    }
}

// ==========================================
// 从 ServiceError 转换
// ==========================================
impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(msg) => ApiError::ValidationError(msg),
            ServiceError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            ServiceError::ConcurrencyConflict(msg) => ApiError::ConcurrencyConflict(msg),
            ServiceError::IllegalTransition { from, to } => ApiError::InvalidStateTransition {
                from: from.to_string(),
                to: to.to_string(),
            },
            ServiceError::Engine(e) => ApiError::ValidationError(e.to_string()),
            ServiceError::Repository(e) => ApiError::from(e),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::AlertStatus;

    #[test]
    fn test_lock_failure_maps_to_conflict() {
        let err: ApiError = RepositoryError::OptimisticLockFailure {
            entity: "RegulatorAlert".to_string(),
            id: "A1".to_string(),
            expected: 1,
            actual: 2,
        }
        .into();
        assert!(matches!(err, ApiError::ConcurrencyConflict(_)));
    }

    #[test]
    fn test_illegal_transition_keeps_states() {
        let err: ApiError = ServiceError::IllegalTransition {
            from: AlertStatus::Resolved,
            to: AlertStatus::New,
        }
        .into();
        match err {
            ApiError::InvalidStateTransition { from, to } => {
                assert_eq!(from, "RESOLVED");
                assert_eq!(to, "NEW");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_service_not_found_message() {
        let err: ApiError = ServiceError::not_found("Animal", "A9").into();
        assert_eq!(err.to_string(), "资源未找到: Animal(id=A9)不存在");
    }
}
