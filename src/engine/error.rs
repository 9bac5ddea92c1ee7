// ==========================================
// 畜产品合规引擎 - 引擎层错误类型
// ==========================================

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("无效输入: {0}")]
    InvalidInput(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
