//! 원장 코어 에러 타입

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LedgerError>;

/// 원장/출금/전환 처리 에러
#[derive(Debug, Error)]
pub enum LedgerError {
    /// 정책 위반 또는 잘못된 입력 (재시도 금지)
    #[error("검증 실패: {0}")]
    Validation(String),

    #[error("잔고 부족: 요청 {requested}, 사용 가능 {available}")]
    InsufficientFunds { requested: i64, available: i64 },

    #[error("찾을 수 없음: {0}")]
    NotFound(String),

    #[error("허용되지 않는 상태 전이: {from} -> {to}")]
    IllegalTransition { from: String, to: String },

    #[error("저장소 오류: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("직렬화 오류: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LedgerError {
    pub fn validation(message: impl Into<String>) -> Self {
        LedgerError::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        LedgerError::NotFound(message.into())
    }

    /// 호출자 입력 문제로 분류되는 에러인지 여부
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            LedgerError::Validation(_) | LedgerError::IllegalTransition { .. }
        )
    }

    /// 에러 코드 (API 응답용)
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::Validation(_) => "VALIDATION_ERROR",
            LedgerError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            LedgerError::NotFound(_) => "NOT_FOUND",
            LedgerError::IllegalTransition { .. } => "ILLEGAL_TRANSITION",
            LedgerError::Storage(_) => "STORAGE_ERROR",
            LedgerError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }
}

/// 설정 로드 에러
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("환경 변수 {key} 값이 올바르지 않음: {value}")]
    InvalidValue { key: &'static str, value: String },
}
