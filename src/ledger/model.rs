use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};

/// 원장 엔트리 종류
///
/// 금액은 항상 0 이상이며 잔고에 대한 부호는 종류에서 결정됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum EntryKind {
    Credit,
    Debit,
    Lock,
    Unlock,
    /// 파트너 확정 전의 임시 적립 (사용 불가)
    Adjust,
}

/// 엔트리 방향. `Decrease`는 `Adjust`에만 허용됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum Direction {
    Increase,
    Decrease,
}

/// 엔트리를 발생시킨 객체 (예: "payout:42", "conversion:17")
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reference {
    Payout(i64),
    Conversion(i64),
}

impl Reference {
    pub fn kind(&self) -> &'static str {
        match self {
            Reference::Payout(_) => "payout",
            Reference::Conversion(_) => "conversion",
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            Reference::Payout(id) | Reference::Conversion(id) => *id,
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id())
    }
}

/// 엔트리 한 건의 최대 금액 (최소 통화 단위). 합계 집계가 i64 범위를 넘지 않도록 제한합니다.
pub const MAX_ENTRY_AMOUNT: i64 = 1_000_000_000_000;

/// 추가 예정 원장 엔트리
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLedgerEntry {
    pub user_id: i64,
    pub kind: EntryKind,
    pub direction: Direction,
    pub amount: i64,
    pub currency: String,
    pub reference: Reference,
    pub notes: Option<String>,
}

impl NewLedgerEntry {
    pub fn new(
        user_id: i64,
        kind: EntryKind,
        amount: i64,
        currency: impl Into<String>,
        reference: Reference,
    ) -> Self {
        Self {
            user_id,
            kind,
            direction: Direction::Increase,
            amount,
            currency: currency.into(),
            reference,
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// 임시 적립 취소용 (Adjust 음수 방향)
    pub fn decreasing(mut self) -> Self {
        self.direction = Direction::Decrease;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.amount < 0 {
            return Err(LedgerError::validation(format!(
                "원장 금액은 음수일 수 없습니다: {}",
                self.amount
            )));
        }
        if self.amount > MAX_ENTRY_AMOUNT {
            return Err(LedgerError::validation(format!(
                "원장 금액이 최대치({})를 넘습니다: {}",
                MAX_ENTRY_AMOUNT, self.amount
            )));
        }
        if self.direction == Direction::Decrease && self.kind != EntryKind::Adjust {
            return Err(LedgerError::validation(format!(
                "{:?} 엔트리는 감소 방향을 가질 수 없습니다",
                self.kind
            )));
        }
        if self.currency.trim().is_empty() {
            return Err(LedgerError::validation("통화가 비어 있습니다"));
        }
        Ok(())
    }
}
