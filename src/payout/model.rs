use serde::{Deserialize, Serialize};

use crate::ledger::EntryKind;

/// 출금 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum PayoutMethod {
    Direct,
    Ozon,
    Wb,
    GoldenApple,
}

const OZON_DENOMINATIONS: &[i64] = &[700, 1000, 1500, 2000, 3000, 3500, 4000, 5000, 8000, 10000];
const WB_DENOMINATIONS: &[i64] = &[1000, 2000, 3000, 5000, 8000, 10000];

impl PayoutMethod {
    /// 고정 액면가 목록 (없으면 임의 금액 허용)
    pub fn denominations(&self) -> Option<&'static [i64]> {
        match self {
            PayoutMethod::Ozon => Some(OZON_DENOMINATIONS),
            PayoutMethod::Wb => Some(WB_DENOMINATIONS),
            PayoutMethod::Direct | PayoutMethod::GoldenApple => None,
        }
    }

    pub fn accepts(&self, amount: i64) -> bool {
        self.denominations()
            .map_or(true, |allowed| allowed.contains(&amount))
    }
}

/// 출금 요청 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum PayoutStatus {
    Pending,
    ApprovedInternal,
    Issued,
    Failed,
}

/// 상태 전이 판정 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// 요청 상태가 현재와 같음 (중복 전달)
    Unchanged,
    /// 이미 종료된 요청
    AlreadyTerminal,
    Allowed,
    Illegal,
}

impl PayoutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutStatus::Pending => "pending",
            PayoutStatus::ApprovedInternal => "approved_internal",
            PayoutStatus::Issued => "issued",
            PayoutStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PayoutStatus::Issued | PayoutStatus::Failed)
    }

    /// 허용 전이 표
    pub fn allowed_next(&self) -> &'static [PayoutStatus] {
        match self {
            PayoutStatus::Pending => &[
                PayoutStatus::ApprovedInternal,
                PayoutStatus::Issued,
                PayoutStatus::Failed,
            ],
            PayoutStatus::ApprovedInternal => &[PayoutStatus::Issued, PayoutStatus::Failed],
            PayoutStatus::Issued | PayoutStatus::Failed => &[],
        }
    }

    pub fn transition_to(&self, next: PayoutStatus) -> Transition {
        if *self == next {
            Transition::Unchanged
        } else if self.is_terminal() {
            Transition::AlreadyTerminal
        } else if self.allowed_next().contains(&next) {
            Transition::Allowed
        } else {
            Transition::Illegal
        }
    }

    /// 이 상태로 진입할 때 추가되는 원장 엔트리 (종류, 메모) 순서대로
    pub fn ledger_effects(&self) -> &'static [(EntryKind, &'static str)] {
        match self {
            PayoutStatus::Issued => &[
                (EntryKind::Unlock, "unlock_after_issue"),
                (EntryKind::Debit, "payout_debit"),
            ],
            PayoutStatus::Failed => &[(EntryKind::Unlock, "payout_failed_unlock")],
            PayoutStatus::Pending | PayoutStatus::ApprovedInternal => &[],
        }
    }
}

impl std::str::FromStr for PayoutStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(PayoutStatus::Pending),
            "approved_internal" => Ok(PayoutStatus::ApprovedInternal),
            "issued" => Ok(PayoutStatus::Issued),
            "failed" => Ok(PayoutStatus::Failed),
            other => Err(format!("알 수 없는 출금 상태: {}", other)),
        }
    }
}

/// 출금 요청 생성 명령
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPayoutRequest {
    pub user_id: i64,
    pub method: PayoutMethod,
    pub amount: i64,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl NewPayoutRequest {
    /// 공백을 제거한 연락처 (비어 있으면 None)
    pub fn contact_phone(&self) -> Option<&str> {
        non_blank(self.phone.as_deref())
    }

    pub fn contact_email(&self) -> Option<&str> {
        non_blank(self.email.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
