use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{LedgerError, Result};
use crate::ledger::MAX_ENTRY_AMOUNT;

/// 전환 상태 (파트너 보고 기준)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ConversionStatus {
    Pending,
    Approved,
    Rejected,
    Hold,
}

impl ConversionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversionStatus::Pending => "pending",
            ConversionStatus::Approved => "approved",
            ConversionStatus::Rejected => "rejected",
            ConversionStatus::Hold => "hold",
        }
    }

    /// 파트너 값 해석. 알 수 없는 값은 Pending 으로 취급합니다.
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "approved" => ConversionStatus::Approved,
            "rejected" => ConversionStatus::Rejected,
            "hold" => ConversionStatus::Hold,
            _ => ConversionStatus::Pending,
        }
    }

    /// 허용 전이 표. Approved 는 종료 상태입니다.
    pub fn allowed_next(&self) -> &'static [ConversionStatus] {
        match self {
            ConversionStatus::Pending => &[
                ConversionStatus::Hold,
                ConversionStatus::Approved,
                ConversionStatus::Rejected,
            ],
            ConversionStatus::Hold => &[
                ConversionStatus::Pending,
                ConversionStatus::Approved,
                ConversionStatus::Rejected,
            ],
            ConversionStatus::Rejected => &[ConversionStatus::Approved],
            ConversionStatus::Approved => &[],
        }
    }

    pub fn can_transition_to(&self, next: ConversionStatus) -> bool {
        self.allowed_next().contains(&next)
    }
}

/// 파트너 포스트백 한 건
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionCallback {
    /// 파트너 측 클릭 ID
    pub click_identifier: String,
    /// 파트너 측 전환 ID (멱등 키)
    pub external_id: Option<String>,
    pub amount: i64,
    pub currency: Option<String>,
    pub status: ConversionStatus,
    pub raw_payload: Value,
}

impl ConversionCallback {
    /// 포스트백 페이로드 해석
    ///
    /// 필드 별칭: click_id|click_uuid, conversion_id|goal_id, amount|payout.
    pub fn from_payload(payload: Map<String, Value>) -> Result<Self> {
        let click_identifier = first_text(&payload, &["click_id", "click_uuid"])
            .ok_or_else(|| LedgerError::not_found("포스트백에 클릭 ID가 없습니다"))?;
        let external_id = first_text(&payload, &["conversion_id", "goal_id"]);
        let amount = match first_value(&payload, &["amount", "payout"]) {
            Some(value) => parse_amount(value)?,
            None => 0,
        };
        let currency = first_text(&payload, &["currency"]).map(|c| c.to_uppercase());
        let status = first_text(&payload, &["status"])
            .map(|s| ConversionStatus::parse_lenient(&s))
            .unwrap_or(ConversionStatus::Pending);

        Ok(Self {
            click_identifier,
            external_id,
            amount,
            currency,
            status,
            raw_payload: Value::Object(payload),
        })
    }

    /// 직렬화 잠금 키 (외부 ID 우선, 없으면 클릭)
    pub fn identity_key(&self) -> String {
        match &self.external_id {
            Some(external_id) => format!("ext:{}", external_id),
            None => format!("click:{}", self.click_identifier),
        }
    }
}

fn first_value<'a>(payload: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| payload.get(*key))
        .find(|value| match value {
            Value::Null => false,
            Value::String(s) => !s.trim().is_empty(),
            _ => true,
        })
}

fn first_text(payload: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    first_value(payload, keys).and_then(|value| match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// 금액 해석: 정수는 그대로, 소수는 정수 단위로 버림
fn parse_amount(value: &Value) -> Result<i64> {
    let parsed = match value {
        Value::Number(n) => match n.as_i64() {
            Some(exact) => Some(Amount::Exact(exact)),
            None => n.as_f64().map(Amount::Decimal),
        },
        Value::String(s) => {
            let s = s.trim();
            match s.parse::<i64>() {
                Ok(exact) => Some(Amount::Exact(exact)),
                Err(_) => s.parse::<f64>().ok().map(Amount::Decimal),
            }
        }
        _ => None,
    };

    let amount = match parsed {
        Some(Amount::Exact(amount)) => amount,
        Some(Amount::Decimal(amount)) if amount.is_finite() => {
            if amount < 0.0 {
                return Err(negative(value));
            }
            if amount > MAX_ENTRY_AMOUNT as f64 {
                return Err(too_large(value));
            }
            amount.trunc() as i64
        }
        _ => return Err(LedgerError::validation(format!("전환 금액 형식 오류: {}", value))),
    };

    if amount < 0 {
        return Err(negative(value));
    }
    if amount > MAX_ENTRY_AMOUNT {
        return Err(too_large(value));
    }
    Ok(amount)
}

enum Amount {
    Exact(i64),
    Decimal(f64),
}

fn negative(value: &Value) -> LedgerError {
    LedgerError::validation(format!("전환 금액은 음수일 수 없습니다: {}", value))
}

fn too_large(value: &Value) -> LedgerError {
    LedgerError::validation(format!(
        "전환 금액이 최대치({})를 넘습니다: {}",
        MAX_ENTRY_AMOUNT, value
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_parse_aliases() {
        let callback = ConversionCallback::from_payload(payload(json!({
            "click_uuid": "clk-1",
            "goal_id": 77,
            "payout": "512.90",
            "currency": "rub",
            "status": "APPROVED",
        })))
        .unwrap();

        assert_eq!(callback.click_identifier, "clk-1");
        assert_eq!(callback.external_id.as_deref(), Some("77"));
        assert_eq!(callback.amount, 512);
        assert_eq!(callback.currency.as_deref(), Some("RUB"));
        assert_eq!(callback.status, ConversionStatus::Approved);
        assert_eq!(callback.identity_key(), "ext:77");
    }

    #[test]
    fn test_unknown_status_is_pending() {
        let callback = ConversionCallback::from_payload(payload(json!({
            "click_id": "clk-2",
            "amount": 100,
            "status": "processing",
        })))
        .unwrap();

        assert_eq!(callback.status, ConversionStatus::Pending);
        assert_eq!(callback.external_id, None);
        assert_eq!(callback.identity_key(), "click:clk-2");
    }

    #[test]
    fn test_negative_amount_rejected() {
        let result = ConversionCallback::from_payload(payload(json!({
            "click_id": "clk-3",
            "amount": "-10",
        })));
        assert!(matches!(result, Err(LedgerError::Validation(_))));

        let result = ConversionCallback::from_payload(payload(json!({
            "click_id": "clk-3",
            "amount": "ten",
        })));
        assert!(matches!(result, Err(LedgerError::Validation(_))));
    }

    #[test]
    fn test_oversized_amount_rejected() {
        for amount in [json!("1e30"), json!(1e30), json!("9223372036854775807"), json!(u64::MAX)] {
            let result = ConversionCallback::from_payload(payload(json!({
                "click_id": "clk-4",
                "amount": amount,
            })));
            assert!(matches!(result, Err(LedgerError::Validation(_))), "{:?}", result);
        }

        let exact = ConversionCallback::from_payload(payload(json!({
            "click_id": "clk-4",
            "amount": "1000000000000",
        })))
        .unwrap();
        assert_eq!(exact.amount, MAX_ENTRY_AMOUNT);
    }

    #[test]
    fn test_missing_click_is_not_found() {
        let result = ConversionCallback::from_payload(payload(json!({ "amount": 10 })));
        assert!(matches!(result, Err(LedgerError::NotFound(_))));
    }

    #[test]
    fn test_transition_table() {
        use ConversionStatus::*;

        assert!(Pending.can_transition_to(Approved));
        assert!(Hold.can_transition_to(Pending));
        assert!(Rejected.can_transition_to(Approved));
        assert!(!Rejected.can_transition_to(Pending));
        assert!(!Approved.can_transition_to(Rejected));
        assert!(!Approved.can_transition_to(Pending));
    }
}
