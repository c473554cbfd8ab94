use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// 설정되지 않았을 때 쓰이는 공유 시크릿
pub const DEFAULT_WEBHOOK_SECRET: &str = "change-me";

/// 저장소 재시도 정책
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: Duration::from_millis(20),
        }
    }
}

/// 원장 정책 설정
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// 최소 출금액
    pub payout_minimum: i64,
    /// 원장 통화 (통화 간 환산은 하지 않음)
    pub currency: String,
    pub retry: RetryPolicy,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            payout_minimum: 700,
            currency: "RUB".into(),
            retry: RetryPolicy::default(),
        }
    }
}

/// 서버 설정
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub rest_port: u16,
    pub public_base_url: String,
    pub webhook_secret: String,
    pub max_connections: u32,
    /// 리더보드 상위 사용자 수
    pub leaderboard_size: i64,
    pub ledger: LedgerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://cpa_ledger.db".into(),
            rest_port: 8000,
            public_base_url: "http://127.0.0.1:8000".into(),
            webhook_secret: DEFAULT_WEBHOOK_SECRET.into(),
            max_connections: 5,
            leaderboard_size: 50,
            ledger: LedgerConfig::default(),
        }
    }
}

impl AppConfig {
    /// 환경 변수에서 설정 로드 (없으면 기본값)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let retry_defaults = defaults.ledger.retry;

        let backoff_ms = parse_or(
            &lookup,
            "STORAGE_RETRY_BACKOFF_MS",
            retry_defaults.backoff.as_millis() as u64,
        )?;

        Ok(Self {
            database_url: lookup("DATABASE_URL").unwrap_or(defaults.database_url),
            rest_port: parse_or(&lookup, "REST_PORT", defaults.rest_port)?,
            public_base_url: lookup("PUBLIC_BASE_URL").unwrap_or(defaults.public_base_url),
            webhook_secret: lookup("WEBHOOK_SECRET").unwrap_or(defaults.webhook_secret),
            max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", defaults.max_connections)?,
            leaderboard_size: parse_or(&lookup, "LEADERBOARD_SIZE", defaults.leaderboard_size)?,
            ledger: LedgerConfig {
                payout_minimum: parse_or(
                    &lookup,
                    "PAYOUT_MINIMUM",
                    defaults.ledger.payout_minimum,
                )?,
                currency: lookup("LEDGER_CURRENCY")
                    .map(|c| c.trim().to_uppercase())
                    .unwrap_or(defaults.ledger.currency),
                retry: RetryPolicy {
                    max_attempts: parse_or(
                        &lookup,
                        "STORAGE_RETRY_ATTEMPTS",
                        retry_defaults.max_attempts,
                    )?,
                    backoff: Duration::from_millis(backoff_ms),
                },
            },
        })
    }

    /// 기본 공유 시크릿을 그대로 쓰는지 여부
    pub fn uses_default_secret(&self) -> bool {
        self.webhook_secret == DEFAULT_WEBHOOK_SECRET
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_when_env_empty() {
        let config = AppConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.rest_port, 8000);
        assert_eq!(config.ledger.payout_minimum, 700);
        assert_eq!(config.ledger.currency, "RUB");
        assert_eq!(config.ledger.retry.max_attempts, 5);
        assert_eq!(config.leaderboard_size, 50);
        assert!(config.uses_default_secret());
    }

    #[test]
    fn test_configured_secret_is_not_default() {
        let config =
            AppConfig::from_lookup(|k| (k == "WEBHOOK_SECRET").then(|| "s3cr3t".to_string())).unwrap();
        assert_eq!(config.webhook_secret, "s3cr3t");
        assert!(!config.uses_default_secret());
    }

    #[test]
    fn test_overrides_from_env() {
        let vars: HashMap<&str, &str> = [
            ("REST_PORT", "9100"),
            ("PAYOUT_MINIMUM", "1000"),
            ("LEDGER_CURRENCY", "usd"),
            ("STORAGE_RETRY_BACKOFF_MS", "5"),
        ]
        .into_iter()
        .collect();

        let config = AppConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.rest_port, 9100);
        assert_eq!(config.ledger.payout_minimum, 1000);
        assert_eq!(config.ledger.currency, "USD");
        assert_eq!(config.ledger.retry.backoff, Duration::from_millis(5));
    }

    #[test]
    fn test_invalid_number_rejected() {
        let result = AppConfig::from_lookup(|k| (k == "REST_PORT").then(|| "abc".to_string()));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { key: "REST_PORT", .. })
        ));
    }
}
