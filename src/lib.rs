//! 캐시백/CPA 리워드 원장
//!
//! 모든 잔고는 불변 원장 엔트리의 합으로 계산됩니다. 출금은 잠금 후 확정되고,
//! 파트너 포스트백은 몇 번 전달되어도 한 번만 반영됩니다.

pub mod api;
pub mod click;
pub mod config;
pub mod conversion;
pub mod db;
pub mod error;
pub mod ledger;
pub mod payout;
pub mod server;

pub use config::{AppConfig, LedgerConfig, RetryPolicy};
pub use error::{LedgerError, Result};
