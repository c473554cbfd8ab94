use anyhow::Context;
use log::info;

use cpa_ledger::config::AppConfig;
use cpa_ledger::db::init_database;
use cpa_ledger::server::start_server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env 로드 (없어도 무방)
    dotenv::dotenv().ok();

    // 로깅 초기화 (RUST_LOG 미설정 시 info)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::from_env().context("설정 로드 실패")?;
    info!(
        "원장 설정: 통화={} 최소 출금액={}",
        config.ledger.currency, config.ledger.payout_minimum
    );

    let pool = init_database(&config.database_url, config.max_connections)
        .await
        .with_context(|| format!("데이터베이스 연결 실패: {}", config.database_url))?;

    start_server(config, pool).await
}
