use axum::Router;
use log::{info, warn};
use sqlx::sqlite::SqlitePool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::create_api_router;
use crate::click::ClickRegistry;
use crate::config::AppConfig;
use crate::conversion::ConversionService;
use crate::ledger::{BalanceAggregator, LedgerStore};
use crate::payout::PayoutService;

/// 서버 상태
#[derive(Clone)]
pub struct ServerState {
    pub ledger: LedgerStore,
    pub balances: BalanceAggregator,
    pub payouts: PayoutService,
    pub conversions: ConversionService,
    pub clicks: ClickRegistry,
    pub webhook_secret: String,
    pub currency: String,
    pub leaderboard_size: i64,
}

impl ServerState {
    pub fn new(pool: SqlitePool, config: &AppConfig) -> Self {
        Self {
            ledger: LedgerStore::new(pool.clone()),
            balances: BalanceAggregator::new(pool.clone()),
            payouts: PayoutService::new(pool.clone(), config.ledger.clone()),
            conversions: ConversionService::new(pool.clone(), config.ledger.clone()),
            clicks: ClickRegistry::new(pool, config.public_base_url.clone()),
            webhook_secret: config.webhook_secret.clone(),
            currency: config.ledger.currency.clone(),
            leaderboard_size: config.leaderboard_size,
        }
    }
}

/// 레이어가 적용된 전체 라우터
pub fn build_router(state: ServerState) -> Router {
    create_api_router()
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// 서버 시작
pub async fn start_server(config: AppConfig, pool: SqlitePool) -> anyhow::Result<()> {
    info!("🚀 cpa-ledger 서버 시작 중...");
    if config.uses_default_secret() {
        warn!("⚠️ WEBHOOK_SECRET 이 설정되지 않아 기본 시크릿을 사용합니다. 운영 환경에서는 반드시 변경하세요");
    }

    let state = ServerState::new(pool, &config);
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.rest_port)).await?;

    info!("✅ 서버가 성공적으로 시작되었습니다!");
    info!("REST API: http://localhost:{}", config.rest_port);
    info!("추적 링크 기준 주소: {}", config.public_base_url);

    axum::serve(listener, router).await?;

    Ok(())
}
