//! 틱택토 세션 서버
//!
//! 매칭, 방 관리, 게임 진행, 하트비트를 제공하는 TCP 서버입니다.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use tictactoe_server::{validate_config, ServerConfig, ServerContext, TcpGameService};

/// 서버 진입점
///
/// 환경변수:
/// - tcp_host: TCP 서버 호스트 (기본값: "0.0.0.0")
/// - tcp_port: TCP 서버 포트 (기본값: "5000")
/// - heartbeat_interval_secs: Ping 간격 (기본값: "10")
/// - heartbeat_grace_secs: Pong 유예 시간 (기본값: "5")
/// - max_connections: 최대 접속 수 (기본값: "1000")
/// - max_frame_bytes: 최대 프레임 크기 (기본값: "65536")
/// - strict_moves: 차례/빈 칸 검증 (기본값: "true")
#[tokio::main]
async fn main() -> Result<()> {
    // 로깅 설정
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // 환경 설정 로드
    let config = ServerConfig::from_env()?;

    // 설정 검증
    validate_config(&config)?;

    info!("=== 틱택토 세션 서버 설정 ===");
    info!("TCP 서버: {}", config.bind_address());
    info!(
        "하트비트: {:?} 간격, {:?} 유예",
        config.heartbeat_interval, config.heartbeat_grace
    );
    info!("최대 접속 수: {}", config.max_connections);
    info!("엄격한 수 검증: {}", config.strict_moves);
    info!("============================");

    let ctx = Arc::new(ServerContext::new(config));
    let server = TcpGameService::bind(ctx)
        .await
        .context("서버 시작 실패")?;

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("종료 시그널 대기 실패: {}", e);
                std::future::pending::<()>().await;
            }
            info!("종료 시그널 수신, 서버를 중지합니다...");
        })
        .await?;

    info!("✅ 서버가 정상적으로 종료되었습니다");
    Ok(())
}
