//! 하트비트 서비스
//!
//! 세션마다 독립된 생존 확인 작업을 돌립니다.
//!
//! ```text
//! Ping 전송 ─▶ interval 대기 ─▶ Pong 받음? ──예──▶ 다음 주기
//!                                   │
//!                                  아니오
//!                                   ▼
//!                             grace 대기 ─▶ Pong 받음? ──아니오──▶ 세션 제거
//! ```
//!
//! 두 대기 모두 세션 종료 신호를 함께 기다리므로, 연결이 먼저 끊기면
//! 작업은 바로 끝나고 연결 작업이 join 합니다.
//! Ping 전송이 interval + grace 안에 끝나지 않아도 응답 없음으로 처리합니다.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::ServerConfig;
use crate::protocol::{Probe, ServerPacket};
use crate::service::connection_service::Session;
use crate::service::context::ServerContext;
use crate::tool::error::{ErrorHandler, ErrorSeverity, ServerError};

/// 하트비트 통계
#[derive(Debug, Clone, Default)]
pub struct HeartbeatStats {
    pub probes_sent: u64,
    pub acknowledgments: u64,
    pub timeouts: u64,
    pub average_latency_ms: f64,
}

/// 하트비트 서비스
pub struct HeartbeatService {
    interval: Duration,
    grace: Duration,
    stats: parking_lot::Mutex<HeartbeatStats>,
}

impl HeartbeatService {
    pub fn new(interval: Duration, grace: Duration) -> Self {
        Self {
            interval,
            grace,
            stats: parking_lot::Mutex::new(HeartbeatStats::default()),
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(config.heartbeat_interval, config.heartbeat_grace)
    }

    /// 세션의 하트비트 작업을 시작합니다.
    ///
    /// 응답이 없으면 작업 안에서 세션 제거까지 마칩니다.
    /// 세션이 먼저 닫히면 아무것도 하지 않고 끝납니다.
    pub fn spawn(ctx: Arc<ServerContext>, session: Arc<Session>) -> JoinHandle<()> {
        tokio::spawn(async move {
            debug!("세션 {} 하트비트 시작", session.id());
            if let Some(error) = ctx.heartbeat.supervise(&ctx, &session).await {
                ErrorHandler::handle_error(&error, ErrorSeverity::Warning, "HeartbeatService", "supervise");
                ctx.sessions.record_timeout();
                ctx.disconnect(&session, &error).await;
            }
            debug!("세션 {} 하트비트 종료", session.id());
        })
    }

    /// 세션이 닫히거나 타임아웃될 때까지 주기를 반복합니다.
    async fn supervise(&self, ctx: &ServerContext, session: &Session) -> Option<ServerError> {
        let mut closed = session.subscribe_closed();

        loop {
            if session.is_closed() {
                return None;
            }

            let timestamp = session.begin_probe();
            let ping = ServerPacket::Ping(Probe { timestamp });
            let deadline = self.interval + self.grace;
            match tokio::time::timeout(deadline, ctx.messages.send_to(session, &ping)).await {
                Ok(Ok(())) => {}
                // 전송 실패로 세션이 닫혔으므로 정리는 연결 작업이 맡음
                Ok(Err(_)) => return None,
                Err(_) => {
                    self.stats.lock().timeouts += 1;
                    warn!("💔 세션 {} Ping 전송이 {:?} 동안 막힘", session.id(), deadline);
                    return Some(ServerError::LivenessTimeout(session.id()));
                }
            }
            self.stats.lock().probes_sent += 1;

            if wait_or_closed(&mut closed, self.interval).await {
                return None;
            }
            if session.is_acknowledged() {
                continue;
            }

            debug!("세션 {} Pong 대기 (유예 {:?})", session.id(), self.grace);
            if wait_or_closed(&mut closed, self.grace).await {
                return None;
            }
            if !session.is_acknowledged() {
                self.stats.lock().timeouts += 1;
                warn!("💔 세션 {} 하트비트 응답 없음", session.id());
                return Some(ServerError::LivenessTimeout(session.id()));
            }
        }
    }

    /// Pong 수신 기록
    pub fn record_acknowledgment(&self, latency_ms: Option<u64>) {
        let mut stats = self.stats.lock();
        stats.acknowledgments += 1;
        if let Some(latency) = latency_ms {
            let latency = latency as f64;
            if stats.average_latency_ms == 0.0 {
                stats.average_latency_ms = latency;
            } else {
                stats.average_latency_ms = (stats.average_latency_ms * 0.9) + (latency * 0.1);
            }
        }
    }

    pub fn stats(&self) -> HeartbeatStats {
        self.stats.lock().clone()
    }
}

/// 주어진 시간만큼 기다립니다. 그 사이 세션이 닫히면 `true`.
async fn wait_or_closed(closed: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        signaled = async { closed.wait_for(|closed| *closed).await.is_ok() } => {
            if !signaled {
                debug!("세션 종료 신호 채널이 닫혔습니다");
            }
            true
        }
    }
}
