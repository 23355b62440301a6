//! 서버 공유 상태
//!
//! 세션 레지스트리, 매칭 대기열, 방 테이블을 하나로 묶어 모든 핸들러에 넘깁니다.
//! 테스트마다 새로 만들 수 있어 전역 상태가 없습니다.
//!
//! 여러 영역을 건드리는 작업은 항상 레지스트리 → 대기열 → 방 순서로 잠급니다.

use std::sync::Arc;

use tracing::info;

use crate::config::ServerConfig;
use crate::service::connection_service::{Session, SessionRegistry};
use crate::service::heartbeat_service::HeartbeatService;
use crate::service::matchmaking_service::MatchmakingService;
use crate::service::message_service::MessageService;
use crate::service::room_service::RoomService;
use crate::tool::error::ServerError;

/// 서버 컨텍스트
pub struct ServerContext {
    pub config: ServerConfig,
    pub sessions: SessionRegistry,
    pub matchmaking: MatchmakingService,
    pub rooms: RoomService,
    pub messages: MessageService,
    pub heartbeat: HeartbeatService,
}

impl ServerContext {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            sessions: SessionRegistry::new(config.max_connections),
            matchmaking: MatchmakingService::new(),
            rooms: RoomService::new(config.strict_moves),
            messages: MessageService::new(),
            heartbeat: HeartbeatService::from_config(&config),
            config,
        }
    }

    /// 세션을 모든 공유 구조에서 제거합니다.
    ///
    /// 연결 종료, 전송 실패, 하트비트 타임아웃이 모두 이 경로를 탑니다.
    /// 여러 번 호출해도 한 번만 정리되며, 방에 남은 상대에게는 퇴장 알림을 보냅니다.
    pub async fn disconnect(&self, session: &Arc<Session>, reason: &ServerError) {
        session.close(reason.to_string()).await;

        let unregistered = self.sessions.unregister(session.id()).await.is_some();
        self.matchmaking.remove(session.id()).await;
        if let Some(notice) = self.rooms.remove_session(session).await {
            self.messages.deliver(vec![notice]).await;
        }

        if unregistered {
            info!(
                "🔌 세션 {} 연결 해제 ({}초 접속): {}",
                session.id(),
                session.connected_at().elapsed().as_secs(),
                reason
            );
        }
    }

    /// 등록된 모든 세션을 닫습니다.
    pub async fn shutdown(&self) {
        let sessions = self.sessions.all().await;
        info!("🛑 서버 종료: 세션 {}개 정리", sessions.len());
        let reason = ServerError::transport(None, "서버 종료");
        for session in sessions {
            self.disconnect(&session, &reason).await;
        }
    }
}
