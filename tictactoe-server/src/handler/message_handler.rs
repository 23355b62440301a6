//! 메시지 핸들러
//!
//! 수신한 프레임을 디코딩하고 opcode별 핸들러로 라우팅합니다.
//! 로그인, 세션 정보, Ping/Pong은 여기서 직접 처리합니다.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::handler::game_handler::GameHandler;
use crate::handler::matching_handler::MatchingHandler;
use crate::handler::room_handler::RoomHandler;
use crate::protocol::{ClientPacket, LoginRequest, Probe, ServerPacket, UserInfoResponse};
use crate::service::{ServerContext, Session};
use crate::tool::error::{ErrorHandler, ServerError, ServerResult};

/// 표시 이름 최대 길이 (문자 수)
pub const MAX_NAME_CHARS: usize = 32;

/// 메시지 핸들러
pub struct MessageHandler {
    ctx: Arc<ServerContext>,
    room_handler: RoomHandler,
    matching_handler: MatchingHandler,
    game_handler: GameHandler,
}

impl MessageHandler {
    pub fn new(ctx: Arc<ServerContext>) -> Self {
        Self {
            room_handler: RoomHandler::new(ctx.clone()),
            matching_handler: MatchingHandler::new(ctx.clone()),
            game_handler: GameHandler::new(ctx.clone()),
            ctx,
        }
    }

    /// 프레임 하나를 처리합니다.
    ///
    /// 디코딩에 실패한 메시지와 모르는 opcode는 버리고 연결은 유지합니다.
    /// 처리 중 에러는 로그만 남기고, 연결을 더 쓸 수 없는 에러만 반환합니다.
    pub async fn handle_frame(&self, session: &Arc<Session>, payload: &[u8]) -> ServerResult<()> {
        let packet = match ClientPacket::decode(payload) {
            Ok(packet) => packet,
            Err(ServerError::UnknownOpcode(code)) => {
                warn!("세션 {} 알 수 없는 opcode {} 무시", session.id(), code);
                return Ok(());
            }
            Err(e) => {
                ErrorHandler::report(&e, "MessageHandler", "decode");
                return Ok(());
            }
        };

        match self.dispatch(session, packet).await {
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                ErrorHandler::report(&e, "MessageHandler", "dispatch");
                Ok(())
            }
            Ok(()) => Ok(()),
        }
    }

    /// 패킷을 opcode에 맞는 핸들러로 보냅니다.
    pub async fn dispatch(&self, session: &Arc<Session>, packet: ClientPacket) -> ServerResult<()> {
        debug!("세션 {} 요청: {:?}", session.id(), packet.opcode());

        match packet {
            ClientPacket::Login(request) => self.login(session, request).await,
            ClientPacket::UserInfo => self.send_user_info(session).await,
            ClientPacket::CreateRoom => self.room_handler.create_room(session).await,
            ClientPacket::SearchRoom(request) => {
                self.room_handler.search_room(session, request.room_number).await
            }
            ClientPacket::EnterRoom(request) => {
                self.room_handler.enter_room(session, request.room_number).await
            }
            ClientPacket::LeaveRoom(request) => {
                self.room_handler.leave_room(session, request.room_number).await
            }
            ClientPacket::RoomList => self.room_handler.room_list(session).await,
            ClientPacket::Ready(request) => {
                self.room_handler.set_ready(session, request.room_number, true).await
            }
            ClientPacket::ReadyCancel(request) => {
                self.room_handler.set_ready(session, request.room_number, false).await
            }
            ClientPacket::Matching => self.matching_handler.request_match(session).await,
            ClientPacket::CancelMatching => self.matching_handler.cancel_match(session).await,
            ClientPacket::TicTacToe(request) => self.game_handler.play_move(session, request).await,
            ClientPacket::Ping(probe) => {
                // 클라이언트가 보낸 타임스탬프를 그대로 돌려줌
                self.ctx
                    .messages
                    .send_to(session, &ServerPacket::Pong(probe))
                    .await
            }
            ClientPacket::Pong(probe) => {
                self.acknowledge(session, probe);
                Ok(())
            }
        }
    }

    /// 표시 이름을 바꾸고 세션 정보로 응답합니다.
    async fn login(&self, session: &Arc<Session>, request: LoginRequest) -> ServerResult<()> {
        let name = normalize_name(&request.name);
        info!("세션 {} 로그인: {:?}", session.id(), name);
        session.set_name(name);
        self.send_user_info(session).await
    }

    async fn send_user_info(&self, session: &Arc<Session>) -> ServerResult<()> {
        let response = UserInfoResponse {
            user_info: session.info(),
        };
        self.ctx
            .messages
            .send_to(session, &ServerPacket::UserInfo(response))
            .await
    }

    fn acknowledge(&self, session: &Session, probe: Probe) {
        let latency = session.acknowledge();
        self.ctx.heartbeat.record_acknowledgment(latency);
        debug!(
            "세션 {} Pong 수신 (timestamp={}, 지연={:?}ms)",
            session.id(),
            probe.timestamp,
            latency
        );
    }
}

/// 앞뒤 공백을 자르고 최대 길이로 줄입니다. 빈 이름은 `None`.
pub fn normalize_name(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(MAX_NAME_CHARS).collect())
}
