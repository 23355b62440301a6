//! 게임 핸들러
//!
//! 틱택토 수 요청을 처리합니다.

use std::sync::Arc;

use tracing::debug;

use crate::protocol::{MoveRequest, ServerPacket};
use crate::service::{MoveDispatch, ServerContext, Session};
use crate::tool::error::{ErrorHandler, ServerResult};

/// 게임 핸들러
pub struct GameHandler {
    ctx: Arc<ServerContext>,
}

impl GameHandler {
    pub fn new(ctx: Arc<ServerContext>) -> Self {
        Self { ctx }
    }

    /// 수 처리
    ///
    /// 적용된 수는 두 플레이어에게 같은 결과로 보내고,
    /// 거부된 수는 요청한 세션에만 `accepted=false`와 사유를 보냅니다.
    ///
    /// # Arguments
    ///
    /// * `session` - 수를 둔 세션
    /// * `request` - 방 번호, 칸 번호, 주장하는 플레이어 번호
    pub async fn play_move(&self, session: &Arc<Session>, request: MoveRequest) -> ServerResult<()> {
        match self.ctx.rooms.play_move(session, &request).await {
            MoveDispatch::Applied(delivery) => {
                self.ctx.messages.deliver(vec![delivery]).await;
                Ok(())
            }
            MoveDispatch::Rejected { response, error } => {
                debug!("세션 {} 수 거부: {}", session.id(), error);
                ErrorHandler::report(&error, "GameHandler", "play_move");
                self.ctx
                    .messages
                    .send_to(session, &ServerPacket::TicTacToe(response))
                    .await
            }
        }
    }
}
