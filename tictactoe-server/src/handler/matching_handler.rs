//! 매칭 핸들러
//!
//! 매칭 요청과 매칭 취소를 처리합니다.

use std::sync::Arc;

use crate::protocol::{CancelMatchingResponse, ServerPacket};
use crate::service::{ServerContext, Session};
use crate::tool::error::{ErrorHandler, ServerResult};

/// 매칭 핸들러
pub struct MatchingHandler {
    ctx: Arc<ServerContext>,
}

impl MatchingHandler {
    pub fn new(ctx: Arc<ServerContext>) -> Self {
        Self { ctx }
    }

    /// 매칭 요청
    ///
    /// 요청한 세션에는 즉시 응답하지 않습니다.
    /// 짝이 지어지면 두 세션 모두 방 상태가 담긴 Matching 알림을 받습니다.
    pub async fn request_match(&self, session: &Arc<Session>) -> ServerResult<()> {
        let ctx = &self.ctx;
        if let Err(e) = ctx
            .matchmaking
            .request_match(session, &ctx.rooms, &ctx.messages)
            .await
        {
            ErrorHandler::report(&e, "MatchingHandler", "request_match");
        }
        Ok(())
    }

    /// 매칭 취소. 결과를 `isCancel`로 응답합니다.
    pub async fn cancel_match(&self, session: &Arc<Session>) -> ServerResult<()> {
        let is_cancel = self.ctx.matchmaking.cancel_match(session).await;
        self.ctx
            .messages
            .send_to(
                session,
                &ServerPacket::CancelMatching(CancelMatchingResponse { is_cancel }),
            )
            .await
    }
}
