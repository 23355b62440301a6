//! 방 관리 핸들러
//!
//! 방 생성, 검색, 입장, 퇴장, 목록, 준비 요청을 처리합니다.

use std::sync::Arc;

use tracing::{debug, info};

use crate::protocol::{
    RoomListResponse, RoomResponse, SearchRoomResponse, ServerPacket,
};
use crate::service::{RoomId, ServerContext, Session};
use crate::tool::error::{ErrorHandler, ServerResult};

/// 방 관리 핸들러
pub struct RoomHandler {
    ctx: Arc<ServerContext>,
}

impl RoomHandler {
    pub fn new(ctx: Arc<ServerContext>) -> Self {
        Self { ctx }
    }

    /// 새로운 방 생성
    ///
    /// 방을 만들고 요청한 세션을 첫 번째 플레이어로 입장시킵니다.
    ///
    /// # Arguments
    ///
    /// * `session` - 요청한 세션
    ///
    /// # Returns
    ///
    /// * `ServerResult<()>` - 응답 전송 결과. 방 생성 실패는 `success=false` 응답으로 알립니다.
    pub async fn create_room(&self, session: &Arc<Session>) -> ServerResult<()> {
        let response = match self.ctx.rooms.create_room_for(session).await {
            Ok(room) => RoomResponse {
                success: true,
                room: Some(room),
            },
            Err(e) => {
                ErrorHandler::report(&e, "RoomHandler", "create_room");
                RoomResponse {
                    success: false,
                    room: None,
                }
            }
        };

        self.ctx
            .messages
            .send_to(session, &ServerPacket::CreateRoom(response))
            .await
    }

    /// 방 검색
    ///
    /// 방이 없으면 `existRoom=false`로 응답합니다.
    pub async fn search_room(&self, session: &Arc<Session>, room_id: RoomId) -> ServerResult<()> {
        let room = self.ctx.rooms.get_room(room_id).await;
        debug!("세션 {} 방 {} 검색: {}", session.id(), room_id, room.is_some());

        let response = SearchRoomResponse {
            room_number: room_id,
            exist_room: room.is_some(),
            roominfo: room,
        };
        self.ctx
            .messages
            .send_to(session, &ServerPacket::SearchRoom(response))
            .await
    }

    /// 방 입장
    ///
    /// 성공하면 갱신된 방 상태를 모든 인원에게 보내고,
    /// 실패하면 요청한 세션에만 `success=false`로 응답합니다.
    ///
    /// # Arguments
    ///
    /// * `session` - 입장할 세션
    /// * `room_id` - 입장할 방 번호
    pub async fn enter_room(&self, session: &Arc<Session>, room_id: RoomId) -> ServerResult<()> {
        match self.ctx.rooms.enter_room(session, room_id).await {
            Ok(delivery) => {
                self.ctx.messages.deliver(vec![delivery]).await;
                Ok(())
            }
            Err(e) => {
                ErrorHandler::report(&e, "RoomHandler", "enter_room");
                let response = RoomResponse {
                    success: false,
                    room: None,
                };
                self.ctx
                    .messages
                    .send_to(session, &ServerPacket::EnterRoom(response))
                    .await
            }
        }
    }

    /// 방 퇴장
    ///
    /// 이미 사라진 방이면 알림 없이 끝냅니다.
    pub async fn leave_room(&self, session: &Arc<Session>, room_id: RoomId) -> ServerResult<()> {
        match self.ctx.rooms.leave_room(session, room_id).await {
            Ok(delivery) => {
                self.ctx.messages.deliver(vec![delivery]).await;
            }
            Err(e) => ErrorHandler::report(&e, "RoomHandler", "leave_room"),
        }
        Ok(())
    }

    /// 전체 방 목록
    pub async fn room_list(&self, session: &Arc<Session>) -> ServerResult<()> {
        let room_list = self.ctx.rooms.room_list().await;
        debug!("세션 {} 방 목록 요청: {}개", session.id(), room_list.len());
        self.ctx
            .messages
            .send_to(session, &ServerPacket::RoomList(RoomListResponse { room_list }))
            .await
    }

    /// 준비 / 준비 해제
    ///
    /// 변경 사항은 방 인원 전체에 알리고, 두 명 모두 준비되면 Start를 보냅니다.
    pub async fn set_ready(
        &self,
        session: &Arc<Session>,
        room_id: RoomId,
        ready: bool,
    ) -> ServerResult<()> {
        match self.ctx.rooms.set_ready(session, room_id, ready).await {
            Ok(deliveries) => {
                if deliveries.len() > 1 {
                    info!("방 {} 모든 플레이어 준비 완료", room_id);
                }
                self.ctx.messages.deliver(deliveries).await;
            }
            Err(e) => ErrorHandler::report(&e, "RoomHandler", "set_ready"),
        }
        Ok(())
    }
}
