//! 매칭 서비스
//!
//! 대기 중인 세션을 도착 순서대로 두 명씩 짝지어 방을 만듭니다.
//! 짝지은 두 세션이 받는 방 상태 알림이 매칭 성공의 유일한 신호입니다.
//!
//! 매칭 알림은 대기열 잠금을 쥔 채로 보냅니다. 연결 해제는 방을 정리하기 전에
//! 대기열 잠금을 거치므로, 남은 세션은 항상 Matching 알림을 받은 뒤에 LeaveRoom을 받습니다.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::protocol::{MatchedResponse, ServerPacket};
use crate::service::connection_service::{Presence, Session, SessionId};
use crate::service::message_service::MessageService;
use crate::service::room_service::RoomService;
use crate::tool::error::{ServerError, ServerResult};

/// 매칭 서비스
pub struct MatchmakingService {
    pool: Mutex<VecDeque<Arc<Session>>>,
}

impl Default for MatchmakingService {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchmakingService {
    pub fn new() -> Self {
        Self {
            pool: Mutex::new(VecDeque::new()),
        }
    }

    /// 세션을 대기열 끝에 넣고, 두 명 이상 모이면 앞에서부터 짝을 짓습니다.
    ///
    /// 대기열 잠금을 쥔 채로 방 잠금을 잡고 (잠금 순서: 대기열 → 방),
    /// 방 잠금을 놓은 뒤 대기열 잠금 안에서 두 세션에 Matching 알림을 보냅니다.
    ///
    /// # Returns
    ///
    /// 새로 만들어진 방 수
    ///
    /// # Errors
    ///
    /// * `ServerError::InvalidState` - 이미 대기 중이거나 방에 입장한 세션
    pub async fn request_match(
        &self,
        session: &Arc<Session>,
        rooms: &RoomService,
        messages: &MessageService,
    ) -> ServerResult<usize> {
        let mut pool = self.pool.lock().await;
        if !session.transition(Presence::Idle, Presence::Waiting) {
            return Err(ServerError::invalid_state(
                session.id(),
                "이미 대기 중이거나 방에 입장한 상태입니다",
            ));
        }
        pool.push_back(session.clone());
        info!("🔍 세션 {} 매칭 대기 (대기 {}명)", session.id(), pool.len());

        // 닫힌 세션은 짝짓기 전에 제외
        pool.retain(|waiting| !waiting.is_closed());

        let mut matched = 0;
        while pool.len() >= 2 {
            let (Some(first), Some(second)) = (pool.pop_front(), pool.pop_front()) else {
                break;
            };
            first.set_matching(true);
            second.set_matching(true);

            let room = rooms.create_room_with([first.clone(), second.clone()]).await;

            first.set_matching(false);
            second.set_matching(false);
            info!(
                "🤝 세션 {} / {} 매칭 완료 → 방 {}",
                first.id(),
                second.id(),
                room.room_number
            );
            messages
                .broadcast(&[first, second], &ServerPacket::Matching(MatchedResponse { room }))
                .await;
            matched += 1;
        }
        Ok(matched)
    }

    /// 대기열에서 세션을 뺍니다.
    ///
    /// 이미 짝지어지는 중(`matching`)이거나 대기열에 없으면 `false`.
    pub async fn cancel_match(&self, session: &Session) -> bool {
        let mut pool = self.pool.lock().await;
        if session.is_matching() {
            debug!("세션 {} 매칭 진행 중이라 취소 불가", session.id());
            return false;
        }

        let Some(position) = pool.iter().position(|waiting| waiting.id() == session.id()) else {
            return false;
        };
        pool.remove(position);
        session.transition(Presence::Waiting, Presence::Idle);
        info!("세션 {} 매칭 취소 (대기 {}명)", session.id(), pool.len());
        true
    }

    /// 연결이 끊긴 세션을 대기열에서 제거합니다.
    pub async fn remove(&self, session_id: SessionId) -> bool {
        let mut pool = self.pool.lock().await;
        let Some(position) = pool.iter().position(|waiting| waiting.id() == session_id) else {
            return false;
        };
        if let Some(session) = pool.remove(position) {
            session.transition(Presence::Waiting, Presence::Idle);
        }
        debug!("세션 {} 대기열에서 제거", session_id);
        true
    }

    pub async fn waiting_count(&self) -> usize {
        self.pool.lock().await.len()
    }

    /// 대기 중인 세션 id (도착 순서)
    pub async fn waiting_ids(&self) -> Vec<SessionId> {
        self.pool.lock().await.iter().map(|s| s.id()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::io::DuplexStream;

    use crate::protocol::DEFAULT_MAX_FRAME_BYTES;

    /// 세션과 그 상대편 스트림. 스트림을 살려 둬야 알림 전송이 성공합니다.
    fn session(id: SessionId) -> (Arc<Session>, DuplexStream) {
        let (writer, client) = tokio::io::duplex(4096);
        let session = Arc::new(Session::new(id, format!("test-{}", id), Box::new(writer)));
        (session, client)
    }

    async fn matched_user_ids(client: &mut DuplexStream) -> Vec<SessionId> {
        match ServerPacket::read_from_stream(client, DEFAULT_MAX_FRAME_BYTES).await {
            Ok(ServerPacket::Matching(response)) => response
                .room
                .users
                .iter()
                .map(|user| user.connect_number)
                .collect(),
            other => panic!("Matching 알림이 아님: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_pairs_in_arrival_order() {
        let matchmaking = MatchmakingService::new();
        let rooms = RoomService::new(true);
        let messages = MessageService::new();
        let (sessions, mut clients): (Vec<_>, Vec<_>) = (1..=4).map(session).unzip();

        let mut matched = 0;
        for s in &sessions {
            matched += matchmaking.request_match(s, &rooms, &messages).await.unwrap();
        }

        assert_eq!(matched, 2);
        assert_eq!(matched_user_ids(&mut clients[0]).await, vec![1, 2]);
        assert_eq!(matched_user_ids(&mut clients[1]).await, vec![1, 2]);
        assert_eq!(matched_user_ids(&mut clients[2]).await, vec![3, 4]);
        assert_eq!(matched_user_ids(&mut clients[3]).await, vec![3, 4]);
        assert_eq!(matchmaking.waiting_count().await, 0);
        assert_eq!(rooms.room_count().await, 2);

        for s in &sessions {
            assert!(matches!(s.presence(), Presence::Seated(_)));
            assert!(!s.is_matching());
        }
    }

    #[tokio::test]
    async fn test_duplicate_request_rejected() {
        let matchmaking = MatchmakingService::new();
        let rooms = RoomService::new(true);
        let messages = MessageService::new();
        let (a, _client) = session(1);

        assert_eq!(matchmaking.request_match(&a, &rooms, &messages).await.unwrap(), 0);
        assert!(matchmaking.request_match(&a, &rooms, &messages).await.is_err());
        assert_eq!(matchmaking.waiting_ids().await, vec![1]);
    }

    #[tokio::test]
    async fn test_cancel_match() {
        let matchmaking = MatchmakingService::new();
        let rooms = RoomService::new(true);
        let messages = MessageService::new();
        let (a, _client) = session(1);

        assert!(!matchmaking.cancel_match(&a).await);
        matchmaking.request_match(&a, &rooms, &messages).await.unwrap();

        a.set_matching(true);
        assert!(!matchmaking.cancel_match(&a).await);
        a.set_matching(false);

        assert!(matchmaking.cancel_match(&a).await);
        assert_eq!(a.presence(), Presence::Idle);
        assert_eq!(matchmaking.waiting_count().await, 0);
    }

    #[tokio::test]
    async fn test_closed_sessions_are_skipped() {
        let matchmaking = MatchmakingService::new();
        let rooms = RoomService::new(true);
        let messages = MessageService::new();
        let (a, _a_client) = session(1);
        let (b, mut b_client) = session(2);
        let (c, _c_client) = session(3);

        matchmaking.request_match(&a, &rooms, &messages).await.unwrap();
        a.close("test").await;
        matchmaking.request_match(&b, &rooms, &messages).await.unwrap();
        let matched = matchmaking.request_match(&c, &rooms, &messages).await.unwrap();

        assert_eq!(matched, 1);
        assert_eq!(matched_user_ids(&mut b_client).await, vec![2, 3]);
        assert!(!matchmaking.remove(a.id()).await);
    }
}
