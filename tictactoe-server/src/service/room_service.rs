//! 방 서비스
//!
//! 방 생성/조회/삭제와 입장, 퇴장, 준비 상태 전이, 게임 진행을 담당합니다.
//!
//! # 방 생명주기
//!
//! ```text
//! empty ──입장──▶ occupied ──준비 토글──▶ ready-pending ──모두 준비──▶ playing
//!   ▲                                                              │
//!   └────────────── 인원 0명 또는 승자 결정 시 삭제 ◀───────────────┘
//! ```
//!
//! 모든 방의 인원, 준비 상태, 보드 변경은 하나의 방 테이블 잠금으로 직렬화됩니다.
//! 알림 수신자와 내용은 잠금 안에서 [`Delivery`]로 만들어 반환하고,
//! 호출자는 잠금을 놓은 뒤에 전송합니다.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::game::{GameBoard, MoveError, MoveRules, PlayerNumber};
use crate::protocol::{
    LeaveRoomResponse, MoveRequest, MoveResponse, ReadyResponse, RoomResponse, RoomSnapshot,
    ServerPacket, SessionInfo, StartResponse, EMPTY_CELL,
};
use crate::service::connection_service::{Presence, Session, SessionId};
use crate::service::message_service::Delivery;
use crate::tool::error::{ServerError, ServerResult};

/// 방 식별자 (단조 증가, 재사용하지 않음)
pub type RoomId = u32;

/// 방 최대 인원
pub const ROOM_CAPACITY: usize = 2;

/// 게임 방
#[derive(Debug)]
pub struct Room {
    id: RoomId,
    occupants: Vec<Arc<Session>>,
    playing: bool,
    board: GameBoard,
}

impl Room {
    fn new(id: RoomId) -> Self {
        Self {
            id,
            occupants: Vec::with_capacity(ROOM_CAPACITY),
            playing: false,
            board: GameBoard::new(),
        }
    }

    pub fn id(&self) -> RoomId {
        self.id
    }

    pub fn occupants(&self) -> &[Arc<Session>] {
        &self.occupants
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_full(&self) -> bool {
        self.occupants.len() >= ROOM_CAPACITY
    }

    pub fn is_empty(&self) -> bool {
        self.occupants.is_empty()
    }

    /// 세션을 방에 추가합니다. 가득 찼거나 이미 있으면 `false`.
    pub fn add_user(&mut self, session: Arc<Session>) -> bool {
        if self.is_full() || self.seat_of(session.id()).is_some() {
            return false;
        }
        self.occupants.push(session);
        true
    }

    /// 세션을 방에서 제거합니다. 없는 세션이면 아무 일도 하지 않습니다.
    pub fn remove_user(&mut self, session_id: SessionId) -> Option<Arc<Session>> {
        let position = self.occupants.iter().position(|s| s.id() == session_id)?;
        Some(self.occupants.remove(position))
    }

    /// 입장 순서로 정해지는 플레이어 번호
    pub fn seat_of(&self, session_id: SessionId) -> Option<PlayerNumber> {
        self.occupants
            .iter()
            .position(|s| s.id() == session_id)
            .and_then(|seat| PlayerNumber::try_from(seat).ok())
    }

    /// 두 명이 모두 입장했고 모두 준비 상태인지
    pub fn all_ready(&self) -> bool {
        self.occupants.len() == ROOM_CAPACITY && self.occupants.iter().all(|s| s.is_ready())
    }

    /// 모두 준비됐으면 게임을 시작합니다. 이번 호출로 시작됐을 때만 `true`.
    fn try_start(&mut self) -> bool {
        if self.playing || !self.all_ready() {
            return false;
        }
        self.playing = true;
        self.board.reset();
        true
    }

    /// 진행 중인 게임을 중단하고 남은 인원의 준비 상태를 해제합니다.
    fn abort_game(&mut self) {
        self.playing = false;
        self.board.reset();
        for session in &self.occupants {
            session.set_ready(false);
        }
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        let mut board = [EMPTY_CELL; 9];
        for (slot, cell) in board.iter_mut().zip(self.board.cells().iter()) {
            *slot = cell.map(i32::from).unwrap_or(EMPTY_CELL);
        }

        RoomSnapshot {
            room_number: self.id,
            users: self.occupants.iter().map(|s| s.info()).collect(),
            is_playing: self.playing,
            board,
            player_select_queue: self.board.history().collect(),
        }
    }
}

/// 수 처리 결과
#[derive(Debug)]
pub enum MoveDispatch {
    /// 적용된 수. 방 인원 전체에 알림
    Applied(Delivery),
    /// 거부된 수. 요청한 세션에만 응답
    Rejected {
        response: MoveResponse,
        error: ServerError,
    },
}

struct RoomTable {
    rooms: BTreeMap<RoomId, Room>,
    next_room_id: RoomId,
}

impl RoomTable {
    fn allocate_id(&mut self) -> RoomId {
        let id = self.next_room_id;
        self.next_room_id += 1;
        id
    }

    /// 세션을 방에서 내보냅니다.
    ///
    /// 방이 비면 삭제하고, 게임 중이었다면 게임을 중단합니다.
    /// 남은 인원 목록을 반환합니다.
    fn depart(&mut self, room_id: RoomId, session: &Session) -> Option<Vec<Arc<Session>>> {
        let room = self.rooms.get_mut(&room_id)?;
        room.remove_user(session.id())?;
        session.with_state(|state| {
            state.ready = false;
            if state.presence == Presence::Seated(room_id) {
                state.presence = Presence::Idle;
            }
        });

        if room.is_empty() {
            self.rooms.remove(&room_id);
            info!("방 {} 삭제 (인원 없음)", room_id);
            return Some(Vec::new());
        }

        if room.is_playing() {
            room.abort_game();
            info!("방 {} 게임 중단: 세션 {} 퇴장", room_id, session.id());
        }
        Some(room.occupants.clone())
    }
}

/// 방 서비스
pub struct RoomService {
    table: Mutex<RoomTable>,
    strict_moves: bool,
}

impl RoomService {
    pub fn new(strict_moves: bool) -> Self {
        Self {
            table: Mutex::new(RoomTable {
                rooms: BTreeMap::new(),
                next_room_id: 1,
            }),
            strict_moves,
        }
    }

    /// 빈 방을 만듭니다.
    pub async fn create_room(&self) -> RoomSnapshot {
        let mut table = self.table.lock().await;
        let id = table.allocate_id();
        let room = Room::new(id);
        let snapshot = room.snapshot();
        table.rooms.insert(id, room);
        info!("방 {} 생성", id);
        snapshot
    }

    /// 방을 만들고 요청한 세션을 입장시킵니다.
    ///
    /// # Errors
    ///
    /// * `ServerError::InvalidState` - 세션이 대기 중이거나 이미 방에 있는 경우
    pub async fn create_room_for(&self, session: &Arc<Session>) -> ServerResult<RoomSnapshot> {
        let mut table = self.table.lock().await;
        let id = table.next_room_id;
        if !session.transition(Presence::Idle, Presence::Seated(id)) {
            return Err(ServerError::invalid_state(
                session.id(),
                "대기 중이거나 이미 방에 입장한 상태입니다",
            ));
        }
        table.allocate_id();
        session.set_ready(false);

        let mut room = Room::new(id);
        room.add_user(session.clone());
        let snapshot = room.snapshot();
        table.rooms.insert(id, room);

        info!("🏠 방 {} 생성, 세션 {} 입장", id, session.id());
        Ok(snapshot)
    }

    /// 매칭된 두 세션으로 방을 만듭니다. 대기열 잠금 안에서 호출됩니다.
    pub async fn create_room_with(&self, players: [Arc<Session>; 2]) -> RoomSnapshot {
        let mut table = self.table.lock().await;
        let id = table.allocate_id();
        let mut room = Room::new(id);
        for player in players {
            player.with_state(|state| {
                state.presence = Presence::Seated(id);
                state.ready = false;
            });
            room.add_user(player);
        }
        let snapshot = room.snapshot();
        table.rooms.insert(id, room);

        info!("🎮 매칭 방 {} 생성", id);
        snapshot
    }

    pub async fn get_room(&self, room_id: RoomId) -> Option<RoomSnapshot> {
        self.table.lock().await.rooms.get(&room_id).map(Room::snapshot)
    }

    /// 방을 삭제합니다. 남아 있던 세션은 방 밖으로 돌아갑니다.
    pub async fn remove_room(&self, room_id: RoomId) -> bool {
        let mut table = self.table.lock().await;
        let Some(room) = table.rooms.remove(&room_id) else {
            return false;
        };
        for session in &room.occupants {
            release_seat(session, room_id);
        }
        info!("방 {} 삭제", room_id);
        true
    }

    /// 세션을 방에 입장시킵니다. 갱신된 방 상태를 모든 인원에게 알립니다.
    ///
    /// # Errors
    ///
    /// * `ServerError::ReferenceNotFound` - 방이 없는 경우
    /// * `ServerError::RoomFull` - 방이 가득 찬 경우
    /// * `ServerError::InvalidState` - 세션이 대기 중이거나 이미 방에 있는 경우
    pub async fn enter_room(&self, session: &Arc<Session>, room_id: RoomId) -> ServerResult<Delivery> {
        let mut table = self.table.lock().await;
        let room = table
            .rooms
            .get_mut(&room_id)
            .ok_or_else(|| ServerError::room_not_found(room_id))?;
        if room.is_full() {
            return Err(ServerError::RoomFull(room_id));
        }
        if !session.transition(Presence::Idle, Presence::Seated(room_id)) {
            return Err(ServerError::invalid_state(
                session.id(),
                "대기 중이거나 이미 방에 입장한 상태입니다",
            ));
        }
        session.set_ready(false);
        room.add_user(session.clone());

        info!("세션 {} 방 {} 입장 ({}명)", session.id(), room_id, room.occupants.len());
        Ok(Delivery::to_all(
            room.occupants.clone(),
            ServerPacket::EnterRoom(RoomResponse {
                success: true,
                room: Some(room.snapshot()),
            }),
        ))
    }

    /// 요청에 의한 퇴장. 퇴장한 본인과 남은 인원 모두에게 알립니다.
    ///
    /// # Errors
    ///
    /// * `ServerError::ReferenceNotFound` - 방이 없거나 세션이 그 방에 없는 경우
    pub async fn leave_room(&self, session: &Arc<Session>, room_id: RoomId) -> ServerResult<Delivery> {
        let mut table = self.table.lock().await;
        let mut recipients = table
            .depart(room_id, session)
            .ok_or_else(|| ServerError::room_not_found(room_id))?;

        info!("세션 {} 방 {} 퇴장", session.id(), room_id);
        recipients.insert(0, session.clone());
        Ok(Delivery::to_all(
            recipients,
            leave_notice(room_id, session.info()),
        ))
    }

    /// 연결이 끊긴 세션을 앉아 있던 방에서 내보냅니다.
    ///
    /// 남은 인원이 있으면 퇴장 알림을 반환합니다.
    pub async fn remove_session(&self, session: &Arc<Session>) -> Option<Delivery> {
        let mut table = self.table.lock().await;
        let Presence::Seated(room_id) = session.presence() else {
            return None;
        };

        let remaining = table.depart(room_id, session)?;
        info!("연결 종료된 세션 {} 방 {}에서 제거", session.id(), room_id);
        if remaining.is_empty() {
            return None;
        }
        Some(Delivery::to_all(remaining, leave_notice(room_id, session.info())))
    }

    /// 준비 상태를 바꿉니다.
    ///
    /// 변경 사항을 방 인원 전체에 알리고, 준비 요청으로 두 명 모두 준비되면
    /// 게임을 시작하고 Start를 알립니다. 게임 중 준비 해제는 플래그만 바꿉니다.
    ///
    /// # Errors
    ///
    /// * `ServerError::ReferenceNotFound` - 방이 없거나 세션이 그 방에 없는 경우
    pub async fn set_ready(
        &self,
        session: &Arc<Session>,
        room_id: RoomId,
        ready: bool,
    ) -> ServerResult<Vec<Delivery>> {
        let mut table = self.table.lock().await;
        let room = table
            .rooms
            .get_mut(&room_id)
            .ok_or_else(|| ServerError::room_not_found(room_id))?;
        if room.seat_of(session.id()).is_none() {
            return Err(ServerError::room_not_found(room_id));
        }

        session.set_ready(ready);
        let notice = ReadyResponse {
            room_number: room_id,
            connect_number: session.id(),
            is_ready: ready,
        };
        let packet = if ready {
            ServerPacket::Ready(notice)
        } else {
            ServerPacket::ReadyCancel(notice)
        };

        let mut deliveries = vec![Delivery::to_all(room.occupants.clone(), packet)];
        debug!("세션 {} 방 {} 준비 상태: {}", session.id(), room_id, ready);

        if ready && room.try_start() {
            info!("▶️ 방 {} 게임 시작", room_id);
            deliveries.push(Delivery::to_all(
                room.occupants.clone(),
                ServerPacket::Start(StartResponse {
                    room_number: room_id,
                }),
            ));
        }
        Ok(deliveries)
    }

    /// 수를 처리합니다.
    ///
    /// 적용된 수는 두 플레이어 모두에게 같은 결과로 알리고,
    /// 승자가 나오면 방을 삭제합니다. 두 플레이어는 대기열에 자동으로 다시 들어가지 않습니다.
    pub async fn play_move(&self, session: &Arc<Session>, request: &MoveRequest) -> MoveDispatch {
        let mut table = self.table.lock().await;
        let room_id = request.room_number;
        let Some(room) = table.rooms.get_mut(&room_id) else {
            return reject(request, false, ServerError::room_not_found(room_id));
        };

        let playing = room.is_playing();
        let player = match self.resolve_player(room, session.id(), request.player) {
            Ok(player) => player,
            Err(e) => return reject(request, playing, e.into()),
        };
        if !playing {
            return reject(request, playing, MoveError::NotPlaying.into());
        }

        let rules = MoveRules::from_strict_flag(self.strict_moves);
        let outcome = match room.board.apply_move(request.index, player, rules) {
            Ok(outcome) => outcome,
            Err(e) => return reject(request, playing, e.into()),
        };

        let recipients = room.occupants.clone();
        let response = MoveResponse {
            room_number: room_id,
            index: outcome.index,
            player: i32::from(outcome.player),
            accepted: true,
            playing: outcome.winner.is_none(),
            winner: outcome.winner.map(i32::from).unwrap_or(EMPTY_CELL),
            delete: outcome.evicted.is_some(),
            delete_index: outcome
                .evicted
                .and_then(|index| i32::try_from(index).ok())
                .unwrap_or(EMPTY_CELL),
            reason: None,
        };

        debug!(
            "방 {} 플레이어 {} → 칸 {} (사라진 칸: {:?})",
            room_id, outcome.player, outcome.index, outcome.evicted
        );

        if let Some(winner) = outcome.winner {
            table.rooms.remove(&room_id);
            for occupant in &recipients {
                release_seat(occupant, room_id);
            }
            info!("🏆 방 {} 플레이어 {} 승리, 방 삭제", room_id, winner);
        }

        MoveDispatch::Applied(Delivery::to_all(recipients, ServerPacket::TicTacToe(response)))
    }

    /// 요청한 세션의 플레이어 번호를 정합니다.
    ///
    /// 엄격 모드에서는 좌석 번호를 쓰고 주장한 번호가 다르면 거부합니다.
    /// 느슨한 모드에서는 주장한 번호를 그대로 믿습니다.
    fn resolve_player(
        &self,
        room: &Room,
        session_id: SessionId,
        claimed: Option<i32>,
    ) -> Result<PlayerNumber, MoveError> {
        let seat = room.seat_of(session_id).ok_or(MoveError::NotAnOccupant)?;
        match claimed {
            None => Ok(seat),
            Some(claimed) if self.strict_moves => {
                if claimed == i32::from(seat) {
                    Ok(seat)
                } else {
                    Err(MoveError::PlayerMismatch { seat, claimed })
                }
            }
            Some(claimed) => match PlayerNumber::try_from(claimed) {
                Ok(player) if usize::from(player) < ROOM_CAPACITY => Ok(player),
                _ => Err(MoveError::InvalidPlayer(claimed)),
            },
        }
    }

    /// 전체 방 목록 (방 번호 순)
    pub async fn room_list(&self) -> Vec<RoomSnapshot> {
        self.table.lock().await.rooms.values().map(Room::snapshot).collect()
    }

    pub async fn room_count(&self) -> usize {
        self.table.lock().await.rooms.len()
    }
}

fn release_seat(session: &Session, room_id: RoomId) {
    session.with_state(|state| {
        state.ready = false;
        if state.presence == Presence::Seated(room_id) {
            state.presence = Presence::Idle;
        }
    });
}

fn leave_notice(room_id: RoomId, user_info: SessionInfo) -> ServerPacket {
    ServerPacket::LeaveRoom(LeaveRoomResponse {
        room_number: room_id,
        user_info,
    })
}

fn reject(request: &MoveRequest, playing: bool, error: ServerError) -> MoveDispatch {
    MoveDispatch::Rejected {
        response: MoveResponse::rejected(request, playing, error.to_string()),
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(id: SessionId) -> Arc<Session> {
        let (writer, _client) = tokio::io::duplex(1024);
        Arc::new(Session::new(id, format!("test-{}", id), Box::new(writer)))
    }

    #[tokio::test]
    async fn test_room_ids_are_never_reused() {
        let service = RoomService::new(true);
        let first = service.create_room().await.room_number;
        assert!(service.remove_room(first).await);
        assert!(!service.remove_room(first).await);
        let second = service.create_room().await.room_number;
        assert!(second > first);
        assert!(service.get_room(first).await.is_none());
        assert!(service.get_room(second).await.is_some());
    }

    #[test]
    fn test_room_occupancy_stays_bounded() {
        let mut room = Room::new(1);
        let a = session(1);
        let b = session(2);
        let c = session(3);

        assert!(room.add_user(a.clone()));
        assert!(!room.add_user(a.clone()));
        assert!(room.add_user(b.clone()));
        assert!(!room.add_user(c.clone()));
        assert_eq!(room.occupants().len(), 2);

        assert!(room.remove_user(c.id()).is_none());
        assert_eq!(room.occupants().len(), 2);
        assert!(room.remove_user(a.id()).is_some());
        assert_eq!(room.seat_of(b.id()), Some(0));
        assert!(room.remove_user(b.id()).is_some());
        assert!(room.remove_user(b.id()).is_none());
        assert!(room.is_empty());
    }

    #[tokio::test]
    async fn test_enter_and_leave() {
        let service = RoomService::new(true);
        let host = session(1);
        let guest = session(2);
        let late = session(3);

        let room_id = service.create_room_for(&host).await.unwrap().room_number;
        assert!(service.create_room_for(&host).await.is_err());

        let delivery = service.enter_room(&guest, room_id).await.unwrap();
        assert_eq!(delivery.recipients.len(), 2);
        assert!(matches!(
            service.enter_room(&late, room_id).await,
            Err(ServerError::RoomFull(_))
        ));
        assert!(matches!(
            service.enter_room(&late, 999).await,
            Err(ServerError::ReferenceNotFound { .. })
        ));

        let delivery = service.leave_room(&host, room_id).await.unwrap();
        let ids: Vec<_> = delivery.recipients.iter().map(|s| s.id()).collect();
        assert_eq!(ids, vec![host.id(), guest.id()]);
        assert_eq!(host.presence(), Presence::Idle);

        // 마지막 인원이 나가면 방 삭제
        service.leave_room(&guest, room_id).await.unwrap();
        assert!(service.get_room(room_id).await.is_none());
        assert!(service.leave_room(&guest, room_id).await.is_err());
    }

    #[tokio::test]
    async fn test_start_fires_once_when_both_ready() {
        let service = RoomService::new(true);
        let a = session(1);
        let b = session(2);
        let room_id = service.create_room_with([a.clone(), b.clone()]).await.room_number;

        let deliveries = service.set_ready(&a, room_id, true).await.unwrap();
        assert_eq!(deliveries.len(), 1);
        assert!(!service.get_room(room_id).await.unwrap().is_playing);

        let deliveries = service.set_ready(&b, room_id, true).await.unwrap();
        assert_eq!(deliveries.len(), 2);
        assert!(matches!(deliveries[1].packet, ServerPacket::Start(_)));
        assert!(service.get_room(room_id).await.unwrap().is_playing);

        // 게임 중 준비 해제 후 재준비: 게임은 그대로, Start 재전송 없음
        service.set_ready(&a, room_id, false).await.unwrap();
        assert!(service.get_room(room_id).await.unwrap().is_playing);
        let deliveries = service.set_ready(&a, room_id, true).await.unwrap();
        assert_eq!(deliveries.len(), 1);
    }

    #[tokio::test]
    async fn test_departure_aborts_game() {
        let service = RoomService::new(true);
        let a = session(1);
        let b = session(2);
        let room_id = service.create_room_with([a.clone(), b.clone()]).await.room_number;
        service.set_ready(&a, room_id, true).await.unwrap();
        service.set_ready(&b, room_id, true).await.unwrap();

        let request = MoveRequest { room_number: room_id, index: 4, player: Some(0) };
        assert!(matches!(service.play_move(&a, &request).await, MoveDispatch::Applied(_)));

        let notice = service.remove_session(&a).await.unwrap();
        assert_eq!(notice.recipients.len(), 1);
        assert_eq!(notice.recipients[0].id(), b.id());

        let snapshot = service.get_room(room_id).await.unwrap();
        assert!(!snapshot.is_playing);
        assert_eq!(snapshot.board, [EMPTY_CELL; 9]);
        assert!(!b.is_ready());
        assert!(service.remove_session(&a).await.is_none());
    }

    #[tokio::test]
    async fn test_rejections_in_strict_mode() {
        let service = RoomService::new(true);
        let a = session(1);
        let b = session(2);
        let outsider = session(3);
        let room_id = service.create_room_with([a.clone(), b.clone()]).await.room_number;

        let request = MoveRequest { room_number: room_id, index: 0, player: Some(0) };
        match service.play_move(&a, &request).await {
            MoveDispatch::Rejected { error, response } => {
                assert!(matches!(error, ServerError::MoveRejected(MoveError::NotPlaying)));
                assert!(!response.accepted);
            }
            other => panic!("거부되어야 함: {:?}", other),
        }

        service.set_ready(&a, room_id, true).await.unwrap();
        service.set_ready(&b, room_id, true).await.unwrap();

        // 차례가 아닌 플레이어
        let request = MoveRequest { room_number: room_id, index: 0, player: Some(1) };
        assert!(matches!(
            service.play_move(&b, &request).await,
            MoveDispatch::Rejected { error: ServerError::MoveRejected(MoveError::OutOfTurn { .. }), .. }
        ));

        // 좌석과 다른 번호를 주장
        let request = MoveRequest { room_number: room_id, index: 0, player: Some(1) };
        assert!(matches!(
            service.play_move(&a, &request).await,
            MoveDispatch::Rejected { error: ServerError::MoveRejected(MoveError::PlayerMismatch { .. }), .. }
        ));

        let request = MoveRequest { room_number: room_id, index: 0, player: None };
        assert!(matches!(
            service.play_move(&outsider, &request).await,
            MoveDispatch::Rejected { error: ServerError::MoveRejected(MoveError::NotAnOccupant), .. }
        ));

        let request = MoveRequest { room_number: room_id, index: 0, player: None };
        assert!(matches!(service.play_move(&a, &request).await, MoveDispatch::Applied(_)));
        let request = MoveRequest { room_number: room_id, index: 0, player: None };
        assert!(matches!(
            service.play_move(&b, &request).await,
            MoveDispatch::Rejected { error: ServerError::MoveRejected(MoveError::CellOccupied(0)), .. }
        ));
    }

    #[tokio::test]
    async fn test_loose_mode_trusts_claimed_player() {
        let service = RoomService::new(false);
        let a = session(1);
        let b = session(2);
        let room_id = service.create_room_with([a.clone(), b.clone()]).await.room_number;
        service.set_ready(&a, room_id, true).await.unwrap();
        service.set_ready(&b, room_id, true).await.unwrap();

        let request = MoveRequest { room_number: room_id, index: 4, player: Some(1) };
        match service.play_move(&a, &request).await {
            MoveDispatch::Applied(delivery) => match delivery.packet {
                ServerPacket::TicTacToe(response) => assert_eq!(response.player, 1),
                other => panic!("예상하지 못한 패킷: {:?}", other),
            },
            other => panic!("적용되어야 함: {:?}", other),
        }

        let request = MoveRequest { room_number: room_id, index: 5, player: Some(7) };
        assert!(matches!(
            service.play_move(&a, &request).await,
            MoveDispatch::Rejected { error: ServerError::MoveRejected(MoveError::InvalidPlayer(7)), .. }
        ));
    }

    #[tokio::test]
    async fn test_win_removes_room_and_frees_players() {
        let service = RoomService::new(true);
        let a = session(1);
        let b = session(2);
        let room_id = service.create_room_with([a.clone(), b.clone()]).await.room_number;
        service.set_ready(&a, room_id, true).await.unwrap();
        service.set_ready(&b, room_id, true).await.unwrap();

        let moves = [(&a, 0), (&b, 3), (&a, 1), (&b, 4)];
        for (player, index) in moves {
            let request = MoveRequest { room_number: room_id, index, player: None };
            assert!(matches!(service.play_move(player, &request).await, MoveDispatch::Applied(_)));
        }

        let request = MoveRequest { room_number: room_id, index: 2, player: None };
        match service.play_move(&a, &request).await {
            MoveDispatch::Applied(delivery) => {
                assert_eq!(delivery.recipients.len(), 2);
                match delivery.packet {
                    ServerPacket::TicTacToe(response) => {
                        assert_eq!(response.winner, 0);
                        assert!(!response.playing);
                    }
                    other => panic!("예상하지 못한 패킷: {:?}", other),
                }
            }
            other => panic!("적용되어야 함: {:?}", other),
        }

        assert!(service.get_room(room_id).await.is_none());
        assert_eq!(a.presence(), Presence::Idle);
        assert_eq!(b.presence(), Presence::Idle);
        assert!(!a.is_ready());
    }
}
