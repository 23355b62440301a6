//! 세션 서버 서비스 레이어
//!
//! 공유 상태를 소유하고 변경하는 서비스들을 정의합니다.
//!
//! # 서비스 구조
//!
//! ```text
//! Service Layer
//! ├── ServerContext (공유 상태 묶음, 연결 해제 경로)
//! ├── SessionRegistry (세션 등록/해제/조회)      ─ 잠금 1
//! ├── MatchmakingService (FIFO 매칭 대기열)       ─ 잠금 2
//! ├── RoomService (방 생명주기, 준비 상태, 게임)  ─ 잠금 3
//! ├── HeartbeatService (세션별 생존 확인)
//! ├── MessageService (직렬화 후 전송/브로드캐스트)
//! └── TcpGameService (리스너, 연결 수락 루프)
//! ```
//!
//! 여러 잠금이 필요한 작업은 항상 1 → 2 → 3 순서로 잡습니다.
//! 세션 상태와 writer 잠금은 말단 잠금입니다.

/// 연결 관리 서비스
///
/// 세션의 상태, 쓰기 스트림, 종료 신호와 전역 레지스트리를 관리합니다.
pub mod connection_service;

/// 하트비트 관리 서비스
///
/// 세션마다 Ping을 보내고 응답이 없는 연결을 정리합니다.
pub mod heartbeat_service;

/// 매칭 대기열 서비스
pub mod matchmaking_service;

/// 방 관리 서비스
///
/// 방 테이블과 게임 진행을 하나의 잠금으로 직렬화합니다.
pub mod room_service;

/// 메시지 전송 서비스
pub mod message_service;

/// TCP 서버 서비스
pub mod tcp_service;

/// 서버 컨텍스트
pub mod context;

pub use connection_service::{
    ConnectionStats, Presence, Session, SessionId, SessionRegistry, SessionWriter,
};
pub use context::ServerContext;
pub use heartbeat_service::{HeartbeatService, HeartbeatStats};
pub use matchmaking_service::MatchmakingService;
pub use message_service::{Delivery, DispatchStats, MessageService};
pub use room_service::{MoveDispatch, Room, RoomId, RoomService, ROOM_CAPACITY};
pub use tcp_service::{ServerStats, TcpGameService};
