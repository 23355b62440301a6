//! 틱택토 세션 서버 라이브러리
//!
//! 두 명이 겨루는 "사라지는 말" 틱택토를 위한 실시간 세션 서버입니다.
//!
//! # 주요 기능
//!
//! - **연결 관리**: 연결마다 세션을 만들고 전역 레지스트리에 등록
//! - **매칭**: 도착 순서대로 두 명씩 짝지어 방 생성
//! - **방 관리**: 입장/퇴장, 준비 상태, 게임 시작
//! - **게임 진행**: 수 검증, 오래된 말 제거, 승자 판정
//! - **하트비트**: 세션별 Ping/Pong으로 끊긴 연결 정리
//! - **프로토콜**: 4바이트 길이 헤더 + JSON 메시지
//!
//! # 아키텍처
//!
//! ```text
//! Session Server
//! ├── Service Layer (공유 상태)
//! │   ├── ServerContext (레지스트리/대기열/방 묶음)
//! │   ├── SessionRegistry (세션 관리)
//! │   ├── MatchmakingService (매칭 대기열)
//! │   ├── RoomService (방과 게임)
//! │   ├── HeartbeatService (생존 확인)
//! │   ├── MessageService (전송)
//! │   └── TcpGameService (리스너)
//! ├── Handler Layer (요청 처리)
//! │   ├── ConnectionHandler (읽기 루프)
//! │   ├── MessageHandler (opcode 라우팅)
//! │   ├── RoomHandler / MatchingHandler / GameHandler
//! ├── Game (보드, 규칙, 승자 판정)
//! ├── Tool Layer (에러, 시간 유틸)
//! └── Protocol (패킷, 프레임)
//! ```
//!
//! # 사용 예시
//!
//! ```text
//! let ctx = Arc::new(ServerContext::new(ServerConfig::from_env()?));
//! let server = TcpGameService::bind(ctx).await?;
//! server.run_until(async { let _ = tokio::signal::ctrl_c().await; }).await?;
//! ```

/// 환경 설정 관리
pub mod config;

/// 게임 규칙
///
/// 보드, 수 검증, 오래된 말 제거, 승자 판정을 담당합니다.
pub mod game;

/// 패킷 프로토콜 정의
pub mod protocol;

/// 서비스 레이어
///
/// 세션 레지스트리, 매칭 대기열, 방 테이블 등 공유 상태를 관리합니다.
pub mod service;

/// 요청 처리 핸들러 레이어
pub mod handler;

/// 공통 유틸리티 도구들
pub mod tool;

/// 시나리오 테스트 모듈
#[cfg(test)]
mod tests;

pub use config::{validate_config, ServerConfig};
pub use game::{GameBoard, MoveError, MoveRules};
pub use handler::ConnectionHandler;
pub use protocol::{ClientPacket, FrameDecoder, Opcode, ServerPacket};
pub use service::{ServerContext, TcpGameService};
pub use tool::{ServerError, ServerResult, SimpleUtils};
