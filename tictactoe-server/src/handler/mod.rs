//! 세션 서버 핸들러 레이어
//!
//! 연결의 읽기 루프와 opcode별 요청 처리를 담당합니다.
//! 상태 변경은 서비스 레이어에 맡기고, 핸들러는 응답을 만들어 보냅니다.

pub mod connection_handler;
pub mod game_handler;
pub mod matching_handler;
pub mod message_handler;
pub mod room_handler;

pub use connection_handler::ConnectionHandler;
pub use game_handler::GameHandler;
pub use matching_handler::MatchingHandler;
pub use message_handler::MessageHandler;
pub use room_handler::RoomHandler;
