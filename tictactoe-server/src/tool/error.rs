//! 공통 에러 처리 시스템
//!
//! 세션 서버에서 발생하는 모든 에러를 분류하고 심각도에 맞게 로깅합니다.

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::game::MoveError;
use crate::service::{RoomId, SessionId};

/// 서버 에러 타입
///
/// 패킷 디코딩부터 전송 장애, 하트비트 타임아웃까지
/// 요청 처리 중 발생할 수 있는 모든 실패를 표현합니다.
#[derive(Debug, Clone, Error)]
pub enum ServerError {
    /// 해석할 수 없는 페이로드. 해당 메시지만 버리고 연결은 유지합니다.
    #[error("잘못된 페이로드: {0}")]
    MalformedPayload(String),

    /// 알 수 없는 opcode. 로그만 남기고 무시합니다.
    #[error("알 수 없는 opcode: {0}")]
    UnknownOpcode(i64),

    /// 길이 헤더가 허용 크기를 넘는 프레임
    #[error("프레임이 너무 큽니다: {len}바이트 (최대 {max}바이트)")]
    FrameTooLarge { len: usize, max: usize },

    /// 이미 사라진 방/세션을 참조한 요청
    #[error("{kind} {id}을(를) 찾을 수 없습니다")]
    ReferenceNotFound { kind: &'static str, id: u64 },

    /// 스트림 읽기/쓰기 실패 또는 상대방 종료
    #[error("전송 장애 [세션 {session_id:?}]: {message}")]
    TransportFault {
        session_id: Option<SessionId>,
        message: String,
    },

    /// 유예 시간 안에 Pong 응답이 없음
    #[error("하트비트 타임아웃 [세션 {0}]")]
    LivenessTimeout(SessionId),

    #[error("방 {0}이(가) 가득 찼습니다")]
    RoomFull(RoomId),

    /// 동시 접속 수 제한 초과. 새 연결을 받지 않고 바로 끊습니다.
    #[error("최대 접속 수 초과 (최대 {0})")]
    ConnectionLimit(usize),

    /// 세션이 요청을 처리할 수 없는 상태 (이미 대기 중이거나 입장한 상태 등)
    #[error("잘못된 상태 [세션 {session_id}]: {message}")]
    InvalidState {
        session_id: SessionId,
        message: String,
    },

    #[error("수 거부: {0}")]
    MoveRejected(#[from] MoveError),

    #[error("직렬화 에러: {0}")]
    Serialization(String),

    #[error("설정 에러 [키: {key}]: {message}")]
    Configuration { key: String, message: String },
}

impl ServerError {
    /// 방 참조 실패 에러 생성
    pub fn room_not_found(room_id: RoomId) -> Self {
        Self::ReferenceNotFound {
            kind: "방",
            id: u64::from(room_id),
        }
    }

    /// 전송 장애 에러 생성
    pub fn transport(session_id: Option<SessionId>, message: impl Into<String>) -> Self {
        Self::TransportFault {
            session_id,
            message: message.into(),
        }
    }

    /// 상태 에러 생성
    pub fn invalid_state(session_id: SessionId, message: impl Into<String>) -> Self {
        Self::InvalidState {
            session_id,
            message: message.into(),
        }
    }

    /// 연결을 끊어야 하는 에러인지 여부
    ///
    /// 디코딩 실패나 참조 실패는 요청 하나만 실패시킵니다.
    /// 스트림을 더 이상 신뢰할 수 없는 경우에만 연결을 종료합니다.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::TransportFault { .. }
                | Self::LivenessTimeout(_)
                | Self::FrameTooLarge { .. }
                | Self::ConnectionLimit(_)
        )
    }
}

/// 결과 타입 별칭
pub type ServerResult<T> = Result<T, ServerError>;

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::TransportFault {
            session_id: None,
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for ServerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// 에러 심각도 레벨
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// 정상 동작 중 예상 가능한 상황 (예: 이미 사라진 방 조회)
    Info,
    /// 요청 하나가 실패했지만 연결은 유지됨
    Warning,
    /// 연결 하나가 종료됨
    Error,
    /// 서버 전체에 영향
    Critical,
}

/// 에러 핸들러
///
/// 모든 에러를 한 곳에서 로깅합니다. 컴포넌트와 작업 이름을 함께 남겨
/// 로그만으로 어느 경로에서 실패했는지 추적할 수 있게 합니다.
pub struct ErrorHandler;

impl ErrorHandler {
    /// 에러를 심각도에 맞는 로그 레벨로 기록합니다.
    ///
    /// # Arguments
    ///
    /// * `error` - 처리할 에러
    /// * `severity` - 에러 심각도
    /// * `component` - 에러가 발생한 컴포넌트 (예: "RoomHandler")
    /// * `operation` - 에러가 발생한 작업 (예: "enter_room")
    pub fn handle_error(
        error: &ServerError,
        severity: ErrorSeverity,
        component: &str,
        operation: &str,
    ) {
        let log_message = format!("[{}] [{}] {}", component, operation, error);

        match severity {
            ErrorSeverity::Info => info!("{}", log_message),
            ErrorSeverity::Warning => warn!("{}", log_message),
            ErrorSeverity::Error => error!("{}", log_message),
            ErrorSeverity::Critical => {
                error!("🚨 CRITICAL: {}", log_message);
            }
        }

        if let ServerError::TransportFault {
            session_id: Some(id),
            ..
        } = error
        {
            debug!("세션 {} 연결 정리 예정", id);
        }
    }

    /// 에러 종류에서 기본 심각도를 결정합니다.
    pub fn default_severity(error: &ServerError) -> ErrorSeverity {
        match error {
            ServerError::ReferenceNotFound { .. }
            | ServerError::UnknownOpcode(_)
            | ServerError::MoveRejected(_) => ErrorSeverity::Info,
            ServerError::MalformedPayload(_)
            | ServerError::RoomFull(_)
            | ServerError::ConnectionLimit(_)
            | ServerError::InvalidState { .. }
            | ServerError::Serialization(_) => ErrorSeverity::Warning,
            ServerError::TransportFault { .. }
            | ServerError::LivenessTimeout(_)
            | ServerError::FrameTooLarge { .. } => ErrorSeverity::Error,
            ServerError::Configuration { .. } => ErrorSeverity::Critical,
        }
    }

    /// 기본 심각도로 에러를 기록합니다.
    pub fn report(error: &ServerError, component: &str, operation: &str) {
        Self::handle_error(error, Self::default_severity(error), component, operation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ServerError::room_not_found(7);
        let display = error.to_string();
        assert!(display.contains("방 7"));

        let error = ServerError::FrameTooLarge { len: 70_000, max: 65_536 };
        assert!(error.to_string().contains("70000"));
    }

    #[test]
    fn test_fatal_classification() {
        assert!(ServerError::transport(Some(1), "reset").is_fatal());
        assert!(ServerError::LivenessTimeout(1).is_fatal());
        assert!(!ServerError::MalformedPayload("x".to_string()).is_fatal());
        assert!(!ServerError::room_not_found(1).is_fatal());
        assert!(!ServerError::from(MoveError::CellOccupied(4)).is_fatal());
    }

    #[test]
    fn test_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "연결 리셋");
        match ServerError::from(io_error) {
            ServerError::TransportFault { message, .. } => assert!(message.contains("연결 리셋")),
            other => panic!("잘못된 에러 변환: {:?}", other),
        }

        let json_error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(matches!(ServerError::from(json_error), ServerError::Serialization(_)));
    }

    #[test]
    fn test_default_severity() {
        assert_eq!(
            ErrorHandler::default_severity(&ServerError::UnknownOpcode(99)),
            ErrorSeverity::Info
        );
        assert_eq!(
            ErrorHandler::default_severity(&ServerError::LivenessTimeout(3)),
            ErrorSeverity::Error
        );

        // 로깅 경로 자체가 패닉 없이 동작하는지 확인
        for severity in [
            ErrorSeverity::Info,
            ErrorSeverity::Warning,
            ErrorSeverity::Error,
            ErrorSeverity::Critical,
        ] {
            ErrorHandler::handle_error(
                &ServerError::transport(Some(1), "test"),
                severity,
                "test_component",
                "test_operation",
            );
        }
    }
}
