//! 틱택토 세션 서버 환경 설정 모듈
//!
//! .env 파일과 시스템 환경변수에서 설정을 로드하고 관리합니다.

use anyhow::Result;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::protocol::{DEFAULT_MAX_FRAME_BYTES, FRAME_HEADER_LEN};
use crate::tool::error::{ServerError, ServerResult};

/// 세션 서버 설정 구조체
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP 서버 호스트 주소
    pub host: String,
    /// TCP 서버 포트 번호
    pub port: u16,
    /// Ping 전송 간격
    pub heartbeat_interval: Duration,
    /// Ping 이후 Pong을 기다리는 유예 시간
    pub heartbeat_grace: Duration,
    /// 동시 접속 최대 수
    pub max_connections: usize,
    /// 프레임 하나의 최대 페이로드 크기
    pub max_frame_bytes: usize,
    /// 차례/빈 칸/좌석 검증 여부
    pub strict_moves: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            heartbeat_interval: Duration::from_secs(10),
            heartbeat_grace: Duration::from_secs(5),
            max_connections: 1000,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            strict_moves: true,
        }
    }
}

impl ServerConfig {
    /// 환경변수에서 설정을 로드합니다.
    ///
    /// 로드 순서:
    /// 1. 현재 디렉토리의 .env 파일
    /// 2. 상위 디렉토리의 .env 파일
    /// 3. 시스템 환경변수
    /// 4. 기본값
    pub fn from_env() -> Result<Self> {
        Self::load_env_file();

        let defaults = Self::default();
        let config = Self {
            host: std::env::var("tcp_host").unwrap_or(defaults.host),
            port: read_var("tcp_port", defaults.port),
            heartbeat_interval: Duration::from_secs(read_var(
                "heartbeat_interval_secs",
                defaults.heartbeat_interval.as_secs(),
            )),
            heartbeat_grace: Duration::from_secs(read_var(
                "heartbeat_grace_secs",
                defaults.heartbeat_grace.as_secs(),
            )),
            max_connections: read_var("max_connections", defaults.max_connections),
            max_frame_bytes: read_var("max_frame_bytes", defaults.max_frame_bytes),
            strict_moves: read_var("strict_moves", defaults.strict_moves),
        };

        info!("세션 서버 설정 로드 완료: {:?}", config);
        Ok(config)
    }

    /// 하트비트 주기만 바꾼 설정 (테스트에서 짧은 주기를 쓸 때 사용)
    pub fn with_heartbeat(mut self, interval: Duration, grace: Duration) -> Self {
        self.heartbeat_interval = interval;
        self.heartbeat_grace = grace;
        self
    }

    /// TCP 서버 바인딩 주소를 반환합니다.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// .env 파일을 로드합니다.
    fn load_env_file() {
        let env_paths = [".env", "../.env"];

        let mut loaded = false;
        for path in env_paths {
            if Path::new(path).exists() && dotenv::from_filename(path).is_ok() {
                info!(".env 파일 로드 성공: {}", path);
                loaded = true;
                break;
            }
        }

        if !loaded {
            warn!(".env 파일을 찾을 수 없습니다. 기본값과 시스템 환경변수를 사용합니다.");
        }
    }
}

/// 환경변수를 읽어 파싱합니다. 없거나 파싱에 실패하면 기본값을 씁니다.
fn read_var<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + std::fmt::Debug,
{
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warn!("환경변수 {}={} 파싱 실패, 기본값 {:?} 사용", key, raw, default);
                default
            }
        },
        Err(_) => default,
    }
}

/// 설정 검증 유틸리티
///
/// # Errors
///
/// * `ServerError::Configuration` - 잘못된 값을 가진 환경변수 키와 사유
pub fn validate_config(config: &ServerConfig) -> ServerResult<()> {
    if config.port == 0 {
        return Err(invalid("tcp_port", format!("유효하지 않은 TCP 포트 번호: {}", config.port)));
    }

    if config.host.is_empty() {
        return Err(invalid("tcp_host", "TCP 호스트 주소가 비어있습니다"));
    }

    if config.heartbeat_interval.is_zero() {
        return Err(invalid("heartbeat_interval_secs", "하트비트 간격은 0보다 커야 합니다"));
    }

    if config.heartbeat_grace.is_zero() {
        return Err(invalid("heartbeat_grace_secs", "하트비트 유예 시간은 0보다 커야 합니다"));
    }

    if config.max_connections == 0 {
        return Err(invalid("max_connections", "최대 접속 수는 0보다 커야 합니다"));
    }

    if config.max_frame_bytes <= FRAME_HEADER_LEN {
        return Err(invalid(
            "max_frame_bytes",
            format!("유효하지 않은 최대 프레임 크기: {}", config.max_frame_bytes),
        ));
    }

    if config.max_frame_bytes > u32::MAX as usize {
        return Err(invalid(
            "max_frame_bytes",
            format!("최대 프레임 크기가 길이 헤더 범위를 넘습니다: {}", config.max_frame_bytes),
        ));
    }

    info!("설정 검증 완료");
    Ok(())
}

fn invalid(key: &str, message: impl Into<String>) -> ServerError {
    ServerError::Configuration {
        key: key.to_string(),
        message: message.into(),
    }
}
