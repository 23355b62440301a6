//! 연결 서비스
//!
//! 세션(연결 하나당 하나) 상태와 전역 세션 레지스트리를 관리합니다.
//!
//! 세션 상태 잠금(`parking_lot::Mutex`)과 writer 잠금은 말단 잠금입니다.
//! 레지스트리/대기열/방 잠금을 쥔 채로 잡을 수 있지만,
//! 이 잠금을 쥔 채로 다른 잠금을 잡거나 `.await` 하지 않습니다.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::protocol::SessionInfo;
use crate::service::room_service::RoomId;
use crate::tool::error::{ServerError, ServerResult};
use crate::tool::SimpleUtils;

/// 세션 식별자 (프로세스 내에서 단조 증가, 재사용하지 않음)
pub type SessionId = u64;

/// 세션이 소유하는 쓰기 스트림
pub type SessionWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// 세션의 위치. 세션은 항상 이 중 정확히 하나의 상태에 있습니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// 대기열에도 방에도 없음
    Idle,
    /// 매칭 대기열에서 대기 중
    Waiting,
    /// 방에 입장함
    Seated(RoomId),
}

/// 세션의 가변 상태
#[derive(Debug)]
pub struct SessionState {
    pub name: Option<String>,
    pub ready: bool,
    /// 대기열에서 꺼내져 방에 배정되는 중
    pub matching: bool,
    /// 마지막 Ping에 대한 Pong 수신 여부
    pub acknowledged: bool,
    /// 마지막 Ping 전송 시각 (Unix 밀리초)
    pub last_probe_ms: i64,
    pub latency_ms: Option<u64>,
    pub presence: Presence,
    pub close_reason: Option<String>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            name: None,
            ready: false,
            matching: false,
            acknowledged: true,
            last_probe_ms: 0,
            latency_ms: None,
            presence: Presence::Idle,
            close_reason: None,
        }
    }
}

/// 연결된 플레이어 한 명
pub struct Session {
    id: SessionId,
    addr: String,
    connected_at: Instant,
    state: parking_lot::Mutex<SessionState>,
    writer: Mutex<BufWriter<SessionWriter>>,
    closed: watch::Sender<bool>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("addr", &self.addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Session {
    pub fn new(id: SessionId, addr: String, writer: SessionWriter) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            id,
            addr,
            connected_at: Instant::now(),
            state: parking_lot::Mutex::new(SessionState::default()),
            writer: Mutex::new(BufWriter::new(writer)),
            closed,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn connected_at(&self) -> Instant {
        self.connected_at
    }

    /// 세션 상태 잠금 안에서 클로저를 실행합니다.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        f(&mut self.state.lock())
    }

    pub fn presence(&self) -> Presence {
        self.state.lock().presence
    }

    /// 현재 위치가 `from`일 때만 `to`로 바꿉니다.
    pub fn transition(&self, from: Presence, to: Presence) -> bool {
        let mut state = self.state.lock();
        if state.presence == from {
            state.presence = to;
            true
        } else {
            false
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state.lock().ready
    }

    pub fn set_ready(&self, ready: bool) {
        self.state.lock().ready = ready;
    }

    pub fn is_matching(&self) -> bool {
        self.state.lock().matching
    }

    pub fn set_matching(&self, matching: bool) {
        self.state.lock().matching = matching;
    }

    pub fn set_name(&self, name: Option<String>) {
        self.state.lock().name = name;
    }

    /// Ping 전송 직전에 호출합니다. 응답 플래그를 내리고 전송 시각을 기록합니다.
    pub fn begin_probe(&self) -> i64 {
        let now = SimpleUtils::current_timestamp_millis();
        let mut state = self.state.lock();
        state.acknowledged = false;
        state.last_probe_ms = now;
        now
    }

    /// Pong 수신 처리. 측정한 왕복 지연 시간을 반환합니다.
    pub fn acknowledge(&self) -> Option<u64> {
        let now = SimpleUtils::current_timestamp_millis();
        let mut state = self.state.lock();
        state.acknowledged = true;
        if state.last_probe_ms > 0 {
            state.latency_ms = Some(SimpleUtils::elapsed_millis(state.last_probe_ms, now));
        }
        state.latency_ms
    }

    pub fn is_acknowledged(&self) -> bool {
        self.state.lock().acknowledged
    }

    /// 와이어로 보낼 세션 정보
    pub fn info(&self) -> SessionInfo {
        let state = self.state.lock();
        SessionInfo {
            connect_number: self.id,
            name: state.name.clone(),
            is_ready: state.ready,
            is_matching: state.matching || state.presence == Presence::Waiting,
            has_ponged: state.acknowledged,
            ping_timestamp: state.last_probe_ms,
            latency_ms: state.latency_ms,
        }
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    pub fn close_reason(&self) -> Option<String> {
        self.state.lock().close_reason.clone()
    }

    /// 종료 신호 구독. 읽기 루프와 하트비트 작업이 이 신호로 깨어납니다.
    pub fn subscribe_closed(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }

    /// 길이 헤더가 붙은 프레임을 전송합니다.
    ///
    /// 잠금 대기와 쓰기 모두 종료 신호와 경쟁합니다. 상대가 읽지 않아 쓰기가 막혀도
    /// 세션이 닫히면 바로 에러로 빠져나옵니다.
    pub async fn send_frame(&self, frame: &[u8]) -> ServerResult<()> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow() {
            return Err(self.closed_error());
        }

        let mut writer = tokio::select! {
            writer = self.writer.lock() => writer,
            _ = async { closed.wait_for(|closed| *closed).await.is_ok() } => {
                return Err(self.closed_error());
            }
        };

        let written = tokio::select! {
            written = async {
                writer.write_all(frame).await?;
                writer.flush().await
            } => written,
            _ = async { closed.wait_for(|closed| *closed).await.is_ok() } => {
                return Err(self.closed_error());
            }
        };
        written.map_err(|e| ServerError::transport(Some(self.id), e.to_string()))
    }

    fn closed_error(&self) -> ServerError {
        ServerError::transport(Some(self.id), "이미 종료된 세션입니다")
    }

    /// 연결을 닫습니다. 처음 호출했을 때만 `true`를 반환합니다.
    pub async fn close(&self, reason: impl Into<String>) -> bool {
        let first = self.closed.send_if_modified(|closed| {
            if *closed {
                false
            } else {
                *closed = true;
                true
            }
        });
        if !first {
            return false;
        }

        let reason = reason.into();
        debug!("세션 {} 종료: {}", self.id, reason);
        self.state.lock().close_reason = Some(reason);

        // 쓰기 중인 작업은 종료 신호를 보고 잠금을 놓음. 스트림은 세션이 해제될 때 닫힘
        if let Ok(mut writer) = self.writer.try_lock() {
            if let Err(e) = writer.shutdown().await {
                debug!("세션 {} 스트림 종료 실패: {}", self.id, e);
            }
        }
        true
    }
}

/// 연결 통계
#[derive(Debug, Clone, Default)]
pub struct ConnectionStats {
    pub total_connections: u64,
    pub current_connections: usize,
    pub peak_connections: usize,
    pub rejected_connections: u64,
    pub timeout_disconnections: u64,
}

/// 전역 세션 레지스트리
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionId, Arc<Session>>>,
    next_session_id: AtomicU64,
    max_connections: usize,
    stats: parking_lot::Mutex<ConnectionStats>,
}

impl SessionRegistry {
    pub fn new(max_connections: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            next_session_id: AtomicU64::new(1),
            max_connections,
            stats: parking_lot::Mutex::new(ConnectionStats::default()),
        }
    }

    /// 새 연결에 세션을 만들고 등록합니다.
    ///
    /// # Errors
    ///
    /// * `ServerError::ConnectionLimit` - 최대 접속 수에 도달한 경우
    pub async fn register(&self, addr: String, writer: SessionWriter) -> ServerResult<Arc<Session>> {
        let mut sessions = self.sessions.lock().await;
        if sessions.len() >= self.max_connections {
            self.stats.lock().rejected_connections += 1;
            warn!("최대 연결 수 초과: {}/{} ({})", sessions.len(), self.max_connections, addr);
            return Err(ServerError::ConnectionLimit(self.max_connections));
        }

        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        let session = Arc::new(Session::new(id, addr, writer));
        sessions.insert(id, session.clone());

        let current = sessions.len();
        let mut stats = self.stats.lock();
        stats.total_connections += 1;
        stats.current_connections = current;
        stats.peak_connections = stats.peak_connections.max(current);
        drop(stats);

        info!("세션 {} 등록 ({}) - 현재 {}명", id, session.addr(), current);
        Ok(session)
    }

    /// 세션을 제거하고 연결을 닫습니다. 없는 세션이면 아무 일도 하지 않습니다.
    pub async fn unregister(&self, id: SessionId) -> Option<Arc<Session>> {
        let (removed, current) = {
            let mut sessions = self.sessions.lock().await;
            let removed = sessions.remove(&id);
            (removed, sessions.len())
        };

        let session = removed?;
        self.stats.lock().current_connections = current;
        session.close("세션 등록 해제").await;
        info!("세션 {} 등록 해제 - 현재 {}명", id, current);
        Some(session)
    }

    pub async fn lookup(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions.lock().await.get(&id).cloned()
    }

    pub async fn count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn all(&self) -> Vec<Arc<Session>> {
        self.sessions.lock().await.values().cloned().collect()
    }

    pub fn record_timeout(&self) {
        self.stats.lock().timeout_disconnections += 1;
    }

    pub fn stats(&self) -> ConnectionStats {
        self.stats.lock().clone()
    }
}
