//! 세션 서버 시나리오 테스트 모듈
//!
//! 각 기능별로 분리된 테스트 파일들을 관리합니다.
//! 모든 테스트는 메모리 duplex 스트림 위에서 실제 핸들러를 그대로 사용합니다.


use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;

use crate::config::ServerConfig;
use crate::handler::{ConnectionHandler, MessageHandler};
use crate::protocol::{ClientPacket, Probe, ServerPacket, DEFAULT_MAX_FRAME_BYTES};
use crate::service::{ServerContext, Session, SessionId};
use crate::tool::error::ServerResult;

/// 응답 대기 최대 시간
pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// 테스트용 컨텍스트 생성
pub fn create_test_context() -> Arc<ServerContext> {
    create_context_with(ServerConfig::default())
}

pub fn create_context_with(config: ServerConfig) -> Arc<ServerContext> {
    Arc::new(ServerContext::new(config))
}

/// 레지스트리에 직접 등록한 세션과 그 상대편 스트림
///
/// 읽기 루프와 하트비트 없이 핸들러를 직접 호출하는 테스트에 사용합니다.
pub struct TestClient {
    pub session: Arc<Session>,
    stream: DuplexStream,
}

impl TestClient {
    pub fn id(&self) -> SessionId {
        self.session.id()
    }

    /// 다음 패킷을 받습니다. 서버 Ping은 건너뜁니다.
    pub async fn recv(&mut self) -> ServerPacket {
        recv_skipping_ping(&mut self.stream).await
    }

    /// 주어진 시간 안에 패킷이 오지 않아야 합니다.
    pub async fn assert_silent(&mut self, wait: Duration) {
        let result = tokio::time::timeout(
            wait,
            ServerPacket::read_from_stream(&mut self.stream, DEFAULT_MAX_FRAME_BYTES),
        )
        .await;
        if let Ok(Ok(packet)) = result {
            panic!("세션 {}이 예상하지 못한 패킷을 받음: {:?}", self.id(), packet);
        }
    }
}

pub async fn connect_test_client(ctx: &ServerContext) -> TestClient {
    connect_test_client_with_buffer(ctx, 64 * 1024).await
}

/// 버퍼 크기를 정한 테스트 클라이언트. 작은 버퍼는 읽기 전까지 서버 쓰기를 막습니다.
pub async fn connect_test_client_with_buffer(ctx: &ServerContext, buffer: usize) -> TestClient {
    let (server_end, client_end) = tokio::io::duplex(buffer);
    let session = ctx
        .sessions
        .register("duplex-test".to_string(), Box::new(server_end))
        .await
        .expect("세션 등록 실패");
    TestClient {
        session,
        stream: client_end,
    }
}

/// 연결 핸들러 전체(읽기 루프 + 하트비트)를 거치는 클라이언트
pub struct WireClient {
    stream: DuplexStream,
    pub task: JoinHandle<ServerResult<()>>,
}

impl WireClient {
    pub async fn send(&mut self, packet: &ClientPacket) {
        packet
            .write_to_stream(&mut self.stream)
            .await
            .expect("패킷 전송 실패");
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.expect("바이트 전송 실패");
        self.stream.flush().await.expect("flush 실패");
    }

    /// 다음 패킷을 받습니다. 서버 Ping은 응답하지 않고 건너뜁니다.
    pub async fn recv(&mut self) -> ServerPacket {
        recv_skipping_ping(&mut self.stream).await
    }

    /// UserInfo로 자신의 세션 id를 알아냅니다.
    pub async fn session_id(&mut self) -> SessionId {
        self.send(&ClientPacket::UserInfo).await;
        match self.recv().await {
            ServerPacket::UserInfo(response) => response.user_info.connect_number,
            other => panic!("UserInfo 응답이 아님: {:?}", other),
        }
    }

    /// 주어진 시간 동안 서버 Ping에 Pong으로 응답합니다.
    pub async fn answer_pings_for(&mut self, duration: Duration) -> usize {
        let deadline = tokio::time::Instant::now() + duration;
        let mut answered = 0;
        loop {
            let read = tokio::time::timeout_at(
                deadline,
                ServerPacket::read_from_stream(&mut self.stream, DEFAULT_MAX_FRAME_BYTES),
            )
            .await;
            match read {
                Ok(Ok(ServerPacket::Ping(probe))) => {
                    self.send(&ClientPacket::Pong(Probe {
                        timestamp: probe.timestamp,
                    }))
                    .await;
                    answered += 1;
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => panic!("연결이 끊김: {}", e),
                Err(_) => return answered,
            }
        }
    }

    /// 서버가 연결을 닫을 때까지 읽습니다. 시간 안에 닫히면 `true`.
    pub async fn wait_closed(&mut self, within: Duration) -> bool {
        let stream = &mut self.stream;
        let drained = async {
            while ServerPacket::read_from_stream(&mut *stream, DEFAULT_MAX_FRAME_BYTES)
                .await
                .is_ok()
            {}
        };
        tokio::time::timeout(within, drained).await.is_ok()
    }
}

pub fn spawn_wire_client(handler: Arc<ConnectionHandler>) -> WireClient {
    spawn_wire_client_with_buffer(handler, 64 * 1024)
}

/// 전송 버퍼 크기를 지정합니다. 작은 버퍼로 읽지 않는 상대를 흉내 냅니다.
pub fn spawn_wire_client_with_buffer(handler: Arc<ConnectionHandler>, buffer: usize) -> WireClient {
    let (client_end, server_end) = tokio::io::duplex(buffer);
    let (reader, writer) = tokio::io::split(server_end);
    let task = tokio::spawn(async move {
        handler
            .handle_connection(reader, Box::new(writer), "duplex-wire".to_string())
            .await
    });
    WireClient {
        stream: client_end,
        task,
    }
}

async fn recv_skipping_ping(stream: &mut DuplexStream) -> ServerPacket {
    loop {
        let packet = tokio::time::timeout(
            RECV_TIMEOUT,
            ServerPacket::read_from_stream(&mut *stream, DEFAULT_MAX_FRAME_BYTES),
        )
        .await
        .expect("응답 대기 시간 초과")
        .expect("패킷 읽기 실패");
        if !matches!(packet, ServerPacket::Ping(_)) {
            return packet;
        }
    }
}

/// 조건이 참이 될 때까지 짧게 기다리며 확인합니다.
pub async fn eventually<F, Fut>(within: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + within;
    loop {
        if condition().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// 테스트용 라우터
pub fn create_router(ctx: &Arc<ServerContext>) -> MessageHandler {
    MessageHandler::new(ctx.clone())
}
