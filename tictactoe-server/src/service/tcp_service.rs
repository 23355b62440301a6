//! TCP 서버 메인 서비스
//!
//! 리스너를 열고 연결을 받아 연결마다 작업을 띄웁니다.

use anyhow::{Context, Result};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::handler::ConnectionHandler;
use crate::service::context::ServerContext;
use crate::tool::error::ErrorHandler;

/// TCP 게임 서버 서비스
pub struct TcpGameService {
    ctx: Arc<ServerContext>,
    listener: TcpListener,
    handler: Arc<ConnectionHandler>,
    started_at: Instant,
}

impl TcpGameService {
    /// 설정의 주소로 리스너를 엽니다.
    pub async fn bind(ctx: Arc<ServerContext>) -> Result<Self> {
        let bind_addr = ctx.config.bind_address();
        let listener = TcpListener::bind(&bind_addr)
            .await
            .with_context(|| format!("TCP 리스너 바인드 실패: {}", bind_addr))?;

        info!("✅ TCP 서버가 {}에서 실행 중입니다", listener.local_addr()?);
        Ok(Self {
            handler: Arc::new(ConnectionHandler::new(ctx.clone())),
            ctx,
            listener,
            started_at: Instant::now(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn context(&self) -> &Arc<ServerContext> {
        &self.ctx
    }

    /// 연결 수락 루프. 리스너 에러가 나도 멈추지 않습니다.
    pub async fn run(&self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        warn!("TCP_NODELAY 설정 실패 ({}): {}", addr, e);
                    }
                    info!("새 클라이언트 연결: {}", addr);

                    let (reader, writer) = stream.into_split();
                    let handler = self.handler.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handler
                            .handle_connection(reader, Box::new(writer), addr.to_string())
                            .await
                        {
                            ErrorHandler::report(&e, "TcpGameService", "handle_connection");
                        }
                    });
                }
                Err(e) => {
                    error!("클라이언트 연결 수락 실패: {}", e);
                    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                }
            }
        }
    }

    /// 종료 신호가 올 때까지 연결을 받고, 이후 모든 세션을 정리합니다.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            result = self.run() => result?,
            _ = shutdown => info!("종료 신호 수신"),
        }

        self.ctx.shutdown().await;
        let stats = self.get_server_stats().await;
        info!("서버 통계: {}", serde_json::to_string(&stats)?);
        Ok(())
    }

    /// 서버 통계 조회
    pub async fn get_server_stats(&self) -> ServerStats {
        let connections = self.ctx.sessions.stats();
        let dispatch = self.ctx.messages.stats();
        let heartbeat = self.ctx.heartbeat.stats();

        ServerStats {
            connection_count: self.ctx.sessions.count().await,
            total_connections: connections.total_connections,
            peak_connections: connections.peak_connections,
            rejected_connections: connections.rejected_connections,
            timeout_disconnections: connections.timeout_disconnections,
            waiting_count: self.ctx.matchmaking.waiting_count().await,
            room_count: self.ctx.rooms.room_count().await,
            messages_sent: dispatch.messages_sent,
            send_failures: dispatch.send_failures,
            average_latency_ms: heartbeat.average_latency_ms,
            uptime_seconds: self.started_at.elapsed().as_secs(),
        }
    }
}

/// 서버 통계 정보
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ServerStats {
    pub connection_count: usize,
    pub total_connections: u64,
    pub peak_connections: usize,
    pub rejected_connections: u64,
    pub timeout_disconnections: u64,
    pub waiting_count: usize,
    pub room_count: usize,
    pub messages_sent: u64,
    pub send_failures: u64,
    pub average_latency_ms: f64,
    pub uptime_seconds: u64,
}
