//! 연결 핸들러
//!
//! 연결 하나의 전체 수명을 처리합니다.
//!
//! 1. 세션 등록
//! 2. 하트비트 작업 시작
//! 3. 읽기 루프: 바이트를 모아 완성된 프레임을 도착 순서대로 처리
//! 4. 종료: 세션을 닫고, 하트비트 작업을 join 한 뒤 공유 구조에서 제거

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info, warn};

use crate::handler::message_handler::MessageHandler;
use crate::protocol::FrameDecoder;
use crate::service::{HeartbeatService, ServerContext, Session, SessionWriter};
use crate::tool::error::{ServerError, ServerResult};

/// 연결 핸들러
pub struct ConnectionHandler {
    ctx: Arc<ServerContext>,
    router: MessageHandler,
}

impl ConnectionHandler {
    pub fn new(ctx: Arc<ServerContext>) -> Self {
        Self {
            router: MessageHandler::new(ctx.clone()),
            ctx,
        }
    }

    pub fn context(&self) -> &Arc<ServerContext> {
        &self.ctx
    }

    /// 새 연결을 처리합니다. 연결이 끝나고 정리가 완료되면 반환합니다.
    ///
    /// # Arguments
    ///
    /// * `reader` - 연결의 읽기 스트림
    /// * `writer` - 연결의 쓰기 스트림 (세션이 소유)
    /// * `addr` - 로그용 상대 주소
    ///
    /// # Errors
    ///
    /// * `ServerError::ConnectionLimit` - 최대 접속 수 초과로 등록하지 못한 경우
    /// * `ServerError::TransportFault` - 읽기 실패
    /// * `ServerError::FrameTooLarge` - 길이 헤더가 최대 크기를 넘은 경우
    pub async fn handle_connection<R>(
        &self,
        reader: R,
        writer: SessionWriter,
        addr: String,
    ) -> ServerResult<()>
    where
        R: AsyncRead + Unpin + Send,
    {
        let session = self.ctx.sessions.register(addr, writer).await?;
        let heartbeat = HeartbeatService::spawn(self.ctx.clone(), session.clone());

        let result = self.read_loop(&session, reader).await;
        let reason = match &result {
            Ok(()) => ServerError::transport(
                Some(session.id()),
                session
                    .close_reason()
                    .unwrap_or_else(|| "연결 종료".to_string()),
            ),
            Err(e) => e.clone(),
        };

        session.close(reason.to_string()).await;
        if let Err(e) = heartbeat.await {
            warn!("세션 {} 하트비트 작업 비정상 종료: {}", session.id(), e);
        }
        self.ctx.disconnect(&session, &reason).await;
        result
    }

    /// 스트림이 끝나거나 세션이 닫힐 때까지 프레임을 읽어 처리합니다.
    async fn read_loop<R>(&self, session: &Arc<Session>, mut reader: R) -> ServerResult<()>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut decoder = FrameDecoder::new(self.ctx.config.max_frame_bytes);
        let mut closed = session.subscribe_closed();

        loop {
            while let Some(frame) = decoder.next_frame()? {
                self.router.handle_frame(session, &frame).await?;
                if session.is_closed() {
                    return Ok(());
                }
            }

            let read = tokio::select! {
                read = reader.read_buf(decoder.buffer_mut()) => read,
                _ = async { closed.wait_for(|closed| *closed).await.is_ok() } => return Ok(()),
            };

            match read {
                Ok(0) => {
                    info!("세션 {} 상대방이 연결을 종료했습니다", session.id());
                    return Ok(());
                }
                Ok(n) => debug!("세션 {} {}바이트 수신", session.id(), n),
                Err(e) => return Err(ServerError::transport(Some(session.id()), e.to_string())),
            }
        }
    }
}
