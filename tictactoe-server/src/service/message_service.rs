//! 메시지 전송 서비스
//!
//! 패킷을 한 번만 직렬화해서 세션 하나 또는 방 인원 전체에 보냅니다.
//! 전송에 실패한 세션은 즉시 닫히고, 해당 연결의 읽기 루프가 정리를 이어받습니다.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::protocol::ServerPacket;
use crate::service::connection_service::Session;
use crate::tool::error::{ErrorHandler, ServerResult};

/// 잠금 밖에서 보낼 알림
///
/// 수신자와 내용은 상태를 바꾼 잠금 안에서 정해지고,
/// 실제 전송은 잠금을 놓은 뒤에 이루어집니다.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub recipients: Vec<Arc<Session>>,
    pub packet: ServerPacket,
}

impl Delivery {
    pub fn to_all(recipients: Vec<Arc<Session>>, packet: ServerPacket) -> Self {
        Self { recipients, packet }
    }
}

/// 전송 통계
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub messages_sent: u64,
    pub send_failures: u64,
    pub broadcasts: u64,
}

/// 메시지 서비스
#[derive(Default)]
pub struct MessageService {
    messages_sent: AtomicU64,
    send_failures: AtomicU64,
    broadcasts: AtomicU64,
}

impl MessageService {
    pub fn new() -> Self {
        Self::default()
    }

    /// 세션 하나에 패킷을 보냅니다.
    ///
    /// 전송에 실패하면 세션을 닫고 에러를 반환합니다.
    pub async fn send_to(&self, session: &Session, packet: &ServerPacket) -> ServerResult<()> {
        let frame = packet.to_frame().map_err(|e| {
            ErrorHandler::report(&e, "MessageService", "encode");
            e
        })?;
        self.send_frame(session, &frame, packet).await
    }

    /// 여러 세션에 같은 패킷을 보냅니다. 전송에 성공한 수를 반환합니다.
    pub async fn broadcast(&self, recipients: &[Arc<Session>], packet: &ServerPacket) -> usize {
        let frame = match packet.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                ErrorHandler::report(&e, "MessageService", "encode");
                return 0;
            }
        };

        self.broadcasts.fetch_add(1, Ordering::Relaxed);
        let mut delivered = 0;
        for session in recipients {
            if self.send_frame(session, &frame, packet).await.is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// 알림 목록을 순서대로 보냅니다.
    pub async fn deliver(&self, deliveries: Vec<Delivery>) {
        for delivery in deliveries {
            self.broadcast(&delivery.recipients, &delivery.packet).await;
        }
    }

    async fn send_frame(
        &self,
        session: &Session,
        frame: &[u8],
        packet: &ServerPacket,
    ) -> ServerResult<()> {
        match session.send_frame(frame).await {
            Ok(()) => {
                self.messages_sent.fetch_add(1, Ordering::Relaxed);
                debug!("세션 {}에 {:?} 전송", session.id(), packet.opcode());
                Ok(())
            }
            Err(e) => {
                self.send_failures.fetch_add(1, Ordering::Relaxed);
                if !session.is_closed() {
                    warn!("세션 {} 전송 실패, 연결 종료: {}", session.id(), e);
                    session.close(e.to_string()).await;
                }
                Err(e)
            }
        }
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Probe, DEFAULT_MAX_FRAME_BYTES};

    #[tokio::test]
    async fn test_broadcast_skips_closed_sessions() {
        let (w1, mut c1) = tokio::io::duplex(1024);
        let (w2, _c2) = tokio::io::duplex(1024);
        let open = Arc::new(Session::new(1, "a".to_string(), Box::new(w1)));
        let closed = Arc::new(Session::new(2, "b".to_string(), Box::new(w2)));
        closed.close("test").await;

        let service = MessageService::new();
        let packet = ServerPacket::Ping(Probe { timestamp: 7 });
        let delivered = service.broadcast(&[open.clone(), closed.clone()], &packet).await;
        assert_eq!(delivered, 1);

        let received = ServerPacket::read_from_stream(&mut c1, DEFAULT_MAX_FRAME_BYTES)
            .await
            .unwrap();
        assert_eq!(received, packet);

        let stats = service.stats();
        assert_eq!(stats.messages_sent, 1);
        assert_eq!(stats.send_failures, 1);
        assert_eq!(stats.broadcasts, 1);
    }

    #[tokio::test]
    async fn test_send_failure_closes_session() {
        let (writer, client) = tokio::io::duplex(1024);
        let session = Session::new(1, "a".to_string(), Box::new(writer));
        drop(client);

        let service = MessageService::new();
        let result = service
            .send_to(&session, &ServerPacket::Ping(Probe::default()))
            .await;
        assert!(result.is_err());
        assert!(session.is_closed());
    }
}
