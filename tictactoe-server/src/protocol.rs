//! 틱택토 세션 프로토콜 정의
//!
//! 클라이언트와 서버 간 통신을 위한 메시지 프로토콜을 정의합니다.
//!
//! # 프로토콜 구조
//!
//! ```text
//! [4바이트 길이 헤더 (big-endian u32)][JSON 메시지 데이터]
//! ```
//!
//! JSON 메시지는 정수 `opcode` 필드와 opcode별 필드(camelCase)로 구성됩니다.
//! 모르는 필드는 무시하고, 모르는 opcode는 로그만 남기고 버립니다.
//!
//! TCP 스트림은 메시지 경계를 보장하지 않으므로 한 번의 read에
//! 메시지가 0개, 1개 또는 여러 개의 조각으로 들어올 수 있습니다.
//! [`FrameDecoder`]가 길이 헤더를 기준으로 완성된 프레임만 꺼내 줍니다.
//!
//! ```text
//! let frame = ClientPacket::Matching.to_frame()?;
//! decoder.extend(&frame[..3]);     // 조각
//! decoder.next_frame()?;           // Ok(None)
//! decoder.extend(&frame[3..]);
//! decoder.next_frame()?;           // Ok(Some(payload))
//! ```

use bytes::{Buf, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::tool::error::{ServerError, ServerResult};

/// 길이 헤더 크기
pub const FRAME_HEADER_LEN: usize = 4;

/// 기본 최대 프레임 크기 (64KiB)
pub const DEFAULT_MAX_FRAME_BYTES: usize = 64 * 1024;

/// 메시지 종류를 구분하는 정수 태그
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Login,
    UserInfo,
    CreateRoom,
    SearchRoom,
    EnterRoom,
    LeaveRoom,
    RoomList,
    Ready,
    Start,
    ReadyCancel,
    Matching,
    CancelMatching,
    TicTacToe,
    Ping,
    Pong,
}

impl Opcode {
    /// 모든 opcode 목록
    pub const ALL: [Opcode; 15] = [
        Opcode::Login,
        Opcode::UserInfo,
        Opcode::CreateRoom,
        Opcode::SearchRoom,
        Opcode::EnterRoom,
        Opcode::LeaveRoom,
        Opcode::RoomList,
        Opcode::Ready,
        Opcode::Start,
        Opcode::ReadyCancel,
        Opcode::Matching,
        Opcode::CancelMatching,
        Opcode::TicTacToe,
        Opcode::Ping,
        Opcode::Pong,
    ];

    /// 와이어 상의 정수 값
    pub fn code(self) -> i64 {
        match self {
            Opcode::Login => 0,
            Opcode::UserInfo => 1,
            Opcode::CreateRoom => 10,
            Opcode::SearchRoom => 12,
            Opcode::EnterRoom => 13,
            Opcode::LeaveRoom => 14,
            Opcode::RoomList => 15,
            Opcode::Ready => 21,
            Opcode::Start => 22,
            Opcode::ReadyCancel => 23,
            Opcode::Matching => 30,
            Opcode::CancelMatching => 31,
            Opcode::TicTacToe => 40,
            Opcode::Ping => 50,
            Opcode::Pong => 51,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|opcode| opcode.code() == code)
    }
}

/// 세션 정보 (UserInfo 응답, 방 상태에 포함)
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub connect_number: u64,
    pub name: Option<String>,
    pub is_ready: bool,
    pub is_matching: bool,
    pub has_ponged: bool,
    /// 마지막 Ping 전송 시각 (Unix 밀리초)
    pub ping_timestamp: i64,
    /// 마지막으로 측정한 왕복 지연 시간
    pub latency_ms: Option<u64>,
}

/// 방 전체 상태
///
/// `board`의 각 칸은 플레이어 번호, 빈 칸은 -1 입니다.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub room_number: u32,
    pub users: Vec<SessionInfo>,
    pub is_playing: bool,
    pub board: [i32; 9],
    pub player_select_queue: Vec<usize>,
}

/// 빈 칸을 나타내는 와이어 값
pub const EMPTY_CELL: i32 = -1;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub name: String,
}

/// 방 번호 하나만 담는 요청 (SearchRoom, EnterRoom, LeaveRoom, Ready, ReadyCancel)
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoomRequest {
    pub room_number: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MoveRequest {
    pub room_number: u32,
    pub index: usize,
    /// 클라이언트가 주장하는 플레이어 번호. 엄격 모드에서는 좌석과 일치해야 합니다.
    #[serde(default)]
    pub player: Option<i32>,
}

/// Ping/Pong 공용 본문
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Probe {
    #[serde(default)]
    pub timestamp: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserInfoResponse {
    pub user_info: SessionInfo,
}

/// 방 생성/입장 응답
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoomResponse {
    pub success: bool,
    pub room: Option<RoomSnapshot>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SearchRoomResponse {
    pub room_number: u32,
    pub exist_room: bool,
    pub roominfo: Option<RoomSnapshot>,
}

/// 퇴장 알림. 퇴장한 본인과 남은 상대 모두에게 전송됩니다.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LeaveRoomResponse {
    pub room_number: u32,
    pub user_info: SessionInfo,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoomListResponse {
    pub room_list: Vec<RoomSnapshot>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReadyResponse {
    pub room_number: u32,
    pub connect_number: u64,
    pub is_ready: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub room_number: u32,
}

/// 매칭 성공 알림. 짝지어진 두 세션이 받는 유일한 신호입니다.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MatchedResponse {
    pub room: RoomSnapshot,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CancelMatchingResponse {
    pub is_cancel: bool,
}

/// 수 처리 결과
///
/// `winner`, `delete_index`는 해당 없을 때 -1 입니다.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MoveResponse {
    pub room_number: u32,
    pub index: usize,
    pub player: i32,
    pub accepted: bool,
    pub playing: bool,
    pub winner: i32,
    pub delete: bool,
    pub delete_index: i32,
    #[serde(default)]
    pub reason: Option<String>,
}

impl MoveResponse {
    /// 거부된 수에 대한 응답 (요청한 본인에게만 전송)
    pub fn rejected(request: &MoveRequest, playing: bool, reason: impl Into<String>) -> Self {
        Self {
            room_number: request.room_number,
            index: request.index,
            player: request.player.unwrap_or(EMPTY_CELL),
            accepted: false,
            playing,
            winner: EMPTY_CELL,
            delete: false,
            delete_index: EMPTY_CELL,
            reason: Some(reason.into()),
        }
    }
}

/// 클라이언트 → 서버 패킷
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientPacket {
    Login(LoginRequest),
    UserInfo,
    CreateRoom,
    SearchRoom(RoomRequest),
    EnterRoom(RoomRequest),
    LeaveRoom(RoomRequest),
    RoomList,
    Ready(RoomRequest),
    ReadyCancel(RoomRequest),
    Matching,
    CancelMatching,
    TicTacToe(MoveRequest),
    /// 클라이언트가 보내는 Ping (서버는 Pong으로 응답)
    Ping(Probe),
    /// 서버 Ping에 대한 응답
    Pong(Probe),
}

impl ClientPacket {
    pub fn opcode(&self) -> Opcode {
        match self {
            ClientPacket::Login(_) => Opcode::Login,
            ClientPacket::UserInfo => Opcode::UserInfo,
            ClientPacket::CreateRoom => Opcode::CreateRoom,
            ClientPacket::SearchRoom(_) => Opcode::SearchRoom,
            ClientPacket::EnterRoom(_) => Opcode::EnterRoom,
            ClientPacket::LeaveRoom(_) => Opcode::LeaveRoom,
            ClientPacket::RoomList => Opcode::RoomList,
            ClientPacket::Ready(_) => Opcode::Ready,
            ClientPacket::ReadyCancel(_) => Opcode::ReadyCancel,
            ClientPacket::Matching => Opcode::Matching,
            ClientPacket::CancelMatching => Opcode::CancelMatching,
            ClientPacket::TicTacToe(_) => Opcode::TicTacToe,
            ClientPacket::Ping(_) => Opcode::Ping,
            ClientPacket::Pong(_) => Opcode::Pong,
        }
    }

    /// JSON 본문으로 직렬화합니다 (길이 헤더 제외).
    pub fn encode(&self) -> ServerResult<Vec<u8>> {
        let opcode = self.opcode();
        match self {
            ClientPacket::Login(body) => encode_body(opcode, body),
            ClientPacket::SearchRoom(body)
            | ClientPacket::EnterRoom(body)
            | ClientPacket::LeaveRoom(body)
            | ClientPacket::Ready(body)
            | ClientPacket::ReadyCancel(body) => encode_body(opcode, body),
            ClientPacket::TicTacToe(body) => encode_body(opcode, body),
            ClientPacket::Ping(body) | ClientPacket::Pong(body) => encode_body(opcode, body),
            ClientPacket::UserInfo
            | ClientPacket::CreateRoom
            | ClientPacket::RoomList
            | ClientPacket::Matching
            | ClientPacket::CancelMatching => encode_empty(opcode),
        }
    }

    /// JSON 본문에서 패킷을 복원합니다.
    ///
    /// # Errors
    ///
    /// * `ServerError::MalformedPayload` - JSON이 아니거나 필드가 맞지 않는 경우
    /// * `ServerError::UnknownOpcode` - opcode가 없거나 서버 전용 opcode인 경우
    pub fn decode(payload: &[u8]) -> ServerResult<Self> {
        let (opcode, body) = split_envelope(payload)?;
        let packet = match opcode {
            Opcode::Login => ClientPacket::Login(decode_body(body)?),
            Opcode::UserInfo => ClientPacket::UserInfo,
            Opcode::CreateRoom => ClientPacket::CreateRoom,
            Opcode::SearchRoom => ClientPacket::SearchRoom(decode_body(body)?),
            Opcode::EnterRoom => ClientPacket::EnterRoom(decode_body(body)?),
            Opcode::LeaveRoom => ClientPacket::LeaveRoom(decode_body(body)?),
            Opcode::RoomList => ClientPacket::RoomList,
            Opcode::Ready => ClientPacket::Ready(decode_body(body)?),
            Opcode::ReadyCancel => ClientPacket::ReadyCancel(decode_body(body)?),
            Opcode::Matching => ClientPacket::Matching,
            Opcode::CancelMatching => ClientPacket::CancelMatching,
            Opcode::TicTacToe => ClientPacket::TicTacToe(decode_body(body)?),
            Opcode::Ping => ClientPacket::Ping(decode_body(body)?),
            Opcode::Pong => ClientPacket::Pong(decode_body(body)?),
            Opcode::Start => return Err(ServerError::UnknownOpcode(opcode.code())),
        };
        Ok(packet)
    }

    /// 길이 헤더가 붙은 프레임으로 직렬화합니다.
    pub fn to_frame(&self) -> ServerResult<Bytes> {
        encode_frame(&self.encode()?)
    }

    /// 스트림에 패킷을 씁니다.
    pub async fn write_to_stream<W>(&self, stream: &mut W) -> ServerResult<()>
    where
        W: AsyncWrite + Unpin,
    {
        let frame = self.to_frame()?;
        stream.write_all(&frame).await?;
        stream.flush().await?;
        Ok(())
    }
}

/// 서버 → 클라이언트 패킷
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerPacket {
    UserInfo(UserInfoResponse),
    CreateRoom(RoomResponse),
    SearchRoom(SearchRoomResponse),
    EnterRoom(RoomResponse),
    LeaveRoom(LeaveRoomResponse),
    RoomList(RoomListResponse),
    Ready(ReadyResponse),
    ReadyCancel(ReadyResponse),
    Start(StartResponse),
    Matching(MatchedResponse),
    CancelMatching(CancelMatchingResponse),
    TicTacToe(MoveResponse),
    /// 서버가 보내는 생존 확인
    Ping(Probe),
    /// 클라이언트 Ping에 대한 응답
    Pong(Probe),
}

impl ServerPacket {
    pub fn opcode(&self) -> Opcode {
        match self {
            ServerPacket::UserInfo(_) => Opcode::UserInfo,
            ServerPacket::CreateRoom(_) => Opcode::CreateRoom,
            ServerPacket::SearchRoom(_) => Opcode::SearchRoom,
            ServerPacket::EnterRoom(_) => Opcode::EnterRoom,
            ServerPacket::LeaveRoom(_) => Opcode::LeaveRoom,
            ServerPacket::RoomList(_) => Opcode::RoomList,
            ServerPacket::Ready(_) => Opcode::Ready,
            ServerPacket::ReadyCancel(_) => Opcode::ReadyCancel,
            ServerPacket::Start(_) => Opcode::Start,
            ServerPacket::Matching(_) => Opcode::Matching,
            ServerPacket::CancelMatching(_) => Opcode::CancelMatching,
            ServerPacket::TicTacToe(_) => Opcode::TicTacToe,
            ServerPacket::Ping(_) => Opcode::Ping,
            ServerPacket::Pong(_) => Opcode::Pong,
        }
    }

    /// JSON 본문으로 직렬화합니다 (길이 헤더 제외).
    pub fn encode(&self) -> ServerResult<Vec<u8>> {
        let opcode = self.opcode();
        match self {
            ServerPacket::UserInfo(body) => encode_body(opcode, body),
            ServerPacket::CreateRoom(body) | ServerPacket::EnterRoom(body) => {
                encode_body(opcode, body)
            }
            ServerPacket::SearchRoom(body) => encode_body(opcode, body),
            ServerPacket::LeaveRoom(body) => encode_body(opcode, body),
            ServerPacket::RoomList(body) => encode_body(opcode, body),
            ServerPacket::Ready(body) | ServerPacket::ReadyCancel(body) => {
                encode_body(opcode, body)
            }
            ServerPacket::Start(body) => encode_body(opcode, body),
            ServerPacket::Matching(body) => encode_body(opcode, body),
            ServerPacket::CancelMatching(body) => encode_body(opcode, body),
            ServerPacket::TicTacToe(body) => encode_body(opcode, body),
            ServerPacket::Ping(body) | ServerPacket::Pong(body) => encode_body(opcode, body),
        }
    }

    /// JSON 본문에서 패킷을 복원합니다.
    pub fn decode(payload: &[u8]) -> ServerResult<Self> {
        let (opcode, body) = split_envelope(payload)?;
        let packet = match opcode {
            Opcode::UserInfo => ServerPacket::UserInfo(decode_body(body)?),
            Opcode::CreateRoom => ServerPacket::CreateRoom(decode_body(body)?),
            Opcode::SearchRoom => ServerPacket::SearchRoom(decode_body(body)?),
            Opcode::EnterRoom => ServerPacket::EnterRoom(decode_body(body)?),
            Opcode::LeaveRoom => ServerPacket::LeaveRoom(decode_body(body)?),
            Opcode::RoomList => ServerPacket::RoomList(decode_body(body)?),
            Opcode::Ready => ServerPacket::Ready(decode_body(body)?),
            Opcode::ReadyCancel => ServerPacket::ReadyCancel(decode_body(body)?),
            Opcode::Start => ServerPacket::Start(decode_body(body)?),
            Opcode::Matching => ServerPacket::Matching(decode_body(body)?),
            Opcode::CancelMatching => ServerPacket::CancelMatching(decode_body(body)?),
            Opcode::TicTacToe => ServerPacket::TicTacToe(decode_body(body)?),
            Opcode::Ping => ServerPacket::Ping(decode_body(body)?),
            Opcode::Pong => ServerPacket::Pong(decode_body(body)?),
            Opcode::Login => return Err(ServerError::UnknownOpcode(opcode.code())),
        };
        Ok(packet)
    }

    /// 길이 헤더가 붙은 프레임으로 직렬화합니다.
    pub fn to_frame(&self) -> ServerResult<Bytes> {
        encode_frame(&self.encode()?)
    }

    /// 스트림에서 프레임 하나를 읽어 패킷으로 복원합니다.
    ///
    /// 테스트 클라이언트처럼 한 번에 한 메시지씩 기다리는 쪽에서 사용합니다.
    pub async fn read_from_stream<R>(stream: &mut R, max_frame_bytes: usize) -> ServerResult<Self>
    where
        R: AsyncRead + Unpin,
    {
        let mut length_bytes = [0u8; FRAME_HEADER_LEN];
        stream.read_exact(&mut length_bytes).await?;
        let length = u32::from_be_bytes(length_bytes) as usize;
        if length > max_frame_bytes {
            return Err(ServerError::FrameTooLarge {
                len: length,
                max: max_frame_bytes,
            });
        }

        let mut buffer = vec![0u8; length];
        stream.read_exact(&mut buffer).await?;
        Self::decode(&buffer)
    }
}

fn encode_body<T: Serialize>(opcode: Opcode, body: &T) -> ServerResult<Vec<u8>> {
    let mut value = serde_json::to_value(body)?;
    match value.as_object_mut() {
        Some(map) => {
            map.insert("opcode".to_string(), Value::from(opcode.code()));
        }
        None => {
            return Err(ServerError::Serialization(format!(
                "{:?} 본문이 JSON 객체가 아닙니다",
                opcode
            )))
        }
    }
    Ok(serde_json::to_vec(&value)?)
}

fn encode_empty(opcode: Opcode) -> ServerResult<Vec<u8>> {
    let mut map = Map::new();
    map.insert("opcode".to_string(), Value::from(opcode.code()));
    Ok(serde_json::to_vec(&Value::Object(map))?)
}

/// 봉투에서 opcode를 꺼내고 나머지 본문을 돌려줍니다.
fn split_envelope(payload: &[u8]) -> ServerResult<(Opcode, Value)> {
    let value: Value = serde_json::from_slice(payload)
        .map_err(|e| ServerError::MalformedPayload(e.to_string()))?;

    let code = value
        .as_object()
        .ok_or_else(|| ServerError::MalformedPayload("JSON 객체가 아닙니다".to_string()))?
        .get("opcode")
        .and_then(Value::as_i64)
        .ok_or_else(|| ServerError::MalformedPayload("opcode 필드가 없습니다".to_string()))?;

    let opcode = Opcode::from_code(code).ok_or(ServerError::UnknownOpcode(code))?;
    Ok((opcode, value))
}

fn decode_body<T: DeserializeOwned>(body: Value) -> ServerResult<T> {
    serde_json::from_value(body).map_err(|e| ServerError::MalformedPayload(e.to_string()))
}

/// 페이로드 앞에 4바이트 길이 헤더를 붙입니다.
pub fn encode_frame(payload: &[u8]) -> ServerResult<Bytes> {
    let length = u32::try_from(payload.len()).map_err(|_| {
        ServerError::Serialization(format!("페이로드가 너무 큽니다: {}바이트", payload.len()))
    })?;

    let mut frame = BytesMut::with_capacity(FRAME_HEADER_LEN + payload.len());
    frame.extend_from_slice(&length.to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame.freeze())
}

/// 길이 헤더 기반 프레임 디코더
///
/// 스트림에서 읽은 바이트를 누적하고, 완성된 프레임의 페이로드만 꺼냅니다.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: BytesMut,
    max_frame_bytes: usize,
}

impl FrameDecoder {
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            max_frame_bytes,
        }
    }

    /// 읽은 바이트를 추가합니다.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// `AsyncReadExt::read_buf`로 직접 채울 수 있는 내부 버퍼
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buffer
    }

    /// 아직 프레임으로 완성되지 않은 바이트 수
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// 완성된 프레임 하나를 꺼냅니다.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(payload))` - 프레임 하나가 완성됨
    /// * `Ok(None)` - 바이트가 더 필요함
    ///
    /// # Errors
    ///
    /// * `ServerError::FrameTooLarge` - 길이 헤더가 최대 크기를 넘는 경우.
    ///   이후 바이트의 경계를 알 수 없으므로 연결을 종료해야 합니다.
    pub fn next_frame(&mut self) -> ServerResult<Option<Bytes>> {
        if self.buffer.len() < FRAME_HEADER_LEN {
            return Ok(None);
        }

        let mut header = [0u8; FRAME_HEADER_LEN];
        header.copy_from_slice(&self.buffer[..FRAME_HEADER_LEN]);
        let length = u32::from_be_bytes(header) as usize;

        if length > self.max_frame_bytes {
            return Err(ServerError::FrameTooLarge {
                len: length,
                max: self.max_frame_bytes,
            });
        }

        if self.buffer.len() < FRAME_HEADER_LEN + length {
            self.buffer.reserve(FRAME_HEADER_LEN + length - self.buffer.len());
            return Ok(None);
        }

        self.buffer.advance(FRAME_HEADER_LEN);
        Ok(Some(self.buffer.split_to(length).freeze()))
    }
}
