//! 간단한 공통 유틸리티

/// 시간 관련 유틸리티
pub struct SimpleUtils;

impl SimpleUtils {
    /// 현재 Unix 타임스탬프 (밀리초)
    ///
    /// Ping 패킷의 `timestamp` 필드와 왕복 지연 시간 계산에 사용합니다.
    pub fn current_timestamp_millis() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    /// 두 밀리초 타임스탬프 사이의 경과 시간
    ///
    /// 시계가 뒤로 간 경우 0을 반환합니다.
    ///
    /// # Examples
    ///
    /// ```
    /// use tictactoe_server::tool::SimpleUtils;
    ///
    /// assert_eq!(SimpleUtils::elapsed_millis(1_000, 1_250), 250);
    /// assert_eq!(SimpleUtils::elapsed_millis(2_000, 1_000), 0);
    /// ```
    pub fn elapsed_millis(from_ms: i64, to_ms: i64) -> u64 {
        u64::try_from(to_ms.saturating_sub(from_ms)).unwrap_or(0)
    }
}
