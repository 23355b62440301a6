//! 세션 서버 공통 유틸리티 모듈
//!
//! 에러 처리와 시간 유틸 등 공통 기능을 제공합니다.

pub mod error;
pub mod simple_utils;

pub use error::{ErrorHandler, ErrorSeverity, ServerError, ServerResult};
pub use simple_utils::SimpleUtils;
