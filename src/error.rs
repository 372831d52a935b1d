//! 에러 타입 정의

use thiserror::Error;

/// SRFP 프로토콜 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("핸드셰이크 타임아웃: {attempts}회 시도 후 응답 없음")]
    HandshakeTimeout { attempts: u32 },

    #[error("파일 없음: {name}")]
    FileNotFound { name: String },

    #[error("수신 타임아웃: next_expected={next_expected}")]
    ReceiveTimeout { next_expected: u32 },

    #[error("잘못된 세그먼트: {len} bytes")]
    MalformedSegment { len: usize },

    #[error("체크섬 불일치: seqno={seqno}")]
    CorruptSegment { seqno: u32 },

    #[error("송신 실패: {0}")]
    SendFailure(std::io::Error),

    #[error("피어 응답 없음: 연속 {timeouts}회 ACK 타임아웃")]
    PeerUnresponsive { timeouts: u32 },

    #[error("파일이 너무 큼: {size} bytes")]
    FileTooLarge { size: u64 },

    #[error("잘못된 설정: {0}")]
    InvalidConfig(String),

    #[error("백그라운드 태스크 실패")]
    TaskFailed,
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
