//! # SRFP (Selective-Repeat File Protocol)
//!
//! UDP 기반 슬라이딩 윈도우 파일 전송 프로토콜
//!
//! ## 핵심 특징
//! - **바이트 오프셋 seqno**: 세그먼트 번호가 아닌 파일 오프셋으로 식별
//! - **선택적 재전송**: 타임아웃이 지난 미확인 바이트만 다시 보냄
//! - **구간 ACK**: 수신자가 실제로 기록한 바이트 구간을 그대로 ACK
//! - **AIMD 윈도우**: ACK마다 한 페이로드씩 증가, 타임아웃마다 절반
//! - **링 버퍼 수신**: 파일 크기와 무관한 고정 크기 버퍼로 순서 재조립
//! - **손실 주입**: 시드 고정 가능한 인공 패킷 손실로 손실 링크 재현

mod ack_listener;
pub mod client;
pub mod config;
pub mod error;
pub mod interval;
pub mod receiver;
pub mod ring_buffer;
pub mod segment;
pub mod sender;
pub mod server;
pub mod stats;
pub mod stop_and_wait;
pub mod transport;
pub mod window;

pub use client::{download, request_file, FileOffer};
pub use config::{Config, ServerSettings};
pub use error::{Error, Result};
pub use interval::Interval;
pub use receiver::{ReceivedFile, Receiver};
pub use segment::{AckSegment, DataSegment};
pub use sender::Sender;
pub use server::Server;
pub use stats::TransferStats;
pub use stop_and_wait::StopAndWaitSender;
pub use transport::{
    ChannelTransport, FaultInjector, NoLoss, RandomLoss, ScriptedLoss, Transport,
};

/// 기본 페이로드 크기 (바이트)
pub const DEFAULT_PAYLOAD_SIZE: usize = 250;

/// 기본 송신 파일 버퍼 크기 (바이트)
pub const DEFAULT_FILE_BUFFER_SIZE: usize = 100_000;

/// 기본 서버 포트
pub const DEFAULT_PORT: u16 = 9000;
