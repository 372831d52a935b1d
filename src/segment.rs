//! 세그먼트 와이어 포맷
//!
//! - DataSegment: 8바이트 헤더 (checksum u16, len u16, seqno u32) + 페이로드
//! - AckSegment: 고정 8바이트 (checksum u16, len u16, offset u32)
//!
//! 모든 정수 필드는 네트워크 바이트 순서(big-endian)

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::interval::Interval;
use crate::{Error, Result};

/// 데이터 세그먼트 헤더 크기
pub const HEADER_SIZE: usize = 8;

/// ACK 세그먼트 크기
pub const ACK_SIZE: usize = 8;

/// 단일 세그먼트 최대 페이로드 (UDP 최대 페이로드 65507 - 헤더)
pub const MAX_PAYLOAD_SIZE: usize = 65_507 - HEADER_SIZE;

/// 핸드셰이크에서 "파일 없음"을 뜻하는 offset 값
pub const FILE_NOT_FOUND: u32 = u32::MAX;

/// crc32를 16비트로 접음
fn fold16(crc: u32) -> u16 {
    ((crc >> 16) ^ (crc & 0xFFFF)) as u16
}

fn checksum(len: u16, offset: u32, payload: &[u8]) -> u16 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&len.to_be_bytes());
    hasher.update(&offset.to_be_bytes());
    hasher.update(payload);
    fold16(hasher.finalize())
}

/// 데이터 세그먼트
///
/// `seqno`는 세그먼트 번호가 아니라 페이로드 첫 바이트의 파일 오프셋
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSegment {
    pub checksum: u16,
    pub seqno: u32,
    pub payload: Bytes,
}

impl DataSegment {
    /// 새 세그먼트 생성 (체크섬 계산 포함)
    pub fn new(seqno: u32, payload: Bytes) -> Self {
        debug_assert!(payload.len() <= MAX_PAYLOAD_SIZE);
        let checksum = checksum(payload.len() as u16, seqno, &payload);
        Self {
            checksum,
            seqno,
            payload,
        }
    }

    pub fn payload_len(&self) -> u16 {
        self.payload.len() as u16
    }

    /// 이 세그먼트가 덮는 파일 구간
    pub fn range(&self) -> Interval {
        Interval::with_len(self.seqno, self.payload.len() as u32)
    }

    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.wire_size());
        buf.put_u16(self.checksum);
        buf.put_u16(self.payload_len());
        buf.put_u32(self.seqno);
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// 수신 바이트에서 디코드
    ///
    /// 헤더보다 짧거나 길이 필드가 실제 수신량보다 크면 `MalformedSegment`
    pub fn decode(mut bytes: &[u8]) -> Result<Self> {
        let received = bytes.len();
        if received < HEADER_SIZE {
            return Err(Error::MalformedSegment { len: received });
        }

        let checksum = bytes.get_u16();
        let len = bytes.get_u16() as usize;
        let seqno = bytes.get_u32();
        if bytes.len() < len {
            return Err(Error::MalformedSegment { len: received });
        }

        Ok(Self {
            checksum,
            seqno,
            payload: Bytes::copy_from_slice(&bytes[..len]),
        })
    }

    /// 체크섬 검증
    pub fn verify(&self) -> bool {
        checksum(self.payload_len(), self.seqno, &self.payload) == self.checksum
    }
}

/// ACK 세그먼트
///
/// `[offset, offset + len)` 구간 수신 확인. 핸드셰이크 응답에서는 `offset`이 파일 크기를 담는다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckSegment {
    pub checksum: u16,
    pub len: u16,
    pub offset: u32,
}

impl AckSegment {
    pub fn new(offset: u32, len: u16) -> Self {
        Self {
            checksum: checksum(len, offset, &[]),
            len,
            offset,
        }
    }

    /// 구간 ACK. 세그먼트 하나 이상의 구간은 u16 범위로 잘림
    pub fn for_range(range: Interval) -> Self {
        let len = range.len().min(u16::MAX as u32) as u16;
        Self::new(range.start(), len)
    }

    /// 핸드셰이크 응답: 파일 크기
    pub fn file_size(size: u32) -> Self {
        Self::new(size, 0)
    }

    /// 핸드셰이크 응답: 파일 없음
    pub fn not_found() -> Self {
        Self::new(FILE_NOT_FOUND, 0)
    }

    pub fn is_not_found(&self) -> bool {
        self.offset == FILE_NOT_FOUND
    }

    pub fn range(&self) -> Interval {
        Interval::with_len(self.offset, self.len as u32)
    }

    pub fn encode(&self) -> [u8; ACK_SIZE] {
        let mut out = [0u8; ACK_SIZE];
        let mut buf = &mut out[..];
        buf.put_u16(self.checksum);
        buf.put_u16(self.len);
        buf.put_u32(self.offset);
        out
    }

    /// 정확히 8바이트가 아니면 `MalformedSegment`
    pub fn decode(mut bytes: &[u8]) -> Result<Self> {
        if bytes.len() != ACK_SIZE {
            return Err(Error::MalformedSegment { len: bytes.len() });
        }
        Ok(Self {
            checksum: bytes.get_u16(),
            len: bytes.get_u16(),
            offset: bytes.get_u32(),
        })
    }

    pub fn verify(&self) -> bool {
        checksum(self.len, self.offset, &[]) == self.checksum
    }
}
