//! 전송 통계

use std::time::{Duration, Instant};

/// 전송 1회 통계 (송신/수신 공용)
#[derive(Debug, Clone)]
pub struct TransferStats {
    /// 시작 시간
    pub start_time: Instant,

    /// 파일 바이트 (송신: 읽은 양, 수신: 확정된 양)
    pub total_bytes: u64,

    /// 실제로 전송된 데이터 세그먼트 수
    pub segments_sent: u64,

    /// 재전송 세그먼트 수
    pub retransmitted_segments: u64,

    /// 손실 주입으로 버려진 세그먼트 수
    pub dropped_segments: u64,

    /// 수신한 데이터 세그먼트 수
    pub segments_received: u64,

    /// 보낸 ACK 수
    pub acks_sent: u64,

    /// 받은 ACK 수
    pub acks_received: u64,

    /// ACK 대기 타임아웃 수
    pub ack_timeouts: u64,

    /// 윈도우 뒤쪽(이미 확정된) 세그먼트에 대한 재ACK 수
    pub stale_acks: u64,

    /// 윈도우 앞쪽이라 무시한 세그먼트 수
    pub ignored_segments: u64,

    /// 헤더보다 짧거나 체크섬이 틀린 데이터그램 수
    pub malformed_segments: u64,

    /// 종료 시간 (None이면 진행 중)
    pub finish_time: Option<Instant>,
}

impl TransferStats {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            total_bytes: 0,
            segments_sent: 0,
            retransmitted_segments: 0,
            dropped_segments: 0,
            segments_received: 0,
            acks_sent: 0,
            acks_received: 0,
            ack_timeouts: 0,
            stale_acks: 0,
            ignored_segments: 0,
            malformed_segments: 0,
            finish_time: None,
        }
    }

    /// 종료 시각 기록
    pub fn finish(&mut self) {
        self.finish_time = Some(Instant::now());
    }

    /// 경과 시간
    pub fn elapsed(&self) -> Duration {
        self.finish_time
            .unwrap_or_else(Instant::now)
            .duration_since(self.start_time)
    }

    /// 처리율 (bytes/sec)
    pub fn throughput(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            return 0.0;
        }
        self.total_bytes as f64 / elapsed
    }

    /// 재전송 비율
    pub fn retransmit_ratio(&self) -> f64 {
        if self.segments_sent == 0 {
            return 0.0;
        }
        self.retransmitted_segments as f64 / self.segments_sent as f64
    }

    /// 다른 통계의 카운터를 더함 (ACK 리스너 결과 합산용)
    pub fn absorb(&mut self, other: &TransferStats) {
        self.segments_sent += other.segments_sent;
        self.retransmitted_segments += other.retransmitted_segments;
        self.dropped_segments += other.dropped_segments;
        self.segments_received += other.segments_received;
        self.acks_sent += other.acks_sent;
        self.acks_received += other.acks_received;
        self.ack_timeouts += other.ack_timeouts;
        self.stale_acks += other.stale_acks;
        self.ignored_segments += other.ignored_segments;
        self.malformed_segments += other.malformed_segments;
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Elapsed: {:.2}s | Bytes: {} | Throughput: {:.2} KB/s | Sent: {} (retx {}, dropped {}) | Recv: {} | ACKs: {}/{} | Timeouts: {}",
            self.elapsed().as_secs_f64(),
            self.total_bytes,
            self.throughput() / 1_000.0,
            self.segments_sent,
            self.retransmitted_segments,
            self.dropped_segments,
            self.segments_received,
            self.acks_sent,
            self.acks_received,
            self.ack_timeouts,
        )
    }
}

impl Default for TransferStats {
    fn default() -> Self {
        Self::new()
    }
}
