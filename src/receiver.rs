//! 수신자 (클라이언트측)
//!
//! 순차 루프: 수신 → 윈도우 교집합 계산 → 링 버퍼 기록/플러시 → ACK.
//! 매 수신 뒤 정확히 한 번 응답하므로 별도 태스크가 필요 없다.

use std::io::Write;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::interval::Interval;
use crate::ring_buffer::RingBuffer;
use crate::segment::{AckSegment, DataSegment, HEADER_SIZE, MAX_PAYLOAD_SIZE};
use crate::stats::TransferStats;
use crate::transport::Transport;
use crate::{Config, Error, Result};

/// 세그먼트 처리 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentVerdict {
    /// 윈도우와 겹쳐 기록됨. 실제 기록 구간에 대한 ACK
    Accepted(AckSegment),
    /// 이미 확정된 구간. 송신측이 ACK를 잃었을 수 있으므로 다시 ACK
    Stale(AckSegment),
    /// 윈도우 앞쪽 또는 버퍼에 들어가지 않음. 송신측 재전송에 맡김
    Ignored,
}

impl SegmentVerdict {
    pub fn ack(&self) -> Option<AckSegment> {
        match self {
            SegmentVerdict::Accepted(ack) | SegmentVerdict::Stale(ack) => Some(*ack),
            SegmentVerdict::Ignored => None,
        }
    }
}

/// 수신 상태 (단일 소유)
pub struct ReceiverState<W: Write> {
    ring: RingBuffer<W>,
    window_size: u32,
    file_size: u32,
}

impl<W: Write> ReceiverState<W> {
    pub fn new(sink: W, file_size: u32, config: &Config) -> Self {
        Self {
            ring: RingBuffer::new(sink, config.recv_buffer_size, config.flush_threshold),
            window_size: config.recv_window_size.min(u32::MAX as usize) as u32,
            file_size,
        }
    }

    /// 다음으로 기대하는 파일 오프셋
    pub fn next_expected(&mut self) -> u32 {
        self.ring.advance()
    }

    /// 현재 수신 윈도우
    pub fn window(&mut self) -> Interval {
        Interval::with_len(self.ring.advance(), self.window_size)
    }

    pub fn is_complete(&mut self) -> bool {
        self.ring.advance() >= self.file_size
    }

    pub fn total_written(&self) -> u32 {
        self.ring.total_written()
    }

    /// 세그먼트 하나 처리
    pub fn accept(&mut self, segment: &DataSegment) -> Result<SegmentVerdict> {
        let window = self.window();
        let pckt_range = segment.range();
        let sect = window.intersect(&pckt_range);

        if !sect.is_empty() {
            let from = (sect.start() - pckt_range.start()) as usize;
            let to = (sect.end() - pckt_range.start()) as usize;
            let written = self.ring.write(&segment.payload[from..to], sect)?;
            if written.is_empty() {
                return Ok(SegmentVerdict::Ignored);
            }
            let acked = Interval::new(sect.start(), written.end());
            return Ok(SegmentVerdict::Accepted(AckSegment::for_range(acked)));
        }

        if pckt_range.end() <= window.start() {
            return Ok(SegmentVerdict::Stale(AckSegment::for_range(pckt_range)));
        }

        Ok(SegmentVerdict::Ignored)
    }

    /// 마지막 플러시. 확정된 총 바이트 수와 출력 저장소 반환
    pub fn finish(self) -> Result<(u32, W)> {
        self.ring.close()
    }
}

/// 수신 결과
#[derive(Debug)]
pub struct ReceivedFile<W> {
    /// 출력 저장소에 확정된 바이트 수
    pub total_written: u32,
    pub sink: W,
    pub stats: TransferStats,
}

/// Selective-repeat 수신자
pub struct Receiver<T> {
    config: Config,
    transport: Arc<T>,
}

impl<T: Transport> Receiver<T> {
    pub fn new(config: Config, transport: Arc<T>) -> Self {
        Self { config, transport }
    }

    /// `file_size` 바이트를 받아 `sink`에 기록
    ///
    /// 세그먼트 대기가 `receive_timeout`을 넘으면 `ReceiveTimeout` (재시도는 송신측 몫).
    pub async fn receive_file<W: Write + Send>(
        &self,
        sink: W,
        file_size: u32,
    ) -> Result<ReceivedFile<W>> {
        let mut state = ReceiverState::new(sink, file_size, &self.config);
        let mut stats = TransferStats::new();
        let mut buf = vec![0u8; HEADER_SIZE + MAX_PAYLOAD_SIZE];

        info!("수신 시작: {} bytes", file_size);

        while !state.is_complete() {
            let next_expected = state.next_expected();
            let segment = self.next_segment(&mut buf, next_expected, &mut stats).await?;
            stats.segments_received += 1;

            let verdict = state.accept(&segment)?;
            match verdict {
                SegmentVerdict::Accepted(ack) => debug!("received {} → acked {}", segment.range(), ack.range()),
                SegmentVerdict::Stale(ack) => {
                    stats.stale_acks += 1;
                    debug!("stale {} → re-acked {}", segment.range(), ack.range());
                }
                SegmentVerdict::Ignored => {
                    stats.ignored_segments += 1;
                    debug!("ignored {} (window={})", segment.range(), state.window());
                }
            }

            if let Some(ack) = verdict.ack() {
                self.transport
                    .send(&ack.encode())
                    .await
                    .map_err(Error::SendFailure)?;
                stats.acks_sent += 1;
            }
        }

        let (total_written, sink) = state.finish()?;
        stats.total_bytes = total_written as u64;
        stats.finish();
        info!("수신 완료: {}", stats.summary());

        Ok(ReceivedFile {
            total_written,
            sink,
            stats,
        })
    }

    /// 데이터 세그먼트 하나 대기
    ///
    /// 잘못된/손상된 데이터그램은 버리고 같은 마감 시각 안에서 계속 기다린다.
    async fn next_segment(
        &self,
        buf: &mut [u8],
        next_expected: u32,
        stats: &mut TransferStats,
    ) -> Result<DataSegment> {
        let deadline = tokio::time::Instant::now() + self.config.receive_timeout;

        loop {
            let len = match tokio::time::timeout_at(deadline, self.transport.recv(buf)).await {
                Ok(received) => received?,
                Err(_) => {
                    warn!("수신 타임아웃: next_expected={}", next_expected);
                    return Err(Error::ReceiveTimeout { next_expected });
                }
            };

            let segment = match DataSegment::decode(&buf[..len]) {
                Ok(segment) => segment,
                Err(e) => {
                    stats.malformed_segments += 1;
                    warn!("데이터그램 버림: {}", e);
                    continue;
                }
            };

            if self.config.verify_checksum && !segment.verify() {
                stats.malformed_segments += 1;
                warn!("{}", Error::CorruptSegment { seqno: segment.seqno });
                continue;
            }

            return Ok(segment);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn config() -> Config {
        Config {
            recv_buffer_size: 64,
            recv_window_size: 32,
            ..Config::default()
        }
    }

    fn segment(data: &[u8], seqno: u32, len: u32) -> DataSegment {
        let start = seqno as usize;
        DataSegment::new(seqno, Bytes::copy_from_slice(&data[start..start + len as usize]))
    }

    #[test]
    fn test_redelivery_is_idempotent() {
        let data: Vec<u8> = (0..40).collect();
        let mut state = ReceiverState::new(Vec::new(), 40, &config());

        let first = state.accept(&segment(&data, 0, 8)).unwrap();
        let written_before = state.total_written();
        let again = state.accept(&segment(&data, 0, 8)).unwrap();

        assert_eq!(first, SegmentVerdict::Accepted(AckSegment::new(0, 8)));
        assert_eq!(again, SegmentVerdict::Stale(AckSegment::new(0, 8)));
        assert_eq!(first.ack(), again.ack());
        assert_eq!(state.total_written(), written_before);
    }

    #[test]
    fn test_redelivery_behind_gap_is_idempotent() {
        let data: Vec<u8> = (0..40).collect();
        let mut state = ReceiverState::new(Vec::new(), 40, &config());

        let first = state.accept(&segment(&data, 8, 8)).unwrap();
        let again = state.accept(&segment(&data, 8, 8)).unwrap();
        assert_eq!(first, again);
        assert_eq!(state.next_expected(), 0);
    }

    #[test]
    fn test_segment_ahead_of_window_ignored() {
        let data: Vec<u8> = (0..80).collect();
        let mut state = ReceiverState::new(Vec::new(), 80, &config());
        assert_eq!(
            state.accept(&segment(&data, 40, 8)).unwrap(),
            SegmentVerdict::Ignored
        );
    }

    #[test]
    fn test_segment_straddling_window_end() {
        let data: Vec<u8> = (0..80).collect();
        let mut state = ReceiverState::new(Vec::new(), 80, &config());
        // 윈도우 [0, 32)
        let verdict = state.accept(&segment(&data, 28, 8)).unwrap();
        assert_eq!(verdict, SegmentVerdict::Accepted(AckSegment::new(28, 4)));
    }

    #[test]
    fn test_segment_straddling_window_start() {
        let data: Vec<u8> = (0..40).collect();
        let mut state = ReceiverState::new(Vec::new(), 40, &config());
        state.accept(&segment(&data, 0, 8)).unwrap();

        let verdict = state.accept(&segment(&data, 4, 8)).unwrap();
        assert_eq!(verdict, SegmentVerdict::Accepted(AckSegment::new(8, 4)));
        assert_eq!(state.next_expected(), 12);

        state.accept(&segment(&data, 12, 28)).unwrap();
        assert!(state.is_complete());
        let (total, out) = state.finish().unwrap();
        assert_eq!(total, 40);
        assert_eq!(out, data);
    }

    #[tokio::test]
    async fn test_silent_sender_times_out() {
        use crate::transport::ChannelTransport;
        use std::time::Duration;

        let config = Config {
            receive_timeout: Duration::from_millis(50),
            ..Config::default()
        };
        let (_server_end, client_end) = ChannelTransport::pair();
        let receiver = Receiver::new(config, Arc::new(client_end));

        let result = receiver.receive_file(Vec::new(), 100).await;
        assert!(matches!(
            result,
            Err(Error::ReceiveTimeout { next_expected: 0 })
        ));
    }

    #[tokio::test]
    async fn test_garbage_does_not_extend_deadline() {
        use crate::transport::ChannelTransport;
        use std::time::{Duration, Instant};

        let config = Config {
            receive_timeout: Duration::from_millis(300),
            ..Config::default()
        };
        let (server_end, client_end) = ChannelTransport::pair();
        let receiver = Receiver::new(config, Arc::new(client_end));

        // 헤더보다 짧은 데이터그램을 100ms마다 1초 동안
        let noise = tokio::spawn(async move {
            for _ in 0..10 {
                server_end.send(&[1, 2, 3]).await.unwrap();
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        });

        let started = Instant::now();
        let result = receiver.receive_file(Vec::new(), 100).await;
        assert!(matches!(
            result,
            Err(Error::ReceiveTimeout { next_expected: 0 })
        ));
        assert!(started.elapsed() < Duration::from_millis(900));
        noise.abort();
    }

    #[tokio::test]
    async fn test_corrupt_segment_dropped_when_verifying() {
        use crate::transport::ChannelTransport;
        use std::time::Duration;

        let config = Config {
            verify_checksum: true,
            receive_timeout: Duration::from_secs(5),
            ..Config::default()
        };
        let (server_end, client_end) = ChannelTransport::pair();
        let receiver = Receiver::new(config, Arc::new(client_end));

        let good = DataSegment::new(0, Bytes::from_static(b"abcd"));
        let mut corrupt = good.encode().to_vec();
        corrupt[HEADER_SIZE + 1] ^= 0xFF;
        server_end.send(&corrupt).await.unwrap();
        server_end.send(&good.encode()).await.unwrap();

        let received = receiver.receive_file(Vec::new(), 4).await.unwrap();
        assert_eq!(received.sink, b"abcd");
        assert_eq!(received.total_written, 4);
        assert_eq!(received.stats.malformed_segments, 1);
        assert_eq!(received.stats.segments_received, 1);

        // 손상 세그먼트에는 ACK 없음
        let mut buf = [0u8; 16];
        let len = server_end.recv(&mut buf).await.unwrap();
        assert_eq!(AckSegment::decode(&buf[..len]).unwrap(), AckSegment::new(0, 4));
    }

    #[test]
    fn test_any_permutation_reassembles() {
        let data: Vec<u8> = (0..200u32).map(|i| (i * 31 % 251) as u8).collect();
        let config = Config {
            recv_buffer_size: 48,
            recv_window_size: 200,
            ..Config::default()
        };

        // 길이가 서로 다른 비중첩 세그먼트
        let cuts = [0u32, 7, 20, 21, 40, 64, 90, 91, 120, 150, 177, 200];
        let segments: Vec<DataSegment> = cuts
            .windows(2)
            .map(|w| segment(&data, w[0], w[1] - w[0]))
            .collect();

        let orders: Vec<Vec<usize>> = vec![
            (0..segments.len()).collect(),
            (0..segments.len()).rev().collect(),
            vec![3, 0, 9, 1, 7, 2, 10, 5, 4, 8, 6],
            vec![10, 8, 6, 4, 2, 0, 9, 7, 5, 3, 1],
        ];

        for order in orders {
            let mut state = ReceiverState::new(Vec::new(), 200, &config);
            let mut pending: std::collections::VecDeque<usize> = order.into_iter().collect();
            // 버퍼에 안 들어간 세그먼트는 재전송처럼 뒤로 돌림
            let mut rounds = 0;
            while let Some(idx) = pending.pop_front() {
                let verdict = state.accept(&segments[idx]).unwrap();
                let covered = verdict
                    .ack()
                    .map_or(false, |ack| ack.range() == segments[idx].range());
                if !covered {
                    pending.push_back(idx);
                }
                rounds += 1;
                assert!(rounds < 10_000);
            }

            assert!(state.is_complete());
            let (total, out) = state.finish().unwrap();
            assert_eq!(total, 200);
            assert_eq!(out, data);
        }
    }
}
