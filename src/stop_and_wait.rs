//! Stop-and-wait 송신자 (기준 모드)
//!
//! 세그먼트 하나를 보내고 seqno가 같은 ACK를 받을 때까지 재전송한다.
//! selective-repeat 수신자와 그대로 호환된다.

use std::io::Read;
use std::sync::Arc;

use bytes::Bytes;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::segment::{AckSegment, DataSegment};
use crate::sender::read_chunk;
use crate::stats::TransferStats;
use crate::transport::{FaultInjector, LossyLink, SendOutcome, Transport};
use crate::{Config, Error, Result};

pub struct StopAndWaitSender<T> {
    config: Config,
    link: LossyLink<T>,
}

impl<T: Transport> StopAndWaitSender<T> {
    pub fn new(config: Config, transport: Arc<T>, injector: Arc<dyn FaultInjector>) -> Self {
        Self {
            link: LossyLink::new(transport, injector),
            config,
        }
    }

    pub async fn send_file<R: Read + Send>(&self, mut source: R) -> Result<TransferStats> {
        let mut stats = TransferStats::new();
        let mut buf = vec![0u8; self.config.payload_size];
        let mut seqno = 0u32;

        loop {
            let len = read_chunk(&mut source, &mut buf)?;
            if len == 0 {
                break;
            }
            let segment = DataSegment::new(seqno, Bytes::copy_from_slice(&buf[..len]));
            let wire = segment.encode();

            let mut attempts = 0u32;
            loop {
                if attempts > 0 {
                    stats.retransmitted_segments += 1;
                }
                attempts += 1;

                match self.link.send(&wire).await? {
                    SendOutcome::Sent(_) => stats.segments_sent += 1,
                    SendOutcome::Dropped => {
                        stats.dropped_segments += 1;
                        debug!("{} - dropped", seqno);
                    }
                }

                if self.wait_for_ack(seqno, &mut stats).await {
                    break;
                }
                if attempts >= self.config.max_silent_timeouts {
                    return Err(Error::PeerUnresponsive { timeouts: attempts });
                }
            }

            stats.total_bytes += len as u64;
            seqno = seqno.wrapping_add(len as u32);
        }

        stats.finish();
        info!("stop-and-wait 전송 완료: {}", stats.summary());
        Ok(stats)
    }

    /// `retransmission_timeout` 안에 offset이 `seqno`인 ACK가 오면 true
    ///
    /// 다른 offset의 ACK(지연된 이전 ACK)는 무시하고 계속 기다린다.
    async fn wait_for_ack(&self, seqno: u32, stats: &mut TransferStats) -> bool {
        let deadline = Instant::now() + self.config.retransmission_timeout;
        let mut buf = [0u8; 64];

        loop {
            let received =
                tokio::time::timeout_at(deadline, self.link.transport().recv(&mut buf)).await;
            match received {
                Ok(Ok(len)) => match AckSegment::decode(&buf[..len]) {
                    Ok(ack) => {
                        stats.acks_received += 1;
                        if ack.offset == seqno {
                            return true;
                        }
                        debug!("ack.no={} (기대 {})", ack.offset, seqno);
                    }
                    Err(_) => stats.malformed_segments += 1,
                },
                Ok(Err(e)) => {
                    warn!("ACK 수신 에러: {}", e);
                    stats.ack_timeouts += 1;
                    return false;
                }
                Err(_) => {
                    stats.ack_timeouts += 1;
                    return false;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receiver::Receiver;
    use crate::transport::{ChannelTransport, ScriptedLoss};
    use std::time::Duration;

    #[tokio::test]
    async fn test_stop_and_wait_with_selective_repeat_receiver() {
        let config = Config {
            payload_size: 100,
            max_window: 0,
            retransmission_timeout: Duration::from_millis(100),
            receive_timeout: Duration::from_secs(5),
            ..Config::default()
        };
        let data: Vec<u8> = (0..450u32).map(|i| (i % 256) as u8).collect();
        let (server_end, client_end) = ChannelTransport::pair();

        let receiver = Receiver::new(config.clone(), Arc::new(client_end));
        let recv_task = tokio::spawn(async move { receiver.receive_file(Vec::new(), 450).await });

        // 두 번째 세그먼트 첫 송신 손실
        let sender = StopAndWaitSender::new(
            config,
            Arc::new(server_end),
            Arc::new(ScriptedLoss::new([1])),
        );
        let stats = sender.send_file(std::io::Cursor::new(data.clone())).await.unwrap();

        let received = recv_task.await.unwrap().unwrap();
        assert_eq!(received.total_written, 450);
        assert_eq!(received.sink, data);
        assert_eq!(stats.segments_sent, 5);
        assert_eq!(stats.dropped_segments, 1);
        assert_eq!(stats.retransmitted_segments, 1);
    }
}
