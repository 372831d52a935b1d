//! ACK 리스너 태스크
//!
//! 송신 엔진과 동시에 실행되며 ACK를 받아 공유 비트맵과 윈도우를 갱신한다.
//! 수신은 항상 `ack_timeout`으로 제한되고, 타임아웃은 손실 신호로 보고 윈도우를 줄인다.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::segment::AckSegment;
use crate::sender::SenderState;
use crate::stats::TransferStats;
use crate::transport::Transport;

/// 수신 버퍼 크기. ACK보다 큰 데이터그램은 잘려서 디코드 단계에서 버려진다
const ACK_RECV_BUFFER: usize = 64;

/// 리스너 루프. `state.finish()`가 호출되면 종료하고 집계한 통계를 돌려준다
pub(crate) async fn run<T: Transport>(
    transport: Arc<T>,
    state: Arc<SenderState>,
    ack_timeout: Duration,
    max_silent_timeouts: u32,
) -> TransferStats {
    let mut stats = TransferStats::new();
    let mut buf = [0u8; ACK_RECV_BUFFER];
    let mut silent = 0u32;

    while !state.is_finished() {
        let received = tokio::select! {
            _ = state.finished_signal() => break,
            r = tokio::time::timeout(ack_timeout, transport.recv(&mut buf)) => r,
        };

        match received {
            Ok(Ok(len)) => match AckSegment::decode(&buf[..len]) {
                Ok(ack) => {
                    silent = 0;
                    stats.acks_received += 1;

                    let fresh = state.mark_acked(&ack);
                    if fresh > 0 {
                        state.grow_window();
                    }
                    state.notify_progress();
                    debug!("ACKed {} ({} new, window={})", ack.range(), fresh, state.window_size());
                }
                Err(e) => {
                    stats.malformed_segments += 1;
                    debug!("ACK 아님, 무시: {}", e);
                }
            },
            Ok(Err(e)) => {
                warn!("ACK 수신 에러: {}", e);
                silent += 1;
                stats.ack_timeouts += 1;
                state.shrink_window();
                // 에러가 즉시 반복되어도 타임아웃 한 번만큼은 기다림
                tokio::select! {
                    _ = state.finished_signal() => break,
                    _ = tokio::time::sleep(ack_timeout) => {}
                }
            }
            Err(_) => {
                silent += 1;
                stats.ack_timeouts += 1;
                state.shrink_window();
                debug!("ACK 타임아웃 (window={})", state.window_size());
            }
        }

        if silent >= max_silent_timeouts {
            warn!("연속 {}회 ACK 없음, 피어 포기", silent);
            state.abandon();
            break;
        }
    }

    stats
}
