//! 송신자 (서버측)
//!
//! - 파일을 고정 크기 청크 단위로 읽어 보관
//! - 윈도우 안의 미확인 바이트를 최대 페이로드 단위 세그먼트로 묶어 전송
//! - 재전송 타임아웃이 지난 바이트만 선택적으로 재전송
//! - ACK 리스너 태스크와 `SenderState`를 공유

use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, info};

use crate::ack_listener;
use crate::interval::Interval;
use crate::segment::{AckSegment, DataSegment};
use crate::stats::TransferStats;
use crate::transport::{FaultInjector, LossyLink, SendOutcome, Transport};
use crate::window::Window;
use crate::{Config, Error, Result};

/// 파일 단위 송신 단계
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderPhase {
    /// 보관 중인 바이트 없음
    Loading,
    /// 보관 청크 전송 중
    Transmitting,
    /// 마지막(짧은) 청크의 ACK 대기
    Draining,
    Done,
}

/// 청크 단위 ACK 상태
struct AckBoard {
    /// 버퍼 인덱스 0에 해당하는 파일 오프셋
    first_byte_seqno: u32,
    chunk_len: usize,
    acked: Vec<bool>,
    /// 한 번이라도 송신을 시도한 바이트 (재전송 집계용)
    attempted: Vec<bool>,
    time_sent: Vec<Option<Instant>>,
}

/// 송신 엔진과 ACK 리스너가 공유하는 상태
///
/// 페이로드 바이트는 여기 없고 송신 엔진만 소유한다.
pub struct SenderState {
    board: Mutex<AckBoard>,
    window: Mutex<Window>,
    finished: AtomicBool,
    abandoned: AtomicBool,
    progress: Notify,
    finish_signal: Notify,
}

impl SenderState {
    pub fn new(config: &Config) -> Self {
        let size = config.file_buffer_size;
        Self {
            board: Mutex::new(AckBoard {
                first_byte_seqno: 0,
                chunk_len: 0,
                acked: vec![false; size],
                attempted: vec![false; size],
                time_sent: vec![None; size],
            }),
            window: Mutex::new(Window::new(config.payload_size, config.window_cap())),
            finished: AtomicBool::new(false),
            abandoned: AtomicBool::new(false),
            progress: Notify::new(),
            finish_signal: Notify::new(),
        }
    }

    pub fn first_byte_seqno(&self) -> u32 {
        self.board.lock().first_byte_seqno
    }

    pub fn window_size(&self) -> usize {
        self.window.lock().size()
    }

    pub fn grow_window(&self) {
        self.window.lock().grow();
    }

    pub fn shrink_window(&self) {
        self.window.lock().shrink();
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// 전송 종료 (리스너도 곧 종료)
    pub fn finish(&self) {
        self.finished.store(true, Ordering::SeqCst);
        self.finish_signal.notify_one();
        self.progress.notify_one();
    }

    /// 피어가 응답하지 않아 전송 포기
    pub fn abandon(&self) {
        self.abandoned.store(true, Ordering::SeqCst);
        self.finish();
    }

    pub fn is_abandoned(&self) -> bool {
        self.abandoned.load(Ordering::SeqCst)
    }

    pub(crate) async fn finished_signal(&self) {
        self.finish_signal.notified().await
    }

    pub(crate) fn notify_progress(&self) {
        self.progress.notify_one();
    }

    /// ACK 반영
    ///
    /// 현재 청크 `[first_byte_seqno, first_byte_seqno + chunk_len)`로 잘라 표시하고
    /// 새로 확인된 바이트 수를 돌려준다.
    pub fn mark_acked(&self, ack: &AckSegment) -> usize {
        let mut board = self.board.lock();
        let chunk = Interval::with_len(board.first_byte_seqno, board.chunk_len as u32);
        let sect = chunk.intersect(&ack.range());
        if sect.is_empty() {
            return 0;
        }

        let rel = sect.relative_to(board.first_byte_seqno);
        let slots = &mut board.acked[rel.start() as usize..rel.end() as usize];
        let fresh = slots.iter().filter(|&&acked| !acked).count();
        slots.fill(true);
        fresh
    }

    /// 새 청크 적재. ACK/송신 기록 초기화
    fn load_chunk(&self, first_byte_seqno: u32, chunk_len: usize) {
        let mut board = self.board.lock();
        board.first_byte_seqno = first_byte_seqno;
        board.chunk_len = chunk_len;
        board.acked.fill(false);
        board.attempted.fill(false);
        board.time_sent.fill(None);
    }

    /// 확인된 바이트를 건너뛴 새 base
    fn advance_base(&self, mut base: usize) -> usize {
        let board = self.board.lock();
        while base < board.chunk_len && board.acked[base] {
            base += 1;
        }
        base
    }

    /// 전송할 구간(청크 상대 인덱스) 수집
    ///
    /// `[base, base + window)` 안에서 미확인이면서 최근에 보내지 않은 바이트의
    /// 최대 연속 구간을 `max_run` 단위로 끊어 돌려준다.
    fn collect_runs(
        &self,
        base: usize,
        window: usize,
        max_run: usize,
        rto: Duration,
        now: Instant,
    ) -> Vec<Interval> {
        let board = self.board.lock();
        let end = base.saturating_add(window).min(board.chunk_len);

        let mut runs = Vec::new();
        let mut run_start: Option<usize> = None;
        for i in base..end {
            let eligible = !board.acked[i]
                && board.time_sent[i].map_or(true, |sent| now.duration_since(sent) >= rto);

            match run_start {
                Some(start) if !eligible => {
                    runs.push(Interval::new(start as u32, i as u32));
                    run_start = None;
                }
                Some(start) if i - start == max_run => {
                    runs.push(Interval::new(start as u32, i as u32));
                    run_start = Some(i);
                }
                None if eligible => run_start = Some(i),
                _ => {}
            }
        }
        if let Some(start) = run_start {
            runs.push(Interval::new(start as u32, end as u32));
        }
        runs
    }

    /// 송신 기록. 실제로 나간 경우에만 송신 시각을 찍는다 (버려진 구간은 곧바로 재시도 대상)
    ///
    /// 이전에 시도한 적 있는 구간이면 true
    fn mark_sent(&self, run: Interval, now: Instant, delivered: bool) -> bool {
        let mut board = self.board.lock();
        let range = run.start() as usize..run.end() as usize;
        let retransmit = board.attempted[range.clone()].iter().any(|&a| a);
        board.attempted[range.clone()].fill(true);
        if delivered {
            board.time_sent[range].fill(Some(now));
        }
        retransmit
    }
}

/// `buf`를 가득 채우거나 EOF까지 읽음
pub(crate) fn read_chunk<R: Read>(source: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Selective-repeat 송신자
pub struct Sender<T> {
    config: Config,
    link: LossyLink<T>,
}

impl<T: Transport + 'static> Sender<T> {
    pub fn new(config: Config, transport: Arc<T>, injector: Arc<dyn FaultInjector>) -> Self {
        Self {
            link: LossyLink::new(transport, injector),
            config,
        }
    }

    /// 파일 전송
    ///
    /// 마지막 바이트까지 ACK를 받으면 통계와 함께 반환.
    /// 리스너가 피어를 포기하면 `PeerUnresponsive`.
    pub async fn send_file<R: Read + Send>(&self, mut source: R) -> Result<TransferStats> {
        let state = Arc::new(SenderState::new(&self.config));
        let listener = tokio::spawn(ack_listener::run(
            self.link.transport().clone(),
            state.clone(),
            self.config.ack_timeout,
            self.config.max_silent_timeouts,
        ));

        let mut stats = TransferStats::new();
        let result = self.drive(&mut source, &state, &mut stats).await;

        state.finish();
        let listener_stats = listener.await.map_err(|_| Error::TaskFailed)?;
        stats.absorb(&listener_stats);
        stats.finish();
        result?;

        if state.is_abandoned() {
            return Err(Error::PeerUnresponsive {
                timeouts: self.config.max_silent_timeouts,
            });
        }

        info!("전송 완료: {}", stats.summary());
        Ok(stats)
    }

    async fn drive<R: Read>(
        &self,
        source: &mut R,
        state: &SenderState,
        stats: &mut TransferStats,
    ) -> Result<()> {
        let payload_size = self.config.payload_size;
        let mut chunk = vec![0u8; self.config.file_buffer_size];
        let mut chunk_len = 0usize;
        let mut base = 0usize;
        let mut phase = SenderPhase::Loading;

        while !state.is_finished() {
            base = state.advance_base(base);

            if base == chunk_len {
                let next_seqno = state.first_byte_seqno().wrapping_add(chunk_len as u32);
                chunk_len = read_chunk(source, &mut chunk)?;
                state.load_chunk(next_seqno, chunk_len);
                base = 0;
                stats.total_bytes += chunk_len as u64;

                let next_phase = if chunk_len == 0 {
                    SenderPhase::Done
                } else if chunk_len < chunk.len() {
                    SenderPhase::Draining
                } else {
                    SenderPhase::Transmitting
                };
                if next_phase != phase {
                    debug!("송신 단계 {:?} → {:?} @ {}", phase, next_phase, next_seqno);
                    phase = next_phase;
                }
                if phase == SenderPhase::Done {
                    state.finish();
                    break;
                }
            }

            let now = Instant::now();
            let first_byte_seqno = state.first_byte_seqno();
            let runs = state.collect_runs(
                base,
                state.window_size(),
                payload_size,
                self.config.retransmission_timeout,
                now,
            );

            let mut delivered_any = false;
            for run in runs {
                let start = run.start() as usize;
                let end = run.end() as usize;
                let segment = DataSegment::new(
                    first_byte_seqno.wrapping_add(run.start()),
                    Bytes::copy_from_slice(&chunk[start..end]),
                );

                let outcome = self.link.send(&segment.encode()).await?;
                let delivered = matches!(outcome, SendOutcome::Sent(_));
                if state.mark_sent(run, now, delivered) {
                    stats.retransmitted_segments += 1;
                }

                if delivered {
                    delivered_any = true;
                    stats.segments_sent += 1;
                    debug!("sent {}", segment.range());
                } else {
                    stats.dropped_segments += 1;
                    debug!("dropped {}", segment.range());
                }
            }

            if delivered_any {
                tokio::task::yield_now().await;
            } else {
                // ACK 또는 재전송 시각까지 대기
                let _ = tokio::time::timeout(self.config.idle_poll, state.progress.notified()).await;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> Config {
        Config {
            payload_size: 4,
            file_buffer_size: 16,
            max_window: 16,
            ..Config::default()
        }
    }

    #[test]
    fn test_collect_runs_coalesces_up_to_payload() {
        let state = SenderState::new(&small_config());
        state.load_chunk(100, 10);

        let now = Instant::now();
        let runs = state.collect_runs(0, 16, 4, Duration::from_secs(1), now);
        assert_eq!(
            runs,
            vec![Interval::new(0, 4), Interval::new(4, 8), Interval::new(8, 10)]
        );
    }

    #[test]
    fn test_collect_runs_skips_acked_and_recent() {
        let state = SenderState::new(&small_config());
        state.load_chunk(0, 12);
        let now = Instant::now();

        state.mark_acked(&AckSegment::new(2, 2));
        state.mark_sent(Interval::new(6, 8), now, true);

        let runs = state.collect_runs(0, 12, 4, Duration::from_secs(1), now);
        assert_eq!(
            runs,
            vec![Interval::new(0, 2), Interval::new(4, 6), Interval::new(8, 12)]
        );
    }

    #[test]
    fn test_collect_runs_respects_window() {
        let state = SenderState::new(&small_config());
        state.load_chunk(0, 16);
        let runs = state.collect_runs(2, 5, 4, Duration::from_secs(1), Instant::now());
        assert_eq!(runs, vec![Interval::new(2, 6), Interval::new(6, 7)]);
    }

    #[test]
    fn test_dropped_send_is_retried_immediately() {
        let state = SenderState::new(&small_config());
        state.load_chunk(0, 8);
        let now = Instant::now();

        assert!(!state.mark_sent(Interval::new(0, 4), now, false));
        let runs = state.collect_runs(0, 8, 4, Duration::from_secs(1), now);
        assert_eq!(runs, vec![Interval::new(0, 4), Interval::new(4, 8)]);

        // 두 번째 시도는 재전송으로 집계
        assert!(state.mark_sent(Interval::new(0, 4), now, true));
    }

    #[test]
    fn test_expired_bytes_become_eligible() {
        let state = SenderState::new(&small_config());
        state.load_chunk(0, 4);
        let sent_at = Instant::now();
        state.mark_sent(Interval::new(0, 4), sent_at, true);

        let rto = Duration::from_millis(10);
        assert!(state.collect_runs(0, 4, 4, rto, sent_at).is_empty());
        let later = sent_at + Duration::from_millis(11);
        assert_eq!(state.collect_runs(0, 4, 4, rto, later), vec![Interval::new(0, 4)]);
    }

    #[test]
    fn test_mark_acked_clamps_to_chunk() {
        let state = SenderState::new(&small_config());
        state.load_chunk(100, 10);

        // 이전 청크 ACK
        assert_eq!(state.mark_acked(&AckSegment::new(90, 10)), 0);
        // 청크 앞뒤로 걸친 ACK
        assert_eq!(state.mark_acked(&AckSegment::new(96, 8)), 4);
        assert_eq!(state.mark_acked(&AckSegment::new(108, 10)), 2);
        // 중복 ACK은 새 바이트 없음
        assert_eq!(state.mark_acked(&AckSegment::new(100, 4)), 0);

        assert_eq!(state.advance_base(0), 4);
    }

    #[test]
    fn test_read_chunk_fills_buffer() {
        let data: Vec<u8> = (0..40).collect();
        let mut source = io::Cursor::new(data);
        let mut buf = [0u8; 16];
        assert_eq!(read_chunk(&mut source, &mut buf).unwrap(), 16);
        assert_eq!(read_chunk(&mut source, &mut buf).unwrap(), 16);
        assert_eq!(read_chunk(&mut source, &mut buf).unwrap(), 8);
        assert_eq!(read_chunk(&mut source, &mut buf).unwrap(), 0);
    }
}
