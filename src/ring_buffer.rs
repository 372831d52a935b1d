//! 고정 용량 링 버퍼 + 플러시 정책
//!
//! 파일 내 최종 위치는 알지만 앞쪽 연속 구간이 확정될 때까지 붙잡아 둬야 하는
//! 바이트를 보관한다. 연속 접두부가 쌓이면 출력 저장소로 내보내고 공간을 회수한다.
//!
//! - 버퍼 윈도우: 아직 메모리에 남아 있는 미플러시 영역 (버퍼 인덱스)
//! - 파일 윈도우: 같은 영역의 절대 파일 오프셋

use std::io::Write;

use tracing::debug;

use crate::interval::Interval;
use crate::Result;

/// 링 버퍼
pub struct RingBuffer<W: Write> {
    /// 출력 저장소
    sink: W,

    /// 데이터
    buf: Vec<u8>,

    /// 점유 비트맵 (buf와 같은 크기)
    occupied: Vec<bool>,

    buffer_window: Interval,
    file_window: Interval,

    /// 출력 저장소에 확정된 총 바이트
    total_written: u32,

    /// 소프트 리셋 임계치 (버퍼 인덱스)
    threshold: u32,

    /// 수행된 플러시 횟수 (0바이트 리셋 제외)
    flushes: u64,
}

impl<W: Write> RingBuffer<W> {
    /// 새 링 버퍼. `flush_threshold`는 용량 대비 비율
    pub fn new(sink: W, capacity: usize, flush_threshold: f64) -> Self {
        let capacity = capacity.min(u32::MAX as usize) as u32;
        let threshold = (flush_threshold.clamp(0.0, 1.0) * capacity as f64) as u32;

        Self {
            sink,
            buf: vec![0u8; capacity as usize],
            occupied: vec![false; capacity as usize],
            buffer_window: Interval::new(0, capacity),
            file_window: Interval::new(0, capacity),
            total_written: 0,
            threshold,
            flushes: 0,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.buf.len() as u32
    }

    pub fn total_written(&self) -> u32 {
        self.total_written
    }

    pub fn flush_count(&self) -> u64 {
        self.flushes
    }

    /// 현재 수용 가능한 절대 파일 구간
    pub fn file_window(&self) -> Interval {
        self.file_window
    }

    /// 절대 파일 오프셋 → 버퍼 인덱스
    ///
    /// `offset`은 `[total_written, total_written + capacity)` 안에 있어야 한다.
    fn index_of(&self, offset: u32) -> usize {
        debug_assert!(offset >= self.total_written);
        (offset - self.total_written) as usize
    }

    /// `data`(파일 구간 `target`에 해당)를 버퍼에 기록
    ///
    /// 실제로 받아들인 구간(파일 윈도우와의 교집합, 비어 있을 수 있음)을 돌려준다.
    pub fn write(&mut self, data: &[u8], target: Interval) -> Result<Interval> {
        self.soft_reset()?;

        let sect = self.file_window.intersect(&target);
        if sect.is_empty() {
            return Ok(sect);
        }

        let src = (sect.start() - target.start()) as usize;
        let dst = self.index_of(sect.start());
        let len = sect.len() as usize;

        self.buf[dst..dst + len].copy_from_slice(&data[src..src + len]);
        self.occupied[dst..dst + len].fill(true);
        Ok(sect)
    }

    /// 연속 점유 접두부만큼 윈도우 시작을 전진
    ///
    /// 다음으로 기대하는 절대 파일 오프셋을 돌려준다.
    pub fn advance(&mut self) -> u32 {
        while !self.buffer_window.is_empty()
            && self.occupied[self.buffer_window.start() as usize]
        {
            self.buffer_window = self.buffer_window.advance_start(1);
            self.file_window = self.file_window.advance_start(1);
        }
        self.file_window.start()
    }

    /// 마지막 플러시 후 출력 저장소 반환. 확정된 총 바이트 수도 함께 돌려준다
    pub fn close(mut self) -> Result<(u32, W)> {
        self.hard_reset()?;
        self.sink.flush()?;
        Ok((self.total_written, self.sink))
    }

    fn soft_reset(&mut self) -> Result<bool> {
        if self.buffer_window.start() >= self.threshold && self.buffer_window.start() > 0 {
            self.hard_reset()?;
            return Ok(true);
        }
        Ok(false)
    }

    /// 확정된 접두부 `[0, buffer_window.start)`를 내보내고 나머지를 앞으로 당김
    fn hard_reset(&mut self) -> Result<()> {
        let flushed = self.buffer_window.start() as usize;
        if flushed > 0 {
            self.sink.write_all(&self.buf[..flushed])?;
            self.flushes += 1;
            debug!(
                "플러시: {} bytes @ {}",
                flushed,
                self.total_written
            );
        }

        self.total_written = self.file_window.start();

        let capacity = self.buf.len();
        self.buf.copy_within(flushed..capacity, 0);
        self.occupied.copy_within(flushed..capacity, 0);
        self.occupied[capacity - flushed..].fill(false);

        let capacity = capacity as u32;
        self.buffer_window = Interval::new(0, capacity);
        self.file_window = Interval::with_len(self.total_written, capacity);
        Ok(())
    }
}
