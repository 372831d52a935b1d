//! 반개구간 `[start, end)` 바이트 오프셋 구간
//!
//! 윈도우 계산 전반에서 쓰이는 값 타입

/// 반개구간 `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Interval {
    start: u32,
    end: u32,
}

impl Interval {
    /// `[start, end)` 생성. `end < start`이면 빈 구간 `[start, start)`
    pub fn new(start: u32, end: u32) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    /// 시작점과 길이로 생성 (u32 범위에서 포화)
    pub fn with_len(start: u32, len: u32) -> Self {
        Self::new(start, start.saturating_add(len))
    }

    pub fn start(&self) -> u32 {
        self.start
    }

    pub fn end(&self) -> u32 {
        self.end
    }

    pub fn len(&self) -> u32 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// 교집합
    ///
    /// 겹치지 않으면 `[max(start), max(start))` 빈 구간을 돌려준다.
    /// 빈 결과도 인자 순서와 무관하게 같다.
    pub fn intersect(&self, other: &Interval) -> Interval {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        if start >= end {
            Interval { start, end: start }
        } else {
            Interval { start, end }
        }
    }

    /// 두 구간을 모두 덮는 최소 구간
    pub fn merge(&self, other: &Interval) -> Interval {
        Interval {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// 시작점을 `by`만큼 전진 (end를 넘지 않음)
    pub fn advance_start(&self, by: u32) -> Interval {
        Interval {
            start: self.start.saturating_add(by).min(self.end),
            end: self.end,
        }
    }

    /// 구간 전체를 `base` 기준 상대 오프셋으로 이동
    pub fn relative_to(&self, base: u32) -> Interval {
        Interval::new(self.start.saturating_sub(base), self.end.saturating_sub(base))
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}+{}", self.start, self.len())
    }
}
