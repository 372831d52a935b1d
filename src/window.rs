//! 송신 윈도우 (AIMD)
//!
//! ACK 수신 시 페이로드 단위만큼 증가, ACK 타임아웃 시 절반으로 감소.
//! RTT 기반 혼잡제어가 아니라 손실에 대한 단순 백프레셔.

#[derive(Debug, Clone)]
pub struct Window {
    size: usize,
    unit: usize,
    max: usize,
}

impl Window {
    /// 한 단위 크기로 시작
    pub fn new(unit: usize, max: usize) -> Self {
        Self::with_size(unit, unit, max)
    }

    pub fn with_size(initial: usize, unit: usize, max: usize) -> Self {
        let unit = unit.max(1);
        let max = max.max(unit);
        Self {
            size: initial.clamp(unit, max),
            unit,
            max,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// 한 단위 증가 (상한 유지)
    pub fn grow(&mut self) {
        self.size = (self.size + self.unit).min(self.max);
    }

    /// 절반 감소 (한 단위 하한)
    pub fn shrink(&mut self) {
        self.size = (self.size / 2).max(self.unit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consecutive_timeouts() {
        let unit = 250;
        let initial = 64_000;
        for n in 0..12u32 {
            let mut window = Window::with_size(initial, unit, 100_000);
            for _ in 0..n {
                window.shrink();
            }
            assert_eq!(window.size(), unit.max(initial >> n));
        }
    }

    #[test]
    fn test_grow_after_backoff() {
        let mut window = Window::with_size(8000, 250, 10_000);
        window.shrink();
        window.shrink();
        assert_eq!(window.size(), 2000);
        window.grow();
        assert_eq!(window.size(), 2250);
    }

    #[test]
    fn test_grow_capped() {
        let mut window = Window::with_size(900, 250, 1000);
        window.grow();
        assert_eq!(window.size(), 1000);
        window.grow();
        assert_eq!(window.size(), 1000);
    }

    #[test]
    fn test_shrink_floor() {
        let mut window = Window::new(250, 1000);
        window.shrink();
        assert_eq!(window.size(), 250);
    }
}
