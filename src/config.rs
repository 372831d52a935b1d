//! 프로토콜 설정

use std::time::Duration;

use tracing::warn;

use crate::segment::MAX_PAYLOAD_SIZE;
use crate::{Error, Result, DEFAULT_FILE_BUFFER_SIZE, DEFAULT_PAYLOAD_SIZE};

/// SRFP 프로토콜 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// 세그먼트당 최대 페이로드 (바이트). 윈도우 증감 단위이기도 함
    pub payload_size: usize,

    /// 송신측 파일 청크 버퍼 크기 (바이트)
    pub file_buffer_size: usize,

    /// 송신 윈도우 상한 (바이트)
    /// 0이면 stop-and-wait 모드
    pub max_window: usize,

    /// 재전송 타임아웃. 이 시간 안에 보낸 바이트는 다시 보내지 않음
    pub retransmission_timeout: Duration,

    /// ACK 리스너의 1회 수신 대기 시간
    pub ack_timeout: Duration,

    /// 연속 ACK 타임아웃 허용 횟수. 초과 시 피어가 사라진 것으로 판단
    pub max_silent_timeouts: u32,

    /// 보낼 것이 없을 때 송신 루프 대기 간격
    pub idle_poll: Duration,

    /// 수신측 링 버퍼 크기 (바이트)
    pub recv_buffer_size: usize,

    /// 수신 윈도우 크기 (바이트)
    pub recv_window_size: usize,

    /// 소프트 리셋 임계치 (링 버퍼 용량 대비 비율)
    pub flush_threshold: f64,

    /// 수신측 세그먼트 대기 타임아웃
    pub receive_timeout: Duration,

    /// 핸드셰이크 1회 응답 대기 시간
    pub handshake_timeout: Duration,

    /// 핸드셰이크 최대 시도 횟수
    pub handshake_retries: u32,

    /// 인위적 패킷 손실 확률 (0.0 ~ 1.0)
    pub loss_probability: f64,

    /// 손실 주입 시드 (None이면 엔트로피 사용)
    pub loss_seed: Option<u64>,

    /// 수신 세그먼트 체크섬 검증 여부
    pub verify_checksum: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            payload_size: DEFAULT_PAYLOAD_SIZE,
            file_buffer_size: DEFAULT_FILE_BUFFER_SIZE,
            max_window: DEFAULT_FILE_BUFFER_SIZE,
            retransmission_timeout: Duration::from_millis(150),
            ack_timeout: Duration::from_millis(150),
            max_silent_timeouts: 200,                    // 약 30초
            idle_poll: Duration::from_millis(5),
            recv_buffer_size: 200 * DEFAULT_PAYLOAD_SIZE,
            recv_window_size: 40 * DEFAULT_PAYLOAD_SIZE,
            flush_threshold: 0.75,
            receive_timeout: Duration::from_millis(500),
            handshake_timeout: Duration::from_secs(1),
            handshake_retries: 100,
            loss_probability: 0.0,
            loss_seed: None,
            verify_checksum: false,
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 송신 윈도우 실제 상한 (파일 버퍼 용량을 넘지 않음)
    pub fn window_cap(&self) -> usize {
        self.max_window.min(self.file_buffer_size).max(self.payload_size)
    }

    /// stop-and-wait 모드 여부
    pub fn is_stop_and_wait(&self) -> bool {
        self.max_window == 0
    }

    /// 설정 검증
    ///
    /// 링 버퍼가 윈도우 + 세그먼트 하나보다 작으면 경고만 남긴다.
    /// 윈도우를 벗어난 쓰기는 교집합 계산에서 버려지고 송신측 재전송으로 회복된다.
    pub fn validate(&self) -> Result<()> {
        if self.payload_size == 0 || self.payload_size > MAX_PAYLOAD_SIZE {
            return Err(Error::InvalidConfig(format!(
                "payload_size {} (1..={} 필요)",
                self.payload_size, MAX_PAYLOAD_SIZE
            )));
        }
        if self.file_buffer_size < self.payload_size {
            return Err(Error::InvalidConfig(format!(
                "file_buffer_size {} < payload_size {}",
                self.file_buffer_size, self.payload_size
            )));
        }
        if self.recv_buffer_size == 0 || self.recv_window_size == 0 {
            return Err(Error::InvalidConfig("수신 버퍼/윈도우 크기는 0일 수 없음".into()));
        }
        if !(0.0..=1.0).contains(&self.flush_threshold) {
            return Err(Error::InvalidConfig(format!(
                "flush_threshold {} (0.0..=1.0 필요)",
                self.flush_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.loss_probability) {
            return Err(Error::InvalidConfig(format!(
                "loss_probability {} (0.0..=1.0 필요)",
                self.loss_probability
            )));
        }
        if self.recv_buffer_size < self.recv_window_size + self.payload_size {
            warn!(
                "수신 버퍼 {} bytes < 윈도우 {} + 페이로드 {}: 윈도우 끝 쓰기는 버려짐",
                self.recv_buffer_size, self.recv_window_size, self.payload_size
            );
        }
        Ok(())
    }

    /// 손실이 많은 링크용 설정
    pub fn lossy_link() -> Self {
        Self {
            retransmission_timeout: Duration::from_millis(300),
            ack_timeout: Duration::from_millis(300),
            receive_timeout: Duration::from_secs(5),
            recv_window_size: 20 * DEFAULT_PAYLOAD_SIZE,
            verify_checksum: true,
            ..Self::default()
        }
    }

    /// LAN용 설정 (큰 세그먼트, 짧은 타임아웃)
    pub fn lan() -> Self {
        let payload_size = 1400;
        Self {
            payload_size,
            file_buffer_size: 1024 * 1024,
            max_window: 1024 * 1024,
            retransmission_timeout: Duration::from_millis(50),
            ack_timeout: Duration::from_millis(50),
            max_silent_timeouts: 400,
            recv_buffer_size: 512 * payload_size,
            recv_window_size: 128 * payload_size,
            ..Self::default()
        }
    }
}

/// 서버 설정 파일 내용
///
/// 형식: 공백으로 구분된 `port max_window seed loss_probability`
#[derive(Debug, Clone, PartialEq)]
pub struct ServerSettings {
    pub port: u16,
    pub max_window: usize,
    pub seed: Option<u64>,
    pub loss_probability: f64,
}

impl ServerSettings {
    /// 설정 파일 파싱. seed가 0 이하이면 시드 없음
    pub fn parse(contents: &str) -> Result<Self> {
        let mut fields = contents.split_whitespace();
        let mut next = |name: &str| {
            fields
                .next()
                .ok_or_else(|| Error::InvalidConfig(format!("설정 파일에 {} 없음", name)))
        };

        let port_str = next("port")?;
        let window_str = next("max_window")?;
        let seed_str = next("seed")?;
        let plp_str = next("loss_probability")?;

        let port = port_str
            .parse::<u16>()
            .map_err(|_| Error::InvalidConfig(format!("잘못된 port: {}", port_str)))?;
        let window = window_str
            .parse::<i64>()
            .map_err(|_| Error::InvalidConfig(format!("잘못된 max_window: {}", window_str)))?;
        let seed = seed_str
            .parse::<f64>()
            .map_err(|_| Error::InvalidConfig(format!("잘못된 seed: {}", seed_str)))?;
        let loss_probability = plp_str
            .parse::<f64>()
            .map_err(|_| Error::InvalidConfig(format!("잘못된 loss_probability: {}", plp_str)))?;

        Ok(Self {
            port,
            max_window: window.max(0) as usize,
            seed: (seed > 0.0).then_some(seed as u64),
            loss_probability,
        })
    }

    /// 기본 설정에 파일 값을 덮어씀
    pub fn apply(&self, config: &mut Config) {
        config.max_window = self.max_window;
        config.loss_seed = self.seed;
        config.loss_probability = self.loss_probability;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(Config::default().validate().is_ok());
        assert!(Config::lossy_link().validate().is_ok());
        assert!(Config::lan().validate().is_ok());
    }

    #[test]
    fn test_invalid_payload() {
        let config = Config {
            payload_size: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_window_cap() {
        let config = Config {
            max_window: 1_000_000,
            file_buffer_size: 5000,
            ..Config::default()
        };
        assert_eq!(config.window_cap(), 5000);
        assert!(!config.is_stop_and_wait());
    }

    #[test]
    fn test_parse_server_settings() {
        let settings = ServerSettings::parse("55555\n5000\n7\n0.1\n").unwrap();
        assert_eq!(settings.port, 55555);
        assert_eq!(settings.max_window, 5000);
        assert_eq!(settings.seed, Some(7));
        assert!((settings.loss_probability - 0.1).abs() < 1e-9);

        let mut config = Config::default();
        settings.apply(&mut config);
        assert_eq!(config.max_window, 5000);
        assert_eq!(config.loss_seed, Some(7));
    }

    #[test]
    fn test_parse_server_settings_unseeded_stop_and_wait() {
        let settings = ServerSettings::parse("9000 0 -1 0.0").unwrap();
        assert_eq!(settings.max_window, 0);
        assert_eq!(settings.seed, None);
    }

    #[test]
    fn test_parse_server_settings_missing_field() {
        assert!(ServerSettings::parse("9000 10").is_err());
        assert!(ServerSettings::parse("port 10 1 0.0").is_err());
    }
}
