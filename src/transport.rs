//! 데이터그램 전송 계층
//!
//! - `Transport`: 고정 피어와의 send / recv (타임아웃은 호출측에서 `tokio::time::timeout`)
//! - `ChannelTransport`: 메모리 내 양방향 링크 (UDP처럼 동작)
//! - `FaultInjector` / `LossyLink`: 인위적 패킷 손실 주입

use std::collections::HashSet;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use crate::{Config, Error, Result};

/// 고정 피어와 연결된 데이터그램 전송
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, datagram: &[u8]) -> io::Result<usize>;

    /// 데이터그램 하나 수신. `buf`보다 크면 잘림
    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize>;
}

/// `connect`된 UDP 소켓
#[async_trait]
impl Transport for UdpSocket {
    async fn send(&self, datagram: &[u8]) -> io::Result<usize> {
        UdpSocket::send(self, datagram).await
    }

    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        UdpSocket::recv(self, buf).await
    }
}

/// 메모리 내 데이터그램 링크의 한쪽 끝
///
/// 상대가 사라진 뒤의 송신은 조용히 버려지고, 수신은 영원히 대기한다 (UDP와 동일).
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<Bytes>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Bytes>>,
}

impl ChannelTransport {
    /// 서로 연결된 양 끝 생성
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        (
            Self {
                tx: a_tx,
                rx: tokio::sync::Mutex::new(a_rx),
            },
            Self {
                tx: b_tx,
                rx: tokio::sync::Mutex::new(b_rx),
            },
        )
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&self, datagram: &[u8]) -> io::Result<usize> {
        let _ = self.tx.send(Bytes::copy_from_slice(datagram));
        Ok(datagram.len())
    }

    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut rx = self.rx.lock().await;
        match rx.recv().await {
            Some(datagram) => {
                let len = datagram.len().min(buf.len());
                buf[..len].copy_from_slice(&datagram[..len]);
                Ok(len)
            }
            None => std::future::pending().await,
        }
    }
}

/// "이번 송신을 버릴까?" 결정자
pub trait FaultInjector: Send + Sync {
    fn should_drop(&self) -> bool;
}

/// 손실 없음
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLoss;

impl FaultInjector for NoLoss {
    fn should_drop(&self) -> bool {
        false
    }
}

/// 고정 확률 무작위 손실
pub struct RandomLoss {
    probability: f64,
    rng: Mutex<StdRng>,
}

impl RandomLoss {
    pub fn new(probability: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            probability: probability.clamp(0.0, 1.0),
            rng: Mutex::new(rng),
        }
    }
}

impl FaultInjector for RandomLoss {
    fn should_drop(&self) -> bool {
        self.rng.lock().gen_bool(self.probability)
    }
}

/// 지정한 순번(0부터)의 송신 시도만 버리는 결정적 손실
#[derive(Debug, Default)]
pub struct ScriptedLoss {
    drops: HashSet<u64>,
    attempts: AtomicU64,
}

impl ScriptedLoss {
    pub fn new(drops: impl IntoIterator<Item = u64>) -> Self {
        Self {
            drops: drops.into_iter().collect(),
            attempts: AtomicU64::new(0),
        }
    }

    /// 지금까지의 송신 시도 횟수
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl FaultInjector for ScriptedLoss {
    fn should_drop(&self) -> bool {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        self.drops.contains(&attempt)
    }
}

/// 설정에서 손실 주입기 생성
pub fn injector_from_config(config: &Config) -> Arc<dyn FaultInjector> {
    if config.loss_probability > 0.0 {
        Arc::new(RandomLoss::new(config.loss_probability, config.loss_seed))
    } else {
        Arc::new(NoLoss)
    }
}

/// 송신 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent(usize),
    Dropped,
}

/// 손실 주입을 거치는 송신 경로
pub struct LossyLink<T> {
    transport: Arc<T>,
    injector: Arc<dyn FaultInjector>,
}

impl<T: Transport> LossyLink<T> {
    pub fn new(transport: Arc<T>, injector: Arc<dyn FaultInjector>) -> Self {
        Self {
            transport,
            injector,
        }
    }

    /// 송신. 전송 계층 에러는 재시도 없이 `SendFailure`
    pub async fn send(&self, datagram: &[u8]) -> Result<SendOutcome> {
        if self.injector.should_drop() {
            return Ok(SendOutcome::Dropped);
        }
        self.transport
            .send(datagram)
            .await
            .map(SendOutcome::Sent)
            .map_err(Error::SendFailure)
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }
}
