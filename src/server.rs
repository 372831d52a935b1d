//! 파일 서버
//!
//! 리스닝 소켓으로 파일 이름을 받고, 클라이언트마다 새 세션 소켓을 열어
//! 첫 ACK(파일 크기)를 보낸 뒤 별도 태스크에서 송신 엔진을 돌린다.

use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::net::UdpSocket;
use tracing::{debug, error, info, warn};

use crate::segment::AckSegment;
use crate::sender::Sender;
use crate::stats::TransferStats;
use crate::stop_and_wait::StopAndWaitSender;
use crate::transport::{injector_from_config, FaultInjector};
use crate::{Config, Error, Result};

/// 파일 이름 요청 최대 길이
const MAX_REQUEST_SIZE: usize = 1024;

/// 진행 중인 세션
#[derive(Clone)]
struct Session {
    socket: Arc<UdpSocket>,
    first_ack: AckSegment,
}

pub struct Server {
    config: Config,
    root: PathBuf,
    socket: UdpSocket,
    /// 클라이언트 주소 → 세션
    sessions: Arc<DashMap<SocketAddr, Session>>,
}

impl Server {
    /// 리스닝 소켓 바인딩. `root` 아래 파일만 제공한다
    pub async fn bind(addr: SocketAddr, root: impl Into<PathBuf>, config: Config) -> Result<Self> {
        config.validate()?;
        let socket = UdpSocket::bind(addr).await?;
        let root = root.into();

        info!(
            "서버 시작: {} (root={:?}, mode={})",
            socket.local_addr()?,
            root,
            if config.is_stop_and_wait() { "stop-and-wait" } else { "selective-repeat" }
        );

        Ok(Self {
            config,
            root,
            socket,
            sessions: Arc::new(DashMap::new()),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// 요청 수신 루프. 리스닝 소켓 에러에서만 반환한다
    pub async fn run(&self) -> Result<()> {
        let mut buf = vec![0u8; MAX_REQUEST_SIZE];

        loop {
            let (len, client) = self.socket.recv_from(&mut buf).await?;
            let name = String::from_utf8_lossy(&buf[..len]);
            let name = name.trim_end_matches('\0').trim();

            if let Err(e) = self.handle_request(name, client).await {
                warn!("{} 요청 실패 ({:?}): {}", client, name, e);
            }
        }
    }

    /// 파일 이름 요청 하나 처리
    pub async fn handle_request(&self, name: &str, client: SocketAddr) -> Result<()> {
        // 핸드셰이크 재시도: 같은 세션의 첫 ACK를 다시 보냄
        let existing = self.sessions.get(&client).map(|entry| entry.value().clone());
        if let Some(session) = existing {
            debug!("{} 중복 요청, 첫 ACK 재전송", client);
            session
                .socket
                .send(&session.first_ack.encode())
                .await
                .map_err(Error::SendFailure)?;
            return Ok(());
        }

        let socket = self.session_socket(client).await?;

        let opened = match resolve_path(&self.root, name) {
            Some(path) => open_file(&path),
            None => Err(Error::FileNotFound { name: name.to_string() }),
        };
        let (file, size) = match opened {
            Ok(opened) => opened,
            Err(e) => {
                socket
                    .send(&AckSegment::not_found().encode())
                    .await
                    .map_err(Error::SendFailure)?;
                return Err(e);
            }
        };

        let first_ack = AckSegment::file_size(size);
        socket
            .send(&first_ack.encode())
            .await
            .map_err(Error::SendFailure)?;
        info!("{} → {:?} ({} bytes)", client, name, size);

        self.sessions.insert(
            client,
            Session {
                socket: socket.clone(),
                first_ack,
            },
        );

        let sessions = self.sessions.clone();
        let config = self.config.clone();
        tokio::spawn(async move {
            let injector = injector_from_config(&config);
            match serve(config, socket, injector, file).await {
                Ok(stats) => info!("{} 전송 완료: {}", client, stats.summary()),
                Err(e) => error!("{} 전송 실패: {}", client, e),
            }
            sessions.remove(&client);
        });

        Ok(())
    }

    /// 리스닝 주소와 같은 IP, 임의 포트에 바인딩하고 클라이언트에 연결
    async fn session_socket(&self, client: SocketAddr) -> Result<Arc<UdpSocket>> {
        let ip = self.socket.local_addr()?.ip();
        let socket = UdpSocket::bind(SocketAddr::new(ip, 0)).await?;
        socket.connect(client).await?;
        Ok(Arc::new(socket))
    }
}

/// 송신 엔진 선택 후 전송
async fn serve(
    config: Config,
    socket: Arc<UdpSocket>,
    injector: Arc<dyn FaultInjector>,
    file: File,
) -> Result<TransferStats> {
    let source = BufReader::new(file);
    if config.is_stop_and_wait() {
        StopAndWaitSender::new(config, socket, injector)
            .send_file(source)
            .await
    } else {
        Sender::new(config, socket, injector).send_file(source).await
    }
}

/// `root` 기준 상대 경로만 허용 (`..`, 절대 경로 거부)
fn resolve_path(root: &Path, name: &str) -> Option<PathBuf> {
    let mut path = root.to_path_buf();
    let mut depth = 0;

    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => {
                path.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            _ => return None,
        }
    }

    (depth > 0).then_some(path)
}

/// 파일 열기. 크기가 32비트 오프셋을 넘으면 거부
fn open_file(path: &Path) -> Result<(File, u32)> {
    let not_found = || Error::FileNotFound {
        name: path.display().to_string(),
    };

    let file = File::open(path).map_err(|_| not_found())?;
    let metadata = file.metadata()?;
    if !metadata.is_file() {
        return Err(not_found());
    }

    let size = metadata.len();
    if size >= u64::from(u32::MAX) {
        return Err(Error::FileTooLarge { size });
    }
    Ok((file, size as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_path() {
        let root = Path::new("/srv/files");
        assert_eq!(
            resolve_path(root, "a.txt"),
            Some(PathBuf::from("/srv/files/a.txt"))
        );
        assert_eq!(
            resolve_path(root, "./dir/b.bin"),
            Some(PathBuf::from("/srv/files/dir/b.bin"))
        );
        assert_eq!(resolve_path(root, "../etc/passwd"), None);
        assert_eq!(resolve_path(root, "dir/../../x"), None);
        assert_eq!(resolve_path(root, "/etc/passwd"), None);
        assert_eq!(resolve_path(root, ""), None);
    }

    #[test]
    fn test_open_file_rejects_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            open_file(dir.path()),
            Err(Error::FileNotFound { .. })
        ));
        assert!(matches!(
            open_file(&dir.path().join("missing")),
            Err(Error::FileNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_duplicate_request_resends_first_ack() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("data.bin"), vec![7u8; 100]).unwrap();

        let config = Config {
            // 세션이 끝나지 않도록 ACK 대기를 길게
            ack_timeout: std::time::Duration::from_secs(30),
            ..Config::default()
        };
        let server = Server::bind("127.0.0.1:0".parse().unwrap(), dir.path(), config)
            .await
            .unwrap();

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let client_addr = client.local_addr().unwrap();

        server.handle_request("data.bin", client_addr).await.unwrap();
        server.handle_request("data.bin", client_addr).await.unwrap();
        assert_eq!(server.active_sessions(), 1);

        let mut buf = [0u8; 512];
        let mut first_acks = Vec::new();
        while first_acks.len() < 2 {
            let (len, from) = client.recv_from(&mut buf).await.unwrap();
            if len == crate::segment::ACK_SIZE {
                first_acks.push((AckSegment::decode(&buf[..len]).unwrap(), from));
            }
        }
        assert_eq!(first_acks[0], first_acks[1]);
        assert_eq!(first_acks[0].0.offset, 100);
    }
}
