//! 클라이언트 측 핸드셰이크 및 다운로드
//!
//! 파일 이름을 보내고 서버 세션 소켓에서 오는 첫 ACK(파일 크기)를 기다린다.
//! 이후 소켓을 세션 주소에 `connect`하고 수신 엔진을 돌린다.

use std::fs::File;
use std::io::BufWriter;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tracing::{info, warn};

use crate::receiver::{ReceivedFile, Receiver};
use crate::segment::AckSegment;
use crate::{Config, Error, Result};

/// 파일 요청 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileOffer {
    pub file_size: u32,
    /// 서버 세션 소켓 주소
    pub session_addr: SocketAddr,
}

/// 파일 이름을 보내고 첫 ACK를 받을 때까지 재시도
pub async fn request_file(
    socket: &UdpSocket,
    server: SocketAddr,
    filename: &str,
    config: &Config,
) -> Result<FileOffer> {
    let mut buf = [0u8; 64];

    for attempt in 1..=config.handshake_retries {
        socket
            .send_to(filename.as_bytes(), server)
            .await
            .map_err(Error::SendFailure)?;

        match tokio::time::timeout(config.handshake_timeout, socket.recv_from(&mut buf)).await {
            Err(_) => {
                warn!(
                    "파일 크기 응답 타임아웃 ({}/{})",
                    attempt, config.handshake_retries
                );
            }
            Ok(Err(e)) => {
                warn!("핸드셰이크 수신 에러: {}", e);
                tokio::time::sleep(config.handshake_timeout).await;
            }
            Ok(Ok((len, session_addr))) => match AckSegment::decode(&buf[..len]) {
                Ok(ack) if ack.is_not_found() => {
                    return Err(Error::FileNotFound {
                        name: filename.to_string(),
                    });
                }
                Ok(ack) => {
                    info!(
                        "서버 응답: file_size={} from {}",
                        ack.offset, session_addr
                    );
                    return Ok(FileOffer {
                        file_size: ack.offset,
                        session_addr,
                    });
                }
                Err(_) => warn!("잘못된 ACK - {} bytes 수신", len),
            },
        }
    }

    Err(Error::HandshakeTimeout {
        attempts: config.handshake_retries,
    })
}

/// 파일 하나 다운로드
///
/// 핸드셰이크가 성공한 뒤에만 출력 파일을 만든다. 실패 시 부분 파일은 남는다.
pub async fn download(
    config: &Config,
    bind_addr: SocketAddr,
    server: SocketAddr,
    filename: &str,
    output: &Path,
) -> Result<ReceivedFile<BufWriter<File>>> {
    config.validate()?;

    let socket = UdpSocket::bind(bind_addr).await?;
    let offer = request_file(&socket, server, filename, config).await?;
    socket.connect(offer.session_addr).await?;

    let file = BufWriter::new(File::create(output)?);
    let receiver = Receiver::new(config.clone(), Arc::new(socket));
    receiver.receive_file(file, offer.file_size).await
}
