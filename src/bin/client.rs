//! SRFP 클라이언트 (수신자) - Selective-Repeat File Protocol
//!
//! 서버에 파일 이름을 보내고 받은 파일을 출력 디렉터리에 저장한다.
//!
//! 사용법:
//!   cargo run --release --bin srfp-client -- [OPTIONS]
//!
//! 예시:
//!   cargo run --release --bin srfp-client -- --server 127.0.0.1:9000 --file data.bin
//!
//!   # 다른 디렉터리에 저장
//!   cargo run --release --bin srfp-client -- -s 10.0.0.2:9000 -f data.bin -o downloads

use std::error::Error;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use srfp::{download, Config, DEFAULT_PORT};

/// 클라이언트 실행 인자
struct ClientArgs {
    bind_addr: SocketAddr,
    server_addr: SocketAddr,
    file: Option<String>,
    output_dir: PathBuf,
}

impl Default for ClientArgs {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 0)),
            server_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            file: None,
            output_dir: PathBuf::from("."),
        }
    }
}

fn print_help() {
    println!(
        r#"SRFP Client - Selective-Repeat File Protocol 클라이언트

사용법:
  cargo run --release --bin srfp-client -- [OPTIONS]

옵션:
  -s, --server <ADDR>      서버 주소 (기본: 127.0.0.1:9000)
  -b, --bind <ADDR>        바인드 주소 (기본: 0.0.0.0:0)
  -f, --file <NAME>        요청할 파일 이름 (필수)
  -o, --output-dir <DIR>   저장 디렉터리 (기본: .)
  -h, --help               이 도움말 출력
"#
    );
}

fn parse_args() -> Result<ClientArgs, Box<dyn Error>> {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = ClientArgs::default();

    let mut i = 1;
    while i < args.len() {
        let value = args.get(i + 1);
        match (args[i].as_str(), value) {
            ("--server" | "-s", Some(v)) => {
                parsed.server_addr = v.parse()?;
                i += 1;
            }
            ("--bind" | "-b", Some(v)) => {
                parsed.bind_addr = v.parse()?;
                i += 1;
            }
            ("--file" | "-f", Some(v)) => {
                parsed.file = Some(v.clone());
                i += 1;
            }
            ("--output-dir" | "-o", Some(v)) => {
                parsed.output_dir = PathBuf::from(v);
                i += 1;
            }
            ("--help" | "-h", _) => {
                print_help();
                std::process::exit(0);
            }
            (other, _) => return Err(format!("알 수 없는 옵션 또는 값 없음: {}", other).into()),
        }
        i += 1;
    }

    Ok(parsed)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // 로깅 설정 (RUST_LOG로 조정)
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = parse_args()?;
    let file = args.file.ok_or("--file 필요 (--help 참고)")?;

    // 요청 경로의 마지막 이름만 저장에 사용
    let local_name = Path::new(&file)
        .file_name()
        .ok_or_else(|| format!("잘못된 파일 이름: {}", file))?;
    let output = args.output_dir.join(local_name);

    let config = Config::default();
    info!("Server: {}", args.server_addr);
    info!("Requesting: {} → {:?}", file, output);

    let received = download(&config, args.bind_addr, args.server_addr, &file, &output).await?;

    let stats = &received.stats;
    info!("Transfer complete!");
    info!("  Bytes written: {}", received.total_written);
    info!("  Time: {:.2}s", stats.elapsed().as_secs_f64());
    info!("  Throughput: {:.2} MB/s", stats.throughput() / 1_000_000.0);
    Ok(())
}
