//! SRFP 서버 (송신자) - Selective-Repeat File Protocol
//!
//! 파일 이름 요청을 받아 클라이언트마다 세션을 열고 파일을 보낸다.
//! `--window 0`이면 stop-and-wait 모드로 동작한다.
//!
//! 사용법:
//!   cargo run --release --bin srfp-server -- [OPTIONS]
//!
//! 예시:
//!   # 현재 디렉터리의 파일 제공
//!   cargo run --release --bin srfp-server -- --bind 0.0.0.0:9000 --root .
//!
//!   # 10% 인공 손실, 시드 고정
//!   cargo run --release --bin srfp-server -- --root files --loss 0.1 --seed 42

use std::error::Error;
use std::net::SocketAddr;
use std::path::PathBuf;

use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use srfp::{Config, Server, ServerSettings, DEFAULT_PORT};

/// 서버 실행 인자
struct ServerArgs {
    bind_addr: SocketAddr,
    root: PathBuf,
    config_file: Option<PathBuf>,
    window: Option<usize>,
    loss: Option<f64>,
    seed: Option<u64>,
}

impl Default for ServerArgs {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            root: PathBuf::from("."),
            config_file: None,
            window: None,
            loss: None,
            seed: None,
        }
    }
}

fn print_help() {
    println!(
        r#"SRFP Server - Selective-Repeat File Protocol 서버

사용법:
  cargo run --release --bin srfp-server -- [OPTIONS]

옵션:
  -b, --bind <ADDR>       바인드 주소 (기본: 0.0.0.0:9000)
  -r, --root <DIR>        제공할 파일 디렉터리 (기본: .)
  -c, --config <PATH>     설정 파일 "port max_window seed loss_probability"
  -w, --window <BYTES>    최대 송신 윈도우, 0이면 stop-and-wait (기본: 100000)
  --loss <P>              인공 패킷 손실 확률 0.0~1.0 (기본: 0.0)
  --seed <N>              손실 난수 시드
  -h, --help              이 도움말 출력

설정 파일의 port는 --bind 주소의 포트를 대체한다.
--window, --loss, --seed는 설정 파일 값보다 우선한다.
"#
    );
}

fn parse_args() -> Result<ServerArgs, Box<dyn Error>> {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = ServerArgs::default();

    let mut i = 1;
    while i < args.len() {
        let value = args.get(i + 1);
        match (args[i].as_str(), value) {
            ("--bind" | "-b", Some(v)) => {
                parsed.bind_addr = v.parse()?;
                i += 1;
            }
            ("--root" | "-r", Some(v)) => {
                parsed.root = PathBuf::from(v);
                i += 1;
            }
            ("--config" | "-c", Some(v)) => {
                parsed.config_file = Some(PathBuf::from(v));
                i += 1;
            }
            ("--window" | "-w", Some(v)) => {
                parsed.window = Some(v.parse()?);
                i += 1;
            }
            ("--loss", Some(v)) => {
                parsed.loss = Some(v.parse()?);
                i += 1;
            }
            ("--seed", Some(v)) => {
                parsed.seed = Some(v.parse()?);
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
    let mut config = Config::default();
    let mut bind_addr = args.bind_addr;

    if let Some(path) = &args.config_file {
        let settings = ServerSettings::parse(&std::fs::read_to_string(path)?)?;
        info!("설정 파일 {:?}: {:?}", path, settings);
        settings.apply(&mut config);
        bind_addr.set_port(settings.port);
    }
    if let Some(window) = args.window {
        config.max_window = window;
    }
    if let Some(loss) = args.loss {
        config.loss_probability = loss;
    }
    if args.seed.is_some() {
        config.loss_seed = args.seed;
    }

    info!("Payload size: {} bytes", config.payload_size);
    info!("Max window: {} bytes", config.max_window);
    info!("Loss probability: {:.1}%", config.loss_probability * 100.0);

    let server = Server::bind(bind_addr, args.root, config).await?;
    server.run().await?;
    Ok(())
}
