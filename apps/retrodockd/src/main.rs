use std::path::PathBuf;

use clap::Parser;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use retrodock_host::runner::RunnerConfig;
use retrodockd::{ServerConfig, run_server};

/// Process-separated libretro backend daemon.
#[derive(Parser, Debug)]
#[command(name = "retrodockd")]
#[command(about = "Hosts a libretro core behind a unix-socket control channel", long_about = None)]
struct Args {
    /// Control socket path
    #[arg(short, long)]
    socket: Option<PathBuf>,

    /// Shared-memory file the frontend maps for video frames and keyboard
    /// state
    #[arg(long)]
    frame_file: Option<PathBuf>,

    /// Directory handed to cores asking for a system directory (BIOS files
    /// and the like)
    #[arg(long)]
    system_dir: Option<PathBuf>,

    /// Directory handed to cores asking for a save directory
    #[arg(long)]
    save_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: Level,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let socket_path = args
        .socket
        .unwrap_or_else(|| std::env::temp_dir().join("retrodock.sock"));
    let frame_path = args
        .frame_file
        .unwrap_or_else(|| std::env::temp_dir().join("retrodock-frames"));

    info!("retrodockd starting");
    info!("control socket: {}", socket_path.display());
    info!("frame file: {}", frame_path.display());
    info!("log level: {}", args.log_level);

    run_server(ServerConfig {
        socket_path,
        runner: RunnerConfig {
            frame_path,
            system_dir: args.system_dir,
            save_dir: args.save_dir,
        },
    })
    .await
}
