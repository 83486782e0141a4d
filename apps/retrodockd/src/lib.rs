//! Control server: one unix socket, one peer, one emulation runner.
//!
//! The async side never touches the core. Every request is decoded here,
//! forwarded to the runner thread over its control channel, and the awaited
//! result is encoded back as a reply. Session state transitions stream to the
//! connected peer as `stateChanged` notifications.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::io::AsyncWriteExt;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};
use tracing::{info, warn};

use retrodock_host::runner::{Runner, RunnerConfig, RunnerHandle};
use retrodock_host::session::Notification;
use retrodock_proto::messages::{ControlReply, ControlRequest, VideoInfo};
use retrodock_proto::{ControlFramer, encode_frame};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub socket_path: PathBuf,
    pub runner: RunnerConfig,
}

/// Binds the control socket, spawns the emulation thread, and serves until
/// the process is killed.
pub async fn run_server(config: ServerConfig) -> Result<()> {
    if config.socket_path.exists() {
        std::fs::remove_file(&config.socket_path)
            .with_context(|| format!("removing stale socket {}", config.socket_path.display()))?;
    }
    let listener = UnixListener::bind(&config.socket_path)
        .with_context(|| format!("binding {}", config.socket_path.display()))?;
    info!(socket = %config.socket_path.display(), "control socket bound");

    let (notify_tx, notify_rx) = unbounded_channel();
    let handle = Runner::spawn(config.runner, notify_tx);
    serve(listener, handle, notify_rx).await
}

/// Accept loop. A single peer is served at a time; connections arriving while
/// one is active are dropped with a warning. Notifications with no peer to
/// receive them are discarded.
pub async fn serve(
    listener: UnixListener,
    handle: RunnerHandle,
    mut notify_rx: UnboundedReceiver<Notification>,
) -> Result<()> {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, _) = accepted.context("accept on control socket")?;
                info!("control peer connected");
                match serve_peer(stream, &listener, &handle, &mut notify_rx).await {
                    Ok(()) => info!("control peer disconnected"),
                    Err(e) => warn!("control peer dropped: {e}"),
                }
            }
            Some(note) = notify_rx.recv() => {
                let Notification::StateChanged(state) = note;
                info!(%state, "state changed with no peer attached");
            }
        }
    }
}

async fn serve_peer(
    mut stream: UnixStream,
    listener: &UnixListener,
    handle: &RunnerHandle,
    notify_rx: &mut UnboundedReceiver<Notification>,
) -> Result<()> {
    let mut framer = ControlFramer::new(4096);
    loop {
        tokio::select! {
            read = stream.readable() => {
                read.context("waiting for control data")?;
                match stream.try_read_buf(framer.buf_mut()) {
                    Ok(0) => return Ok(()),
                    Ok(_) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
                    Err(e) => return Err(e).context("reading control socket"),
                }
                for decoded in framer.drain_requests() {
                    let reply = match decoded {
                        Ok(request) => dispatch(handle, request).await,
                        Err(e) => {
                            warn!("bad control frame: {e}");
                            ControlReply::error(e.to_string())
                        }
                    };
                    write_reply(&mut stream, &reply).await?;
                }
            }
            Some(Notification::StateChanged(state)) = notify_rx.recv() => {
                let reply = ControlReply::StateChanged { state: state.to_string() };
                write_reply(&mut stream, &reply).await?;
            }
            extra = listener.accept() => {
                if extra.is_ok() {
                    warn!("dropping additional control connection, one peer at a time");
                }
            }
        }
    }
}

async fn write_reply(stream: &mut UnixStream, reply: &ControlReply) -> Result<()> {
    let frame = encode_frame(reply).context("encoding reply")?;
    stream
        .write_all(&frame)
        .await
        .context("writing control reply")?;
    Ok(())
}

/// Maps one request onto the runner and shapes its result into a reply.
/// Failures never tear the connection down; they become `error` replies.
async fn dispatch(handle: &RunnerHandle, request: ControlRequest) -> ControlReply {
    match request {
        ControlRequest::InitEmu { core, game } => {
            match handle.init(core.into(), game.into()).await {
                Ok(report) => ControlReply::init_emu(VideoInfo {
                    width: report.av.width,
                    height: report.av.height,
                    aspect_ratio: report.av.aspect_ratio,
                    frame_rate: report.av.fps,
                    pixel_format: report.pixel_format,
                }),
                Err(e) => ControlReply::error(e.to_string()),
            }
        }
        ControlRequest::PlayEmu => reply_unit(handle.play().await, ControlReply::PlayEmu),
        ControlRequest::PauseEmu => reply_unit(handle.pause().await, ControlReply::PausedEmu),
        ControlRequest::ShutdownEmu => reply_state(handle, handle.shutdown().await).await,
        ControlRequest::RestartEmu => reply_state(handle, handle.restart().await).await,
        ControlRequest::KillEmu => reply_state(handle, handle.kill().await).await,
        ControlRequest::SaveState { path } => {
            reply_unit(handle.save_state(path.into()).await, ControlReply::SaveState)
        }
        ControlRequest::LoadState { path } => {
            reply_unit(handle.load_state(path.into()).await, ControlReply::LoadState)
        }
        ControlRequest::UpdateVariable { key, value } => reply_unit(
            handle.update_variable(key, value).await,
            ControlReply::UpdateVariable,
        ),
    }
}

fn reply_unit(
    result: Result<(), retrodock_host::HostError>,
    ok: ControlReply,
) -> ControlReply {
    match result {
        Ok(()) => ok,
        Err(e) => ControlReply::error(e.to_string()),
    }
}

/// Verbs whose success is best described by the state they land in.
async fn reply_state(
    handle: &RunnerHandle,
    result: Result<(), retrodock_host::HostError>,
) -> ControlReply {
    match result {
        Ok(()) => match handle.state().await {
            Ok(state) => ControlReply::StateChanged {
                state: state.to_string(),
            },
            Err(e) => ControlReply::error(e.to_string()),
        },
        Err(e) => ControlReply::error(e.to_string()),
    }
}
