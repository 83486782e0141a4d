//! The emulation thread.
//!
//! All core calls happen on one dedicated thread: native cores are not
//! thread-safe and several (audio device, gamepad backend) attachments want a
//! stable home. Control messages arrive over a crossbeam channel with a tokio
//! oneshot riding along for the reply, so the async control server awaits
//! results without ever touching the core. While playing, the loop paces
//! itself on a frame deadline derived from the core's reported fps.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::oneshot;

use crate::error::HostError;
use crate::session::{AvReport, Notification, Session, SessionConfig, SessionState};

/// How long the loop parks waiting for control traffic while not playing.
const IDLE_WAIT: Duration = Duration::from_millis(10);

const DEFAULT_FPS: f64 = 60.0;

pub type Reply<T> = oneshot::Sender<Result<T, HostError>>;

pub enum ControlMessage {
    Init {
        core: PathBuf,
        game: PathBuf,
        reply: Reply<AvReport>,
    },
    Play { reply: Reply<()> },
    Pause { reply: Reply<()> },
    Shutdown { reply: Reply<()> },
    Restart { reply: Reply<()> },
    Kill { reply: Reply<()> },
    SaveState { path: PathBuf, reply: Reply<()> },
    LoadState { path: PathBuf, reply: Reply<()> },
    UpdateVariable {
        key: String,
        value: String,
        reply: Reply<()>,
    },
    State { reply: Reply<SessionState> },
    Stop,
}

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub frame_path: PathBuf,
    pub system_dir: Option<PathBuf>,
    pub save_dir: Option<PathBuf>,
}

pub struct Runner {
    session: Session,
    ctrl_rx: Receiver<ControlMessage>,
    notify: UnboundedSender<Notification>,
    last_notified: SessionState,
}

impl Runner {
    /// Spawns the emulation thread and returns its control handle.
    pub fn spawn(config: RunnerConfig, notify: UnboundedSender<Notification>) -> RunnerHandle {
        let (ctrl_tx, ctrl_rx) = crossbeam_channel::unbounded();
        let join = std::thread::Builder::new()
            .name("retrodock-runner".into())
            .spawn(move || {
                // The session (audio stream, gamepad backend) must be born on
                // the thread it lives on.
                let session = Session::new(SessionConfig {
                    frame_path: config.frame_path,
                    system_dir: config.system_dir,
                    save_dir: config.save_dir,
                });
                Runner {
                    session,
                    ctrl_rx,
                    notify,
                    last_notified: SessionState::Uninitialized,
                }
                .run();
            });
        match join {
            Ok(join) => RunnerHandle {
                ctrl_tx,
                join: Some(join),
            },
            Err(e) => {
                // Thread spawn failing leaves a handle whose requests all
                // report RunnerGone.
                tracing::error!("failed to spawn runner thread: {e}");
                RunnerHandle {
                    ctrl_tx,
                    join: None,
                }
            }
        }
    }

    fn run(mut self) {
        let mut deadline = Instant::now();
        loop {
            loop {
                match self.ctrl_rx.try_recv() {
                    Ok(msg) => {
                        if self.handle(msg) {
                            return;
                        }
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => return,
                }
            }

            if self.session.state() != SessionState::Playing {
                match self.ctrl_rx.recv_timeout(IDLE_WAIT) {
                    Ok(msg) => {
                        if self.handle(msg) {
                            return;
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => return,
                }
                deadline = Instant::now();
                continue;
            }

            let frame = self.frame_duration();
            let now = Instant::now();
            if now < deadline {
                match self.ctrl_rx.recv_timeout(deadline - now) {
                    Ok(msg) => {
                        if self.handle(msg) {
                            return;
                        }
                        continue;
                    }
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => return,
                }
            }

            if let Err(e) = self.session.step_frame(frame.as_micros() as i64) {
                tracing::error!("frame step failed: {e}");
            }
            self.publish_state();

            deadline += frame;
            let now = Instant::now();
            // Catch-up clamp: after a long stall run at most a couple of
            // make-up frames instead of a burst.
            if now > deadline && now - deadline > frame * 2 {
                deadline = now;
            }
        }
    }

    fn frame_duration(&self) -> Duration {
        let fps = self
            .session
            .av_info()
            .map(|av| av.fps)
            .filter(|fps| *fps > 0.0)
            .unwrap_or(DEFAULT_FPS);
        Duration::from_secs_f64(1.0 / fps)
    }

    /// Returns true when the loop should exit.
    fn handle(&mut self, msg: ControlMessage) -> bool {
        match msg {
            ControlMessage::Init { core, game, reply } => {
                let _ = reply.send(self.session.init(&core, &game));
            }
            ControlMessage::Play { reply } => {
                let _ = reply.send(self.session.play());
            }
            ControlMessage::Pause { reply } => {
                let _ = reply.send(self.session.pause());
            }
            ControlMessage::Shutdown { reply } => {
                let _ = reply.send(self.session.shutdown());
            }
            ControlMessage::Restart { reply } => {
                let _ = reply.send(self.session.restart());
            }
            ControlMessage::Kill { reply } => {
                let _ = reply.send(self.session.kill());
            }
            ControlMessage::SaveState { path, reply } => {
                let _ = reply.send(self.session.save_state(&path));
            }
            ControlMessage::LoadState { path, reply } => {
                let _ = reply.send(self.session.load_state(&path));
            }
            ControlMessage::UpdateVariable { key, value, reply } => {
                let _ = reply.send(self.session.update_variable(&key, &value));
            }
            ControlMessage::State { reply } => {
                let _ = reply.send(Ok(self.session.state()));
            }
            ControlMessage::Stop => {
                if let Err(e) = self.session.shutdown() {
                    tracing::warn!("shutdown on stop failed: {e}");
                }
                return true;
            }
        }
        self.publish_state();
        false
    }

    fn publish_state(&mut self) {
        let state = self.session.state();
        if state != self.last_notified {
            self.last_notified = state;
            let _ = self.notify.send(Notification::StateChanged(state));
        }
    }
}

/// Cloneable-enough control endpoint living in the async server.
pub struct RunnerHandle {
    ctrl_tx: Sender<ControlMessage>,
    join: Option<std::thread::JoinHandle<()>>,
}

impl RunnerHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> ControlMessage,
    ) -> Result<T, HostError> {
        let (tx, rx) = oneshot::channel();
        self.ctrl_tx
            .send(make(tx))
            .map_err(|_| HostError::RunnerGone)?;
        rx.await.map_err(|_| HostError::RunnerGone)?
    }

    pub async fn init(&self, core: PathBuf, game: PathBuf) -> Result<AvReport, HostError> {
        self.request(|reply| ControlMessage::Init { core, game, reply })
            .await
    }

    pub async fn play(&self) -> Result<(), HostError> {
        self.request(|reply| ControlMessage::Play { reply }).await
    }

    pub async fn pause(&self) -> Result<(), HostError> {
        self.request(|reply| ControlMessage::Pause { reply }).await
    }

    pub async fn shutdown(&self) -> Result<(), HostError> {
        self.request(|reply| ControlMessage::Shutdown { reply }).await
    }

    pub async fn restart(&self) -> Result<(), HostError> {
        self.request(|reply| ControlMessage::Restart { reply }).await
    }

    pub async fn kill(&self) -> Result<(), HostError> {
        self.request(|reply| ControlMessage::Kill { reply }).await
    }

    pub async fn save_state(&self, path: PathBuf) -> Result<(), HostError> {
        self.request(|reply| ControlMessage::SaveState { path, reply })
            .await
    }

    pub async fn load_state(&self, path: PathBuf) -> Result<(), HostError> {
        self.request(|reply| ControlMessage::LoadState { path, reply })
            .await
    }

    pub async fn update_variable(&self, key: String, value: String) -> Result<(), HostError> {
        self.request(|reply| ControlMessage::UpdateVariable { key, value, reply })
            .await
    }

    pub async fn state(&self) -> Result<SessionState, HostError> {
        self.request(|reply| ControlMessage::State { reply }).await
    }

    /// Stops the emulation thread and waits for it to exit.
    pub fn stop(mut self) {
        self.stop_inner();
    }

    fn stop_inner(&mut self) {
        let _ = self.ctrl_tx.send(ControlMessage::Stop);
        if let Some(join) = self.join.take()
            && let Err(e) = join.join()
        {
            tracing::error!("runner thread panicked: {e:?}");
        }
    }
}

impl Drop for RunnerHandle {
    fn drop(&mut self) {
        self.stop_inner();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Notification;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    fn spawn(dir: &TempDir) -> (RunnerHandle, mpsc::UnboundedReceiver<Notification>) {
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let handle = Runner::spawn(
            RunnerConfig {
                frame_path: dir.path().join("frames"),
                system_dir: None,
                save_dir: None,
            },
            notify_tx,
        );
        (handle, notify_rx)
    }

    #[tokio::test]
    async fn init_with_a_bogus_core_reports_load_failure() {
        let dir = TempDir::new().unwrap();
        let (handle, _rx) = spawn(&dir);
        let err = handle
            .init("/nonexistent/core.so".into(), "/nonexistent/rom".into())
            .await
            .unwrap_err();
        assert!(matches!(err, HostError::Load { .. }));
        handle.stop();
    }

    #[tokio::test]
    async fn play_before_init_is_an_invalid_transition() {
        let dir = TempDir::new().unwrap();
        let (handle, _rx) = spawn(&dir);
        assert!(matches!(
            handle.play().await,
            Err(HostError::InvalidTransition { .. })
        ));
        handle.stop();
    }

    #[tokio::test]
    async fn unknown_variable_updates_are_rejected() {
        let dir = TempDir::new().unwrap();
        let (handle, _rx) = spawn(&dir);
        assert!(matches!(
            handle.update_variable("nope".into(), "x".into()).await,
            Err(HostError::UnknownVariable(_))
        ));
        handle.stop();
    }

    #[tokio::test]
    async fn kill_emits_a_state_change_notification() {
        let dir = TempDir::new().unwrap();
        let (handle, mut rx) = spawn(&dir);
        handle.kill().await.unwrap();
        assert_eq!(
            rx.recv().await,
            Some(Notification::StateChanged(SessionState::Killed))
        );
        handle.stop();
    }

    #[tokio::test]
    async fn requests_after_stop_report_runner_gone() {
        let dir = TempDir::new().unwrap();
        let (handle, _rx) = spawn(&dir);
        let (tx, _join) = (handle.ctrl_tx.clone(), ());
        handle.stop();
        // The control channel's receiver is gone once the thread exits.
        assert!(tx.send(ControlMessage::Stop).is_err());
    }
}
