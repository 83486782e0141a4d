//! Session state machine: one loaded core and everything attached to it.
//!
//! A `Session` owns the core handle, the variable table, the shared-memory
//! frame channel, the audio sink, and the gamepad hub. Control verbs drive
//! the state machine; the dispatcher callbacks mutate the session while the
//! core is running. Every call into the core goes through a dispatcher bind
//! guard so re-entrant callbacks can find their way back here.

use std::collections::HashSet;
use std::ffi::{CString, c_uint};
use std::path::{Path, PathBuf};

use retrodock_abi as abi;

use crate::audio::AudioPipeline;
use crate::corehost::CoreHost;
use crate::dispatcher::{BindGuard, HostCallbacks};
use crate::error::HostError;
use crate::framechannel::FrameChannel;
use crate::input::InputHub;
use crate::ring::RingProducer;
use crate::variables::VariableTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::IntoStaticStr)]
#[strum(serialize_all = "camelCase")]
pub enum SessionState {
    Uninitialized,
    Initialized,
    Playing,
    Paused,
    Killed,
}

/// Audio/video parameters reported by the core.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AvInfo {
    pub width: u32,
    pub height: u32,
    pub aspect_ratio: f32,
    pub fps: f64,
    pub sample_rate: f64,
}

impl AvInfo {
    pub fn from_raw(raw: &abi::retro_system_av_info) -> Self {
        let g = &raw.geometry;
        let aspect_ratio = if g.aspect_ratio > 0.0 {
            g.aspect_ratio
        } else if g.base_height > 0 {
            g.base_width as f32 / g.base_height as f32
        } else {
            4.0 / 3.0
        };
        Self {
            width: g.base_width,
            height: g.base_height,
            aspect_ratio,
            fps: raw.timing.fps,
            sample_rate: raw.timing.sample_rate,
        }
    }
}

/// What `init` hands back to the frontend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AvReport {
    pub av: AvInfo,
    pub pixel_format: c_uint,
}

/// Out-of-band events the runner pushes toward the control channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    StateChanged(SessionState),
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Backing file for the shared-memory frame channel.
    pub frame_path: PathBuf,
    pub system_dir: Option<PathBuf>,
    pub save_dir: Option<PathBuf>,
}

pub struct Session {
    pub(crate) core: CoreHost,
    pub(crate) state: SessionState,
    pub(crate) variables: VariableTable,
    pub(crate) av_info: Option<AvInfo>,
    pub(crate) pixel_format: c_uint,
    /// Set once the first frame is published; pixel format changes are
    /// rejected afterwards.
    pub(crate) pixel_format_locked: bool,
    /// A core gets one accepted format change per session; set on the first.
    pub(crate) pixel_format_chosen: bool,
    pub(crate) frames: Option<FrameChannel>,
    pub(crate) audio: Option<AudioPipeline>,
    pub(crate) audio_tx: Option<RingProducer>,
    /// None on hosts without a usable gamepad backend; keyboard input still
    /// works through the frame channel.
    pub(crate) input: Option<InputHub>,
    pub(crate) keyboard: [i16; abi::RETRO_JOYPAD_ID_COUNT],
    pub(crate) shutdown_requested: bool,
    pub(crate) support_no_game: bool,
    pub(crate) system_dir_c: Option<CString>,
    pub(crate) save_dir_c: Option<CString>,
    /// Command ids already logged as unhandled, so each logs once.
    pub(crate) unknown_env: HashSet<c_uint>,
    pub(crate) frame_time_cb: Option<abi::retro_frame_time_callback>,
    pub(crate) audio_cb: Option<abi::retro_audio_callback>,
    pub(crate) keyboard_cb: Option<abi::retro_keyboard_callback>,
    /// What the live core was brought up with; restart reloads from these.
    pub(crate) core_path: Option<PathBuf>,
    pub(crate) game_path: Option<PathBuf>,
    config: SessionConfig,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            core: CoreHost::new(),
            state: SessionState::Uninitialized,
            variables: VariableTable::new(),
            av_info: None,
            pixel_format: abi::RETRO_PIXEL_FORMAT_0RGB1555,
            pixel_format_locked: false,
            pixel_format_chosen: false,
            frames: None,
            audio: None,
            audio_tx: None,
            input: None,
            keyboard: [0; abi::RETRO_JOYPAD_ID_COUNT],
            shutdown_requested: false,
            support_no_game: false,
            system_dir_c: dir_c_string(config.system_dir.as_deref()),
            save_dir_c: dir_c_string(config.save_dir.as_deref()),
            unknown_env: HashSet::new(),
            frame_time_cb: None,
            audio_cb: None,
            keyboard_cb: None,
            core_path: None,
            game_path: None,
            config,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn av_info(&self) -> Option<AvInfo> {
        self.av_info
    }

    fn require(&self, allowed: &[SessionState], request: &'static str) -> Result<(), HostError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(HostError::InvalidTransition {
                state: self.state.into(),
                request,
            })
        }
    }

    /// Loads a core and its content and brings the session to `Initialized`.
    pub fn init(&mut self, core_path: &Path, game_path: &Path) -> Result<AvReport, HostError> {
        self.require(&[SessionState::Uninitialized], "initEmu")?;
        let report = self.bring_up(core_path, game_path)?;
        self.core_path = Some(core_path.to_owned());
        self.game_path = Some(game_path.to_owned());
        self.state = SessionState::Initialized;
        tracing::info!(core = %core_path.display(), game = %game_path.display(), "session initialized");
        Ok(report)
    }

    /// The shared load path behind `init` and `restart`: frame channel, core,
    /// AV negotiation, audio sink, gamepads.
    fn bring_up(&mut self, core_path: &Path, game_path: &Path) -> Result<AvReport, HostError> {
        match &mut self.frames {
            Some(ch) => ch.clear()?,
            None => self.frames = Some(FrameChannel::open(&self.config.frame_path)?),
        }

        self.core.load(core_path)?;
        if let Err(e) = self.start_core(game_path) {
            // Partial bring-up must not leave a half-alive core behind.
            self.teardown_core();
            return Err(e);
        }

        let raw = self.core.system_av_info()?;
        let av = AvInfo::from_raw(&raw);
        self.av_info = Some(av);

        match AudioPipeline::open(av.sample_rate) {
            Ok((pipeline, producer)) => {
                self.audio = Some(pipeline);
                self.audio_tx = Some(producer);
            }
            Err(e) => {
                self.teardown_core();
                return Err(HostError::UnsupportedFormat(e.to_string()));
            }
        }

        match InputHub::new() {
            Ok(hub) => self.input = Some(hub),
            Err(e) => tracing::warn!("gamepad backend unavailable: {e}"),
        }

        Ok(AvReport {
            av,
            pixel_format: self.pixel_format,
        })
    }

    /// Callback registration, `retro_init` and content load, all under the
    /// dispatcher binding since cores call the environment from any of them.
    fn start_core(&mut self, game_path: &Path) -> Result<(), HostError> {
        let this: *mut Session = self;
        let _guard = BindGuard::new(this);
        self.core.register_callbacks(&HostCallbacks::host())?;
        let version = self.core.api_version()?;
        if version != abi::RETRO_API_VERSION {
            return Err(HostError::Load {
                path: self.core.path().map(Path::to_owned).unwrap_or_default(),
                reason: format!("unsupported API version {version}"),
            });
        }
        let info = self.core.system_info()?;
        tracing::info!(name = %info.library_name, version = %info.library_version, "core identified");
        self.core.init()?;
        self.core.load_game(game_path)?;
        Ok(())
    }

    pub fn play(&mut self) -> Result<(), HostError> {
        self.require(&[SessionState::Initialized, SessionState::Paused], "playEmu")?;
        self.state = SessionState::Playing;
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), HostError> {
        self.require(&[SessionState::Playing], "pauseEmu")?;
        if let Some(audio) = &self.audio {
            audio.clear();
        }
        self.state = SessionState::Paused;
        Ok(())
    }

    /// Tears the core down and returns to `Uninitialized`. Idempotent; the
    /// variable table and the frame channel file survive for the next init.
    pub fn shutdown(&mut self) -> Result<(), HostError> {
        if self.state == SessionState::Killed {
            return Err(HostError::InvalidTransition {
                state: self.state.into(),
                request: "shutdownEmu",
            });
        }
        if self.state == SessionState::Uninitialized {
            return Ok(());
        }
        self.teardown_core();
        if let Some(ch) = &mut self.frames {
            ch.clear()?;
        }
        self.state = SessionState::Uninitialized;
        tracing::info!("session shut down");
        Ok(())
    }

    /// Terminal shutdown: the session never leaves `Killed`.
    pub fn kill(&mut self) -> Result<(), HostError> {
        if self.state != SessionState::Uninitialized && self.state != SessionState::Killed {
            self.teardown_core();
            if let Some(ch) = &mut self.frames {
                ch.clear()?;
            }
        }
        self.state = SessionState::Killed;
        tracing::info!("session killed");
        Ok(())
    }

    /// Restarts the game from scratch: the core, its symbol table and the
    /// cached AV info are destroyed and brought back up with the same core
    /// and content. The session keeps the state it was in; a failed reload
    /// drops back to `Uninitialized`.
    pub fn restart(&mut self) -> Result<(), HostError> {
        self.require(
            &[
                SessionState::Initialized,
                SessionState::Playing,
                SessionState::Paused,
            ],
            "restartEmu",
        )?;
        let (Some(core_path), Some(game_path)) = (self.core_path.clone(), self.game_path.clone())
        else {
            return Err(HostError::NoCore);
        };

        self.teardown_core();
        if let Err(e) = self.bring_up(&core_path, &game_path) {
            self.state = SessionState::Uninitialized;
            return Err(e);
        }
        self.core_path = Some(core_path.clone());
        self.game_path = Some(game_path);
        tracing::info!(core = %core_path.display(), "session restarted");
        Ok(())
    }

    pub fn save_state(&mut self, path: &Path) -> Result<(), HostError> {
        self.require(
            &[
                SessionState::Initialized,
                SessionState::Playing,
                SessionState::Paused,
            ],
            "saveState",
        )?;
        let this: *mut Session = self;
        let _guard = BindGuard::new(this);
        let data = self.core.serialize().map_err(|e| HostError::SaveState {
            path: path.to_owned(),
            reason: e.to_string(),
        })?;
        std::fs::write(path, &data).map_err(|e| HostError::SaveState {
            path: path.to_owned(),
            reason: e.to_string(),
        })?;
        tracing::info!(path = %path.display(), bytes = data.len(), "state saved");
        Ok(())
    }

    pub fn load_state(&mut self, path: &Path) -> Result<(), HostError> {
        self.require(
            &[
                SessionState::Initialized,
                SessionState::Playing,
                SessionState::Paused,
            ],
            "loadState",
        )?;
        let data = std::fs::read(path).map_err(|e| HostError::LoadState {
            path: path.to_owned(),
            reason: e.to_string(),
        })?;
        let this: *mut Session = self;
        let _guard = BindGuard::new(this);
        self.core.unserialize(&data).map_err(|e| HostError::LoadState {
            path: path.to_owned(),
            reason: e.to_string(),
        })?;
        if let Some(audio) = &self.audio {
            audio.clear();
        }
        tracing::info!(path = %path.display(), "state loaded");
        Ok(())
    }

    /// Applies a frontend variable update; legal in every live state.
    pub fn update_variable(&mut self, key: &str, value: &str) -> Result<(), HostError> {
        if self.state == SessionState::Killed {
            return Err(HostError::InvalidTransition {
                state: self.state.into(),
                request: "updateVariable",
            });
        }
        self.variables.set(key, value)
    }

    /// Runs one emulated frame. Only meaningful while `Playing`; the runner
    /// gates on the state, this just enforces it.
    pub fn step_frame(&mut self, frame_usec: i64) -> Result<(), HostError> {
        self.require(&[SessionState::Playing], "run")?;

        if let Some(ch) = &mut self.frames
            && let Err(e) = ch.read_keyboard_states(&mut self.keyboard)
        {
            tracing::warn!("keyboard read failed: {e}");
        }

        let this: *mut Session = self;
        let _guard = BindGuard::new(this);
        if let Some(cb) = &self.frame_time_cb
            && let Some(f) = cb.callback
        {
            unsafe { f(frame_usec) };
        }
        if let Some(cb) = &self.audio_cb
            && let Some(f) = cb.callback
        {
            unsafe { f() };
        }
        self.core.run()?;

        if self.shutdown_requested {
            tracing::info!("core requested shutdown");
            self.shutdown()?;
        }
        Ok(())
    }

    fn teardown_core(&mut self) {
        if self.core.is_loaded() {
            let this: *mut Session = self;
            let _guard = BindGuard::new(this);
            if let Err(e) = self.core.unload_game() {
                tracing::warn!("unload_game failed: {e}");
            }
            if let Err(e) = self.core.deinit() {
                tracing::warn!("deinit failed: {e}");
            }
        }
        self.core.unload();
        self.audio = None;
        self.audio_tx = None;
        self.input = None;
        self.av_info = None;
        self.pixel_format = abi::RETRO_PIXEL_FORMAT_0RGB1555;
        self.pixel_format_locked = false;
        self.pixel_format_chosen = false;
        self.shutdown_requested = false;
        self.support_no_game = false;
        self.frame_time_cb = None;
        self.audio_cb = None;
        self.keyboard_cb = None;
        self.core_path = None;
        self.game_path = None;
        self.unknown_env.clear();
    }
}

fn dir_c_string(dir: Option<&Path>) -> Option<CString> {
    let dir = dir?;
    #[cfg(unix)]
    {
        use std::os::unix::ffi::OsStrExt;
        CString::new(dir.as_os_str().as_bytes()).ok()
    }
    #[cfg(not(unix))]
    {
        CString::new(dir.to_string_lossy().as_bytes()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn session(dir: &TempDir) -> Session {
        Session::new(SessionConfig {
            frame_path: dir.path().join("frames"),
            system_dir: None,
            save_dir: None,
        })
    }

    #[test]
    fn control_verbs_are_rejected_before_init() {
        let dir = TempDir::new().unwrap();
        let mut s = session(&dir);
        assert!(matches!(
            s.play(),
            Err(HostError::InvalidTransition { request: "playEmu", .. })
        ));
        assert!(matches!(
            s.pause(),
            Err(HostError::InvalidTransition { request: "pauseEmu", .. })
        ));
        assert!(matches!(
            s.restart(),
            Err(HostError::InvalidTransition { .. })
        ));
        assert!(matches!(
            s.save_state(Path::new("/tmp/x")),
            Err(HostError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn init_with_a_missing_core_fails_cleanly() {
        let dir = TempDir::new().unwrap();
        let mut s = session(&dir);
        let err = s
            .init(Path::new("/nonexistent/core.so"), Path::new("/nonexistent/rom"))
            .unwrap_err();
        assert!(matches!(err, HostError::Load { .. }));
        assert_eq!(s.state(), SessionState::Uninitialized);
        assert!(!s.core.is_loaded());
    }

    #[test]
    fn shutdown_is_idempotent_from_uninitialized() {
        let dir = TempDir::new().unwrap();
        let mut s = session(&dir);
        s.shutdown().unwrap();
        s.shutdown().unwrap();
        assert_eq!(s.state(), SessionState::Uninitialized);
    }

    #[test]
    fn kill_is_terminal() {
        let dir = TempDir::new().unwrap();
        let mut s = session(&dir);
        s.kill().unwrap();
        assert_eq!(s.state(), SessionState::Killed);
        assert!(matches!(
            s.shutdown(),
            Err(HostError::InvalidTransition { .. })
        ));
        assert!(matches!(
            s.update_variable("k", "v"),
            Err(HostError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn restart_tears_the_core_down_before_reloading() {
        let dir = TempDir::new().unwrap();
        let mut s = session(&dir);
        // A live-looking session whose recorded core path no longer loads:
        // restart must destroy the cached av info and symbols first, and the
        // failed reload lands back in uninitialized.
        s.state = SessionState::Playing;
        s.av_info = Some(AvInfo {
            width: 256,
            height: 240,
            aspect_ratio: 4.0 / 3.0,
            fps: 60.0,
            sample_rate: 44_100.0,
        });
        s.pixel_format_chosen = true;
        s.core_path = Some(PathBuf::from("/nonexistent/core.so"));
        s.game_path = Some(PathBuf::from("/nonexistent/rom"));
        s.variables.declare("scaling", "Scaling; 1x|2x");

        let err = s.restart().unwrap_err();
        assert!(matches!(err, HostError::Load { .. }));
        assert!(s.av_info().is_none());
        assert!(!s.core.is_loaded());
        assert!(!s.pixel_format_chosen);
        assert_eq!(s.state(), SessionState::Uninitialized);
        // The variable table outlives the reload like it outlives shutdown.
        assert_eq!(s.variables.get("scaling"), Some("1x"));
    }

    #[test]
    fn variables_survive_shutdown() {
        let dir = TempDir::new().unwrap();
        let mut s = session(&dir);
        s.variables.declare("scaling", "Scaling; 1x|2x");
        s.variables.set("scaling", "2x").unwrap();
        s.shutdown().unwrap();
        assert_eq!(s.variables.get("scaling"), Some("2x"));
    }

    #[test]
    fn state_names_serialize_camel_case() {
        assert_eq!(SessionState::Uninitialized.to_string(), "uninitialized");
        assert_eq!(SessionState::Playing.to_string(), "playing");
        let s: &'static str = SessionState::Paused.into();
        assert_eq!(s, "paused");
    }
}
