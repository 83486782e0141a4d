use serde::{Deserialize, Serialize};

/// Inbound session commands, discriminated by the `"request"` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "request", rename_all = "camelCase")]
pub enum ControlRequest {
    /// Load a core shared object and a piece of content.
    InitEmu { core: String, game: String },
    PlayEmu,
    PauseEmu,
    /// Tear the session down but keep the process alive.
    ShutdownEmu,
    /// Tear the core down and bring it back up with the same core and game.
    RestartEmu,
    /// Terminal: the session can never be revived afterwards.
    KillEmu,
    SaveState { path: String },
    LoadState { path: String },
    UpdateVariable { key: String, value: String },
}

/// AV geometry/timing reported back to the frontend after a successful init.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub aspect_ratio: f32,
    pub frame_rate: f64,
    pub pixel_format: u32,
}

/// Outbound replies and notifications, discriminated by the `"reply"` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reply", rename_all = "camelCase")]
pub enum ControlReply {
    #[serde(rename_all = "camelCase")]
    InitEmu {
        width: u32,
        height: u32,
        aspect_ratio: f32,
        frame_rate: f64,
        pixel_format: u32,
    },
    PlayEmu,
    PausedEmu,
    SaveState,
    LoadState,
    UpdateVariable,
    /// Emitted on every session state transition, carrying the state name.
    StateChanged { state: String },
    Error { message: String },
}

impl ControlReply {
    pub fn init_emu(info: VideoInfo) -> Self {
        ControlReply::InitEmu {
            width: info.width,
            height: info.height,
            aspect_ratio: info.aspect_ratio,
            frame_rate: info.frame_rate,
            pixel_format: info.pixel_format,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ControlReply::Error {
            message: message.into(),
        }
    }
}
