//! Process-separated libretro host.
//!
//! The backend process loads a core shared object through [`CoreHost`],
//! installs the [`dispatcher`] callbacks as the core's only callback target,
//! and drives the core frame-by-frame on a dedicated [`runner`] thread. Audio
//! leaves through a lock-free [`ring`] into the cpal sink, video and keyboard
//! state cross the process boundary through the shared-memory
//! [`FrameChannel`], and the session is commanded over the control channel
//! owned by the daemon binary.

pub mod audio;
pub mod corehost;
pub mod dispatcher;
pub mod error;
pub mod framechannel;
pub mod input;
pub mod ring;
pub mod runner;
pub mod session;
pub mod variables;

pub use corehost::CoreHost;
pub use error::HostError;
pub use framechannel::{FrameChannel, VideoFrame, KEYBOARD_BLOCK_LEN};
pub use ring::{RingConsumer, RingProducer, ring};
pub use runner::{Runner, RunnerConfig, RunnerHandle};
pub use session::{AvInfo, AvReport, Notification, SessionState};
pub use variables::VariableTable;
