//! Shared-memory frame and keyboard channel between backend and frontend.
//!
//! Both processes map the same file. The layout is fixed:
//!
//! ```text
//! [0 .. 32)   keyboard block, one i16 per joypad id, little-endian
//! [32]        video update flag (0 = consumed, 1 = fresh frame)
//! [33 .. 37)  width, u32 LE
//! [37 .. 41)  height, u32 LE
//! [41 .. 45)  pitch in bytes, u32 LE
//! [45 .. )    pixel rows, height * pitch bytes
//! ```
//!
//! The update flag makes the video region a single-slot mailbox: the writer
//! sets it after the header and pixels are in place, the reader copies the
//! frame out and clears it. An advisory file lock serializes whole-frame
//! access so neither side observes a half-written header.
//!
//! The backend opens the channel when a session initializes, before any video
//! frame exists, so the frontend can publish keyboard state from the start;
//! the file then persists across shutdowns and is only ever cleared.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use memmap2::MmapMut;

use crate::error::HostError;
use retrodock_abi::RETRO_JOYPAD_ID_COUNT;

/// One i16 per joypad id.
pub const KEYBOARD_BLOCK_LEN: usize = RETRO_JOYPAD_ID_COUNT * 2;

const FLAG_OFFSET: usize = KEYBOARD_BLOCK_LEN;
const WIDTH_OFFSET: usize = FLAG_OFFSET + 1;
const HEIGHT_OFFSET: usize = WIDTH_OFFSET + 4;
const PITCH_OFFSET: usize = HEIGHT_OFFSET + 4;
const PIXELS_OFFSET: usize = PITCH_OFFSET + 4;

/// Minimum mapping: keyboard block plus a video header with no pixels yet.
const MIN_LEN: usize = PIXELS_OFFSET;

/// A video frame copied out of the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub pitch: u32,
    pub pixels: Vec<u8>,
}

pub struct FrameChannel {
    file: File,
    map: MmapMut,
    path: PathBuf,
}

impl FrameChannel {
    /// Opens (creating if needed) the channel file at `path` and maps it.
    ///
    /// A fresh file is zeroed, so readers see an empty keyboard block and a
    /// cleared update flag.
    pub fn open(path: &Path) -> Result<Self, HostError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| HostError::Channel(format!("open {}: {e}", path.display())))?;

        let len = file
            .metadata()
            .map_err(|e| HostError::Channel(e.to_string()))?
            .len() as usize;
        if len < MIN_LEN {
            file.set_len(MIN_LEN as u64)
                .map_err(|e| HostError::Channel(e.to_string()))?;
        }

        let map = unsafe { MmapMut::map_mut(&file) }
            .map_err(|e| HostError::Channel(format!("mmap {}: {e}", path.display())))?;

        Ok(Self {
            file,
            map,
            path: path.to_owned(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Total bytes a frame of the given shape needs, including the fixed
    /// prefix.
    fn total_len(pixel_bytes: usize) -> usize {
        PIXELS_OFFSET + pixel_bytes
    }

    /// Grows (or shrinks) the file to hold `pixel_bytes` of pixels and
    /// remaps. The pixel region is zeroed and the flag cleared, so stale
    /// frame data never leaks across a geometry change.
    fn ensure_capacity(&mut self, pixel_bytes: usize) -> Result<(), HostError> {
        let want = Self::total_len(pixel_bytes);
        if self.map.len() == want {
            return Ok(());
        }
        tracing::debug!(from = self.map.len(), to = want, "resizing frame channel");
        self.file
            .set_len(want as u64)
            .map_err(|e| HostError::Channel(e.to_string()))?;
        self.map = unsafe { MmapMut::map_mut(&self.file) }
            .map_err(|e| HostError::Channel(e.to_string()))?;
        for b in &mut self.map[FLAG_OFFSET..] {
            *b = 0;
        }
        Ok(())
    }

    /// Publishes one video frame. `pixels` must be exactly `height * pitch`
    /// bytes.
    pub fn write_video_frame(
        &mut self,
        width: u32,
        height: u32,
        pitch: u32,
        pixels: &[u8],
    ) -> Result<(), HostError> {
        let expected = height as usize * pitch as usize;
        if pixels.len() != expected {
            return Err(HostError::Size {
                expected,
                actual: pixels.len(),
            });
        }
        self.ensure_capacity(expected)?;

        self.lock()?;
        self.map[WIDTH_OFFSET..WIDTH_OFFSET + 4].copy_from_slice(&width.to_le_bytes());
        self.map[HEIGHT_OFFSET..HEIGHT_OFFSET + 4].copy_from_slice(&height.to_le_bytes());
        self.map[PITCH_OFFSET..PITCH_OFFSET + 4].copy_from_slice(&pitch.to_le_bytes());
        self.map[PIXELS_OFFSET..PIXELS_OFFSET + expected].copy_from_slice(pixels);
        // Flag last: a reader that wins the next lock sees a complete frame.
        self.map[FLAG_OFFSET] = 1;
        self.unlock()
    }

    /// Takes the pending frame, if any, clearing the update flag.
    pub fn read_video_frame(&mut self) -> Result<Option<VideoFrame>, HostError> {
        // The writer may have grown the file since we mapped it.
        let file_len = self
            .file
            .metadata()
            .map_err(|e| HostError::Channel(e.to_string()))?
            .len() as usize;
        if file_len != self.map.len() {
            self.map = unsafe { MmapMut::map_mut(&self.file) }
                .map_err(|e| HostError::Channel(e.to_string()))?;
        }

        self.lock()?;
        if self.map[FLAG_OFFSET] == 0 {
            self.unlock()?;
            return Ok(None);
        }

        let width = read_u32(&self.map, WIDTH_OFFSET);
        let height = read_u32(&self.map, HEIGHT_OFFSET);
        let pitch = read_u32(&self.map, PITCH_OFFSET);
        let pixel_bytes = height as usize * pitch as usize;
        if self.map.len() < PIXELS_OFFSET + pixel_bytes {
            self.map[FLAG_OFFSET] = 0;
            self.unlock()?;
            return Err(HostError::Size {
                expected: PIXELS_OFFSET + pixel_bytes,
                actual: self.map.len(),
            });
        }
        let pixels = self.map[PIXELS_OFFSET..PIXELS_OFFSET + pixel_bytes].to_vec();
        self.map[FLAG_OFFSET] = 0;
        self.unlock()?;

        Ok(Some(VideoFrame {
            width,
            height,
            pitch,
            pixels,
        }))
    }

    /// Publishes the frontend's keyboard state, one i16 per joypad id.
    pub fn write_keyboard_states(&mut self, states: &[i16]) -> Result<(), HostError> {
        if states.len() * 2 != KEYBOARD_BLOCK_LEN {
            return Err(HostError::Size {
                expected: KEYBOARD_BLOCK_LEN,
                actual: states.len() * 2,
            });
        }
        self.lock()?;
        for (i, s) in states.iter().enumerate() {
            self.map[i * 2..i * 2 + 2].copy_from_slice(&s.to_le_bytes());
        }
        self.unlock()
    }

    /// Reads the keyboard block into `states`.
    pub fn read_keyboard_states(&mut self, states: &mut [i16]) -> Result<(), HostError> {
        if states.len() * 2 != KEYBOARD_BLOCK_LEN {
            return Err(HostError::Size {
                expected: KEYBOARD_BLOCK_LEN,
                actual: states.len() * 2,
            });
        }
        self.lock()?;
        for (i, s) in states.iter_mut().enumerate() {
            let mut b = [0u8; 2];
            b.copy_from_slice(&self.map[i * 2..i * 2 + 2]);
            *s = i16::from_le_bytes(b);
        }
        self.unlock()
    }

    /// Zeroes the whole channel without shrinking the file, leaving it ready
    /// for the next session.
    pub fn clear(&mut self) -> Result<(), HostError> {
        self.lock()?;
        for b in self.map.iter_mut() {
            *b = 0;
        }
        self.unlock()
    }

    fn lock(&self) -> Result<(), HostError> {
        self.file
            .lock_exclusive()
            .map_err(|e| HostError::Channel(format!("lock: {e}")))
    }

    fn unlock(&self) -> Result<(), HostError> {
        fs2::FileExt::unlock(&self.file).map_err(|e| HostError::Channel(format!("unlock: {e}")))
    }
}

fn read_u32(map: &[u8], at: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&map[at..at + 4]);
    u32::from_le_bytes(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn channel(dir: &TempDir) -> FrameChannel {
        FrameChannel::open(&dir.path().join("frames")).unwrap()
    }

    #[test]
    fn video_frame_round_trips_byte_identical() {
        let dir = TempDir::new().unwrap();
        let mut ch = channel(&dir);

        // Pitch wider than width*bpp, as cores commonly pad rows.
        let (w, h, pitch) = (4u32, 3u32, 10u32);
        let pixels: Vec<u8> = (0..h * pitch).map(|i| i as u8).collect();
        ch.write_video_frame(w, h, pitch, &pixels).unwrap();

        let frame = ch.read_video_frame().unwrap().unwrap();
        assert_eq!(frame.width, w);
        assert_eq!(frame.height, h);
        assert_eq!(frame.pitch, pitch);
        assert_eq!(frame.pixels, pixels);

        // Mailbox semantics: the frame was consumed.
        assert!(ch.read_video_frame().unwrap().is_none());
    }

    #[test]
    fn pixel_length_must_match_geometry() {
        let dir = TempDir::new().unwrap();
        let mut ch = channel(&dir);
        let err = ch.write_video_frame(4, 3, 10, &[0u8; 29]).unwrap_err();
        assert!(matches!(
            err,
            HostError::Size {
                expected: 30,
                actual: 29
            }
        ));
    }

    #[test]
    fn channel_grows_and_shrinks_with_frame_size() {
        let dir = TempDir::new().unwrap();
        let mut ch = channel(&dir);

        ch.write_video_frame(2, 2, 4, &[1u8; 8]).unwrap();
        assert_eq!(ch.read_video_frame().unwrap().unwrap().pixels, vec![1u8; 8]);

        ch.write_video_frame(8, 8, 16, &[2u8; 128]).unwrap();
        let big = ch.read_video_frame().unwrap().unwrap();
        assert_eq!(big.pixels.len(), 128);

        ch.write_video_frame(2, 1, 4, &[3u8; 4]).unwrap();
        assert_eq!(ch.read_video_frame().unwrap().unwrap().pixels, vec![3u8; 4]);
    }

    #[test]
    fn keyboard_block_round_trips() {
        let dir = TempDir::new().unwrap();
        let mut ch = channel(&dir);

        let states: Vec<i16> = (0..16).map(|i| if i % 3 == 0 { 1 } else { 0 }).collect();
        ch.write_keyboard_states(&states).unwrap();

        let mut out = [0i16; 16];
        ch.read_keyboard_states(&mut out).unwrap();
        assert_eq!(&out[..], &states[..]);
    }

    #[test]
    fn keyboard_block_size_is_enforced() {
        let dir = TempDir::new().unwrap();
        let mut ch = channel(&dir);
        assert!(matches!(
            ch.write_keyboard_states(&[0i16; 8]),
            Err(HostError::Size { .. })
        ));
        let mut short = [0i16; 8];
        assert!(matches!(
            ch.read_keyboard_states(&mut short),
            Err(HostError::Size { .. })
        ));
    }

    #[test]
    fn two_mappings_of_one_file_share_frames() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("frames");
        let mut writer = FrameChannel::open(&path).unwrap();
        let mut reader = FrameChannel::open(&path).unwrap();

        writer.write_video_frame(2, 2, 4, &[9u8; 8]).unwrap();
        let frame = reader.read_video_frame().unwrap().unwrap();
        assert_eq!(frame.pixels, vec![9u8; 8]);
        // Consumed through either mapping.
        assert!(writer.read_video_frame().unwrap().is_none());
    }

    #[test]
    fn clear_resets_flag_and_keyboard() {
        let dir = TempDir::new().unwrap();
        let mut ch = channel(&dir);
        ch.write_video_frame(2, 1, 4, &[7u8; 4]).unwrap();
        ch.write_keyboard_states(&[1i16; 16]).unwrap();

        ch.clear().unwrap();
        assert!(ch.read_video_frame().unwrap().is_none());
        let mut out = [1i16; 16];
        ch.read_keyboard_states(&mut out).unwrap();
        assert_eq!(out, [0i16; 16]);
    }
}
