//! The callback adapter between the C ABI and the session.
//!
//! Cores take plain function pointers, so the `extern "C"` callbacks here are
//! the only symbols ever registered with a core. They find the owning
//! [`Session`] through a thread-local raw pointer installed by [`BindGuard`]
//! around every call into the core; callbacks are re-entrant on the calling
//! thread only, which is exactly the guarantee the ABI gives.

use std::cell::Cell;
use std::ffi::{CStr, c_char, c_uint, c_void};
use std::time::Duration;

use retrodock_abi as abi;

use crate::input;
use crate::session::{AvInfo, Session};

thread_local! {
    static ACTIVE: Cell<*mut Session> = const { Cell::new(std::ptr::null_mut()) };
}

/// Binds a session as the callback target for the current thread, restoring
/// the previous binding on drop so nested core calls stay consistent.
pub struct BindGuard {
    prev: *mut Session,
}

impl BindGuard {
    pub fn new(session: *mut Session) -> Self {
        let prev = ACTIVE.with(|c| c.replace(session));
        Self { prev }
    }
}

impl Drop for BindGuard {
    fn drop(&mut self) {
        ACTIVE.with(|c| c.set(self.prev));
    }
}

fn with_session<R>(fallback: R, f: impl FnOnce(&mut Session) -> R) -> R {
    let ptr = ACTIVE.with(Cell::get);
    if ptr.is_null() {
        tracing::error!("core callback fired outside a bound session");
        return fallback;
    }
    f(unsafe { &mut *ptr })
}

/// The full callback set handed to a core on registration.
pub struct HostCallbacks {
    pub environment: abi::retro_environment_t,
    pub video_refresh: abi::retro_video_refresh_t,
    pub audio_sample: abi::retro_audio_sample_t,
    pub audio_sample_batch: abi::retro_audio_sample_batch_t,
    pub input_poll: abi::retro_input_poll_t,
    pub input_state: abi::retro_input_state_t,
}

impl HostCallbacks {
    pub fn host() -> Self {
        Self {
            environment: Some(environment),
            video_refresh: Some(video_refresh),
            audio_sample: Some(audio_sample),
            audio_sample_batch: Some(audio_sample_batch),
            input_poll: Some(input_poll),
            input_state: Some(input_state),
        }
    }
}

pub(crate) unsafe extern "C" fn environment(cmd: c_uint, data: *mut c_void) -> bool {
    with_session(false, |session| {
        let id = cmd & !abi::RETRO_ENVIRONMENT_EXPERIMENTAL;
        match id {
            abi::RETRO_ENVIRONMENT_GET_OVERSCAN => env_write(data, true),
            abi::RETRO_ENVIRONMENT_GET_CAN_DUPE => env_write(data, true),
            abi::RETRO_ENVIRONMENT_SET_PIXEL_FORMAT => env_set_pixel_format(session, data),
            abi::RETRO_ENVIRONMENT_GET_VARIABLE => env_get_variable(session, data),
            abi::RETRO_ENVIRONMENT_SET_VARIABLES => env_set_variables(session, data),
            abi::RETRO_ENVIRONMENT_GET_VARIABLE_UPDATE => {
                env_write(data, session.variables.take_dirty())
            }
            abi::RETRO_ENVIRONMENT_GET_LOG_INTERFACE => env_get_log_interface(data),
            abi::RETRO_ENVIRONMENT_SET_MESSAGE => env_set_message(data),
            abi::RETRO_ENVIRONMENT_SHUTDOWN => {
                session.shutdown_requested = true;
                true
            }
            abi::RETRO_ENVIRONMENT_SET_PERFORMANCE_LEVEL => {
                if data.is_null() {
                    return false;
                }
                let level = unsafe { *(data as *const c_uint) };
                tracing::debug!(level, "core performance hint");
                true
            }
            abi::RETRO_ENVIRONMENT_GET_SYSTEM_DIRECTORY => {
                env_write_dir(data, session.system_dir_c.as_ref().map(|c| c.as_ptr()))
            }
            abi::RETRO_ENVIRONMENT_GET_SAVE_DIRECTORY => {
                env_write_dir(data, session.save_dir_c.as_ref().map(|c| c.as_ptr()))
            }
            abi::RETRO_ENVIRONMENT_SET_INPUT_DESCRIPTORS => env_set_input_descriptors(data),
            abi::RETRO_ENVIRONMENT_SET_SUPPORT_NO_GAME => {
                if data.is_null() {
                    return false;
                }
                session.support_no_game = unsafe { *(data as *const bool) };
                true
            }
            abi::RETRO_ENVIRONMENT_SET_KEYBOARD_CALLBACK => {
                if data.is_null() {
                    return false;
                }
                session.keyboard_cb =
                    Some(unsafe { *(data as *const abi::retro_keyboard_callback) });
                true
            }
            abi::RETRO_ENVIRONMENT_SET_FRAME_TIME_CALLBACK => {
                if data.is_null() {
                    return false;
                }
                session.frame_time_cb =
                    Some(unsafe { *(data as *const abi::retro_frame_time_callback) });
                true
            }
            abi::RETRO_ENVIRONMENT_SET_AUDIO_CALLBACK => {
                if data.is_null() {
                    return false;
                }
                session.audio_cb = Some(unsafe { *(data as *const abi::retro_audio_callback) });
                true
            }
            abi::RETRO_ENVIRONMENT_SET_CONTROLLER_INFO => env_set_controller_info(data),
            abi::RETRO_ENVIRONMENT_GET_INPUT_DEVICE_CAPABILITIES => env_write(
                data,
                u64::from(
                    (1u32 << abi::RETRO_DEVICE_JOYPAD) | (1u32 << abi::RETRO_DEVICE_KEYBOARD),
                ),
            ),
            abi::RETRO_ENVIRONMENT_GET_RUMBLE_INTERFACE => {
                if data.is_null() {
                    return false;
                }
                let out = data as *mut abi::retro_rumble_interface;
                unsafe { (*out).set_rumble_state = Some(rumble_state) };
                true
            }
            abi::RETRO_ENVIRONMENT_SET_SYSTEM_AV_INFO => {
                if data.is_null() {
                    return false;
                }
                let raw = unsafe { &*(data as *const abi::retro_system_av_info) };
                let av = AvInfo::from_raw(raw);
                tracing::info!(?av, "core replaced its av info");
                session.av_info = Some(av);
                true
            }
            abi::RETRO_ENVIRONMENT_SET_GEOMETRY => env_set_geometry(session, data),
            _ => {
                if session.unknown_env.insert(cmd) {
                    tracing::debug!(cmd, "unhandled environment command");
                }
                false
            }
        }
    })
}

/// Writes a plain value through an out-pointer, the common GET_* shape.
fn env_write<T>(data: *mut c_void, value: T) -> bool {
    if data.is_null() {
        return false;
    }
    unsafe { *(data as *mut T) = value };
    true
}

fn env_write_dir(data: *mut c_void, dir: Option<*const c_char>) -> bool {
    match dir {
        Some(ptr) => env_write(data, ptr),
        None => false,
    }
}

fn env_set_pixel_format(session: &mut Session, data: *mut c_void) -> bool {
    if data.is_null() || session.pixel_format_locked || session.pixel_format_chosen {
        return false;
    }
    let format = unsafe { *(data as *const c_uint) };
    match format {
        abi::RETRO_PIXEL_FORMAT_0RGB1555
        | abi::RETRO_PIXEL_FORMAT_XRGB8888
        | abi::RETRO_PIXEL_FORMAT_RGB565 => {
            tracing::debug!(format, "pixel format set");
            session.pixel_format = format;
            session.pixel_format_chosen = true;
            true
        }
        _ => false,
    }
}

/// GET_VARIABLE: the core asks for one key; an unknown key leaves the output
/// untouched and reports false.
fn env_get_variable(session: &mut Session, data: *mut c_void) -> bool {
    if data.is_null() {
        return false;
    }
    let var = unsafe { &mut *(data as *mut abi::retro_variable) };
    if var.key.is_null() {
        return false;
    }
    let key = unsafe { CStr::from_ptr(var.key) }.to_string_lossy();
    match session.variables.value_ptr(&key) {
        Some(ptr) => {
            var.value = ptr;
            true
        }
        None => false,
    }
}

/// SET_VARIABLES: a core-terminated array of declarations.
fn env_set_variables(session: &mut Session, data: *mut c_void) -> bool {
    if data.is_null() {
        return false;
    }
    let mut cursor = data as *const abi::retro_variable;
    loop {
        let var = unsafe { *cursor };
        if var.key.is_null() {
            break;
        }
        if !var.value.is_null() {
            let key = unsafe { CStr::from_ptr(var.key) }.to_string_lossy();
            let raw = unsafe { CStr::from_ptr(var.value) }.to_string_lossy();
            session.variables.declare(&key, &raw);
        }
        cursor = unsafe { cursor.add(1) };
    }
    true
}

fn env_get_log_interface(data: *mut c_void) -> bool {
    if data.is_null() {
        return false;
    }
    let out = data as *mut abi::retro_log_callback;
    // Defining a variadic function is unstable; the shim takes only the named
    // arguments and the C caller's variadic tail is never read.
    let shim: unsafe extern "C" fn(c_uint, *const c_char) = log_printf;
    let shim = unsafe {
        std::mem::transmute::<
            unsafe extern "C" fn(c_uint, *const c_char),
            unsafe extern "C" fn(c_uint, *const c_char, ...),
        >(shim)
    };
    unsafe { (*out).log = Some(shim) };
    true
}

unsafe extern "C" fn log_printf(level: c_uint, fmt: *const c_char) {
    if fmt.is_null() {
        return;
    }
    let msg = unsafe { CStr::from_ptr(fmt) }.to_string_lossy();
    let msg = msg.trim_end_matches('\n');
    match level {
        abi::RETRO_LOG_DEBUG => tracing::debug!(target: "core", "{msg}"),
        abi::RETRO_LOG_INFO => tracing::info!(target: "core", "{msg}"),
        abi::RETRO_LOG_WARN => tracing::warn!(target: "core", "{msg}"),
        _ => tracing::error!(target: "core", "{msg}"),
    }
}

fn env_set_message(data: *mut c_void) -> bool {
    if data.is_null() {
        return false;
    }
    let message = unsafe { &*(data as *const abi::retro_message) };
    if !message.msg.is_null() {
        let msg = unsafe { CStr::from_ptr(message.msg) }.to_string_lossy();
        tracing::info!(frames = message.frames, "core message: {msg}");
    }
    true
}

fn env_set_input_descriptors(data: *mut c_void) -> bool {
    if data.is_null() {
        return false;
    }
    let mut cursor = data as *const abi::retro_input_descriptor;
    let mut count = 0usize;
    while !unsafe { *cursor }.description.is_null() {
        count += 1;
        cursor = unsafe { cursor.add(1) };
    }
    tracing::debug!(count, "core declared input descriptors");
    true
}

fn env_set_controller_info(data: *mut c_void) -> bool {
    if data.is_null() {
        return false;
    }
    let mut cursor = data as *const abi::retro_controller_info;
    let mut ports = 0usize;
    while !unsafe { *cursor }.types.is_null() {
        ports += 1;
        cursor = unsafe { cursor.add(1) };
    }
    tracing::debug!(ports, "core declared controller info");
    true
}

fn env_set_geometry(session: &mut Session, data: *mut c_void) -> bool {
    if data.is_null() {
        return false;
    }
    let g = unsafe { &*(data as *const abi::retro_game_geometry) };
    if let Some(av) = &mut session.av_info {
        av.width = g.base_width;
        av.height = g.base_height;
        if g.aspect_ratio > 0.0 {
            av.aspect_ratio = g.aspect_ratio;
        }
        tracing::debug!(width = av.width, height = av.height, "geometry updated");
    }
    true
}

unsafe extern "C" fn rumble_state(port: c_uint, effect: c_uint, strength: u16) -> bool {
    with_session(false, |session| {
        let Some(hub) = &mut session.input else {
            return false;
        };
        // The ABI has no duration; an effect runs until strength 0 replaces
        // it, so play a long window and let the next call cut it short.
        let _ = effect;
        let strength = f32::from(strength) / 65535.0;
        match hub.rumble(port as usize, strength, Duration::from_secs(10)) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(port, "rumble failed: {e}");
                false
            }
        }
    })
}

pub(crate) unsafe extern "C" fn video_refresh(
    data: *const c_void,
    width: c_uint,
    height: c_uint,
    pitch: usize,
) {
    with_session((), |session| {
        // Null means "duplicate previous frame"; the hardware-framebuffer
        // sentinel means the pixels never touched CPU memory. Both drop.
        if data.is_null() || data == abi::RETRO_HW_FRAME_BUFFER_VALID {
            return;
        }
        session.pixel_format_locked = true;
        let Some(frames) = &mut session.frames else {
            return;
        };
        let pixels =
            unsafe { std::slice::from_raw_parts(data as *const u8, height as usize * pitch) };
        if let Err(e) = frames.write_video_frame(width, height, pitch as u32, pixels) {
            tracing::warn!("video frame dropped: {e}");
        }
    })
}

pub(crate) unsafe extern "C" fn audio_sample(left: i16, right: i16) {
    with_session((), |session| {
        if let Some(tx) = &mut session.audio_tx {
            let mut frame = [0u8; 4];
            frame[..2].copy_from_slice(&left.to_le_bytes());
            frame[2..].copy_from_slice(&right.to_le_bytes());
            tx.write(&frame);
        }
    })
}

pub(crate) unsafe extern "C" fn audio_sample_batch(data: *const i16, frames: usize) -> usize {
    with_session(frames, |session| {
        if data.is_null() || frames == 0 {
            return frames;
        }
        if let Some(tx) = &mut session.audio_tx {
            let bytes =
                unsafe { std::slice::from_raw_parts(data as *const u8, frames * 4) };
            tx.write(bytes);
        }
        // Always report full consumption; dropped audio is the ring's policy,
        // not the core's problem.
        frames
    })
}

pub(crate) unsafe extern "C" fn input_poll() {
    with_session((), |session| {
        if let Some(hub) = &mut session.input {
            hub.poll();
        }
    })
}

pub(crate) unsafe extern "C" fn input_state(
    port: c_uint,
    device: c_uint,
    _index: c_uint,
    id: c_uint,
) -> i16 {
    with_session(0, |session| {
        if device != abi::RETRO_DEVICE_JOYPAD {
            return 0;
        }
        let (masks, tracked) = match &session.input {
            Some(hub) => (hub.masks(), hub.tracked_pads()),
            None => ([0; input::MAX_PORTS], 0),
        };
        input::digital_state(&masks, tracked, &session.keyboard, port, id)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framechannel::FrameChannel;
    use crate::ring::ring;
    use crate::session::SessionConfig;
    use std::ffi::CString;
    use tempfile::TempDir;

    fn session(dir: &TempDir) -> Session {
        Session::new(SessionConfig {
            frame_path: dir.path().join("frames"),
            system_dir: Some(dir.path().join("system")),
            save_dir: None,
        })
    }

    fn env(cmd: c_uint, data: *mut c_void) -> bool {
        unsafe { environment(cmd, data) }
    }

    #[test]
    fn overscan_and_can_dupe_report_true() {
        let dir = TempDir::new().unwrap();
        let mut s = session(&dir);
        let _guard = BindGuard::new(&mut s);

        let mut out = false;
        assert!(env(
            abi::RETRO_ENVIRONMENT_GET_OVERSCAN,
            &mut out as *mut bool as *mut c_void
        ));
        assert!(out);

        out = false;
        assert!(env(
            abi::RETRO_ENVIRONMENT_GET_CAN_DUPE,
            &mut out as *mut bool as *mut c_void
        ));
        assert!(out);
    }

    #[test]
    fn pixel_format_accepts_a_single_change_before_the_first_frame() {
        let dir = TempDir::new().unwrap();
        let mut s = session(&dir);
        let _guard = BindGuard::new(&mut s);

        let mut bogus = 9u32;
        assert!(!env(
            abi::RETRO_ENVIRONMENT_SET_PIXEL_FORMAT,
            &mut bogus as *mut c_uint as *mut c_void
        ));

        let mut fmt = abi::RETRO_PIXEL_FORMAT_RGB565;
        assert!(env(
            abi::RETRO_ENVIRONMENT_SET_PIXEL_FORMAT,
            &mut fmt as *mut c_uint as *mut c_void
        ));
        assert_eq!(s.pixel_format, abi::RETRO_PIXEL_FORMAT_RGB565);

        // One change only, even before any frame was published.
        let mut second = abi::RETRO_PIXEL_FORMAT_XRGB8888;
        assert!(!env(
            abi::RETRO_ENVIRONMENT_SET_PIXEL_FORMAT,
            &mut second as *mut c_uint as *mut c_void
        ));
        assert_eq!(s.pixel_format, abi::RETRO_PIXEL_FORMAT_RGB565);

        s.pixel_format_locked = true;
        let mut late = abi::RETRO_PIXEL_FORMAT_XRGB8888;
        assert!(!env(
            abi::RETRO_ENVIRONMENT_SET_PIXEL_FORMAT,
            &mut late as *mut c_uint as *mut c_void
        ));
        assert_eq!(s.pixel_format, abi::RETRO_PIXEL_FORMAT_RGB565);
    }

    #[test]
    fn variable_declarations_and_lookup() {
        let dir = TempDir::new().unwrap();
        let mut s = session(&dir);
        let _guard = BindGuard::new(&mut s);

        let key = CString::new("console_region").unwrap();
        let val = CString::new("Region; ntsc|pal").unwrap();
        let vars = [
            abi::retro_variable {
                key: key.as_ptr(),
                value: val.as_ptr(),
            },
            abi::retro_variable {
                key: std::ptr::null(),
                value: std::ptr::null(),
            },
        ];
        assert!(env(
            abi::RETRO_ENVIRONMENT_SET_VARIABLES,
            vars.as_ptr() as *mut c_void
        ));
        assert_eq!(s.variables.get("console_region"), Some("ntsc"));

        let mut query = abi::retro_variable {
            key: key.as_ptr(),
            value: std::ptr::null(),
        };
        assert!(env(
            abi::RETRO_ENVIRONMENT_GET_VARIABLE,
            &mut query as *mut abi::retro_variable as *mut c_void
        ));
        let got = unsafe { CStr::from_ptr(query.value) }.to_str().unwrap();
        assert_eq!(got, "ntsc");

        // Unknown key: false, output untouched.
        let missing = CString::new("missing").unwrap();
        let sentinel = CString::new("sentinel").unwrap();
        let mut query = abi::retro_variable {
            key: missing.as_ptr(),
            value: sentinel.as_ptr(),
        };
        assert!(!env(
            abi::RETRO_ENVIRONMENT_GET_VARIABLE,
            &mut query as *mut abi::retro_variable as *mut c_void
        ));
        assert_eq!(query.value, sentinel.as_ptr());
    }

    #[test]
    fn variable_update_flag_is_edge_triggered() {
        let dir = TempDir::new().unwrap();
        let mut s = session(&dir);
        s.variables.declare("speed", "Speed; 1x|2x");
        s.variables.set("speed", "2x").unwrap();
        let _guard = BindGuard::new(&mut s);

        let mut dirty = false;
        assert!(env(
            abi::RETRO_ENVIRONMENT_GET_VARIABLE_UPDATE,
            &mut dirty as *mut bool as *mut c_void
        ));
        assert!(dirty);
        assert!(env(
            abi::RETRO_ENVIRONMENT_GET_VARIABLE_UPDATE,
            &mut dirty as *mut bool as *mut c_void
        ));
        assert!(!dirty);
    }

    #[test]
    fn shutdown_sets_the_session_flag() {
        let dir = TempDir::new().unwrap();
        let mut s = session(&dir);
        let _guard = BindGuard::new(&mut s);
        assert!(env(abi::RETRO_ENVIRONMENT_SHUTDOWN, std::ptr::null_mut()));
        assert!(s.shutdown_requested);
    }

    #[test]
    fn unknown_commands_return_false_and_log_once() {
        let dir = TempDir::new().unwrap();
        let mut s = session(&dir);
        let _guard = BindGuard::new(&mut s);
        assert!(!env(4242, std::ptr::null_mut()));
        assert!(!env(4242, std::ptr::null_mut()));
        assert!(s.unknown_env.contains(&4242));
        assert_eq!(s.unknown_env.len(), 1);
    }

    #[test]
    fn system_directory_answers_only_when_configured() {
        let dir = TempDir::new().unwrap();
        let mut s = session(&dir);
        let _guard = BindGuard::new(&mut s);

        let mut out: *const c_char = std::ptr::null();
        assert!(env(
            abi::RETRO_ENVIRONMENT_GET_SYSTEM_DIRECTORY,
            &mut out as *mut *const c_char as *mut c_void
        ));
        assert!(!out.is_null());

        let mut out: *const c_char = std::ptr::null();
        assert!(!env(
            abi::RETRO_ENVIRONMENT_GET_SAVE_DIRECTORY,
            &mut out as *mut *const c_char as *mut c_void
        ));
        assert!(out.is_null());
    }

    #[test]
    fn input_capabilities_cover_joypad_and_keyboard() {
        let dir = TempDir::new().unwrap();
        let mut s = session(&dir);
        let _guard = BindGuard::new(&mut s);

        let mut caps = 0u64;
        assert!(env(
            abi::RETRO_ENVIRONMENT_GET_INPUT_DEVICE_CAPABILITIES,
            &mut caps as *mut u64 as *mut c_void
        ));
        assert_ne!(caps & (1 << abi::RETRO_DEVICE_JOYPAD), 0);
        assert_ne!(caps & (1 << abi::RETRO_DEVICE_KEYBOARD), 0);
    }

    #[test]
    fn audio_batch_lands_in_the_ring_and_reports_full_consumption() {
        let dir = TempDir::new().unwrap();
        let mut s = session(&dir);
        let (tx, mut rx) = ring(256);
        s.audio_tx = Some(tx);
        let _guard = BindGuard::new(&mut s);

        let samples: [i16; 4] = [100, -100, 200, -200];
        let consumed = unsafe { audio_sample_batch(samples.as_ptr(), 2) };
        assert_eq!(consumed, 2);

        let mut out = [0u8; 8];
        assert_eq!(rx.read(&mut out), 8);
        assert_eq!(i16::from_le_bytes([out[0], out[1]]), 100);
        assert_eq!(i16::from_le_bytes([out[6], out[7]]), -200);
    }

    #[test]
    fn video_refresh_forwards_frames_and_locks_the_pixel_format() {
        let dir = TempDir::new().unwrap();
        let mut s = session(&dir);
        s.frames = Some(FrameChannel::open(&dir.path().join("frames")).unwrap());
        let _guard = BindGuard::new(&mut s);

        let pixels = [7u8; 2 * 8];
        unsafe { video_refresh(pixels.as_ptr() as *const c_void, 4, 2, 8) };
        assert!(s.pixel_format_locked);

        let frame = s.frames.as_mut().unwrap().read_video_frame().unwrap().unwrap();
        assert_eq!(frame.width, 4);
        assert_eq!(frame.height, 2);
        assert_eq!(frame.pitch, 8);
        assert_eq!(frame.pixels, pixels.to_vec());
    }

    #[test]
    fn duplicate_and_hardware_frames_are_dropped() {
        let dir = TempDir::new().unwrap();
        let mut s = session(&dir);
        s.frames = Some(FrameChannel::open(&dir.path().join("frames")).unwrap());
        let _guard = BindGuard::new(&mut s);

        unsafe { video_refresh(std::ptr::null(), 4, 2, 8) };
        unsafe { video_refresh(abi::RETRO_HW_FRAME_BUFFER_VALID, 4, 2, 8) };
        assert!(s.frames.as_mut().unwrap().read_video_frame().unwrap().is_none());
    }

    #[test]
    fn keyboard_answers_joypad_queries_without_pads() {
        let dir = TempDir::new().unwrap();
        let mut s = session(&dir);
        s.keyboard[abi::RETRO_DEVICE_ID_JOYPAD_START as usize] = 1;
        let _guard = BindGuard::new(&mut s);

        let pressed = unsafe {
            input_state(0, abi::RETRO_DEVICE_JOYPAD, 0, abi::RETRO_DEVICE_ID_JOYPAD_START)
        };
        assert_eq!(pressed, 1);
        let other_device = unsafe {
            input_state(0, abi::RETRO_DEVICE_MOUSE, 0, abi::RETRO_DEVICE_ID_JOYPAD_START)
        };
        assert_eq!(other_device, 0);
    }

    #[test]
    fn callbacks_without_a_binding_fall_back_harmlessly() {
        assert!(!env(abi::RETRO_ENVIRONMENT_GET_OVERSCAN, std::ptr::null_mut()));
        assert_eq!(unsafe { input_state(0, abi::RETRO_DEVICE_JOYPAD, 0, 0) }, 0);
    }
}
