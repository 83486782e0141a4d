//! Native core loading and the ABI symbol table.
//!
//! A core is a shared object exporting the libretro entry points. `load`
//! resolves every required symbol up front into a [`SymbolTable`]; either the
//! whole table populates or the host stays unloaded, so callers never observe
//! a half-resolved core. Optional entry points stay `Option` and are
//! null-checked at the call site.

use std::ffi::{CStr, CString, c_char, c_uint, c_void};
use std::mem::MaybeUninit;
use std::path::{Path, PathBuf};

use libloading::Library;

use retrodock_abi as abi;

use crate::dispatcher::HostCallbacks;
use crate::error::HostError;

/// Typed function pointers for every required ABI entry point, plus the
/// optional ones a core may omit.
pub struct SymbolTable {
    pub set_environment: unsafe extern "C" fn(abi::retro_environment_t),
    pub set_video_refresh: unsafe extern "C" fn(abi::retro_video_refresh_t),
    pub set_audio_sample: unsafe extern "C" fn(abi::retro_audio_sample_t),
    pub set_audio_sample_batch: unsafe extern "C" fn(abi::retro_audio_sample_batch_t),
    pub set_input_poll: unsafe extern "C" fn(abi::retro_input_poll_t),
    pub set_input_state: unsafe extern "C" fn(abi::retro_input_state_t),
    pub init: unsafe extern "C" fn(),
    pub deinit: unsafe extern "C" fn(),
    pub api_version: unsafe extern "C" fn() -> c_uint,
    pub get_system_info: unsafe extern "C" fn(*mut abi::retro_system_info),
    pub get_system_av_info: unsafe extern "C" fn(*mut abi::retro_system_av_info),
    pub set_controller_port_device: unsafe extern "C" fn(c_uint, c_uint),
    pub reset: unsafe extern "C" fn(),
    pub run: unsafe extern "C" fn(),
    pub serialize_size: unsafe extern "C" fn() -> usize,
    pub serialize: unsafe extern "C" fn(*mut c_void, usize) -> bool,
    pub unserialize: unsafe extern "C" fn(*const c_void, usize) -> bool,
    pub cheat_reset: unsafe extern "C" fn(),
    pub cheat_set: unsafe extern "C" fn(c_uint, bool, *const c_char),
    pub load_game: unsafe extern "C" fn(*const abi::retro_game_info) -> bool,
    pub unload_game: unsafe extern "C" fn(),
    pub get_region: unsafe extern "C" fn() -> c_uint,
    pub get_memory_data: unsafe extern "C" fn(c_uint) -> *mut c_void,
    pub get_memory_size: unsafe extern "C" fn(c_uint) -> usize,
    pub load_game_special:
        Option<unsafe extern "C" fn(c_uint, *const abi::retro_game_info, usize) -> bool>,
}

/// Content currently handed to the core. The ABI lets a core keep the data
/// pointer until `unload_game`, so the bytes and the path string live here
/// for as long as the game is loaded.
struct GameSlot {
    _path: CString,
    _data: Vec<u8>,
}

/// Core metadata copied out of `retro_get_system_info`.
#[derive(Debug, Clone)]
pub struct SystemInfo {
    pub library_name: String,
    pub library_version: String,
    pub valid_extensions: Option<String>,
    pub need_fullpath: bool,
}

pub struct CoreHost {
    lib: Option<Library>,
    symbols: Option<SymbolTable>,
    path: Option<PathBuf>,
    game: Option<GameSlot>,
}

impl CoreHost {
    pub fn new() -> Self {
        Self {
            lib: None,
            symbols: None,
            path: None,
            game: None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.symbols.is_some()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Loads the shared object and resolves the full symbol table.
    ///
    /// On any failure the host is left exactly as it was: no library handle,
    /// no symbols.
    pub fn load(&mut self, path: &Path) -> Result<(), HostError> {
        if self.is_loaded() {
            return Err(HostError::Load {
                path: path.to_owned(),
                reason: "another core is already loaded".into(),
            });
        }
        if !path.is_file() {
            return Err(HostError::Load {
                path: path.to_owned(),
                reason: "no such file".into(),
            });
        }

        let lib = unsafe { Library::new(path) }.map_err(|e| HostError::Load {
            path: path.to_owned(),
            reason: e.to_string(),
        })?;

        let symbols = resolve_table(&lib, path)?;
        tracing::info!(path = %path.display(), "core loaded");
        self.lib = Some(lib);
        self.symbols = Some(symbols);
        self.path = Some(path.to_owned());
        Ok(())
    }

    /// Releases the native handle and clears the table. Idempotent.
    pub fn unload(&mut self) {
        self.game = None;
        self.symbols = None;
        self.path = None;
        if self.lib.take().is_some() {
            tracing::info!("core unloaded");
        }
    }

    fn symbols(&self) -> Result<&SymbolTable, HostError> {
        self.symbols.as_ref().ok_or(HostError::NoCore)
    }

    /// Installs the dispatcher as the core's only callback target.
    pub fn register_callbacks(&self, cbs: &HostCallbacks) -> Result<(), HostError> {
        let t = self.symbols()?;
        unsafe {
            (t.set_environment)(cbs.environment);
            (t.set_video_refresh)(cbs.video_refresh);
            (t.set_audio_sample)(cbs.audio_sample);
            (t.set_audio_sample_batch)(cbs.audio_sample_batch);
            (t.set_input_poll)(cbs.input_poll);
            (t.set_input_state)(cbs.input_state);
        }
        Ok(())
    }

    pub fn init(&self) -> Result<(), HostError> {
        unsafe { (self.symbols()?.init)() };
        Ok(())
    }

    pub fn deinit(&self) -> Result<(), HostError> {
        unsafe { (self.symbols()?.deinit)() };
        Ok(())
    }

    pub fn api_version(&self) -> Result<c_uint, HostError> {
        Ok(unsafe { (self.symbols()?.api_version)() })
    }

    pub fn system_info(&self) -> Result<SystemInfo, HostError> {
        let t = self.symbols()?;
        let mut raw = MaybeUninit::<abi::retro_system_info>::zeroed();
        let raw = unsafe {
            (t.get_system_info)(raw.as_mut_ptr());
            raw.assume_init()
        };
        Ok(SystemInfo {
            library_name: c_str_lossy(raw.library_name),
            library_version: c_str_lossy(raw.library_version),
            valid_extensions: if raw.valid_extensions.is_null() {
                None
            } else {
                Some(c_str_lossy(raw.valid_extensions))
            },
            need_fullpath: raw.need_fullpath,
        })
    }

    pub fn system_av_info(&self) -> Result<abi::retro_system_av_info, HostError> {
        let t = self.symbols()?;
        let mut raw = MaybeUninit::<abi::retro_system_av_info>::zeroed();
        Ok(unsafe {
            (t.get_system_av_info)(raw.as_mut_ptr());
            raw.assume_init()
        })
    }

    /// Reads the content file and hands it to the core.
    ///
    /// Both the path and the raw bytes are provided, so cores work whether or
    /// not they set `need_fullpath`.
    pub fn load_game(&mut self, game: &Path) -> Result<(), HostError> {
        let t = self.symbols()?;
        let data = std::fs::read(game).map_err(|e| HostError::Load {
            path: game.to_owned(),
            reason: e.to_string(),
        })?;
        let path_c = path_c_string(game);

        let info = abi::retro_game_info {
            path: path_c.as_ptr(),
            data: data.as_ptr() as *const c_void,
            size: data.len(),
            meta: std::ptr::null(),
        };

        let ok = unsafe { (t.load_game)(&info) };
        if !ok {
            return Err(HostError::Load {
                path: game.to_owned(),
                reason: "core rejected the content".into(),
            });
        }

        tracing::info!(game = %game.display(), bytes = data.len(), "content loaded");
        self.game = Some(GameSlot {
            _path: path_c,
            _data: data,
        });
        Ok(())
    }

    pub fn unload_game(&mut self) -> Result<(), HostError> {
        if self.game.take().is_some() {
            unsafe { (self.symbols()?.unload_game)() };
        }
        Ok(())
    }

    /// Single-steps the core one emulated frame. The core will re-enter the
    /// host through the dispatcher callbacks on this thread.
    pub fn run(&self) -> Result<(), HostError> {
        unsafe { (self.symbols()?.run)() };
        Ok(())
    }

    pub fn reset(&self) -> Result<(), HostError> {
        unsafe { (self.symbols()?.reset)() };
        Ok(())
    }

    pub fn set_controller_port_device(&self, port: c_uint, device: c_uint) -> Result<(), HostError> {
        unsafe { (self.symbols()?.set_controller_port_device)(port, device) };
        Ok(())
    }

    pub fn region(&self) -> Result<c_uint, HostError> {
        Ok(unsafe { (self.symbols()?.get_region)() })
    }

    pub fn serialize(&self) -> Result<Vec<u8>, HostError> {
        let t = self.symbols()?;
        let size = unsafe { (t.serialize_size)() };
        if size == 0 {
            return Err(HostError::SaveState {
                path: PathBuf::new(),
                reason: "core does not support serialization".into(),
            });
        }
        let mut buf = vec![0u8; size];
        let ok = unsafe { (t.serialize)(buf.as_mut_ptr() as *mut c_void, size) };
        if !ok {
            return Err(HostError::SaveState {
                path: PathBuf::new(),
                reason: "retro_serialize returned false".into(),
            });
        }
        Ok(buf)
    }

    pub fn unserialize(&self, data: &[u8]) -> Result<(), HostError> {
        let t = self.symbols()?;
        let expected = unsafe { (t.serialize_size)() };
        if expected != 0 && data.len() != expected {
            return Err(HostError::LoadState {
                path: PathBuf::new(),
                reason: format!("state is {} bytes, core expects {expected}", data.len()),
            });
        }
        let ok = unsafe { (t.unserialize)(data.as_ptr() as *const c_void, data.len()) };
        if !ok {
            return Err(HostError::LoadState {
                path: PathBuf::new(),
                reason: "retro_unserialize returned false".into(),
            });
        }
        Ok(())
    }

    pub fn memory_size(&self, id: c_uint) -> Result<usize, HostError> {
        Ok(unsafe { (self.symbols()?.get_memory_size)(id) })
    }

    /// Copies a memory region (save RAM, RTC, ...) out of the core. Empty
    /// when the core does not expose the region.
    pub fn read_memory(&self, id: c_uint) -> Result<Vec<u8>, HostError> {
        let t = self.symbols()?;
        let size = unsafe { (t.get_memory_size)(id) };
        let data = unsafe { (t.get_memory_data)(id) };
        if size == 0 || data.is_null() {
            return Ok(Vec::new());
        }
        Ok(unsafe { std::slice::from_raw_parts(data as *const u8, size) }.to_vec())
    }

    pub fn cheat_reset(&self) -> Result<(), HostError> {
        unsafe { (self.symbols()?.cheat_reset)() };
        Ok(())
    }

    pub fn cheat_set(&self, index: c_uint, enabled: bool, code: &CStr) -> Result<(), HostError> {
        unsafe { (self.symbols()?.cheat_set)(index, enabled, code.as_ptr()) };
        Ok(())
    }
}

impl Default for CoreHost {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CoreHost {
    fn drop(&mut self) {
        self.unload();
    }
}

fn resolve_table(lib: &Library, path: &Path) -> Result<SymbolTable, HostError> {
    // Resolution failures abort the whole load; `?` below keeps the
    // all-or-nothing invariant without any partially filled table existing.
    macro_rules! required {
        ($name:literal) => {
            resolve(lib, $name, path)?
        };
    }

    Ok(SymbolTable {
        set_environment: required!("retro_set_environment"),
        set_video_refresh: required!("retro_set_video_refresh"),
        set_audio_sample: required!("retro_set_audio_sample"),
        set_audio_sample_batch: required!("retro_set_audio_sample_batch"),
        set_input_poll: required!("retro_set_input_poll"),
        set_input_state: required!("retro_set_input_state"),
        init: required!("retro_init"),
        deinit: required!("retro_deinit"),
        api_version: required!("retro_api_version"),
        get_system_info: required!("retro_get_system_info"),
        get_system_av_info: required!("retro_get_system_av_info"),
        set_controller_port_device: required!("retro_set_controller_port_device"),
        reset: required!("retro_reset"),
        run: required!("retro_run"),
        serialize_size: required!("retro_serialize_size"),
        serialize: required!("retro_serialize"),
        unserialize: required!("retro_unserialize"),
        cheat_reset: required!("retro_cheat_reset"),
        cheat_set: required!("retro_cheat_set"),
        load_game: required!("retro_load_game"),
        unload_game: required!("retro_unload_game"),
        get_region: required!("retro_get_region"),
        get_memory_data: required!("retro_get_memory_data"),
        get_memory_size: required!("retro_get_memory_size"),
        load_game_special: resolve(lib, "retro_load_game_special", path).ok(),
    })
}

fn resolve<T: Copy>(lib: &Library, name: &str, path: &Path) -> Result<T, HostError> {
    let symbol = unsafe { lib.get::<T>(name.as_bytes()) }.map_err(|e| HostError::Load {
        path: path.to_owned(),
        reason: format!("missing symbol {name}: {e}"),
    })?;
    Ok(*symbol)
}

fn c_str_lossy(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

fn path_c_string(path: &Path) -> CString {
    #[cfg(unix)]
    {
        use std::os::unix::ffi::OsStrExt;
        CString::new(path.as_os_str().as_bytes()).unwrap_or_default()
    }
    #[cfg(not(unix))]
    {
        CString::new(path.to_string_lossy().as_bytes()).unwrap_or_default()
    }
}
