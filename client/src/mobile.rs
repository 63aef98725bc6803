//! Mobile FFI bindings
//!
//! C-compatible entry points for iOS/Android shells. The runtime pointer
//! returned by `remdesk_init` owns its own Tokio runtime; every other call
//! is synchronous and never blocks on network I/O except `remdesk_cleanup`,
//! which waits for sessions to close.
//!
//! Negative return values are `ErrorKind` codes.

use crate::config::RuntimeConfig;
use crate::error::ErrorKind;
use crate::error_channel::ErrorTarget;
use crate::registry::RuntimeHandle;
use crate::services::Services;
use crate::state::SessionId;
use parking_lot::Mutex;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;
use tokio::runtime::Runtime;
use tracing::{error, info, warn};

static VERSION_C: &str = concat!(env!("CARGO_PKG_VERSION"), "\0");

/// Opaque runtime owned by the host
pub struct RemdeskRuntime {
    handle: RuntimeHandle,
    runtime: Mutex<Option<Runtime>>,
}

fn build(config_path: Option<&str>) -> anyhow::Result<RemdeskRuntime> {
    let config = match config_path {
        Some(path) => RuntimeConfig::load_blocking(path)?,
        None => RuntimeConfig::default(),
    };
    let services = Services::from_config(&config)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("remdesk-worker")
        .build()?;
    let handle = RuntimeHandle::init_on(runtime.handle().clone(), config, services);

    Ok(RemdeskRuntime {
        handle,
        runtime: Mutex::new(Some(runtime)),
    })
}

unsafe fn runtime_ref<'a>(rt: *const RemdeskRuntime) -> Option<&'a RemdeskRuntime> {
    unsafe { rt.as_ref() }
}

fn session_id(id: i64) -> SessionId {
    // Ids start at 1, so a negative id maps to a session that never exists
    SessionId::new(u64::try_from(id).unwrap_or(0))
}

/// Initialize a runtime from a TOML config file (null for defaults)
///
/// Returns null if the config cannot be loaded or the runtime cannot start.
///
/// # Safety
///
/// `config_path` must be null or a valid NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn remdesk_init(config_path: *const c_char) -> *mut RemdeskRuntime {
    crate::logging::init(false);

    let path = if config_path.is_null() {
        None
    } else {
        match unsafe { CStr::from_ptr(config_path) }.to_str() {
            Ok(path) => Some(path),
            Err(_) => {
                error!("remdesk_init: config path is not valid UTF-8");
                return ptr::null_mut();
            }
        }
    };

    match build(path) {
        Ok(runtime) => Box::into_raw(Box::new(runtime)),
        Err(e) => {
            error!("remdesk_init failed: {:#}", e);
            ptr::null_mut()
        }
    }
}

/// Stop every session and shut the runtime down
///
/// The pointer stays valid: later calls return `InvalidHandle` until it is
/// released with `remdesk_destroy`.
///
/// # Safety
///
/// `rt` must be null or a pointer returned by `remdesk_init` and not yet
/// destroyed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn remdesk_cleanup(rt: *mut RemdeskRuntime) {
    let Some(rt) = (unsafe { runtime_ref(rt) }) else {
        return;
    };

    let Some(runtime) = rt.runtime.lock().take() else {
        warn!("remdesk_cleanup called twice");
        return;
    };

    runtime.block_on(rt.handle.cleanup());
    runtime.shutdown_timeout(rt.handle.config().runtime.grace_period());
    info!("remdesk runtime shut down");
}

/// Release a runtime, cleaning it up first if needed
///
/// # Safety
///
/// `rt` must be null or a pointer returned by `remdesk_init`; it must not be
/// used afterwards.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn remdesk_destroy(rt: *mut RemdeskRuntime) {
    if rt.is_null() {
        return;
    }
    unsafe {
        if !(*rt).handle.is_closed() {
            remdesk_cleanup(rt);
        }
        drop(Box::from_raw(rt));
    }
}

/// Library version; static, do not free
#[unsafe(no_mangle)]
pub extern "C" fn remdesk_get_version() -> *const c_char {
    VERSION_C.as_ptr() as *const c_char
}

/// Start a session to `peer_id`
///
/// Returns the session id (> 0) or a negative error code.
///
/// # Safety
///
/// `rt` must be null or a live runtime pointer; `peer_id` must be null or a
/// valid NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn remdesk_start_session(
    rt: *mut RemdeskRuntime,
    peer_id: *const c_char,
) -> i64 {
    let Some(rt) = (unsafe { runtime_ref(rt) }) else {
        return ErrorKind::InvalidHandle.code() as i64;
    };

    // Null and non-UTF-8 ids fail peer id validation
    let peer = if peer_id.is_null() {
        String::new()
    } else {
        unsafe { CStr::from_ptr(peer_id) }.to_string_lossy().into_owned()
    };

    match rt.handle.start_session(&peer) {
        Ok(id) => id.get() as i64,
        Err(e) => e.kind().code() as i64,
    }
}

/// Ask a session to stop; returns 0 or a negative error code
///
/// # Safety
///
/// `rt` must be null or a live runtime pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn remdesk_stop_session(rt: *mut RemdeskRuntime, session_id: i64) -> i32 {
    let Some(rt) = (unsafe { runtime_ref(rt) }) else {
        return ErrorKind::InvalidHandle.code();
    };

    match rt.handle.stop_session(self::session_id(session_id)) {
        Ok(()) => 0,
        Err(e) => e.kind().code(),
    }
}

/// State code of a session (0..=6) or a negative error code
///
/// # Safety
///
/// `rt` must be null or a live runtime pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn remdesk_session_state(rt: *mut RemdeskRuntime, session_id: i64) -> i32 {
    let Some(rt) = (unsafe { runtime_ref(rt) }) else {
        return ErrorKind::InvalidHandle.code();
    };

    match rt.handle.state(self::session_id(session_id)) {
        Ok(state) => state.code(),
        Err(e) => e.kind().code(),
    }
}

/// Last error text for a session, or for the runtime when `session_id <= 0`
///
/// The returned string is empty when nothing has been recorded and must be
/// released with `remdesk_string_free`.
///
/// # Safety
///
/// `rt` must be null or a live runtime pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn remdesk_get_error(rt: *mut RemdeskRuntime, session_id: i64) -> *mut c_char {
    let text = match unsafe { runtime_ref(rt) } {
        Some(rt) if session_id > 0 => rt.handle.get_error(self::session_id(session_id)),
        Some(rt) => rt.handle.get_error(ErrorTarget::Runtime),
        None => format!("{}: null runtime handle", ErrorKind::InvalidHandle),
    };

    CString::new(text.replace('\0', ""))
        .map(CString::into_raw)
        .unwrap_or(ptr::null_mut())
}

/// Free a string returned by `remdesk_get_error`
///
/// # Safety
///
/// `s` must be null or a pointer returned by `remdesk_get_error` that has not
/// been freed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn remdesk_string_free(s: *mut c_char) {
    if !s.is_null() {
        drop(unsafe { CString::from_raw(s) });
    }
}
