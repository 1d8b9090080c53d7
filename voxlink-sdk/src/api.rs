//! The native call table.
//!
//! Typed aliases for every `vx_*` entry point the SDK requires, the
//! `#[repr(C)]` callback table the module invokes us through, and
//! [`NativeApi::load`], which resolves each entry point exactly once at
//! startup. [`NativeModule`] keeps the call table and the underlying
//! [`Library`] in one place so a resolved pointer can never outlive the
//! handle it came from.
//!
//! Signatures here are asserted against the native ABI, not verified; a
//! mismatch between this table and the module actually installed is
//! undefined behavior at the first call. Version skew instead shows up as
//! `EntryPointNotFound` at load time whenever an export is missing.

use std::ffi::{CStr, c_char, c_int, c_void};
use std::sync::Arc;

use voxlink_native::{Library, NativeError};

/// Opaque native connection identifier. Zero is never a valid connection.
pub type ConnectionId = u64;

/// Status code for a successful native call; anything else is an error code
/// describable via `vx_error_message`.
pub const VX_OK: c_int = 0;

// Connect-state codes delivered through `on_connect_state`.
pub const VX_STATE_CONNECTING: c_int = 0;
pub const VX_STATE_CONNECTED: c_int = 1;
pub const VX_STATE_DISCONNECTED: c_int = 2;

// Channel event kinds delivered through `on_channel_event`.
pub const VX_CHANNEL_ADDED: c_int = 0;
pub const VX_CHANNEL_REMOVED: c_int = 1;

// Client event kinds delivered through `on_client_event`.
pub const VX_CLIENT_JOINED: c_int = 0;
pub const VX_CLIENT_LEFT: c_int = 1;
pub const VX_CLIENT_MOVED: c_int = 2;

// Text-message target kinds accepted by `vx_send_text`.
pub const VX_TARGET_CHANNEL: c_int = 0;
pub const VX_TARGET_CLIENT: c_int = 1;

/// Callback table registered with `vx_connection_new`.
///
/// The module copies the table; `user_data` is passed back verbatim on every
/// invocation and must stay valid until `vx_connection_free` returns, after
/// which the module guarantees no further callbacks for that connection.
/// Callbacks may arrive on any native thread and must not block.
#[repr(C)]
pub struct VxCallbacks {
    pub on_connect_state: unsafe extern "C" fn(
        conn: ConnectionId,
        state: c_int,
        message: *const c_char,
        user_data: *mut c_void,
    ),
    pub on_channel_event: unsafe extern "C" fn(
        conn: ConnectionId,
        kind: c_int,
        channel_id: u64,
        name: *const c_char,
        user_data: *mut c_void,
    ),
    pub on_client_event: unsafe extern "C" fn(
        conn: ConnectionId,
        kind: c_int,
        client_id: u64,
        nickname: *const c_char,
        channel_id: u64,
        user_data: *mut c_void,
    ),
    pub on_talk_status: unsafe extern "C" fn(
        conn: ConnectionId,
        client_id: u64,
        talking: c_int,
        user_data: *mut c_void,
    ),
    pub on_text_message: unsafe extern "C" fn(
        conn: ConnectionId,
        from_client: u64,
        from_nickname: *const c_char,
        text: *const c_char,
        user_data: *mut c_void,
    ),
    pub user_data: *mut c_void,
}

pub type VxLibVersionFn = unsafe extern "C" fn() -> *const c_char;
pub type VxErrorMessageFn = unsafe extern "C" fn(code: c_int) -> *const c_char;
pub type VxConnectionNewFn = unsafe extern "C" fn(callbacks: *const VxCallbacks) -> ConnectionId;
pub type VxConnectionFreeFn = unsafe extern "C" fn(conn: ConnectionId) -> c_int;
pub type VxConnectStartFn = unsafe extern "C" fn(
    conn: ConnectionId,
    host: *const c_char,
    port: u16,
    nickname: *const c_char,
) -> c_int;
pub type VxConnectStopFn =
    unsafe extern "C" fn(conn: ConnectionId, reason: *const c_char) -> c_int;
pub type VxChannelJoinFn =
    unsafe extern "C" fn(conn: ConnectionId, channel_id: u64, password: *const c_char) -> c_int;
pub type VxSendTextFn = unsafe extern "C" fn(
    conn: ConnectionId,
    target_kind: c_int,
    target_id: u64,
    text: *const c_char,
) -> c_int;
pub type VxSetInputMutedFn = unsafe extern "C" fn(conn: ConnectionId, muted: c_int) -> c_int;

/// Fixed table of resolved entry points.
///
/// Built once per loaded module; any missing export aborts construction with
/// `EntryPointNotFound` naming the symbol.
pub struct NativeApi {
    pub(crate) lib_version: VxLibVersionFn,
    pub(crate) error_message: VxErrorMessageFn,
    pub(crate) connection_new: VxConnectionNewFn,
    pub(crate) connection_free: VxConnectionFreeFn,
    pub(crate) connect_start: VxConnectStartFn,
    pub(crate) connect_stop: VxConnectStopFn,
    pub(crate) channel_join: VxChannelJoinFn,
    pub(crate) send_text: VxSendTextFn,
    pub(crate) set_input_muted: VxSetInputMutedFn,
}

impl NativeApi {
    /// Resolve every required entry point from `lib`.
    fn load(lib: &Library) -> Result<Self, NativeError> {
        // Safety: each `T` matches the documented `vx_*` ABI; see the module
        // docs for the asserted-signature contract.
        unsafe {
            Ok(Self {
                lib_version: lib.symbol("vx_lib_version")?,
                error_message: lib.symbol("vx_error_message")?,
                connection_new: lib.symbol("vx_connection_new")?,
                connection_free: lib.symbol("vx_connection_free")?,
                connect_start: lib.symbol("vx_connect_start")?,
                connect_stop: lib.symbol("vx_connect_stop")?,
                channel_join: lib.symbol("vx_channel_join")?,
                send_text: lib.symbol("vx_send_text")?,
                set_input_muted: lib.symbol("vx_set_input_muted")?,
            })
        }
    }
}

/// A loaded native module plus its resolved call table.
///
/// Shared (`Arc`) between all connections created from it; the library is
/// unloaded when the last reference drops.
pub struct NativeModule {
    api: NativeApi,
    lib: Library,
}

impl NativeModule {
    /// Build the call table over an already-opened library.
    pub fn load(lib: Library) -> Result<Arc<Self>, NativeError> {
        let api = NativeApi::load(&lib)?;
        tracing::debug!(module = lib.name(), "native call table resolved");
        Ok(Arc::new(Self { api, lib }))
    }

    /// Detect the platform, probe the default candidate names, and load.
    pub fn load_default() -> Result<Arc<Self>, NativeError> {
        let detected = voxlink_native::detect()?;
        let lib = Library::open(detected.platform, &detected.candidates)?;
        Self::load(lib)
    }

    /// Version string reported by the module.
    pub fn version(&self) -> String {
        lossy_cstr(unsafe { (self.api.lib_version)() })
    }

    /// File name of the binary that was actually loaded.
    pub fn module_name(&self) -> &str {
        self.lib.name()
    }

    pub(crate) fn api(&self) -> &NativeApi {
        &self.api
    }

    /// Pair an already-opened library with a hand-built call table, so the
    /// connection lifecycle can be exercised without a real voice module.
    #[cfg(test)]
    pub(crate) fn with_api(api: NativeApi, lib: Library) -> Arc<Self> {
        Arc::new(Self { api, lib })
    }

    /// The module's description of a native status code.
    pub(crate) fn error_message(&self, code: c_int) -> String {
        lossy_cstr(unsafe { (self.api.error_message)(code) })
    }
}

/// Copy a possibly-null native C string into an owned `String`.
pub(crate) fn lossy_cstr(ptr: *const c_char) -> String {
    if ptr.is_null() {
        String::new()
    } else {
        unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    #[test]
    fn lossy_cstr_handles_null_and_utf8() {
        assert_eq!(lossy_cstr(std::ptr::null()), "");
        let s = CString::new("lobby").unwrap();
        assert_eq!(lossy_cstr(s.as_ptr()), "lobby");
    }
}
