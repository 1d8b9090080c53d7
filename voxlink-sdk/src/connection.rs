//! Event-driven connection facade over the native module.
//!
//! [`connect`] registers a callback table with the module, starts the
//! connection, and returns a [`Connection`] handle plus an event receiver.
//! The native module invokes the callbacks on its own threads; the
//! trampolines here convert each invocation into an [`Event`] and push it
//! over an unbounded channel (callbacks must never block).
//!
//! A `Connection` is single-owner: it holds the callback state the module
//! points at, and tears everything down exactly once on [`Connection::disconnect`]
//! or drop. The module guarantees no callback fires after
//! `vx_connection_free` returns, which is what makes dropping the callback
//! state afterwards sound.

use std::ffi::{CString, c_char, c_int, c_void};
use std::ptr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;

use crate::api::{
    self, ConnectionId, NativeModule, VX_CHANNEL_ADDED, VX_CHANNEL_REMOVED, VX_CLIENT_JOINED,
    VX_CLIENT_LEFT, VX_CLIENT_MOVED, VX_OK, VX_STATE_CONNECTED, VX_STATE_CONNECTING,
    VX_STATE_DISCONNECTED, VX_TARGET_CHANNEL, VX_TARGET_CLIENT, VxCallbacks,
};
use crate::error::SdkError;
use crate::event::{Channel, Client, Event};

/// Configuration for connecting to a voice server.
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    /// Server host name or address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Desired nickname.
    pub nickname: String,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9987,
            nickname: "guest".to_string(),
        }
    }
}

/// Where a text message goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Channel(u64),
    Client(u64),
}

/// State shared with the native callback trampolines via `user_data`.
struct CallbackShared {
    events: mpsc::UnboundedSender<Event>,
}

/// A live connection to a voice server.
///
/// Keeps the native module alive (shared `Arc`) and owns the callback state
/// registered with it. All methods are synchronous pass-throughs to the
/// native entry points.
pub struct Connection {
    module: Arc<NativeModule>,
    id: ConnectionId,
    closed: AtomicBool,
    // The module holds a pointer to this through `user_data`; it must stay
    // boxed (stable address) until `vx_connection_free` has returned.
    _callbacks: Box<CallbackShared>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

/// Create a native connection and start connecting.
///
/// Returns the owning handle and the receiver for the event stream. Events
/// begin with [`Event::Connecting`] and end with [`Event::Disconnected`]
/// (or the channel closing when the `Connection` is dropped).
pub fn connect(
    module: Arc<NativeModule>,
    config: &ConnectConfig,
) -> Result<(Connection, mpsc::UnboundedReceiver<Event>), SdkError> {
    let host = CString::new(config.host.as_str()).map_err(|_| SdkError::InvalidString)?;
    let nickname = CString::new(config.nickname.as_str()).map_err(|_| SdkError::InvalidString)?;

    let (tx, rx) = mpsc::unbounded_channel();
    let shared = Box::new(CallbackShared { events: tx });
    let callbacks = VxCallbacks {
        on_connect_state,
        on_channel_event,
        on_client_event,
        on_talk_status,
        on_text_message,
        user_data: &*shared as *const CallbackShared as *mut c_void,
    };

    // The module copies the table; `shared` must outlive the connection.
    let id = unsafe { (module.api().connection_new)(&callbacks) };
    if id == 0 {
        return Err(SdkError::ConnectionRefused);
    }

    let rc =
        unsafe { (module.api().connect_start)(id, host.as_ptr(), config.port, nickname.as_ptr()) };
    if rc != VX_OK {
        let err = call_error(&module, "vx_connect_start", rc);
        let free_rc = unsafe { (module.api().connection_free)(id) };
        if free_rc != VX_OK {
            tracing::debug!(conn = id, code = free_rc, "connection_free failed during connect cleanup");
        }
        return Err(err);
    }

    tracing::debug!(conn = id, host = %config.host, port = config.port, "connect started");
    Ok((
        Connection {
            module,
            id,
            closed: AtomicBool::new(false),
            _callbacks: shared,
        },
        rx,
    ))
}

impl Connection {
    /// Native connection id (for log correlation).
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Join a channel, optionally with a password.
    pub fn join_channel(&self, channel_id: u64, password: Option<&str>) -> Result<(), SdkError> {
        self.ensure_open()?;
        let password = password
            .map(CString::new)
            .transpose()
            .map_err(|_| SdkError::InvalidString)?;
        let pw_ptr = password.as_ref().map_or(ptr::null(), |p| p.as_ptr());
        let rc = unsafe { (self.module.api().channel_join)(self.id, channel_id, pw_ptr) };
        self.check("vx_channel_join", rc)
    }

    /// Send a text message to a channel or directly to a client.
    pub fn send_text(&self, target: Target, text: &str) -> Result<(), SdkError> {
        self.ensure_open()?;
        let text = CString::new(text).map_err(|_| SdkError::InvalidString)?;
        let (kind, target_id) = match target {
            Target::Channel(id) => (VX_TARGET_CHANNEL, id),
            Target::Client(id) => (VX_TARGET_CLIENT, id),
        };
        let rc = unsafe { (self.module.api().send_text)(self.id, kind, target_id, text.as_ptr()) };
        self.check("vx_send_text", rc)
    }

    /// Mute or unmute our own microphone input.
    pub fn set_input_muted(&self, muted: bool) -> Result<(), SdkError> {
        self.ensure_open()?;
        let rc = unsafe { (self.module.api().set_input_muted)(self.id, c_int::from(muted)) };
        self.check("vx_set_input_muted", rc)
    }

    /// Stop the connection and release the native handle.
    ///
    /// One-way: the connection is closed whatever the native outcome, and
    /// every later call fails with [`SdkError::Closed`].
    pub fn disconnect(&self, reason: Option<&str>) -> Result<(), SdkError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(SdkError::Closed);
        }
        let reason = reason
            .map(CString::new)
            .transpose()
            .map_err(|_| SdkError::InvalidString)?;
        let reason_ptr = reason.as_ref().map_or(ptr::null(), |r| r.as_ptr());

        let stop_rc = unsafe { (self.module.api().connect_stop)(self.id, reason_ptr) };
        // Free even if stop failed; after this no callbacks will fire.
        let free_rc = unsafe { (self.module.api().connection_free)(self.id) };

        if stop_rc != VX_OK {
            if free_rc != VX_OK {
                tracing::debug!(conn = self.id, code = free_rc, "connection_free also failed");
            }
            return Err(call_error(&self.module, "vx_connect_stop", stop_rc));
        }
        if free_rc != VX_OK {
            return Err(call_error(&self.module, "vx_connection_free", free_rc));
        }
        tracing::debug!(conn = self.id, "disconnected");
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), SdkError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SdkError::Closed);
        }
        Ok(())
    }

    fn check(&self, call: &'static str, rc: c_int) -> Result<(), SdkError> {
        if rc == VX_OK {
            Ok(())
        } else {
            Err(call_error(&self.module, call, rc))
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::Acquire) {
            if let Err(err) = self.disconnect(None) {
                tracing::warn!(conn = self.id, error = %err, "disconnect on drop failed");
            }
        }
    }
}

fn call_error(module: &NativeModule, call: &'static str, code: c_int) -> SdkError {
    SdkError::Call {
        call,
        code,
        message: module.error_message(code),
    }
}

// ── Callback trampolines ──
//
// Each recovers the `CallbackShared` from `user_data`, converts the C
// arguments, and pushes an event. Send failures mean the consumer dropped
// the receiver; events are then discarded.

unsafe fn shared_from(user_data: *mut c_void) -> &'static CallbackShared {
    unsafe { &*(user_data as *const CallbackShared) }
}

unsafe extern "C" fn on_connect_state(
    _conn: ConnectionId,
    state: c_int,
    message: *const c_char,
    user_data: *mut c_void,
) {
    let shared = unsafe { shared_from(user_data) };
    let event = match state {
        VX_STATE_CONNECTING => Event::Connecting,
        VX_STATE_CONNECTED => Event::Connected,
        VX_STATE_DISCONNECTED => Event::Disconnected {
            reason: api::lossy_cstr(message),
        },
        other => {
            tracing::warn!(state = other, "unknown connect state from native module");
            return;
        }
    };
    let _ = shared.events.send(event);
}

unsafe extern "C" fn on_channel_event(
    _conn: ConnectionId,
    kind: c_int,
    channel_id: u64,
    name: *const c_char,
    user_data: *mut c_void,
) {
    let shared = unsafe { shared_from(user_data) };
    let event = match kind {
        VX_CHANNEL_ADDED => Event::ChannelAdded {
            channel: Channel {
                id: channel_id,
                name: api::lossy_cstr(name),
            },
        },
        VX_CHANNEL_REMOVED => Event::ChannelRemoved { channel_id },
        other => {
            tracing::warn!(kind = other, "unknown channel event from native module");
            return;
        }
    };
    let _ = shared.events.send(event);
}

unsafe extern "C" fn on_client_event(
    _conn: ConnectionId,
    kind: c_int,
    client_id: u64,
    nickname: *const c_char,
    channel_id: u64,
    user_data: *mut c_void,
) {
    let shared = unsafe { shared_from(user_data) };
    let event = match kind {
        VX_CLIENT_JOINED => Event::ClientJoined {
            client: Client {
                id: client_id,
                nickname: api::lossy_cstr(nickname),
            },
            channel_id,
        },
        VX_CLIENT_LEFT => Event::ClientLeft {
            client_id,
            channel_id,
        },
        VX_CLIENT_MOVED => Event::ClientMoved {
            client_id,
            channel_id,
        },
        other => {
            tracing::warn!(kind = other, "unknown client event from native module");
            return;
        }
    };
    let _ = shared.events.send(event);
}

unsafe extern "C" fn on_talk_status(
    _conn: ConnectionId,
    client_id: u64,
    talking: c_int,
    user_data: *mut c_void,
) {
    let shared = unsafe { shared_from(user_data) };
    let _ = shared.events.send(Event::TalkStatusChanged {
        client_id,
        talking: talking != 0,
    });
}

unsafe extern "C" fn on_text_message(
    _conn: ConnectionId,
    from_client: u64,
    from_nickname: *const c_char,
    text: *const c_char,
    user_data: *mut c_void,
) {
    let shared = unsafe { shared_from(user_data) };
    let _ = shared.events.send(Event::TextMessage {
        from_id: from_client,
        from_nickname: api::lossy_cstr(from_nickname),
        text: api::lossy_cstr(text),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    fn shared_and_rx() -> (Box<CallbackShared>, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Box::new(CallbackShared { events: tx }), rx)
    }

    fn user_data(shared: &CallbackShared) -> *mut c_void {
        shared as *const CallbackShared as *mut c_void
    }

    #[test]
    fn connect_state_marshals_to_events() {
        let (shared, mut rx) = shared_and_rx();
        let ud = user_data(&shared);

        unsafe {
            on_connect_state(1, VX_STATE_CONNECTING, std::ptr::null(), ud);
            on_connect_state(1, VX_STATE_CONNECTED, std::ptr::null(), ud);
            let reason = CString::new("server shutdown").unwrap();
            on_connect_state(1, VX_STATE_DISCONNECTED, reason.as_ptr(), ud);
        }

        assert_eq!(rx.try_recv().unwrap(), Event::Connecting);
        assert_eq!(rx.try_recv().unwrap(), Event::Connected);
        assert_eq!(
            rx.try_recv().unwrap(),
            Event::Disconnected {
                reason: "server shutdown".to_string()
            }
        );
    }

    #[test]
    fn unknown_codes_are_dropped_not_crashed() {
        let (shared, mut rx) = shared_and_rx();
        let ud = user_data(&shared);

        unsafe {
            on_connect_state(1, 99, std::ptr::null(), ud);
            on_channel_event(1, 99, 7, std::ptr::null(), ud);
            on_client_event(1, 99, 7, std::ptr::null(), 3, ud);
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn channel_and_client_events_carry_payloads() {
        let (shared, mut rx) = shared_and_rx();
        let ud = user_data(&shared);

        let name = CString::new("lobby").unwrap();
        let nick = CString::new("alice").unwrap();
        unsafe {
            on_channel_event(1, VX_CHANNEL_ADDED, 42, name.as_ptr(), ud);
            on_client_event(1, VX_CLIENT_JOINED, 7, nick.as_ptr(), 42, ud);
            on_client_event(1, VX_CLIENT_MOVED, 7, std::ptr::null(), 43, ud);
            on_talk_status(1, 7, 1, ud);
        }

        assert_eq!(
            rx.try_recv().unwrap(),
            Event::ChannelAdded {
                channel: Channel {
                    id: 42,
                    name: "lobby".to_string()
                }
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            Event::ClientJoined {
                client: Client {
                    id: 7,
                    nickname: "alice".to_string()
                },
                channel_id: 42,
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            Event::ClientMoved {
                client_id: 7,
                channel_id: 43
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            Event::TalkStatusChanged {
                client_id: 7,
                talking: true
            }
        );
    }

    #[test]
    fn text_message_marshals_sender_and_body() {
        let (shared, mut rx) = shared_and_rx();
        let ud = user_data(&shared);

        let nick = CString::new("bob").unwrap();
        let text = CString::new("hello there").unwrap();
        unsafe {
            on_text_message(1, 9, nick.as_ptr(), text.as_ptr(), ud);
        }

        assert_eq!(
            rx.try_recv().unwrap(),
            Event::TextMessage {
                from_id: 9,
                from_nickname: "bob".to_string(),
                text: "hello there".to_string(),
            }
        );
    }

    #[test]
    fn dropped_receiver_discards_events() {
        let (shared, rx) = shared_and_rx();
        drop(rx);
        unsafe {
            on_talk_status(1, 7, 0, user_data(&shared));
        }
        // No panic is the assertion.
    }

    /// Connection lifecycle against a hand-built call table. The table's
    /// entry points are local functions, but `NativeModule` still needs a
    /// real library underneath, so these run where libm is available.
    #[cfg(target_os = "linux")]
    mod lifecycle {
        use crate::api::{
            NativeApi, NativeModule, VX_OK, VxCallbacks, VxConnectStartFn, VxConnectionNewFn,
        };
        use crate::connection::{ConnectConfig, Target, connect};
        use crate::error::SdkError;
        use std::ffi::{c_char, c_int};
        use std::sync::atomic::{AtomicU64, Ordering};
        use std::sync::{Arc, Mutex};
        use voxlink_native::Library;

        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        static STOPPED: Mutex<Vec<u64>> = Mutex::new(Vec::new());
        static FREED: Mutex<Vec<u64>> = Mutex::new(Vec::new());

        unsafe extern "C" fn fake_version() -> *const c_char {
            std::ptr::null()
        }
        unsafe extern "C" fn fake_error_message(_code: c_int) -> *const c_char {
            std::ptr::null()
        }
        unsafe extern "C" fn fake_connection_new(_cb: *const VxCallbacks) -> u64 {
            NEXT_ID.fetch_add(1, Ordering::SeqCst)
        }
        unsafe extern "C" fn fake_connection_new_refusing_start(_cb: *const VxCallbacks) -> u64 {
            // Fixed id outside NEXT_ID's range so cleanup is attributable.
            9999
        }
        unsafe extern "C" fn fake_connection_free(conn: u64) -> c_int {
            FREED.lock().unwrap().push(conn);
            VX_OK
        }
        unsafe extern "C" fn fake_connect_start(
            _conn: u64,
            _host: *const c_char,
            _port: u16,
            _nick: *const c_char,
        ) -> c_int {
            VX_OK
        }
        unsafe extern "C" fn fake_connect_start_refused(
            _conn: u64,
            _host: *const c_char,
            _port: u16,
            _nick: *const c_char,
        ) -> c_int {
            7
        }
        unsafe extern "C" fn fake_connect_stop(conn: u64, _reason: *const c_char) -> c_int {
            STOPPED.lock().unwrap().push(conn);
            VX_OK
        }
        unsafe extern "C" fn fake_channel_join(
            _conn: u64,
            _channel: u64,
            _password: *const c_char,
        ) -> c_int {
            VX_OK
        }
        unsafe extern "C" fn fake_send_text(
            _conn: u64,
            _kind: c_int,
            _target: u64,
            _text: *const c_char,
        ) -> c_int {
            VX_OK
        }
        unsafe extern "C" fn fake_set_input_muted(_conn: u64, _muted: c_int) -> c_int {
            VX_OK
        }

        fn fake_module(
            connection_new: VxConnectionNewFn,
            connect_start: VxConnectStartFn,
        ) -> Arc<NativeModule> {
            let detected = voxlink_native::detect().expect("supported host");
            let lib = Library::open(detected.platform, &["libm.so.6".to_string()])
                .expect("libm must load");
            NativeModule::with_api(
                NativeApi {
                    lib_version: fake_version,
                    error_message: fake_error_message,
                    connection_new,
                    connection_free: fake_connection_free,
                    connect_start,
                    connect_stop: fake_connect_stop,
                    channel_join: fake_channel_join,
                    send_text: fake_send_text,
                    set_input_muted: fake_set_input_muted,
                },
                lib,
            )
        }

        fn freed_count(id: u64) -> usize {
            FREED.lock().unwrap().iter().filter(|&&c| c == id).count()
        }

        #[test]
        fn closed_connection_rejects_every_operation() {
            let module = fake_module(fake_connection_new, fake_connect_start);
            let (conn, _rx) = connect(module, &ConnectConfig::default()).expect("connect");
            let id = conn.id();

            conn.disconnect(Some("done")).expect("first disconnect");

            assert!(matches!(
                conn.join_channel(1, None).unwrap_err(),
                SdkError::Closed
            ));
            assert!(matches!(
                conn.send_text(Target::Channel(1), "hi").unwrap_err(),
                SdkError::Closed
            ));
            assert!(matches!(
                conn.set_input_muted(true).unwrap_err(),
                SdkError::Closed
            ));
            assert!(matches!(conn.disconnect(None).unwrap_err(), SdkError::Closed));

            // Drop after an explicit disconnect must not tear down again.
            drop(conn);
            assert_eq!(freed_count(id), 1);
            assert_eq!(
                STOPPED.lock().unwrap().iter().filter(|&&c| c == id).count(),
                1
            );
        }

        #[test]
        fn failed_connect_start_frees_the_native_connection() {
            let module = fake_module(fake_connection_new_refusing_start, fake_connect_start_refused);
            let err = connect(module, &ConnectConfig::default()).unwrap_err();
            match err {
                SdkError::Call { call, code, .. } => {
                    assert_eq!(call, "vx_connect_start");
                    assert_eq!(code, 7);
                }
                other => panic!("expected Call error, got {other:?}"),
            }
            assert_eq!(freed_count(9999), 1);
        }
    }
}
