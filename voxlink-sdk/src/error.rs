//! Errors surfaced by the SDK facade.

use voxlink_native::NativeError;

/// Failures from the binding facade and the native call boundary.
#[derive(Debug, thiserror::Error)]
pub enum SdkError {
    /// Locating, loading, or resolving the native module failed.
    #[error(transparent)]
    Loader(#[from] NativeError),

    /// A native entry point returned a non-zero status. `message` is the
    /// module's own description of the code (via `vx_error_message`).
    #[error("native call `{call}` failed: {message} (code {code})")]
    Call {
        call: &'static str,
        code: i32,
        message: String,
    },

    /// The native module refused to create a connection.
    #[error("native module refused to create a connection")]
    ConnectionRefused,

    /// Operation on a connection that has already been disconnected.
    #[error("connection is closed")]
    Closed,

    /// An argument contained an interior NUL byte and cannot cross the
    /// C boundary.
    #[error("argument contains a NUL byte")]
    InvalidString,
}
