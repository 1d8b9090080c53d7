//! Errors raised while locating, loading, and unloading the native module.

/// Failures from the platform detector, loader, resolver, and unloader.
///
/// Platform error strings (`dlerror`, `GetLastError`) are captured
/// immediately after the failing call — that state is thread-local and the
/// next platform call overwrites it — and attached verbatim so the topmost
/// caller can render a useful diagnostic. Nothing here is retried.
#[derive(Debug, thiserror::Error)]
pub enum NativeError {
    /// Host OS or pointer width matches no supported configuration, or a
    /// loader was invoked for a platform it was not compiled for. Indicates
    /// a build/deployment mismatch, not a runtime condition to recover from.
    #[error("unsupported platform: {detail}")]
    UnsupportedPlatform { detail: String },

    /// No candidate binary name could be opened. `tried` lists every name
    /// probed, in order.
    #[error("no native module could be opened (tried: {tried:?}); last error: {last_error}")]
    LibraryNotFound {
        tried: Vec<String>,
        last_error: String,
    },

    /// A required export is missing from an otherwise loadable module —
    /// a version mismatch between the binding and the native binary.
    #[error("entry point `{symbol}` not found in `{library}`: {last_error}")]
    EntryPointNotFound {
        library: String,
        symbol: String,
        last_error: String,
    },

    /// A closed handle was used. Programming error; never expected in
    /// correct operation.
    #[error("library handle for `{library}` is closed")]
    InvalidHandle { library: String },

    /// The platform failed to release the module. The handle is still
    /// considered closed; the module may remain mapped until process exit.
    #[error("failed to unload `{library}`: {last_error}")]
    Unload {
        library: String,
        last_error: String,
    },
}
