//! Dynamic loading of the native client module.
//!
//! One [`PlatformLoader`] implementation exists per OS family and only the
//! one matching the compile target is built; [`Library`] is the safe RAII
//! handle over it. Loading and symbol resolution are synchronous, blocking
//! calls on the caller's thread.
//!
//! A [`Library`] is either open or closed, one-way. `symbol` is only valid
//! while open; `close` transitions the handle exactly once and a second
//! `close` (or any use after it) is a checked [`NativeError::InvalidHandle`]
//! rather than a double platform unload.

use std::ffi::c_void;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::NativeError;
use crate::platform::PlatformKind;

/// Per-OS load/resolve/unload primitive.
///
/// Errors are the platform's own error string, read immediately after the
/// failing call — `dlerror` and `GetLastError` are thread-local state that
/// the next platform call overwrites.
trait PlatformLoader: Sync {
    fn kind(&self) -> PlatformKind;
    fn open(&self, name: &str) -> Result<*mut c_void, String>;
    fn resolve(&self, handle: *mut c_void, symbol: &str) -> Result<*mut c_void, String>;
    fn close(&self, handle: *mut c_void) -> Result<(), String>;
}

/// Select the compiled-in loader for `platform`.
///
/// The loader variants are chosen at build time; asking for any other
/// platform is a programming error surfaced as `UnsupportedPlatform`.
fn loader_for(platform: PlatformKind) -> Result<&'static dyn PlatformLoader, NativeError> {
    let loader = compiled_loader();
    if loader.kind() != platform {
        return Err(NativeError::UnsupportedPlatform {
            detail: format!(
                "loader for `{}` invoked on a `{}` build",
                platform,
                loader.kind()
            ),
        });
    }
    Ok(loader)
}

#[cfg(windows)]
fn compiled_loader() -> &'static dyn PlatformLoader {
    &WindowsLoader
}

#[cfg(any(target_os = "macos", target_os = "ios"))]
fn compiled_loader() -> &'static dyn PlatformLoader {
    &AppleLoader
}

#[cfg(all(unix, not(any(target_os = "macos", target_os = "ios"))))]
fn compiled_loader() -> &'static dyn PlatformLoader {
    &PosixLoader
}

/// An open native module.
///
/// Owns the platform handle; the chosen candidate name is retained for
/// diagnostics. Dropping a still-open `Library` unloads the module
/// best-effort (failures are logged, not surfaced).
pub struct Library {
    raw: *mut c_void,
    name: String,
    platform: PlatformKind,
    loader: &'static dyn PlatformLoader,
    open: AtomicBool,
}

// Safety: the platform handle is a process-global resource and the
// platform symbol-lookup primitives are thread-safe on all supported OSes.
// The open flag turns use-after-close into a checked error, but it does not
// serialize `close` against an in-flight `symbol`; callers must not race
// teardown with resolution (single-owner discipline).
unsafe impl Send for Library {}
unsafe impl Sync for Library {}

impl Library {
    /// Probe `candidates` in order and open the first loadable one.
    ///
    /// On total failure returns [`NativeError::LibraryNotFound`] listing
    /// every name tried (in input order) plus the platform error string
    /// from the last failing attempt. No resource is retained on failure.
    pub fn open(platform: PlatformKind, candidates: &[String]) -> Result<Self, NativeError> {
        let loader = loader_for(platform)?;
        let mut last_error = String::from("no candidate names were provided");
        for name in candidates {
            match loader.open(name) {
                Ok(raw) => {
                    tracing::debug!(module = %name, "native module loaded");
                    return Ok(Self {
                        raw,
                        name: name.clone(),
                        platform,
                        loader,
                        open: AtomicBool::new(true),
                    });
                }
                Err(err) => {
                    tracing::debug!(module = %name, error = %err, "candidate failed to open");
                    last_error = err;
                }
            }
        }
        Err(NativeError::LibraryNotFound {
            tried: candidates.to_vec(),
            last_error,
        })
    }

    /// The candidate name that actually loaded.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn platform(&self) -> PlatformKind {
        self.platform
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Resolve an exported entry point as a callable of type `T`.
    ///
    /// # Safety
    ///
    /// `T` must be a function-pointer type whose signature and calling
    /// convention exactly match the native export. The signature is asserted,
    /// not verified; a mismatch is undefined behavior at the first call. This
    /// is the only place in the crate that converts a raw address into a
    /// callable.
    pub unsafe fn symbol<T: Copy>(&self, symbol: &str) -> Result<T, NativeError> {
        let ptr = self.resolve_raw(symbol)?;
        debug_assert_eq!(
            std::mem::size_of::<T>(),
            std::mem::size_of::<*mut c_void>(),
            "symbol type must be a bare function pointer"
        );
        // Safety: caller asserts T is a fn pointer of the correct signature;
        // ptr is non-null (resolve_raw treats null as a miss).
        Ok(unsafe { std::mem::transmute_copy::<*mut c_void, T>(&ptr) })
    }

    fn resolve_raw(&self, symbol: &str) -> Result<*mut c_void, NativeError> {
        if !self.is_open() {
            return Err(NativeError::InvalidHandle {
                library: self.name.clone(),
            });
        }
        self.loader
            .resolve(self.raw, symbol)
            .map_err(|last_error| NativeError::EntryPointNotFound {
                library: self.name.clone(),
                symbol: symbol.to_string(),
                last_error,
            })
    }

    /// Unload the module.
    ///
    /// The handle is closed by policy once this returns, whatever the
    /// outcome: a platform failure is reported as [`NativeError::Unload`]
    /// but not retried, and the module may stay mapped until process exit.
    /// A second `close` fails with [`NativeError::InvalidHandle`] without
    /// touching the platform.
    pub fn close(&self) -> Result<(), NativeError> {
        if self.open.swap(false, Ordering::AcqRel) {
            self.loader
                .close(self.raw)
                .map_err(|last_error| NativeError::Unload {
                    library: self.name.clone(),
                    last_error,
                })
        } else {
            Err(NativeError::InvalidHandle {
                library: self.name.clone(),
            })
        }
    }
}

impl Drop for Library {
    fn drop(&mut self) {
        if self.is_open() {
            if let Err(err) = self.close() {
                tracing::warn!(library = %self.name, error = %err, "unload on drop failed");
            }
        }
    }
}

impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("name", &self.name)
            .field("platform", &self.platform)
            .field("open", &self.is_open())
            .finish()
    }
}

// ── Unix (dlopen/dlsym/dlclose) ──

#[cfg(unix)]
mod dlfcn {
    use std::ffi::{CStr, CString, c_void};

    pub fn open(name: &str) -> Result<*mut c_void, String> {
        let cname =
            CString::new(name).map_err(|_| "module name contains a NUL byte".to_string())?;
        // RTLD_NOW: fail here, not at first call, if the module is broken.
        // RTLD_LOCAL: keep its symbols out of the global namespace.
        let handle = unsafe { libc::dlopen(cname.as_ptr(), libc::RTLD_NOW | libc::RTLD_LOCAL) };
        if handle.is_null() {
            return Err(last_error());
        }
        Ok(handle)
    }

    pub fn resolve(handle: *mut c_void, symbol: &str) -> Result<*mut c_void, String> {
        let csym =
            CString::new(symbol).map_err(|_| "symbol name contains a NUL byte".to_string())?;
        // Clear stale error state so a null return is unambiguous.
        unsafe { libc::dlerror() };
        let ptr = unsafe { libc::dlsym(handle, csym.as_ptr()) };
        if ptr.is_null() {
            return Err(last_error());
        }
        Ok(ptr)
    }

    pub fn close(handle: *mut c_void) -> Result<(), String> {
        let rc = unsafe { libc::dlclose(handle) };
        if rc != 0 {
            return Err(last_error());
        }
        Ok(())
    }

    /// Read `dlerror` right after a failing call; the state is thread-local
    /// and the next dl* call overwrites it.
    fn last_error() -> String {
        let err = unsafe { libc::dlerror() };
        if err.is_null() {
            "unknown dynamic loader error".to_string()
        } else {
            unsafe { CStr::from_ptr(err) }.to_string_lossy().into_owned()
        }
    }
}

#[cfg(all(unix, not(any(target_os = "macos", target_os = "ios"))))]
struct PosixLoader;

#[cfg(all(unix, not(any(target_os = "macos", target_os = "ios"))))]
impl PlatformLoader for PosixLoader {
    fn kind(&self) -> PlatformKind {
        PlatformKind::Posix
    }

    fn open(&self, name: &str) -> Result<*mut c_void, String> {
        dlfcn::open(name)
    }

    fn resolve(&self, handle: *mut c_void, symbol: &str) -> Result<*mut c_void, String> {
        dlfcn::resolve(handle, symbol)
    }

    fn close(&self, handle: *mut c_void) -> Result<(), String> {
        dlfcn::close(handle)
    }
}

#[cfg(any(target_os = "macos", target_os = "ios"))]
struct AppleLoader;

#[cfg(any(target_os = "macos", target_os = "ios"))]
impl PlatformLoader for AppleLoader {
    fn kind(&self) -> PlatformKind {
        PlatformKind::Apple
    }

    fn open(&self, name: &str) -> Result<*mut c_void, String> {
        dlfcn::open(name)
    }

    fn resolve(&self, handle: *mut c_void, symbol: &str) -> Result<*mut c_void, String> {
        dlfcn::resolve(handle, symbol)
    }

    fn close(&self, handle: *mut c_void) -> Result<(), String> {
        dlfcn::close(handle)
    }
}

// ── Windows (LoadLibrary/GetProcAddress) ──

#[cfg(windows)]
struct WindowsLoader;

#[cfg(windows)]
impl PlatformLoader for WindowsLoader {
    fn kind(&self) -> PlatformKind {
        PlatformKind::Windows
    }

    fn open(&self, name: &str) -> Result<*mut c_void, String> {
        use windows::Win32::System::LibraryLoader::LoadLibraryW;
        use windows::core::HSTRING;

        let module = unsafe { LoadLibraryW(&HSTRING::from(name)) }
            .map_err(|err| err.message().to_string())?;
        Ok(module.0)
    }

    fn resolve(&self, handle: *mut c_void, symbol: &str) -> Result<*mut c_void, String> {
        use std::ffi::CString;
        use windows::Win32::Foundation::HMODULE;
        use windows::Win32::System::LibraryLoader::GetProcAddress;
        use windows::core::PCSTR;

        let csym =
            CString::new(symbol).map_err(|_| "symbol name contains a NUL byte".to_string())?;
        let proc = unsafe { GetProcAddress(HMODULE(handle), PCSTR(csym.as_ptr() as *const u8)) };
        match proc {
            Some(addr) => Ok(addr as *mut c_void),
            // Read the thread-local last error before anything else runs.
            None => Err(windows::core::Error::from_win32().message().to_string()),
        }
    }

    fn close(&self, handle: *mut c_void) -> Result<(), String> {
        use windows::Win32::Foundation::{FreeLibrary, HMODULE};

        unsafe { FreeLibrary(HMODULE(handle)) }.map_err(|err| err.message().to_string())
    }
}
