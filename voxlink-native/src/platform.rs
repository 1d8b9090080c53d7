//! Host platform detection and candidate binary names.
//!
//! The native module ships under a handful of file names depending on OS and
//! word size. Detection is a pure query done once at process start; the
//! candidate list it returns is ordered (generic name first, qualified name
//! second) and that order is part of the contract — the loader probes it
//! front to back and the first openable name wins.

use crate::error::NativeError;

/// Base name of the native client module.
pub const MODULE_BASENAME: &str = "voxclient";

/// Operating-system/ABI family the loader dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformKind {
    /// Windows (LoadLibrary/GetProcAddress).
    Windows,
    /// Linux and other non-Apple Unix (dlopen on `.so`).
    Posix,
    /// macOS / iOS (dlopen on `.dylib`).
    Apple,
}

impl std::fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlatformKind::Windows => write!(f, "windows"),
            PlatformKind::Posix => write!(f, "posix"),
            PlatformKind::Apple => write!(f, "apple"),
        }
    }
}

/// Result of [`detect`]: the host platform plus the ordered list of native
/// module file names worth probing on it.
#[derive(Debug, Clone)]
pub struct Detected {
    pub platform: PlatformKind,
    pub candidates: Vec<String>,
}

/// Detect the host platform and propose candidate module names.
///
/// Fails with [`NativeError::UnsupportedPlatform`] when the OS identity or
/// pointer width (anything other than 32/64-bit) matches no configuration
/// the native module ships for.
pub fn detect() -> Result<Detected, NativeError> {
    let width = pointer_width().ok_or_else(|| NativeError::UnsupportedPlatform {
        detail: "pointer width is neither 32 nor 64 bits".to_string(),
    })?;
    let platform = host_platform().ok_or_else(|| NativeError::UnsupportedPlatform {
        detail: format!("unrecognized operating system ({})", std::env::consts::OS),
    })?;
    Ok(Detected {
        platform,
        candidates: candidate_names(platform, width),
    })
}

/// Candidate file names for `platform` at the given pointer width,
/// in probe order.
pub fn candidate_names(platform: PlatformKind, pointer_width: u32) -> Vec<String> {
    match platform {
        PlatformKind::Windows => vec![
            format!("{MODULE_BASENAME}.dll"),
            format!("{MODULE_BASENAME}_win{pointer_width}.dll"),
        ],
        PlatformKind::Posix => {
            let qualified = if pointer_width == 64 {
                format!("lib{MODULE_BASENAME}_linux_amd64.so")
            } else {
                format!("lib{MODULE_BASENAME}_linux_x86.so")
            };
            vec![format!("lib{MODULE_BASENAME}.so"), qualified]
        }
        PlatformKind::Apple => vec![
            format!("lib{MODULE_BASENAME}.dylib"),
            format!("lib{MODULE_BASENAME}_mac.dylib"),
        ],
    }
}

fn pointer_width() -> Option<u32> {
    if cfg!(target_pointer_width = "64") {
        Some(64)
    } else if cfg!(target_pointer_width = "32") {
        Some(32)
    } else {
        None
    }
}

fn host_platform() -> Option<PlatformKind> {
    if cfg!(windows) {
        Some(PlatformKind::Windows)
    } else if cfg!(any(target_os = "macos", target_os = "ios")) {
        Some(PlatformKind::Apple)
    } else if cfg!(unix) {
        Some(PlatformKind::Posix)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_matches_compile_target() {
        let detected = detect().expect("host must be supported in tests");

        #[cfg(windows)]
        assert_eq!(detected.platform, PlatformKind::Windows);
        #[cfg(any(target_os = "macos", target_os = "ios"))]
        assert_eq!(detected.platform, PlatformKind::Apple);
        #[cfg(all(unix, not(any(target_os = "macos", target_os = "ios"))))]
        assert_eq!(detected.platform, PlatformKind::Posix);

        assert!(!detected.candidates.is_empty());
    }

    #[test]
    fn generic_name_probes_first() {
        // The generic name must come before any qualified variant so an
        // unqualified install wins when both are present.
        let names = candidate_names(PlatformKind::Posix, 64);
        assert_eq!(names[0], "libvoxclient.so");
        assert_eq!(names[1], "libvoxclient_linux_amd64.so");

        let names = candidate_names(PlatformKind::Windows, 32);
        assert_eq!(names[0], "voxclient.dll");
        assert_eq!(names[1], "voxclient_win32.dll");

        let names = candidate_names(PlatformKind::Apple, 64);
        assert_eq!(names[0], "libvoxclient.dylib");
    }

    #[test]
    fn width_qualifies_names() {
        assert_eq!(
            candidate_names(PlatformKind::Posix, 32)[1],
            "libvoxclient_linux_x86.so"
        );
        assert_eq!(
            candidate_names(PlatformKind::Windows, 64)[1],
            "voxclient_win64.dll"
        );
    }
}
