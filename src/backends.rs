//! Device backend registration
//!
//! Backends are feature-gated; this module tells the rest of the binary
//! which ones were compiled in.

/// Information about a device backend
pub struct BackendInfo {
    /// Name shown to the user
    pub name: &'static str,
    /// Short description
    pub description: &'static str,
}

/// Backends enabled at compile time
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn available_backends() -> Vec<BackendInfo> {
    let mut backends = Vec::new();

    #[cfg(feature = "usb")]
    backends.push(BackendInfo {
        name: "usb",
        description: "HalfKay bootloader over USB HID (VID:16c0 PID:0478)",
    });

    #[cfg(feature = "dummy")]
    backends.push(BackendInfo {
        name: "dummy",
        description: "In-memory HalfKay emulator for testing (--dummy)",
    });

    backends
}

/// One-line summary for log output
pub fn backend_names() -> String {
    let names: Vec<_> = available_backends().iter().map(|b| b.name).collect();
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(", ")
    }
}
