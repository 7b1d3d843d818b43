//! Console bridge: typing into a server's `screen` session.

use blockhost_core::ServerName;
use blockhost_os::Invocation;

/// Commands the engine understands for world persistence.
pub mod commands {
    /// Ask the engine to exit.
    pub const STOP: &str = "stop";
    /// Flush the world to disk.
    pub const SAVE_ALL: &str = "save-all";
    /// Suspend autosave.
    pub const SAVE_OFF: &str = "save-off";
    /// Resume autosave.
    pub const SAVE_ON: &str = "save-on";
}

/// Type `command` followed by a newline into window 0 of the session.
///
/// The text is passed through verbatim; callers must not embed `"`.
#[must_use]
pub fn console_invocation(screen: &str, server: &ServerName, command: &str) -> Invocation {
    Invocation::new(screen).args([
        "-S".to_string(),
        server.session_name(),
        "-p".to_string(),
        "0".to_string(),
        "-X".to_string(),
        "eval".to_string(),
        format!("stuff \"{command}\\012\""),
    ])
}
