//! Platform abstraction layer
//!
//! Each platform exposes a `NativeInput` type implementing both
//! [`InputSource`](crate::input::InputSource) and
//! [`InputSink`](crate::input::InputSink), plus a `backend()` constructor.

#[cfg(target_os = "macos")]
pub mod macos;

#[cfg(not(target_os = "macos"))]
pub mod fallback;

// Re-export the current platform
#[cfg(target_os = "macos")]
pub use macos as current;

#[cfg(not(target_os = "macos"))]
pub use fallback as current;
