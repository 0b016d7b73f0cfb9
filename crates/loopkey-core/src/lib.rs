//! loopkey-core - input capture and synthesis primitives
//!
//! The recorder never talks to the OS directly. It consumes two capabilities:
//! an [`InputSource`] that delivers raw keyboard/mouse notifications into a
//! channel, and an [`InputSink`] that synthesizes input.
//!
//! ## Platform Support
//!
//! - **macOS**: CGEventTap capture, CGEventPost synthesis
//! - **Linux / Windows**: not yet, operations return `Unsupported`
//! - **Any**: [`mock`] backend for tests and dry runs

pub mod error;
pub mod input;
pub mod mock;
pub mod platform;

pub use error::{Error, ErrorCode, Result};
pub use input::{
    ButtonAction, InputSink, InputSource, InputSubscription, Interest, KeyId, MouseButton,
    RawEvent, RawInput,
};

pub mod prelude {
    pub use crate::error::{Error, ErrorCode, Result};
    pub use crate::input::{
        ButtonAction, InputSink, InputSource, InputSubscription, Interest, KeyId, MouseButton,
        RawEvent, RawInput,
    };
    pub use crate::mock::{RecordingSink, ScriptedSource, Synthesized};
}

/// Whether the process may install input hooks and post events
pub fn has_input_permissions() -> bool {
    platform::current::has_input_permissions()
}

/// Prompt for input permissions where the OS supports a prompt
pub fn request_input_permissions() -> bool {
    platform::current::request_input_permissions()
}
