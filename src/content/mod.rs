//! Response body helpers for markup sources.

pub mod html;

pub use html::{html_to_text, looks_bot_protected, script_blocks};
