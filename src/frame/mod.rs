//! Frame decode transactions.
//!
//! A transaction locks the backend, begins a frame, commits the ordered buffer set, submits it and
//! always ends the frame again.

/// Copying payloads into backend buffer slots.
pub mod commit;
/// The begin/commit/submit/end state machine.
pub mod transaction;
