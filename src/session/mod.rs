/// Decode session handle and its frame entry point.
pub mod decode_session;
