//! Serializable event types for the host process.
//!
//! All types derive `serde::Serialize` + `serde::Deserialize` so a host can
//! forward them verbatim to a web view or log them as JSON.

pub mod events;
