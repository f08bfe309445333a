//! Types shared by the nowgrab coordinator and its now-playing poller.

pub mod config;
pub mod platform;
pub mod protocol;
pub mod track;

pub use protocol::{PollerMessage, ProtocolError};
pub use track::{query_key, QueryKey, Track};
