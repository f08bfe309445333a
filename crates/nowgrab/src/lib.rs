//! Track-queue coordinator: turns "now playing" notifications into downloaded,
//! tagged audio files, one operator-confirmed fetch at a time.

pub mod command;
pub mod console;
pub mod coordinator;
pub mod ingest;
pub mod providers;
pub mod queue;
pub mod retry;
pub mod session_log;
pub mod slot;

pub use coordinator::{
    Coordinator, CoordinatorError, CoordinatorEvent, CoordinatorSettings, FetchEvent, Flow,
    Providers,
};
pub use session_log::{DisplayUpdate, SessionEvent, SessionLog};
