/*
[INPUT]:  Public API exports for exdash-live crate
[OUTPUT]: Module declarations and public re-exports
[POS]:    Crate root - library entry point
[UPDATE]: When adding new modules or public exports
*/

pub mod activity_log;
pub mod backoff;
pub mod balance;
pub mod config;
pub mod dispatch;
pub mod indicator;
pub mod keepalive;
pub mod manager;
pub mod starter;

// Re-export main types for convenience
pub use activity_log::{ActivityLog, LogLine};
pub use backoff::{Backoff, BackoffPolicy};
pub use balance::{BalanceRefresher, HttpBalanceRefresher};
pub use config::LiveConfig;
pub use dispatch::{DispatchOutcome, dispatch};
pub use indicator::Indicator;
pub use keepalive::KeepaliveScheduler;
pub use manager::{
    Collaborators, ConnectionPhase, LiveStreamManager, ManagerSettings, SessionSnapshot,
    StartOutcome,
};
pub use starter::StreamStarter;
