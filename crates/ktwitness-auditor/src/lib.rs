//! ktwitness-auditor: the service half of the ktwitness auditor
//!
//! Wires the audit core from `ktwitness-core` to the outside world: a
//! scheduled audit loop, a framed TCP client for the key transparency
//! service, durable state storage, and TOML configuration.

pub mod auditor;
pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod storage;

pub use auditor::{Auditor, AuditorStats};
pub use client::{AuditPage, KeyTransparencyClient, TcpClient};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AuditorKeys, Config};
pub use error::{Error, Result};
pub use storage::{FileStateRepository, InMemoryStateRepository, StateRepository};
