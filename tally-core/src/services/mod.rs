//! Service layer - business logic orchestration
//!
//! Services coordinate domain logic and port interactions. Each service
//! focuses on a specific use case or feature area.

mod balance;
mod key_store;
pub mod logging;
mod router;
mod scheduler;
mod status;
mod vault;

pub use balance::{BalanceService, BalanceState, MonitorEvent};
pub use key_store::KeyStore;
pub use logging::{EntryPoint, LogEntry, LogEvent, LoggingService};
pub use router::MessageRouter;
pub use scheduler::{ArmedTimer, SyncScheduler, KEEP_ALIVE_TIMER, REFRESH_TIMER};
pub use status::{StatusService, StatusSummary};
pub use vault::CredentialVault;
