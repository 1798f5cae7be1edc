//! Core domain entities
//!
//! Pure data structures with validation logic - no I/O or external dependencies.

pub mod balance;
mod credential;
pub mod indicator;
pub mod message;
pub mod result;

pub use balance::{BalanceSnapshot, RefreshSchedule};
pub use credential::{EncryptedCredential, EncryptionKey, KEY_LEN, NONCE_LEN};
pub use indicator::{BadgeColor, Indicator, IndicatorInput};
pub use message::{Reply, Request, Response};
