//! Services behind the websocket routes.
//!
//! ARCHITECTURE
//! ============
//! `dispatch` owns the request queues; the rest are collaborators the
//! requests and `main` share: account lookup, per-identity storage, the
//! failure indicator, and the inactivity timer.

pub mod accounts;
pub mod dispatch;
pub mod identity;
pub mod inactivity;
pub mod indicator;
