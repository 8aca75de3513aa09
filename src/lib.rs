//! leadsync - marketing event synchronization engine.
//!
//! Pulls activity from externally rate-limited outreach platforms and
//! prepares it for storage: adaptive batch processing paced by per-service
//! token limiters, and collision-resistant idempotency keys so no event is
//! stored twice across retries, reruns, or racing callers.

pub mod cli;
pub mod config;
pub mod keys;
pub mod models;
pub mod rate_limit;
pub mod sync;
