//! Redis-backed store implementations.
//!
//! Production deployments point these at a shared Redis so the
//! brute-force counters and the revocation list hold across nodes; the
//! in-memory equivalents live in `sokoni-core` and carry the same
//! contracts for single-node and test use.

mod gate_redis;
mod revocation_redis;

pub use gate_redis::RedisLoginGate;
pub use revocation_redis::RedisRevocationStore;
