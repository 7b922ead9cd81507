//! Task lifecycle engine.
//!
//! Tasks are created with status `Wait` by the [`services::TaskManager`],
//! stored through the [`ports::TaskStore`] and announced to executors
//! through the [`ports::MessageBus`]. Executors move them forward to a
//! terminal status; maintenance loops fail or re-dispatch the ones that stall
//! and purge the ones that are old enough.
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Orchestration services in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
