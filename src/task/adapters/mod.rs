//! Adapter implementations for the task store, message bus and lock ports.

pub mod amqp;
pub mod memory;
pub mod postgres;
