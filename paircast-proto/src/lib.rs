//! Shared protocol definitions for the `Paircast` wire format.

pub mod message;
pub mod relay;
