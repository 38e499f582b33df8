//! `Paircast` client library: pairwise conversations reconciled from a
//! broadcast relay stream.

pub mod chat;
pub mod config;
pub mod net;
pub mod transport;
