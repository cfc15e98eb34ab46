//! Replication primitives and wire encoding

pub mod replicated;
pub mod transport;
pub mod wire;

pub use replicated::{Authority, ReplicatedValue, ReplicationError, Writer};
pub use transport::{Envelope, Target, Transport};
pub use wire::{decode, encode, WireError, WireField, WireSchema, WireType};
