//! The four coordinated in-memory registries. Each owns its state behind a
//! single lock; the invite registry reaches into the party registry through
//! the `PartyDirectory` interface (lock order: invite → party).

pub mod friends;
pub mod invites;
pub mod parties;
pub mod party;
pub mod servers;
