//! The pluggable state-machine applier. The core only guarantees
//! that each committed entry's payload is handed to the applier exactly
//! once, in index order; turning that payload into a state-machine effect
//! is a caller concern.

use crate::store::Entry;
use log::debug;

pub trait Applier: Send + Sync {
    fn apply(&self, entry: &Entry);
}

/// Ships with the core so a replica is runnable out of the box; logs each
/// committed entry instead of doing anything with its payload.
pub struct LoggingApplier;

impl Applier for LoggingApplier {
    fn apply(&self, entry: &Entry) {
        debug!("applying committed entry {} (term {}, {} byte payload)", entry.index, entry.term, entry.payload.len());
    }
}
