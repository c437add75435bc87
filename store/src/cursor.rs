use crate::error::{Error, Result};
use crate::ChainStore;
use crypto::Beacon;

/// Forward/backward cursor over a chain store's rounds, in ascending
/// order (§4.2). A cursor is a thin, stateful wrapper; it takes no lock on
/// the underlying store beyond what each individual read does.
pub struct Cursor<'a> {
    store: &'a ChainStore,
    position: Option<u64>,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(store: &'a ChainStore) -> Self {
        Cursor {
            store,
            position: None,
        }
    }

    pub fn first(&mut self) -> Result<Beacon> {
        let beacon = self.store.get(0)?;
        self.position = Some(0);
        Ok(beacon)
    }

    pub fn last(&mut self) -> Result<Beacon> {
        let beacon = self.store.last()?;
        self.position = Some(beacon.round);
        Ok(beacon)
    }

    pub fn seek(&mut self, round: u64) -> Result<Beacon> {
        let beacon = self.store.get(round)?;
        self.position = Some(round);
        Ok(beacon)
    }

    /// Returns [`Error::NoMoreBeacons`] once the cursor has passed the
    /// stored tail, rather than silently stalling — callers (e.g. the sync
    /// manager) rely on this to detect end-of-stream.
    pub fn next(&mut self) -> Result<Beacon> {
        let next_round = match self.position {
            Some(r) => r + 1,
            None => 0,
        };
        match self.store.get(next_round) {
            Ok(beacon) => {
                self.position = Some(next_round);
                Ok(beacon)
            }
            Err(Error::NotFound(_)) => Err(Error::NoMoreBeacons),
            Err(e) => Err(e),
        }
    }
}
