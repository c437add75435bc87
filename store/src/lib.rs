//! Append-only chain store and cursoring: §4.2 of the design.

pub mod callback;
pub mod chain_store;
pub mod cursor;
pub mod error;

pub use callback::{Callback, CallbackRegistry};
pub use chain_store::ChainStore;
pub use cursor::Cursor;
pub use error::{Error, Result};

#[cfg(test)]
mod tests {
    use super::*;
    use crypto::Beacon;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn beacon(round: u64, sig: &[u8], prev: &[u8]) -> Beacon {
        Beacon {
            round,
            signature: sig.to_vec(),
            previous_signature: prev.to_vec(),
        }
    }

    #[test]
    fn put_is_idempotent_and_rejects_mismatch() {
        let store = ChainStore::open_temporary(true, b"genesis".to_vec()).unwrap();
        let b1 = beacon(1, b"sig-1", b"genesis");
        store.put(&b1).unwrap();
        store.put(&b1).unwrap();
        assert_eq!(store.get(1).unwrap(), b1);

        let conflicting = beacon(1, b"sig-1-evil", b"genesis");
        assert!(store.put(&conflicting).is_err());
    }

    #[test]
    fn chained_previous_signature_is_reconstructed() {
        let store = ChainStore::open_temporary(true, b"genesis".to_vec()).unwrap();
        store.put(&beacon(1, b"sig-1", b"genesis")).unwrap();
        store.put(&beacon(2, b"sig-2", b"sig-1")).unwrap();

        let b2 = store.get(2).unwrap();
        assert_eq!(b2.previous_signature, b"sig-1");
    }

    #[test]
    fn cursor_walks_in_order_and_signals_end() {
        let store = ChainStore::open_temporary(false, b"genesis".to_vec()).unwrap();
        store.put(&beacon(1, b"sig-1", b"")).unwrap();
        store.put(&beacon(2, b"sig-2", b"")).unwrap();

        let mut cursor = store.cursor();
        assert_eq!(cursor.first().unwrap().round, 0);
        assert_eq!(cursor.next().unwrap().round, 1);
        assert_eq!(cursor.next().unwrap().round, 2);
        assert!(matches!(cursor.next(), Err(Error::NoMoreBeacons)));
    }

    #[test]
    fn cursor_seek_and_last() {
        let store = ChainStore::open_temporary(false, b"genesis".to_vec()).unwrap();
        store.put(&beacon(1, b"sig-1", b"")).unwrap();
        store.put(&beacon(2, b"sig-2", b"")).unwrap();

        let mut cursor = store.cursor();
        assert_eq!(cursor.seek(1).unwrap().round, 1);
        assert_eq!(cursor.last().unwrap().round, 2);
    }

    #[test]
    fn callbacks_fire_on_append_and_close() {
        let store = ChainStore::open_temporary(false, b"genesis".to_vec()).unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let closed_seen = Arc::new(AtomicUsize::new(0));
        {
            let count = count.clone();
            let closed_seen = closed_seen.clone();
            store.add_callback(
                "test",
                Arc::new(move |_beacon, closed| {
                    count.fetch_add(1, Ordering::SeqCst);
                    if closed {
                        closed_seen.fetch_add(1, Ordering::SeqCst);
                    }
                }),
            );
        }
        store.put(&beacon(1, b"sig-1", b"")).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);

        let last = store.get(1).unwrap();
        store.close_callbacks(&last);
        assert_eq!(closed_seen.load(Ordering::SeqCst), 1);

        store.remove_callback("test");
        store.put(&beacon(2, b"sig-2", b"")).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn save_to_streams_all_rounds() {
        let store = ChainStore::open_temporary(false, b"genesis".to_vec()).unwrap();
        store.put(&beacon(1, b"sig-1", b"")).unwrap();
        store.put(&beacon(2, b"sig-2", b"")).unwrap();

        let mut buf = Vec::new();
        store.save_to(&mut buf).unwrap();
        let lines = String::from_utf8(buf).unwrap();
        assert_eq!(lines.lines().count(), 3);
    }

    #[test]
    fn load_from_restores_a_save_to_snapshot() {
        let source = ChainStore::open_temporary(true, b"genesis".to_vec()).unwrap();
        source.put(&beacon(1, b"sig-1", b"genesis")).unwrap();
        source.put(&beacon(2, b"sig-2", b"sig-1")).unwrap();
        let mut buf = Vec::new();
        source.save_to(&mut buf).unwrap();

        let dest = ChainStore::open_temporary(true, b"genesis".to_vec()).unwrap();
        dest.load_from(buf.as_slice()).unwrap();

        assert_eq!(dest.last().unwrap(), source.last().unwrap());
        assert_eq!(dest.get(1).unwrap(), source.get(1).unwrap());
        assert_eq!(dest.len(), source.len());
    }

    #[test]
    fn load_from_is_idempotent_against_an_already_populated_store() {
        let store = ChainStore::open_temporary(false, b"genesis".to_vec()).unwrap();
        store.put(&beacon(1, b"sig-1", b"")).unwrap();
        let mut buf = Vec::new();
        store.save_to(&mut buf).unwrap();

        // Replaying the same snapshot against the store it came from must
        // not error, since `put` is idempotent for matching content.
        store.load_from(buf.as_slice()).unwrap();
        assert_eq!(store.get(1).unwrap().signature, b"sig-1");
    }
}
