//! Media Vault - List Presenter
//!
//! Holds the last file list pushed by the metadata store and forwards it to
//! a view.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};

use crate::error::VaultResult;
use crate::metadata::{FileRecord, MetadataStore};

/// Anything that can show the file list
pub trait ListView: Send {
    fn show(&mut self, items: &[FileRecord]);
}

/// List Presenter
pub struct ListPresenter {
    updates: Receiver<Vec<FileRecord>>,
    latest: Vec<FileRecord>,
}

impl ListPresenter {
    /// Subscribe to `store`; the current list is available after the first [`pump`](Self::pump)
    pub fn new(store: &MetadataStore) -> VaultResult<Self> {
        Ok(Self {
            updates: store.subscribe()?,
            latest: Vec::new(),
        })
    }

    /// Apply every pending update; returns whether anything arrived
    pub fn pump(&mut self) -> bool {
        let mut changed = false;
        while let Ok(items) = self.updates.try_recv() {
            self.latest = items;
            changed = true;
        }
        changed
    }

    /// Block for the next update, then apply anything queued behind it
    pub fn wait_for_update(&mut self, timeout: Duration) -> bool {
        match self.updates.recv_timeout(timeout) {
            Ok(items) => {
                self.latest = items;
                self.pump();
                true
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    /// Last list seen
    pub fn latest(&self) -> &[FileRecord] {
        &self.latest
    }

    /// Drive `view` from a background thread until the store goes away
    pub fn bind<V: ListView + 'static>(self, mut view: V) -> VaultResult<JoinHandle<V>> {
        let handle = thread::Builder::new()
            .name("media-list".into())
            .spawn(move || {
                for items in self.updates.iter() {
                    view.show(&items);
                }
                view
            })?;
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::NewFileRecord;
    use crossbeam_channel::{unbounded, Sender};

    fn record(name: &str) -> NewFileRecord {
        NewFileRecord {
            name: name.into(),
            stored_path: name.into(),
            extension: "png".into(),
        }
    }

    struct ChannelView(Sender<Vec<String>>);

    impl ListView for ChannelView {
        fn show(&mut self, items: &[FileRecord]) {
            let _ = self.0.send(items.iter().map(|r| r.name.clone()).collect());
        }
    }

    #[test]
    fn test_pump_keeps_latest() {
        let store = MetadataStore::open_in_memory().unwrap();
        let mut presenter = ListPresenter::new(&store).unwrap();

        assert!(presenter.pump());
        assert!(presenter.latest().is_empty());
        assert!(!presenter.pump());

        store.insert(record("a.png")).unwrap();
        store.insert(record("b.png")).unwrap();
        assert!(presenter.pump());
        assert_eq!(presenter.latest().len(), 2);
    }

    #[test]
    fn test_wait_for_update() {
        let store = MetadataStore::open_in_memory().unwrap();
        let mut presenter = ListPresenter::new(&store).unwrap();
        presenter.pump();

        assert!(!presenter.wait_for_update(Duration::from_millis(10)));
        store.insert(record("a.png")).unwrap();
        assert!(presenter.wait_for_update(Duration::from_secs(1)));
        assert_eq!(presenter.latest()[0].name, "a.png");
    }

    #[test]
    fn test_bind_forwards_until_store_dropped() {
        let store = MetadataStore::open_in_memory().unwrap();
        let presenter = ListPresenter::new(&store).unwrap();
        let (tx, rx) = unbounded();
        let handle = presenter.bind(ChannelView(tx)).unwrap();

        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), Vec::<String>::new());
        store.insert(record("a.png")).unwrap();
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(1)).unwrap(),
            vec!["a.png".to_string()]
        );

        drop(store);
        assert!(handle.join().is_ok());
    }
}
