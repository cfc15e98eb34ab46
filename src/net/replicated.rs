//! Single-writer replicated values
//!
//! A [`ReplicatedValue`] has exactly one authority. Writes from anyone else
//! are protocol violations: they are logged and rejected, and the stored
//! value is left untouched. Readers either poll, hold a `watch::Receiver`,
//! or register a change callback.

use std::fmt;

use tokio::sync::watch;
use tracing::warn;

use crate::game::PlayerId;

/// Who is allowed to write a value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authority {
    Server,
    Owner(PlayerId),
}

/// Who is attempting a write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Writer {
    Server,
    Client(PlayerId),
}

impl Authority {
    pub fn permits(&self, writer: Writer) -> bool {
        match (self, writer) {
            (Authority::Server, Writer::Server) => true,
            (Authority::Owner(owner), Writer::Client(id)) => *owner == id,
            _ => false,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ReplicationError {
    #[error("{writer:?} may not write `{name}` (authority is {authority:?})")]
    NotAuthority {
        name: &'static str,
        writer: Writer,
        authority: Authority,
    },
}

type ChangeCallback<T> = Box<dyn FnMut(&T, &T) + Send>;

pub struct ReplicatedValue<T> {
    name: &'static str,
    authority: Authority,
    tx: watch::Sender<T>,
    listeners: Vec<ChangeCallback<T>>,
    /// Set by a successful local write, cleared when the outbound layer publishes
    dirty: bool,
}

impl<T> ReplicatedValue<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    pub fn new(name: &'static str, authority: Authority, initial: T) -> Self {
        let (tx, _) = watch::channel(initial);
        Self {
            name,
            authority,
            tx,
            listeners: Vec::new(),
            dirty: false,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn authority(&self) -> Authority {
        self.authority
    }

    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }

    /// Receiver that observes every change, usable from other tasks
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }

    /// Register a callback invoked with `(old, new)` whenever the value changes
    pub fn on_change<F>(&mut self, callback: F)
    where
        F: FnMut(&T, &T) + Send + 'static,
    {
        self.listeners.push(Box::new(callback));
    }

    /// Local write by `writer`; rejected unless `writer` is the authority
    pub fn write(&mut self, writer: Writer, value: T) -> Result<(), ReplicationError> {
        if !self.authority.permits(writer) {
            warn!(
                value = self.name,
                writer = ?writer,
                authority = ?self.authority,
                "Rejected write from non-authority"
            );
            return Err(ReplicationError::NotAuthority {
                name: self.name,
                writer,
                authority: self.authority,
            });
        }

        self.dirty = true;
        self.store(value);
        Ok(())
    }

    /// Apply a value received from the authority over the transport
    pub fn apply_remote(&mut self, value: T) {
        self.store(value);
    }

    /// Returns the current value once per write, for publishing to peers
    pub fn take_dirty(&mut self) -> Option<T> {
        if std::mem::take(&mut self.dirty) {
            Some(self.get())
        } else {
            None
        }
    }

    fn store(&mut self, value: T) {
        let old = self.tx.send_replace(value);
        if self.listeners.is_empty() {
            return;
        }
        let new = self.tx.borrow().clone();
        if old != new {
            for listener in &mut self.listeners {
                listener(&old, &new);
            }
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ReplicatedValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplicatedValue")
            .field("name", &self.name)
            .field("authority", &self.authority)
            .field("value", &*self.tx.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn owner_write_is_accepted() {
        let mut value = ReplicatedValue::new("motion", Authority::Owner(3), 0u32);
        assert!(value.write(Writer::Client(3), 7).is_ok());
        assert_eq!(value.get(), 7);
        assert_eq!(value.take_dirty(), Some(7));
        assert_eq!(value.take_dirty(), None);
    }

    #[test]
    fn foreign_write_is_rejected_and_value_kept() {
        let mut value = ReplicatedValue::new("motion", Authority::Owner(3), 1u32);
        let err = value.write(Writer::Client(4), 9).unwrap_err();
        assert_eq!(
            err,
            ReplicationError::NotAuthority {
                name: "motion",
                writer: Writer::Client(4),
                authority: Authority::Owner(3),
            }
        );
        assert!(value.write(Writer::Server, 9).is_err());
        assert_eq!(value.get(), 1);
        assert_eq!(value.take_dirty(), None);
    }

    #[test]
    fn callbacks_fire_only_on_change() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let mut value = ReplicatedValue::new("state", Authority::Server, 0u8);
        value.on_change(move |old, new| sink.lock().unwrap().push((*old, *new)));

        value.write(Writer::Server, 1).unwrap();
        value.write(Writer::Server, 1).unwrap();
        value.apply_remote(2);

        assert_eq!(*seen.lock().unwrap(), vec![(0, 1), (1, 2)]);
    }

    #[test]
    fn subscribers_observe_writes() {
        let mut value = ReplicatedValue::new("zone", Authority::Server, 0i32);
        let mut rx = value.subscribe();
        value.write(Writer::Server, 5).unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), 5);
    }
}
