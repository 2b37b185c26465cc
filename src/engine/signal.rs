//! Routing of signals to running workflows by key.
//!
//! A workflow subscribes under its key for as long as it wants signals; the
//! subscription removes itself when dropped. Senders look the key up and get
//! [`SignalError::NotFound`] if nothing is listening.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;

/// Buffered signals per subscriber.
pub const SIGNAL_CHANNEL_BUFFER: usize = 16;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignalError {
    #[error("no workflow is listening for {0}")]
    NotFound(String),

    #[error("workflow {0} stopped listening")]
    Closed(String),
}

struct Entry<S> {
    generation: u64,
    tx: mpsc::Sender<S>,
}

struct Inner<K, S> {
    next_generation: u64,
    entries: HashMap<K, Entry<S>>,
}

pub struct SignalRegistry<K, S> {
    inner: Arc<Mutex<Inner<K, S>>>,
}

impl<K, S> Clone for SignalRegistry<K, S> {
    fn clone(&self) -> Self {
        SignalRegistry {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, S> Default for SignalRegistry<K, S> {
    fn default() -> Self {
        SignalRegistry {
            inner: Arc::new(Mutex::new(Inner {
                next_generation: 0,
                entries: HashMap::new(),
            })),
        }
    }
}

impl<K, S> SignalRegistry<K, S>
where
    K: Eq + Hash + Clone + Debug,
{
    pub fn new() -> Self {
        SignalRegistry::default()
    }

    /// Starts listening under `key`, replacing any earlier subscriber.
    pub fn subscribe(&self, key: K) -> Subscription<K, S> {
        let (tx, rx) = mpsc::channel(SIGNAL_CHANNEL_BUFFER);
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.next_generation += 1;
        let generation = inner.next_generation;
        inner.entries.insert(key.clone(), Entry { generation, tx });
        Subscription {
            key,
            generation,
            rx,
            registry: self.clone(),
        }
    }

    /// Delivers `signal` to the subscriber for `key`.
    pub async fn send(&self, key: &K, signal: S) -> Result<(), SignalError> {
        let tx = {
            let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            inner
                .entries
                .get(key)
                .map(|entry| entry.tx.clone())
                .ok_or_else(|| SignalError::NotFound(format!("{key:?}")))?
        };
        tx.send(signal)
            .await
            .map_err(|_| SignalError::Closed(format!("{key:?}")))
    }

    pub fn is_subscribed(&self, key: &K) -> bool {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.entries.contains_key(key)
    }

    fn remove(&self, key: &K, generation: u64) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner
            .entries
            .get(key)
            .is_some_and(|entry| entry.generation == generation)
        {
            inner.entries.remove(key);
        }
    }
}

/// Receiving end of a registration. Unsubscribes on drop.
pub struct Subscription<K, S>
where
    K: Eq + Hash + Clone + Debug,
{
    key: K,
    generation: u64,
    rx: mpsc::Receiver<S>,
    registry: SignalRegistry<K, S>,
}

impl<K, S> Subscription<K, S>
where
    K: Eq + Hash + Clone + Debug,
{
    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn receiver(&mut self) -> &mut mpsc::Receiver<S> {
        &mut self.rx
    }

    pub async fn recv(&mut self) -> Option<S> {
        self.rx.recv().await
    }
}

impl<K, S> Drop for Subscription<K, S>
where
    K: Eq + Hash + Clone + Debug,
{
    fn drop(&mut self) {
        self.registry.remove(&self.key, self.generation);
    }
}
