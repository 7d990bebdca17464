//! Thread-scoped bookkeeping of open sessions.
//!
//! Sessions are stored per `(ClassId, ThreadId)` and, within that, per
//! [`CredentialKey`]. Each (class, thread) has at most one *active* session,
//! the one resource calls default to. The registry lock only guards the
//! maps; network calls run on the session handles with the lock released.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::engine::Session;
use crate::api::DynError;
use crate::auth::CredentialKey;

/// Names a family of sessions, e.g. one per API product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(&'static str);

impl ClassId {
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub fn name(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// What the registry needs from a session it stores.
pub trait ManagedSession: Send + 'static {
    fn key(&self) -> &CredentialKey;

    /// Release server-side state. Local state is cleared even when this
    /// returns an error.
    fn logout(&mut self) -> Result<(), DynError>;
}

pub type SessionHandle<S = Session> = Arc<Mutex<S>>;

struct ThreadSessions<S> {
    sessions: BTreeMap<CredentialKey, SessionHandle<S>>,
    active: Option<CredentialKey>,
}

impl<S> Default for ThreadSessions<S> {
    fn default() -> Self {
        Self {
            sessions: BTreeMap::new(),
            active: None,
        }
    }
}

/// Sessions of type `S`, one per (class, thread, key).
pub struct SessionRegistry<S = Session> {
    slots: Mutex<HashMap<(ClassId, ThreadId), ThreadSessions<S>>>,
}

impl<S> Default for SessionRegistry<S> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<S> fmt::Debug for SessionRegistry<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("slots", &self.slots.lock().len())
            .finish()
    }
}

impl<S: ManagedSession> SessionRegistry<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `class` and the calling thread.
    pub fn current_thread(&self, class: ClassId) -> ThreadScope<'_, S> {
        ThreadScope {
            registry: self,
            class,
            thread: thread::current().id(),
        }
    }

    /// Return the stored session for the triple, or build one with
    /// `constructor` and store it.
    ///
    /// The constructor runs without the registry lock held, so it may
    /// authenticate. If another caller stored a session for the same triple
    /// in the meantime, that one is returned and the new one dropped.
    pub fn get_or_create<F>(
        &self,
        class: ClassId,
        thread: ThreadId,
        key: &CredentialKey,
        constructor: F,
    ) -> Result<SessionHandle<S>, DynError>
    where
        F: FnOnce() -> Result<S, DynError>,
    {
        if let Some(handle) = self.get(class, thread, key) {
            return Ok(handle);
        }

        let session = constructor()?;
        if session.key() != key {
            return Err(DynError::invalid_argument(
                "constructor",
                format!("built session for {} instead of {}", session.key(), key),
            ));
        }

        let mut slots = self.slots.lock();
        let slot = slots.entry((class, thread)).or_default();
        let handle = slot
            .sessions
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(session)))
            .clone();
        if slot.active.is_none() {
            slot.active = Some(key.clone());
        }
        debug!(class = %class, key = %key, "Session registered");
        Ok(handle)
    }

    pub fn get(&self, class: ClassId, thread: ThreadId, key: &CredentialKey) -> Option<SessionHandle<S>> {
        self.slots
            .lock()
            .get(&(class, thread))
            .and_then(|slot| slot.sessions.get(key).cloned())
    }

    /// Make the stored session for `key` the current one.
    pub fn set_active(
        &self,
        class: ClassId,
        thread: ThreadId,
        key: &CredentialKey,
    ) -> Result<(), DynError> {
        let mut slots = self.slots.lock();
        match slots.get_mut(&(class, thread)) {
            Some(slot) if slot.sessions.contains_key(key) => {
                slot.active = Some(key.clone());
                Ok(())
            }
            _ => Err(DynError::NotFound(key.to_string())),
        }
    }

    pub fn active(&self, class: ClassId, thread: ThreadId) -> Option<SessionHandle<S>> {
        let slots = self.slots.lock();
        let slot = slots.get(&(class, thread))?;
        slot.active
            .as_ref()
            .and_then(|key| slot.sessions.get(key).cloned())
    }

    pub fn active_key(&self, class: ClassId, thread: ThreadId) -> Option<CredentialKey> {
        self.slots
            .lock()
            .get(&(class, thread))
            .and_then(|slot| slot.active.clone())
    }

    /// Snapshot of every session stored for (class, thread).
    pub fn all_sessions(
        &self,
        class: ClassId,
        thread: ThreadId,
    ) -> BTreeMap<CredentialKey, SessionHandle<S>> {
        self.slots
            .lock()
            .get(&(class, thread))
            .map(|slot| slot.sessions.clone())
            .unwrap_or_default()
    }

    /// Drop the session for `key`. Returns the removed handle, if any.
    ///
    /// When the active session is removed and exactly one other remains, that
    /// one becomes active; with several left the marker is cleared.
    pub fn remove(
        &self,
        class: ClassId,
        thread: ThreadId,
        key: &CredentialKey,
    ) -> Option<SessionHandle<S>> {
        let mut slots = self.slots.lock();
        let slot = slots.get_mut(&(class, thread))?;
        let removed = slot.sessions.remove(key)?;

        if slot.active.as_ref() == Some(key) {
            slot.active = None;
            match slot.sessions.len() {
                0 => {}
                1 => slot.active = slot.sessions.keys().next().cloned(),
                n => warn!(class = %class, remaining = n, "Active session removed, none selected"),
            }
        }
        if slot.sessions.is_empty() {
            slots.remove(&(class, thread));
        }
        debug!(class = %class, key = %key, "Session removed");
        Some(removed)
    }

    /// Log the session out remotely, then remove it.
    ///
    /// A failed remote logout is logged and otherwise ignored; the local
    /// entry is always removed.
    pub fn logout(
        &self,
        class: ClassId,
        thread: ThreadId,
        key: &CredentialKey,
    ) -> Result<(), DynError> {
        let handle = self
            .get(class, thread, key)
            .ok_or_else(|| DynError::NotFound(key.to_string()))?;

        if let Err(e) = handle.lock().logout() {
            warn!(key = %key, error = %e, "Remote logout failed, removing session anyway");
        }
        self.remove(class, thread, key);
        Ok(())
    }

    pub fn logout_all(&self, class: ClassId, thread: ThreadId) {
        let keys: Vec<CredentialKey> = self.all_sessions(class, thread).into_keys().collect();
        for key in keys {
            // another caller may have removed it already
            let _ = self.logout(class, thread, &key);
        }
    }

    /// Number of sessions stored for (class, thread).
    pub fn len(&self, class: ClassId, thread: ThreadId) -> usize {
        self.slots
            .lock()
            .get(&(class, thread))
            .map_or(0, |slot| slot.sessions.len())
    }

    pub fn is_empty(&self, class: ClassId, thread: ThreadId) -> bool {
        self.len(class, thread) == 0
    }
}

/// The registry seen from one thread for one class.
pub struct ThreadScope<'a, S = Session> {
    registry: &'a SessionRegistry<S>,
    class: ClassId,
    thread: ThreadId,
}

impl<S> Clone for ThreadScope<'_, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for ThreadScope<'_, S> {}

impl<'a, S: ManagedSession> ThreadScope<'a, S> {
    pub fn class(&self) -> ClassId {
        self.class
    }

    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    pub fn get_or_create<F>(&self, key: &CredentialKey, constructor: F) -> Result<SessionHandle<S>, DynError>
    where
        F: FnOnce() -> Result<S, DynError>,
    {
        self.registry.get_or_create(self.class, self.thread, key, constructor)
    }

    pub fn get(&self, key: &CredentialKey) -> Option<SessionHandle<S>> {
        self.registry.get(self.class, self.thread, key)
    }

    pub fn set_active(&self, key: &CredentialKey) -> Result<(), DynError> {
        self.registry.set_active(self.class, self.thread, key)
    }

    pub fn active(&self) -> Option<SessionHandle<S>> {
        self.registry.active(self.class, self.thread)
    }

    pub fn active_key(&self) -> Option<CredentialKey> {
        self.registry.active_key(self.class, self.thread)
    }

    pub fn all_sessions(&self) -> BTreeMap<CredentialKey, SessionHandle<S>> {
        self.registry.all_sessions(self.class, self.thread)
    }

    pub fn remove(&self, key: &CredentialKey) -> Option<SessionHandle<S>> {
        self.registry.remove(self.class, self.thread, key)
    }

    pub fn logout(&self, key: &CredentialKey) -> Result<(), DynError> {
        self.registry.logout(self.class, self.thread, key)
    }

    pub fn logout_all(&self) {
        self.registry.logout_all(self.class, self.thread)
    }

    pub fn len(&self) -> usize {
        self.registry.len(self.class, self.thread)
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty(self.class, self.thread)
    }
}
