//! Persistent references into the lua registry
//!
//! A [`PersistentRef`] owns exactly one registry slot. Proxies share it through
//! `Rc`, so cloning a proxy bumps the count instead of copying the slot; the
//! slot is removed once, when the last owner drops.

use crate::error::{BridgeError, MarshalError};
use crate::session::SessionInner;
use mlua::{FromLua, RegistryKey, Value};
use std::cell::Cell;
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::{trace, warn};

/// Registry bookkeeping for one session.
#[derive(Debug, Default)]
pub(crate) struct RegistryLedger {
    acquired: Cell<u64>,
    released: Cell<u64>,
}

impl RegistryLedger {
    fn record_acquire(&self) {
        self.acquired.set(self.acquired.get() + 1);
    }

    fn record_release(&self) {
        self.released.set(self.released.get() + 1);
    }

    pub(crate) fn acquired(&self) -> u64 {
        self.acquired.get()
    }

    pub(crate) fn released(&self) -> u64 {
        self.released.get()
    }

    pub(crate) fn live(&self) -> usize {
        (self.acquired.get() - self.released.get()) as usize
    }
}

pub(crate) struct PersistentRef {
    key: Option<RegistryKey>,
    type_name: &'static str,
    session: Weak<SessionInner>,
}

impl PersistentRef {
    /// Store `value` in the session registry and return the owning handle.
    pub(crate) fn acquire(session: &SessionInner, value: Value) -> Result<Rc<Self>, BridgeError> {
        let type_name = value.type_name();
        let key = session.lua().create_registry_value(value)?;
        session.ledger().record_acquire();
        trace!(type_name, live = session.ledger().live(), "acquired registry slot");

        Ok(Rc::new(Self {
            key: Some(key),
            type_name,
            session: session.downgrade(),
        }))
    }

    pub(crate) fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Upgrade to the owning session, failing if it was torn down.
    pub(crate) fn session(&self) -> Result<Rc<SessionInner>, BridgeError> {
        self.session.upgrade().ok_or_else(|| {
            warn!(type_name = self.type_name, "reference used after session teardown");
            BridgeError::DanglingReference
        })
    }

    pub(crate) fn is_attached(&self) -> bool {
        self.session.strong_count() > 0
    }

    /// Fetch the referenced value for use in `session`.
    pub(crate) fn push<T: FromLua>(&self, session: &SessionInner) -> Result<T, BridgeError> {
        if !self.is_attached() {
            warn!(type_name = self.type_name, "reference used after session teardown");
            return Err(BridgeError::DanglingReference);
        }
        if !std::ptr::eq(self.session.as_ptr(), session) {
            return Err(MarshalError::ForeignReference.into());
        }
        let key = self.key.as_ref().ok_or(BridgeError::ReleasedReference)?;
        Ok(session.lua().registry_value(key)?)
    }

    /// Clear the registry slot. Safe to call more than once.
    pub(crate) fn release(&mut self) {
        let Some(key) = self.key.take() else {
            return;
        };
        // A torn-down session already freed the registry with its state.
        let Some(session) = self.session.upgrade() else {
            return;
        };
        if let Err(err) = session.lua().remove_registry_value(key) {
            warn!(error = %err, "failed to release registry slot");
        }
        session.ledger().record_release();
        trace!(type_name = self.type_name, live = session.ledger().live(), "released registry slot");
    }
}

impl Drop for PersistentRef {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for PersistentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistentRef")
            .field("type_name", &self.type_name)
            .field("released", &self.key.is_none())
            .field("attached", &self.is_attached())
            .finish()
    }
}
