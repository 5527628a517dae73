//! Lua session management
//!
//! A [`Session`] owns one interpreter, its registry and its globals. Proxies
//! and host handles refer back to it weakly; once the session is dropped they
//! report [`BridgeError::DanglingReference`] instead of touching freed state.

use crate::config::{LibrarySet, SessionConfig};
use crate::error::BridgeError;
use crate::host::{HostFunction, HostObject, LiveHandle};
use crate::marshal;
use crate::reference::RegistryLedger;
use crate::value::{HostObjectRef, HostValue};
use mlua::{Function, Lua, LuaOptions, MultiValue, StdLib, Value};
use serde::Serialize;
use std::cell::{Cell, RefCell};
use std::path::Path;
use std::rc::{Rc, Weak};
use tracing::{debug, info, trace, warn};

// Guest-level operators, so metamethods run exactly as in scripts.
const HELPERS: &str = r#"
return function(o, k) return o[k] end,
       function(o, k, v) o[k] = v end,
       function(o, ...) return o(...) end,
       function(o) return #o end
"#;

pub(crate) struct Helpers {
    pub(crate) index: Function,
    pub(crate) newindex: Function,
    pub(crate) call: Function,
    pub(crate) len: Function,
}

impl Helpers {
    fn load(lua: &Lua) -> Result<Self, BridgeError> {
        let (index, newindex, call, len) = lua
            .load(HELPERS)
            .set_name("=lunar.helpers")
            .eval::<(Function, Function, Function, Function)>()?;
        Ok(Self {
            index,
            newindex,
            call,
            len,
        })
    }
}

/// Snapshot of bridge bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BridgeStats {
    /// Registry slots currently owned by host proxies.
    pub live_references: usize,
    pub references_acquired: u64,
    pub references_released: u64,
    /// Host functions/objects wrapped in lua userdata not yet finalized.
    pub live_host_handles: usize,
    /// Host-to-lua calls, including `eval`.
    pub guest_calls: u64,
    /// Lua-to-host calls and attribute accesses.
    pub host_calls: u64,
    pub call_depth: usize,
    pub used_memory: usize,
}

// Field order matters: helpers hold lua references and drop before the state.
pub(crate) struct SessionInner {
    helpers: Helpers,
    lua: Lua,
    config: SessionConfig,
    ledger: RegistryLedger,
    depth: Cell<usize>,
    guest_calls: Cell<u64>,
    host_calls: Cell<u64>,
    host_handles: Rc<Cell<usize>>,
    // last host failure raised into lua, until a host caller sees an error
    host_failure: RefCell<Option<String>>,
    this: Weak<SessionInner>,
}

impl SessionInner {
    pub(crate) fn lua(&self) -> &Lua {
        &self.lua
    }

    pub(crate) fn helpers(&self) -> &Helpers {
        &self.helpers
    }

    pub(crate) fn ledger(&self) -> &RegistryLedger {
        &self.ledger
    }

    pub(crate) fn downgrade(&self) -> Weak<SessionInner> {
        self.this.clone()
    }

    pub(crate) fn track_host_handle(&self) -> LiveHandle {
        LiveHandle::new(&self.host_handles)
    }

    pub(crate) fn record_guest_call(&self) {
        self.guest_calls.set(self.guest_calls.get() + 1);
    }

    pub(crate) fn record_host_call(&self) {
        self.host_calls.set(self.host_calls.get() + 1);
    }

    pub(crate) fn record_host_failure(&self, message: &str) {
        self.host_failure.replace(Some(message.to_owned()));
    }

    /// Report a host failure that escaped every guest `pcall` as
    /// [`BridgeError::HostCallback`] instead of a plain guest error.
    pub(crate) fn classify(&self, err: BridgeError) -> BridgeError {
        let Some(raised) = self.host_failure.take() else {
            return err;
        };
        match err {
            BridgeError::Guest { message, traceback }
                if message
                    .strip_prefix(raised.as_str())
                    .is_some_and(|rest| rest.is_empty() || rest.starts_with('\n')) =>
            {
                let rest = message[raised.len()..].trim_start();
                BridgeError::HostCallback {
                    traceback: traceback.or_else(|| (!rest.is_empty()).then(|| rest.to_owned())),
                    message: raised,
                }
            }
            other => other,
        }
    }

    /// Open a boundary crossing. Nested crossings stack; each must close
    /// before its parent.
    pub(crate) fn enter(&self) -> Result<CallScope<'_>, BridgeError> {
        let entry = self.depth.get();
        let limit = self.config.max_call_depth;
        if entry >= limit {
            warn!(limit, "call depth limit reached");
            return Err(BridgeError::CallDepthExceeded { limit });
        }
        self.depth.set(entry + 1);
        Ok(CallScope {
            session: self,
            entry,
        })
    }
}

/// Restores the call depth on drop, including on error paths.
pub(crate) struct CallScope<'a> {
    session: &'a SessionInner,
    entry: usize,
}

impl CallScope<'_> {
    /// Close the scope, checking that nested crossings were balanced.
    pub(crate) fn finish(self) -> Result<(), BridgeError> {
        let expected = self.entry + 1;
        let found = self.session.depth.get();
        debug_assert_eq!(found, expected, "boundary crossing left call depth unbalanced");
        if found != expected {
            return Err(BridgeError::StackImbalance { expected, found });
        }
        Ok(())
    }
}

impl Drop for CallScope<'_> {
    fn drop(&mut self) {
        self.session.depth.set(self.entry);
    }
}

/// An embedded lua interpreter.
///
/// Sessions are `!Send`: every proxy and handle attached to a session must
/// stay on the thread that created it, and only one logical call runs at a
/// time. Guest/host reentrancy is supported up to `max_call_depth`.
pub struct Session {
    inner: Rc<SessionInner>,
}

impl Session {
    pub fn new() -> Result<Self, BridgeError> {
        Self::with_config(SessionConfig::default())
    }

    pub fn with_config(config: SessionConfig) -> Result<Self, BridgeError> {
        let lua = Lua::new_with(StdLib::NONE, LuaOptions::new())?;
        if let Some(limit) = config.memory_limit {
            lua.set_memory_limit(limit)?;
        }
        let helpers = Helpers::load(&lua)?;

        let inner = Rc::new_cyclic(|this| SessionInner {
            helpers,
            lua,
            config,
            ledger: RegistryLedger::default(),
            depth: Cell::new(0),
            guest_calls: Cell::new(0),
            host_calls: Cell::new(0),
            host_handles: Rc::new(Cell::new(0)),
            host_failure: RefCell::new(None),
            this: this.clone(),
        });
        let session = Self { inner };
        info!(
            memory_limit = ?session.inner.config.memory_limit,
            max_call_depth = session.inner.config.max_call_depth,
            "lua session created"
        );

        if session.inner.config.open_libraries {
            session.open_libraries()?;
        }
        Ok(session)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Load the configured standard library groups.
    pub fn open_libraries(&self) -> Result<(), BridgeError> {
        self.open_libraries_with(self.inner.config.libraries)
    }

    pub fn open_libraries_with(&self, libraries: LibrarySet) -> Result<(), BridgeError> {
        self.inner.lua.load_std_libs(libraries.to_std_lib())?;
        debug!(libraries = ?libraries.names(), "opened lua libraries");
        Ok(())
    }

    /// Run a chunk and return all of its results.
    pub fn eval(&self, source: &str) -> Result<Vec<HostValue>, BridgeError> {
        self.eval_named(source, &self.inner.config.chunk_name)
    }

    pub fn eval_named(&self, source: &str, name: &str) -> Result<Vec<HostValue>, BridgeError> {
        let inner = &*self.inner;
        trace!(chunk = name, "evaluating chunk");
        let scope = inner.enter()?;
        inner.record_guest_call();
        let results = inner
            .lua
            .load(source)
            .set_name(name)
            .eval::<MultiValue>()
            .map_err(|err| inner.classify(err.into()))?;
        let results = marshal::to_host_multi(inner, results)?;
        scope.finish()?;
        Ok(results)
    }

    pub fn eval_file(&self, path: impl AsRef<Path>) -> Result<Vec<HostValue>, BridgeError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| BridgeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.eval_named(&source, &format!("@{}", path.display()))
    }

    /// Read a global, honoring any metatable on `_G`.
    pub fn get_global(&self, name: &str) -> Result<HostValue, BridgeError> {
        let value: Value = self.inner.lua.globals().get(name)?;
        marshal::to_host(&self.inner, value)
    }

    pub fn set_global(&self, name: &str, value: HostValue) -> Result<(), BridgeError> {
        let value = marshal::to_guest(&self.inner, &value)?;
        self.inner.lua.globals().set(name, value)?;
        Ok(())
    }

    /// Expose a host closure to lua as the global `name`.
    pub fn register_function<F>(&self, name: &str, func: F) -> Result<(), BridgeError>
    where
        F: Fn(Vec<HostValue>) -> anyhow::Result<Vec<HostValue>> + 'static,
    {
        self.set_global(name, HostValue::Callable(HostFunction::new(name, func)))
    }

    /// Expose a host object to lua as the global `name`.
    pub fn expose_object<T: HostObject + 'static>(
        &self,
        name: &str,
        object: Rc<T>,
    ) -> Result<(), BridgeError> {
        let object: HostObjectRef = object;
        self.set_global(name, HostValue::Object(object))
    }

    /// Run a full guest collection cycle, finalizing unreachable host handles.
    pub fn collect_garbage(&self) -> Result<(), BridgeError> {
        self.inner.lua.gc_collect()?;
        Ok(())
    }

    pub fn used_memory(&self) -> usize {
        self.inner.lua.used_memory()
    }

    pub fn stats(&self) -> BridgeStats {
        let inner = &self.inner;
        BridgeStats {
            live_references: inner.ledger.live(),
            references_acquired: inner.ledger.acquired(),
            references_released: inner.ledger.released(),
            live_host_handles: inner.host_handles.get(),
            guest_calls: inner.guest_calls.get(),
            host_calls: inner.host_calls.get(),
            call_depth: inner.depth.get(),
            used_memory: inner.lua.used_memory(),
        }
    }

    pub(crate) fn inner(&self) -> &SessionInner {
        &self.inner
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let live = self.inner.ledger.live();
        if live > 0 {
            warn!(live, "closing lua session with live references; they are now dangling");
        }
        info!("lua session closed");
    }
}
