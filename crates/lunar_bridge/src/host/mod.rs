//! Host values exposed to lua
//!
//! Host functions and objects enter lua as userdata. The userdata owns an
//! `Rc` to the host handle, so the handle lives exactly as long as lua can
//! reach it: the guest collector finalizes the userdata and `Drop` releases
//! the host side. Reference cycles that pass through both runtimes are not
//! collected by either.

pub mod function;
pub mod object;

pub use function::HostFunction;
pub use object::{HostObject, Namespace};

use crate::error::BridgeError;
use crate::marshal;
use crate::session::SessionInner;
use crate::value::HostValue;
use mlua::{AnyUserData, FromLuaMulti, Function, Lua, MultiValue, UserData, Value};
use std::cell::Cell;
use std::iter;
use std::rc::{Rc, Weak};
use tracing::debug;

// Host failures are raised from lua itself so the guest sees a plain string.
const TRAMPOLINE: &str = r#"
local raw = ...
local error = error
local function settle(ok, ...)
    if ok then
        return ...
    end
    error((...), 0)
end
return function(...)
    return settle(raw(...))
end
"#;

/// Counts a host handle as live while lua holds it.
pub(crate) struct LiveHandle(Rc<Cell<usize>>);

impl LiveHandle {
    pub(crate) fn new(counter: &Rc<Cell<usize>>) -> Self {
        counter.set(counter.get() + 1);
        Self(counter.clone())
    }
}

impl Drop for LiveHandle {
    fn drop(&mut self) {
        self.0.set(self.0.get() - 1);
    }
}

/// Build a metamethod for the host cell `T`.
///
/// `handler` receives the cell and the remaining arguments. Its failure is
/// handed back to the lua trampoline as `false, message` and raised there.
pub(crate) fn metamethod<T, A, F>(lua: &Lua, handler: F) -> mlua::Result<Function>
where
    T: UserData + 'static,
    A: FromLuaMulti,
    F: Fn(&T, A) -> Result<MultiValue, BridgeError> + 'static,
{
    let raw = lua.create_function(move |lua, (cell, args): (AnyUserData, A)| {
        let cell = cell.borrow::<T>()?;
        settle(lua, handler(&cell, args))
    })?;
    lua.load(TRAMPOLINE).set_name("=lunar.trampoline").call(raw)
}

fn settle(lua: &Lua, outcome: Result<MultiValue, BridgeError>) -> mlua::Result<MultiValue> {
    let values = match outcome {
        Ok(results) => iter::once(Value::Boolean(true)).chain(results).collect(),
        Err(err) => {
            let message = err.message().map(str::to_owned).unwrap_or_else(|| err.to_string());
            vec![Value::Boolean(false), Value::String(lua.create_string(&message)?)]
        }
    };
    Ok(MultiValue::from_vec(values))
}

/// Run a guest-to-host crossing inside a call scope.
pub(crate) fn enter_host<R>(
    session: &Weak<SessionInner>,
    op: impl FnOnce(&SessionInner) -> Result<R, BridgeError>,
) -> Result<R, BridgeError> {
    let session = session.upgrade().ok_or(BridgeError::DanglingReference)?;
    let scope = session.enter()?;
    session.record_host_call();
    let result = op(&*session);
    if let Err(BridgeError::HostCallback { message, .. }) = &result {
        session.record_host_failure(message);
    }
    let result = result?;
    scope.finish()?;
    Ok(result)
}

/// Marshal guest arguments, run `call`, marshal its results back.
pub(crate) fn call_host(
    session: &SessionInner,
    name: &str,
    args: MultiValue,
    call: impl FnOnce(Vec<HostValue>) -> anyhow::Result<Vec<HostValue>>,
) -> Result<MultiValue, BridgeError> {
    let args = marshal::to_host_multi(session, args)?;
    let results = call(args).map_err(|err| host_failure(name, err))?;
    marshal::to_guest_multi(session, &results)
}

/// Wrap a failure of host code called from lua.
pub(crate) fn host_failure(origin: &str, err: anyhow::Error) -> BridgeError {
    let message = format!("{err:#}");
    debug!(origin, error = %message, "host failure raised into lua");
    BridgeError::HostCallback {
        message,
        traceback: None,
    }
}
