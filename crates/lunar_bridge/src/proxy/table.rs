//! Table/userdata proxy
//!
//! Indexing, assignment and calls go through lua's own operators (see
//! `Helpers` in the session), so `__index`, `__newindex`, `__call` and `__len`
//! metamethods run exactly as they would for guest code.

use super::function::same_guest_value;
use crate::error::BridgeError;
use crate::marshal;
use crate::reference::PersistentRef;
use crate::session::SessionInner;
use crate::value::HostValue;
use mlua::{MultiValue, Value};
use std::fmt;
use std::rc::Rc;

/// A lua table or userdata held by the host.
#[derive(Clone)]
pub struct LuaTable {
    reference: Rc<PersistentRef>,
}

impl LuaTable {
    pub(crate) fn new(reference: Rc<PersistentRef>) -> Self {
        Self { reference }
    }

    pub(crate) fn reference(&self) -> &PersistentRef {
        &self.reference
    }

    /// `"table"` or `"userdata"`.
    pub fn type_name(&self) -> &'static str {
        self.reference.type_name()
    }

    pub fn get_attr(&self, name: &str) -> Result<HostValue, BridgeError> {
        self.get_item(name)
    }

    pub fn set_attr(&self, name: &str, value: impl Into<HostValue>) -> Result<(), BridgeError> {
        self.set_item(name, value)
    }

    /// `self[key]`, honoring `__index`.
    pub fn get_item(&self, key: impl Into<HostValue>) -> Result<HostValue, BridgeError> {
        let key = key.into();
        self.dispatch(|session, target| {
            let key = marshal::to_guest(session, &key)?;
            let value: Value = session.helpers().index.call((target, key))?;
            marshal::to_host(session, value)
        })
    }

    /// `self[key] = value`, honoring `__newindex`.
    pub fn set_item(
        &self,
        key: impl Into<HostValue>,
        value: impl Into<HostValue>,
    ) -> Result<(), BridgeError> {
        let (key, value) = (key.into(), value.into());
        self.dispatch(|session, target| {
            let key = marshal::to_guest(session, &key)?;
            let value = marshal::to_guest(session, &value)?;
            session.helpers().newindex.call::<()>((target, key, value))?;
            Ok(())
        })
    }

    /// Call the value itself; tables need a `__call` metamethod.
    pub fn call<I>(&self, args: I) -> Result<Vec<HostValue>, BridgeError>
    where
        I: IntoIterator<Item = HostValue>,
    {
        let args: Vec<HostValue> = args.into_iter().collect();
        self.dispatch(|session, target| {
            let mut values = vec![target];
            values.extend(marshal::to_guest_multi(session, &args)?);
            session.record_guest_call();
            let results: MultiValue = session.helpers().call.call(MultiValue::from_vec(values))?;
            marshal::to_host_multi(session, results)
        })
    }

    /// `self:name(args...)`.
    pub fn call_method<I>(&self, name: &str, args: I) -> Result<Vec<HostValue>, BridgeError>
    where
        I: IntoIterator<Item = HostValue>,
    {
        let args: Vec<HostValue> = args.into_iter().collect();
        self.dispatch(|session, target| {
            let method: Value = session
                .helpers()
                .index
                .call((target.clone(), session.lua().create_string(name)?))?;
            let mut values = vec![method, target];
            values.extend(marshal::to_guest_multi(session, &args)?);
            session.record_guest_call();
            let results: MultiValue = session.helpers().call.call(MultiValue::from_vec(values))?;
            marshal::to_host_multi(session, results)
        })
    }

    /// `#self`, honoring `__len`.
    pub fn len(&self) -> Result<HostValue, BridgeError> {
        self.dispatch(|session, target| {
            let value: Value = session.helpers().len.call(target)?;
            marshal::to_host(session, value)
        })
    }

    pub fn session_alive(&self) -> bool {
        self.reference.is_attached()
    }

    /// Guest identity: both proxies refer to the same table or userdata.
    pub fn same_as(&self, other: &LuaTable) -> bool {
        same_guest_value(&self.reference, &other.reference)
    }

    fn dispatch<R>(
        &self,
        op: impl FnOnce(&SessionInner, Value) -> Result<R, BridgeError>,
    ) -> Result<R, BridgeError> {
        let session = self.reference.session()?;
        let target: Value = self.reference.push(&session)?;
        let scope = session.enter()?;
        let result = op(&*session, target).map_err(|err| session.classify(err))?;
        scope.finish()?;
        Ok(result)
    }
}

impl fmt::Debug for LuaTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LuaTable").field(&self.reference).finish()
    }
}
