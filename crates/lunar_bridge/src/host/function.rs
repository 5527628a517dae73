//! Host functions callable from lua

use super::{call_host, enter_host, metamethod, LiveHandle};
use crate::error::BridgeError;
use crate::session::SessionInner;
use crate::value::{HostObjectRef, HostValue};
use mlua::{AnyUserData, MetaMethod, MultiValue, UserData, UserDataFields, UserDataMethods};
use std::fmt;
use std::rc::{Rc, Weak};

type HostFn = dyn Fn(Vec<HostValue>) -> anyhow::Result<Vec<HostValue>>;

/// A named host closure. Cloning shares the closure.
#[derive(Clone)]
pub struct HostFunction {
    name: Rc<str>,
    func: Rc<HostFn>,
}

impl HostFunction {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(Vec<HostValue>) -> anyhow::Result<Vec<HostValue>> + 'static,
    {
        let name: String = name.into();
        Self {
            name: Rc::from(name),
            func: Rc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, args: Vec<HostValue>) -> anyhow::Result<Vec<HostValue>> {
        (self.func)(args)
    }

    pub fn ptr_eq(&self, other: &HostFunction) -> bool {
        Rc::ptr_eq(&self.func, &other.func)
    }

    /// Bind to `receiver`: a leading argument that is the receiver itself is
    /// dropped, so lua's `obj:method(x)` and `obj.method(x)` agree.
    pub fn bind(self, receiver: HostObjectRef) -> HostFunction {
        let name = self.name.clone();
        HostFunction {
            name,
            func: Rc::new(move |mut args: Vec<HostValue>| {
                if matches!(args.first(), Some(HostValue::Object(first)) if Rc::ptr_eq(first, &receiver)) {
                    args.remove(0);
                }
                self.call(args)
            }),
        }
    }
}

impl fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HostFunction").field(&self.name).finish()
    }
}

struct HostFunctionCell {
    function: HostFunction,
    session: Weak<SessionInner>,
    _live: LiveHandle,
}

impl HostFunctionCell {
    fn invoke(&self, args: MultiValue) -> Result<MultiValue, BridgeError> {
        enter_host(&self.session, |session| {
            call_host(session, self.function.name(), args, |args| self.function.call(args))
        })
    }
}

impl UserData for HostFunctionCell {
    fn add_fields<F: UserDataFields<Self>>(fields: &mut F) {
        fields.add_meta_field_with(MetaMethod::Call.name(), |lua| {
            metamethod::<Self, MultiValue, _>(lua, |this, args| this.invoke(args))
        });
    }

    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| {
            Ok(format!("host function: {}", this.function.name()))
        });
    }
}

/// Wrap `function` in a fresh lua userdata.
pub(crate) fn install(
    session: &SessionInner,
    function: HostFunction,
) -> Result<AnyUserData, BridgeError> {
    let cell = HostFunctionCell {
        function,
        session: session.downgrade(),
        _live: session.track_host_handle(),
    };
    Ok(session.lua().create_userdata(cell)?)
}

pub(crate) fn unwrap(ud: &AnyUserData) -> Option<HostFunction> {
    ud.borrow::<HostFunctionCell>()
        .ok()
        .map(|cell| cell.function.clone())
}
