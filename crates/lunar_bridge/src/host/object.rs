//! Host objects with a named-attribute protocol

use super::{call_host, enter_host, host_failure, metamethod, LiveHandle};
use crate::error::{BridgeError, MarshalError};
use crate::marshal;
use crate::session::SessionInner;
use crate::value::{HostObjectRef, HostValue};
use anyhow::bail;
use mlua::{
    AnyUserData, MetaMethod, MultiValue, UserData, UserDataFields, UserDataMethods, Value,
};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Weak;

/// An object lua can index, assign into and call.
///
/// Implementations use interior mutability; the object is shared between the
/// host and every lua value wrapping it.
pub trait HostObject {
    fn type_name(&self) -> &str;

    /// `Ok(None)` means the attribute does not exist; lua sees an error.
    fn get_attr(&self, name: &str) -> anyhow::Result<Option<HostValue>>;

    fn set_attr(&self, name: &str, _value: HostValue) -> anyhow::Result<()> {
        bail!("attribute '{name}' of '{}' is read-only", self.type_name())
    }

    fn call(&self, _args: Vec<HostValue>) -> anyhow::Result<Vec<HostValue>> {
        bail!("'{}' object is not callable", self.type_name())
    }
}

/// Attribute bag that accepts any attribute.
#[derive(Debug)]
pub struct Namespace {
    type_name: String,
    attrs: RefCell<BTreeMap<String, HostValue>>,
}

impl Namespace {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            attrs: RefCell::new(BTreeMap::new()),
        }
    }

    pub fn with(self, name: &str, value: impl Into<HostValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<HostValue> {
        self.attrs.borrow().get(name).cloned()
    }

    pub fn set(&self, name: &str, value: impl Into<HostValue>) {
        let previous = self.attrs.borrow_mut().insert(name.to_string(), value.into());
        // dropping a proxy may release a registry slot; do it outside the borrow
        drop(previous);
    }

    pub fn names(&self) -> Vec<String> {
        self.attrs.borrow().keys().cloned().collect()
    }
}

impl HostObject for Namespace {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn get_attr(&self, name: &str) -> anyhow::Result<Option<HostValue>> {
        Ok(self.get(name))
    }

    fn set_attr(&self, name: &str, value: HostValue) -> anyhow::Result<()> {
        self.set(name, value);
        Ok(())
    }
}

struct HostObjectCell {
    object: HostObjectRef,
    session: Weak<SessionInner>,
    _live: LiveHandle,
}

impl HostObjectCell {
    fn index(&self, key: Value) -> Result<MultiValue, BridgeError> {
        let name = attribute_name(&key)?;
        enter_host(&self.session, |session| {
            let value = self
                .object
                .get_attr(&name)
                .map_err(|err| host_failure(&name, err))?
                .ok_or_else(|| BridgeError::MissingAttribute {
                    type_name: self.object.type_name().to_string(),
                    name: name.clone(),
                })?;
            let value = match value {
                HostValue::Callable(method) => HostValue::Callable(method.bind(self.object.clone())),
                other => other,
            };
            Ok(MultiValue::from_vec(vec![marshal::to_guest(session, &value)?]))
        })
    }

    fn new_index(&self, key: Value, value: Value) -> Result<MultiValue, BridgeError> {
        let name = attribute_name(&key)?;
        enter_host(&self.session, |session| {
            let value = marshal::to_host(session, value)?;
            self.object
                .set_attr(&name, value)
                .map_err(|err| host_failure(&name, err))?;
            Ok(MultiValue::new())
        })
    }

    fn invoke(&self, args: MultiValue) -> Result<MultiValue, BridgeError> {
        enter_host(&self.session, |session| {
            call_host(session, self.object.type_name(), args, |args| self.object.call(args))
        })
    }
}

/// Attribute names are lua strings holding valid UTF-8.
fn attribute_name(key: &Value) -> Result<String, BridgeError> {
    match key {
        Value::String(name) => std::str::from_utf8(&name.as_bytes())
            .map(str::to_owned)
            .map_err(|_| MarshalError::NonUtf8AttributeName.into()),
        other => Err(MarshalError::AttributeNameType {
            type_name: other.type_name(),
        }
        .into()),
    }
}

impl UserData for HostObjectCell {
    fn add_fields<F: UserDataFields<Self>>(fields: &mut F) {
        fields.add_meta_field_with(MetaMethod::Index.name(), |lua| {
            metamethod::<Self, Value, _>(lua, |this, key| this.index(key))
        });
        fields.add_meta_field_with(MetaMethod::NewIndex.name(), |lua| {
            metamethod::<Self, (Value, Value), _>(lua, |this, (key, value)| {
                this.new_index(key, value)
            })
        });
        fields.add_meta_field_with(MetaMethod::Call.name(), |lua| {
            metamethod::<Self, MultiValue, _>(lua, |this, args| this.invoke(args))
        });
    }

    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| {
            Ok(format!("host object: {}", this.object.type_name()))
        });
    }
}

pub(crate) fn install(
    session: &SessionInner,
    object: HostObjectRef,
) -> Result<AnyUserData, BridgeError> {
    let cell = HostObjectCell {
        object,
        session: session.downgrade(),
        _live: session.track_host_handle(),
    };
    Ok(session.lua().create_userdata(cell)?)
}

pub(crate) fn unwrap(ud: &AnyUserData) -> Option<HostObjectRef> {
    ud.borrow::<HostObjectCell>().ok().map(|cell| cell.object.clone())
}
