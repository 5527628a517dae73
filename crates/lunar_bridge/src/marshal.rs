//! Value conversion between lua and the host
//!
//! Conversions work on owned mlua values rather than absolute stack slots, so
//! they stay correct at any nesting depth of guest/host calls. A failed
//! conversion drops whatever it already acquired, releasing the registry slots.

use crate::error::{BridgeError, MarshalError};
use crate::host;
use crate::proxy::{LuaFunction, LuaTable};
use crate::reference::PersistentRef;
use crate::session::SessionInner;
use crate::value::HostValue;
use mlua::{AnyUserData, MultiValue, Value};

// 2^63 as f64; the largest float below it is the top of the i64 range.
pub(crate) const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

/// Map one lua value to its nearest host representation.
pub(crate) fn to_host(session: &SessionInner, value: Value) -> Result<HostValue, BridgeError> {
    Ok(match value {
        Value::Nil => HostValue::Nil,
        Value::Boolean(b) => HostValue::Bool(b),
        Value::Integer(i) => HostValue::Int(i),
        Value::Number(n) => number_to_host(n),
        Value::String(s) => HostValue::Bytes(s.as_bytes().to_vec()),
        Value::Function(f) => {
            HostValue::Function(LuaFunction::new(PersistentRef::acquire(session, Value::Function(f))?))
        }
        Value::Table(t) => {
            HostValue::Table(LuaTable::new(PersistentRef::acquire(session, Value::Table(t))?))
        }
        Value::UserData(ud) => userdata_to_host(session, ud)?,
        // error objects raised by host callbacks and caught by `pcall`
        Value::Error(err) => HostValue::Bytes(err.to_string().into_bytes()),
        other => {
            return Err(MarshalError::UnsupportedGuestType {
                type_name: other.type_name(),
            }
            .into())
        }
    })
}

/// Map one host value to exactly one lua value.
pub(crate) fn to_guest(session: &SessionInner, value: &HostValue) -> Result<Value, BridgeError> {
    Ok(match value {
        HostValue::Nil => Value::Nil,
        HostValue::Bool(b) => Value::Boolean(*b),
        HostValue::Int(i) => Value::Integer(*i),
        HostValue::Float(f) => Value::Number(*f),
        HostValue::Bytes(bytes) => Value::String(session.lua().create_string(bytes)?),
        HostValue::Function(function) => function.reference().push::<Value>(session)?,
        HostValue::Table(table) => table.reference().push::<Value>(session)?,
        HostValue::Callable(function) => {
            Value::UserData(host::function::install(session, function.clone())?)
        }
        HostValue::Object(object) => Value::UserData(host::object::install(session, object.clone())?),
        HostValue::Opaque { type_name, .. } => {
            return Err(MarshalError::UnsupportedHostType { type_name }.into())
        }
    })
}

pub(crate) fn to_host_multi(
    session: &SessionInner,
    values: MultiValue,
) -> Result<Vec<HostValue>, BridgeError> {
    values.into_iter().map(|value| to_host(session, value)).collect()
}

pub(crate) fn to_guest_multi(
    session: &SessionInner,
    values: &[HostValue],
) -> Result<MultiValue, BridgeError> {
    let values = values
        .iter()
        .map(|value| to_guest(session, value))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(MultiValue::from_vec(values))
}

/// Integral floats inside the i64 range become `Int`.
fn number_to_host(n: f64) -> HostValue {
    if n.fract() == 0.0 && (-I64_BOUND..I64_BOUND).contains(&n) {
        HostValue::Int(n as i64)
    } else {
        HostValue::Float(n)
    }
}

/// Host handles unwrap to themselves; any other userdata becomes a proxy.
fn userdata_to_host(session: &SessionInner, ud: AnyUserData) -> Result<HostValue, BridgeError> {
    if let Some(function) = host::function::unwrap(&ud) {
        return Ok(HostValue::Callable(function));
    }
    if let Some(object) = host::object::unwrap(&ud) {
        return Ok(HostValue::Object(object));
    }
    Ok(HostValue::Table(LuaTable::new(PersistentRef::acquire(
        session,
        Value::UserData(ud),
    )?)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HostFunction, Namespace, Session};

    fn round_trip(session: &Session, value: HostValue) -> HostValue {
        let inner = session.inner();
        let guest = to_guest(inner, &value).unwrap();
        to_host(inner, guest).unwrap()
    }

    #[test]
    fn scalars_round_trip() {
        let session = Session::new().unwrap();
        for value in [
            HostValue::Nil,
            HostValue::Bool(true),
            HostValue::Bool(false),
            HostValue::Int(0),
            HostValue::Int(i64::MIN),
            HostValue::Int(i64::MAX),
            HostValue::Float(0.5),
            HostValue::Float(-1e300),
            HostValue::from("plain"),
            HostValue::Bytes(vec![0, 159, 146, 150, 0]),
        ] {
            assert_eq!(round_trip(&session, value.clone()), value);
        }
        assert_eq!(session.stats().live_references, 0);
    }

    #[test]
    fn guest_scalars_round_trip() {
        let session = Session::new().unwrap();
        let values = session
            .eval("return nil, true, 42, 0.25, 'text', 3.0")
            .unwrap();
        assert_eq!(
            values,
            vec![
                HostValue::Nil,
                HostValue::Bool(true),
                HostValue::Int(42),
                HostValue::Float(0.25),
                HostValue::from("text"),
                HostValue::Int(3),
            ]
        );
        assert!(matches!(values[5], HostValue::Int(3)));

        let inner = session.inner();
        let echoed = session.eval("return 0.25, 'text'").unwrap();
        let guest = to_guest_multi(inner, &echoed).unwrap();
        assert_eq!(to_host_multi(inner, guest).unwrap(), echoed);
    }

    #[test]
    fn floats_outside_integer_range_stay_floats() {
        assert!(matches!(number_to_host(1e19), HostValue::Float(_)));
        assert!(matches!(number_to_host(-1e19), HostValue::Float(_)));
        assert!(matches!(number_to_host(f64::NAN), HostValue::Float(_)));
        assert!(matches!(number_to_host(f64::INFINITY), HostValue::Float(_)));
        assert!(matches!(number_to_host(-9.223372036854775808e18), HostValue::Int(i64::MIN)));
        assert!(matches!(number_to_host(7.0), HostValue::Int(7)));
    }

    #[test]
    fn guest_threads_are_unsupported() {
        let session = Session::new().unwrap();
        session.open_libraries().unwrap();
        let err = session
            .eval("return coroutine.create(function() end)")
            .unwrap_err();
        assert!(matches!(
            err,
            BridgeError::Marshal(MarshalError::UnsupportedGuestType { type_name: "thread" })
        ));
    }

    #[test]
    fn failed_multi_conversion_releases_partial_work() {
        let session = Session::new().unwrap();
        session.open_libraries().unwrap();
        let err = session
            .eval("return {}, function() end, coroutine.running()")
            .unwrap_err();
        assert!(matches!(err, BridgeError::Marshal(_)));
        assert_eq!(session.stats().live_references, 0);
        assert_eq!(session.stats().call_depth, 0);
    }

    #[test]
    fn host_handles_come_back_unchanged() {
        let session = Session::new().unwrap();
        let function = HostValue::Callable(HostFunction::new("noop", |_| Ok(vec![])));
        let object = HostValue::object(Namespace::new("Thing"));

        assert_eq!(round_trip(&session, function.clone()), function);
        assert_eq!(round_trip(&session, object.clone()), object);
    }

    #[test]
    fn proxies_are_bound_to_their_session() {
        let first = Session::new().unwrap();
        let second = Session::new().unwrap();
        let table = first.eval("return {}").unwrap().remove(0);

        let err = second.set_global("stolen", table).unwrap_err();
        assert!(matches!(err, BridgeError::Marshal(MarshalError::ForeignReference)));
    }

    #[test]
    fn proxy_from_torn_down_session_is_dangling_elsewhere() {
        let first = Session::new().unwrap();
        let second = Session::new().unwrap();
        let table = first.eval("return {}").unwrap().remove(0);
        drop(first);

        let err = second.set_global("orphan", table.clone()).unwrap_err();
        assert!(matches!(err, BridgeError::DanglingReference), "{err:?}");
        assert!(err.is_fatal());

        let receiver = second.eval("return {}").unwrap().remove(0);
        let err = receiver.as_table().unwrap().set_item("orphan", table).unwrap_err();
        assert!(matches!(err, BridgeError::DanglingReference), "{err:?}");
        assert_eq!(second.stats().call_depth, 0);
    }
}
