//! Callable proxy for lua functions

use crate::error::BridgeError;
use crate::marshal;
use crate::reference::PersistentRef;
use crate::value::HostValue;
use mlua::{Function, MultiValue, Value};
use std::fmt;
use std::rc::Rc;

/// A lua function held by the host.
#[derive(Clone)]
pub struct LuaFunction {
    reference: Rc<PersistentRef>,
}

impl LuaFunction {
    pub(crate) fn new(reference: Rc<PersistentRef>) -> Self {
        Self { reference }
    }

    pub(crate) fn reference(&self) -> &PersistentRef {
        &self.reference
    }

    /// Call the function in protected mode.
    ///
    /// All arguments are marshaled before lua sees any of them; an unsupported
    /// argument fails the call without running guest code. Missing arguments
    /// read as `nil` inside lua and surplus ones are ignored by the callee.
    /// Every returned value comes back in order, possibly none.
    pub fn invoke<I>(&self, args: I) -> Result<Vec<HostValue>, BridgeError>
    where
        I: IntoIterator<Item = HostValue>,
    {
        let session = self.reference.session()?;
        let args: Vec<HostValue> = args.into_iter().collect();
        let args = marshal::to_guest_multi(&session, &args)?;
        let function: Function = self.reference.push(&session)?;

        let scope = session.enter()?;
        session.record_guest_call();
        let results = function
            .call::<MultiValue>(args)
            .map_err(|err| session.classify(err.into()))?;
        let results = marshal::to_host_multi(&session, results)?;
        scope.finish()?;
        Ok(results)
    }

    /// Invoke and keep only the first result, `Nil` when there is none.
    pub fn invoke1<I>(&self, args: I) -> Result<HostValue, BridgeError>
    where
        I: IntoIterator<Item = HostValue>,
    {
        Ok(self.invoke(args)?.into_iter().next().unwrap_or(HostValue::Nil))
    }

    /// Whether the owning session is still alive.
    pub fn session_alive(&self) -> bool {
        self.reference.is_attached()
    }

    /// Guest identity: both proxies refer to the same lua function.
    pub fn same_as(&self, other: &LuaFunction) -> bool {
        same_guest_value(&self.reference, &other.reference)
    }
}

impl fmt::Debug for LuaFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LuaFunction").field(&self.reference).finish()
    }
}

pub(crate) fn same_guest_value(a: &Rc<PersistentRef>, b: &Rc<PersistentRef>) -> bool {
    if Rc::ptr_eq(a, b) {
        return true;
    }
    let Ok(session) = a.session() else {
        return false;
    };
    match (a.push::<Value>(&session), b.push::<Value>(&session)) {
        (Ok(x), Ok(y)) => x.to_pointer() == y.to_pointer(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use crate::{BridgeError, HostFunction, HostValue, MarshalError, Session};
    use std::cell::Cell;
    use std::rc::Rc;

    fn session() -> Session {
        let session = Session::new().unwrap();
        session.open_libraries().unwrap();
        session
    }

    #[test]
    fn pair_pads_and_ignores_extra_arguments() {
        let session = session();
        session.eval("function pair(x, y) return x, y end").unwrap();
        let pair = session.get_global("pair").unwrap();
        let pair = pair.as_function().unwrap();

        assert_eq!(pair.invoke([5.into()]).unwrap(), vec![HostValue::Int(5), HostValue::Nil]);
        assert_eq!(
            pair.invoke([5.into(), 6.into()]).unwrap(),
            vec![HostValue::Int(5), HostValue::Int(6)]
        );
        assert_eq!(
            pair.invoke([5.into(), 6.into(), 8.into()]).unwrap(),
            vec![HostValue::Int(5), HostValue::Int(6)]
        );
    }

    #[test]
    fn zero_results_is_empty() {
        let session = session();
        let noop = session.eval("return function() end").unwrap().remove(0);
        assert!(noop.as_function().unwrap().invoke([]).unwrap().is_empty());
        assert!(noop.as_function().unwrap().invoke1([]).unwrap().is_nil());
    }

    #[test]
    fn guest_errors_are_reported_not_raised() {
        let session = session();
        let fail = session
            .eval("return function(msg) error('failed: ' .. msg) end")
            .unwrap()
            .remove(0);
        let err = fail.as_function().unwrap().invoke(["disk".into()]).unwrap_err();
        match err {
            BridgeError::Guest { message, .. } => assert!(message.contains("failed: disk")),
            other => panic!("unexpected error: {other:?}"),
        }
        // The session stays usable after a guest failure.
        assert_eq!(session.eval("return 1 + 1").unwrap(), vec![HostValue::Int(2)]);
    }

    #[test]
    fn unsupported_argument_fails_before_guest_runs() {
        let session = session();
        session.eval("calls = 0").unwrap();
        let counted = session
            .eval("return function(...) calls = calls + 1 end")
            .unwrap()
            .remove(0);

        let err = counted
            .as_function()
            .unwrap()
            .invoke([1.into(), HostValue::opaque(vec![1u8, 2, 3])])
            .unwrap_err();
        assert!(matches!(err, BridgeError::Marshal(MarshalError::UnsupportedHostType { .. })));
        assert_eq!(session.get_global("calls").unwrap(), HostValue::Int(0));
    }

    #[test]
    fn reentrant_calls_keep_depth_balanced() {
        let session = session();
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        session
            .register_function("apply", move |args| {
                counter.set(counter.get() + 1);
                let callback = args[0].as_function().cloned().ok_or_else(|| anyhow::anyhow!("expected function"))?;
                Ok(callback.invoke(args.into_iter().skip(1))?)
            })
            .unwrap();

        session
            .eval(
                r#"
                function countdown(n)
                    if n == 0 then return 'done' end
                    return apply(countdown, n - 1)
                end
                "#,
            )
            .unwrap();
        let countdown = session.get_global("countdown").unwrap();
        let result = countdown.as_function().unwrap().invoke([10.into()]).unwrap();

        assert_eq!(result, vec![HostValue::from("done")]);
        assert_eq!(calls.get(), 10);
        assert_eq!(session.stats().call_depth, 0);
    }

    #[test]
    fn runaway_recursion_hits_depth_limit() {
        let session = Session::with_config(crate::SessionConfig {
            max_call_depth: 8,
            ..Default::default()
        })
        .unwrap();
        let bounce = HostFunction::new("bounce", |args| {
            let callback = args[0].as_function().cloned().ok_or_else(|| anyhow::anyhow!("expected function"))?;
            Ok(callback.invoke([HostValue::Function(callback.clone())])?)
        });
        session.set_global("bounce", bounce.into()).unwrap();

        let looping = session
            .eval("return function(self) return bounce(self) end")
            .unwrap()
            .remove(0);
        let err = looping
            .as_function()
            .unwrap()
            .invoke([looping.clone()])
            .unwrap_err();
        assert!(err.to_string().contains("call depth limit of 8"), "{err}");
        assert_eq!(session.stats().call_depth, 0);
    }

    #[test]
    fn identity_survives_separate_acquisition() {
        let session = session();
        session.eval("function f() end").unwrap();
        let a = session.get_global("f").unwrap();
        let b = session.get_global("f").unwrap();
        assert_eq!(a, b);
        assert_eq!(session.stats().live_references, 2);
    }
}
