//! Host-side representation of values crossing the boundary

use crate::host::{HostFunction, HostObject};
use crate::marshal::I64_BOUND;
use crate::proxy::{LuaFunction, LuaTable};
use std::any::Any;
use std::fmt;
use std::rc::Rc;

/// Shared handle to a host object exposed to lua.
pub type HostObjectRef = Rc<dyn HostObject>;

/// A value on the host side of the bridge.
///
/// Scalars are copied across. Lua tables, functions and userdata arrive as
/// proxies that keep the guest value alive. Host functions and objects are
/// handed to lua by reference and come back as the same handle.
#[derive(Clone)]
pub enum HostValue {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Lua strings are byte strings; no encoding is assumed.
    Bytes(Vec<u8>),
    Function(LuaFunction),
    Table(LuaTable),
    Callable(HostFunction),
    Object(HostObjectRef),
    /// Host data with no lua representation. Passing it to lua fails.
    Opaque {
        type_name: &'static str,
        value: Rc<dyn Any>,
    },
}

impl HostValue {
    pub fn opaque<T: Any>(value: T) -> Self {
        HostValue::Opaque {
            type_name: std::any::type_name::<T>(),
            value: Rc::new(value),
        }
    }

    pub fn object(object: impl HostObject + 'static) -> Self {
        HostValue::Object(Rc::new(object))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            HostValue::Nil => "nil",
            HostValue::Bool(_) => "bool",
            HostValue::Int(_) => "int",
            HostValue::Float(_) => "float",
            HostValue::Bytes(_) => "bytes",
            HostValue::Function(_) => "lua function",
            HostValue::Table(_) => "lua table",
            HostValue::Callable(_) => "host function",
            HostValue::Object(_) => "host object",
            HostValue::Opaque { type_name, .. } => type_name,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, HostValue::Nil)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            HostValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            HostValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric value as a float; integers widen.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            HostValue::Int(i) => Some(*i as f64),
            HostValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            HostValue::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// The byte string as UTF-8, if it is valid.
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|bytes| std::str::from_utf8(bytes).ok())
    }

    pub fn as_function(&self) -> Option<&LuaFunction> {
        match self {
            HostValue::Function(function) => Some(function),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&LuaTable> {
        match self {
            HostValue::Table(table) => Some(table),
            _ => None,
        }
    }

    pub fn as_callable(&self) -> Option<&HostFunction> {
        match self {
            HostValue::Callable(function) => Some(function),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&HostObjectRef> {
        match self {
            HostValue::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn downcast_opaque<T: Any>(&self) -> Option<&T> {
        match self {
            HostValue::Opaque { value, .. } => value.downcast_ref(),
            _ => None,
        }
    }
}

impl PartialEq for HostValue {
    /// Numbers compare by value across `Int`/`Float` like lua does; proxies
    /// compare by guest identity; host handles by pointer.
    fn eq(&self, other: &Self) -> bool {
        use HostValue::*;
        match (self, other) {
            (Nil, Nil) => true,
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Float(a), Float(b)) => a == b,
            (Int(i), Float(f)) | (Float(f), Int(i)) => {
                f.fract() == 0.0 && (-I64_BOUND..I64_BOUND).contains(f) && *f as i64 == *i
            }
            (Bytes(a), Bytes(b)) => a == b,
            (Function(a), Function(b)) => a.same_as(b),
            (Table(a), Table(b)) => a.same_as(b),
            (Callable(a), Callable(b)) => a.ptr_eq(b),
            (Object(a), Object(b)) => Rc::ptr_eq(a, b),
            (Opaque { value: a, .. }, Opaque { value: b, .. }) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::Nil => write!(f, "Nil"),
            HostValue::Bool(b) => write!(f, "Bool({b})"),
            HostValue::Int(i) => write!(f, "Int({i})"),
            HostValue::Float(x) => write!(f, "Float({x})"),
            HostValue::Bytes(bytes) => write!(f, "Bytes({:?})", String::from_utf8_lossy(bytes)),
            HostValue::Function(function) => write!(f, "{function:?}"),
            HostValue::Table(table) => write!(f, "{table:?}"),
            HostValue::Callable(function) => write!(f, "{function:?}"),
            HostValue::Object(object) => write!(f, "Object({})", object.type_name()),
            HostValue::Opaque { type_name, .. } => write!(f, "Opaque({type_name})"),
        }
    }
}

impl fmt::Display for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::Nil => write!(f, "nil"),
            HostValue::Bool(b) => write!(f, "{b}"),
            HostValue::Int(i) => write!(f, "{i}"),
            HostValue::Float(x) => write!(f, "{x}"),
            HostValue::Bytes(bytes) => write!(f, "{}", String::from_utf8_lossy(bytes)),
            HostValue::Function(_) => write!(f, "<lua function>"),
            HostValue::Table(table) => write!(f, "<lua {}>", table.type_name()),
            HostValue::Callable(function) => write!(f, "<host function {}>", function.name()),
            HostValue::Object(object) => write!(f, "<host object {}>", object.type_name()),
            HostValue::Opaque { type_name, .. } => write!(f, "<opaque {type_name}>"),
        }
    }
}

impl From<()> for HostValue {
    fn from(_: ()) -> Self {
        HostValue::Nil
    }
}

impl From<bool> for HostValue {
    fn from(value: bool) -> Self {
        HostValue::Bool(value)
    }
}

impl From<i32> for HostValue {
    fn from(value: i32) -> Self {
        HostValue::Int(value.into())
    }
}

impl From<i64> for HostValue {
    fn from(value: i64) -> Self {
        HostValue::Int(value)
    }
}

impl From<f64> for HostValue {
    fn from(value: f64) -> Self {
        HostValue::Float(value)
    }
}

impl From<&str> for HostValue {
    fn from(value: &str) -> Self {
        HostValue::Bytes(value.as_bytes().to_vec())
    }
}

impl From<String> for HostValue {
    fn from(value: String) -> Self {
        HostValue::Bytes(value.into_bytes())
    }
}

impl From<Vec<u8>> for HostValue {
    fn from(value: Vec<u8>) -> Self {
        HostValue::Bytes(value)
    }
}

impl From<LuaFunction> for HostValue {
    fn from(value: LuaFunction) -> Self {
        HostValue::Function(value)
    }
}

impl From<LuaTable> for HostValue {
    fn from(value: LuaTable) -> Self {
        HostValue::Table(value)
    }
}

impl From<HostFunction> for HostValue {
    fn from(value: HostFunction) -> Self {
        HostValue::Callable(value)
    }
}

impl From<HostObjectRef> for HostValue {
    fn from(value: HostObjectRef) -> Self {
        HostValue::Object(value)
    }
}

impl<T: Into<HostValue>> From<Option<T>> for HostValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(HostValue::Nil, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integral_floats_equal_ints() {
        assert_eq!(HostValue::Int(2), HostValue::Float(2.0));
        assert_eq!(HostValue::Float(2.0), HostValue::Int(2));
        assert_ne!(HostValue::Int(2), HostValue::Float(2.5));
        assert_ne!(HostValue::Int(0), HostValue::Nil);
    }

    #[test]
    fn int_float_equality_is_exact_at_range_edges() {
        assert_ne!(HostValue::Int(i64::MAX), HostValue::Float(9.223372036854775808e18));
        assert_ne!(HostValue::Int(i64::MAX), HostValue::Float(9.223372036854774784e18));
        assert_eq!(HostValue::Int(i64::MIN), HostValue::Float(-9.223372036854775808e18));
        assert_ne!(HostValue::Int(i64::MAX), HostValue::Float(f64::INFINITY));
        assert_ne!(HostValue::Int(0), HostValue::Float(f64::NAN));
    }

    #[test]
    fn string_accessors() {
        let value = HostValue::from("hello");
        assert_eq!(value.as_str(), Some("hello"));
        assert_eq!(value.as_bytes(), Some(&b"hello"[..]));
        assert_eq!(HostValue::Bytes(vec![0xff, 0xfe]).as_str(), None);
    }

    #[test]
    fn option_maps_none_to_nil() {
        assert!(HostValue::from(None::<i64>).is_nil());
        assert_eq!(HostValue::from(Some(7)), HostValue::Int(7));
    }

    #[test]
    fn opaque_values_downcast() {
        #[derive(Debug, PartialEq)]
        struct Token(u32);

        let value = HostValue::opaque(Token(9));
        assert_eq!(value.downcast_opaque::<Token>(), Some(&Token(9)));
        assert!(value.type_name().ends_with("Token"));
        assert_eq!(value.clone(), value);
    }

    #[test]
    fn display_is_script_friendly() {
        assert_eq!(HostValue::Nil.to_string(), "nil");
        assert_eq!(HostValue::Int(-3).to_string(), "-3");
        assert_eq!(HostValue::from("abc").to_string(), "abc");
    }
}
