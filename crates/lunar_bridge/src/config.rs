//! Session configuration

use crate::error::BridgeError;
use mlua::StdLib;
use serde::{Deserialize, Serialize};

/// Settings applied when a [`Session`](crate::Session) is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Library groups loaded by `Session::open_libraries`.
    pub libraries: LibrarySet,
    /// Open `libraries` immediately instead of waiting for an explicit call.
    pub open_libraries: bool,
    /// Chunk name used by `Session::eval` in error messages.
    pub chunk_name: String,
    /// Upper bound on guest heap size in bytes.
    pub memory_limit: Option<usize>,
    /// Maximum nesting of host/guest boundary crossings.
    pub max_call_depth: usize,
}

impl SessionConfig {
    pub fn from_json(source: &str) -> Result<Self, BridgeError> {
        Ok(serde_json::from_str(source)?)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            libraries: LibrarySet::default(),
            open_libraries: false,
            chunk_name: "=eval".to_string(),
            memory_limit: None,
            max_call_depth: 200,
        }
    }
}

/// Which standard library groups to load. The base library is always present.
/// `debug` cannot be loaded into a safe session and is not listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibrarySet {
    pub coroutine: bool,
    pub table: bool,
    pub io: bool,
    pub os: bool,
    pub string: bool,
    pub utf8: bool,
    pub math: bool,
    pub package: bool,
}

impl LibrarySet {
    pub fn all() -> Self {
        Self {
            coroutine: true,
            table: true,
            io: true,
            os: true,
            string: true,
            utf8: true,
            math: true,
            package: true,
        }
    }

    pub fn none() -> Self {
        Self {
            coroutine: false,
            table: false,
            io: false,
            os: false,
            string: false,
            utf8: false,
            math: false,
            package: false,
        }
    }

    pub(crate) fn to_std_lib(self) -> StdLib {
        let groups = [
            (self.coroutine, StdLib::COROUTINE),
            (self.table, StdLib::TABLE),
            (self.io, StdLib::IO),
            (self.os, StdLib::OS),
            (self.string, StdLib::STRING),
            (self.utf8, StdLib::UTF8),
            (self.math, StdLib::MATH),
            (self.package, StdLib::PACKAGE),
        ];
        groups
            .into_iter()
            .filter(|(enabled, _)| *enabled)
            .fold(StdLib::NONE, |libs, (_, lib)| libs | lib)
    }

    /// Names of the enabled groups, for logging.
    pub fn names(self) -> Vec<&'static str> {
        [
            (self.coroutine, "coroutine"),
            (self.table, "table"),
            (self.io, "io"),
            (self.os, "os"),
            (self.string, "string"),
            (self.utf8, "utf8"),
            (self.math, "math"),
            (self.package, "package"),
        ]
        .into_iter()
        .filter_map(|(enabled, name)| enabled.then_some(name))
        .collect()
    }
}

impl Default for LibrarySet {
    fn default() -> Self {
        Self::all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config =
            SessionConfig::from_json(r#"{ "libraries": { "io": false, "os": false }, "max_call_depth": 16 }"#)
                .unwrap();
        assert_eq!(config.max_call_depth, 16);
        assert_eq!(config.chunk_name, "=eval");
        assert!(!config.libraries.io);
        assert!(config.libraries.string);
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let err = SessionConfig::from_json("{ nope").unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));
    }

    #[test]
    fn library_names_follow_flags() {
        let mut set = LibrarySet::none();
        set.math = true;
        set.string = true;
        assert_eq!(set.names(), vec!["string", "math"]);
        assert!(LibrarySet::none().names().is_empty());
    }
}
