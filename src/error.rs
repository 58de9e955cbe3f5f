/*
 *  error.rs
 *
 *  kioskd - the show must go on
 *  (c) 2020-26 Stuart Hunter
 *
 *  Host error taxonomy and the control-plane codes it maps to
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use std::path::PathBuf;
use thiserror::Error;

use crate::props::PropError;
use crate::surface::SurfaceError;

/// Control-plane error codes, stable across releases
pub mod codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const NOT_AN_OBJECT: i64 = -43;
    pub const MISSING_NAME: i64 = -44;
    pub const MISSING_TYPE: i64 = -45;
    pub const TYPE_NOT_FOUND: i64 = -46;
    pub const BAD_GEOMETRY: i64 = -47;
    pub const INSTANCE_NOT_FOUND: i64 = -48;
    pub const INSTANCE_INIT_FAILED: i64 = -49;
    pub const UPDATE_FAILED: i64 = -50;
    pub const HOST_ERROR: i64 = -32000;
}

/// What is wrong with a control request's parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RequestFault {
    #[error("params is not an object")]
    NotAnObject,

    #[error("missing or non-string 'name'")]
    MissingName,

    #[error("missing or non-string 'type'")]
    MissingType,

    #[error("geometry field '{0}' is not a number")]
    BadGeometry(&'static str),
}

impl RequestFault {
    pub fn code(&self) -> i64 {
        match self {
            RequestFault::NotAnObject => codes::NOT_AN_OBJECT,
            RequestFault::MissingName => codes::MISSING_NAME,
            RequestFault::MissingType => codes::MISSING_TYPE,
            RequestFault::BadGeometry(_) => codes::BAD_GEOMETRY,
        }
    }
}

/// Everything the host can fail at
#[derive(Debug, Error)]
pub enum KioskError {
    #[error("plugin '{name}' not found (tried {tried:?})")]
    PluginNotFound { name: String, tried: Vec<PathBuf> },

    #[error("plugin {} is missing symbols: {}", path.display(), missing.join(", "))]
    PluginIncomplete { path: PathBuf, missing: Vec<&'static str> },

    #[error("plugin {} speaks ABI {found}, host speaks {expected}", path.display())]
    PluginAbiMismatch { path: PathBuf, found: u32, expected: u32 },

    #[error("plugin {} reported no usable type name", path.display())]
    InvalidTypeName { path: PathBuf },

    #[error("prop type '{type_name}' failed to initialise: {source}")]
    PluginInitFailed {
        type_name: String,
        #[source]
        source: PropError,
    },

    #[error("prop type '{0}' is already registered")]
    DuplicateType(String),

    #[error("prop type '{0}' not found")]
    TypeNotFound(String),

    #[error("prop '{name}' of type '{type_name}' not found")]
    InstanceNotFound { type_name: String, name: String },

    #[error("prop '{name}' of type '{type_name}' failed to initialise: {source}")]
    InstanceInitFailed {
        type_name: String,
        name: String,
        #[source]
        source: PropError,
    },

    #[error("prop '{name}' of type '{type_name}' rejected the update: {source}")]
    UpdateFailed {
        type_name: String,
        name: String,
        #[source]
        source: PropError,
    },

    #[error("malformed request: {0}")]
    MalformedRequest(#[from] RequestFault),

    #[error("surface error: {0}")]
    Surface(#[from] SurfaceError),

    #[error("host is shutting down")]
    ShuttingDown,
}

impl KioskError {
    /// Code reported to control-plane callers
    pub fn code(&self) -> i64 {
        match self {
            KioskError::MalformedRequest(fault) => fault.code(),
            KioskError::TypeNotFound(_) => codes::TYPE_NOT_FOUND,
            KioskError::InstanceNotFound { .. } => codes::INSTANCE_NOT_FOUND,
            KioskError::InstanceInitFailed { .. } => codes::INSTANCE_INIT_FAILED,
            KioskError::UpdateFailed { .. } => codes::UPDATE_FAILED,
            _ => codes::HOST_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(KioskError::TypeNotFound("text".into()).code(), -46);
        assert_eq!(
            KioskError::InstanceNotFound { type_name: "text".into(), name: "clock".into() }.code(),
            -48
        );
        assert_eq!(KioskError::MalformedRequest(RequestFault::MissingName).code(), -44);
        assert_eq!(KioskError::MalformedRequest(RequestFault::BadGeometry("x")).code(), -47);
        assert_eq!(KioskError::DuplicateType("text".into()).code(), -32000);
    }

    #[test]
    fn test_incomplete_message_lists_symbols() {
        let err = KioskError::PluginIncomplete {
            path: PathBuf::from("./libprop_text.so"),
            missing: vec!["kiosk_prop_init", "kiosk_prop_shutdown"],
        };
        let text = err.to_string();
        assert!(text.contains("kiosk_prop_init, kiosk_prop_shutdown"));
    }
}
