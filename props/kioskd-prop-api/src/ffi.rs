/*
 *  kioskd prop plugin API - FFI types
 *
 *  kioskd - the show must go on
 *  (c) 2020-26 Stuart Hunter
 *
 *  C ABI types for the prop plugin interface
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

//! FFI types for the kioskd prop plugin system
//!
//! All types use `#[repr(C)]` so the host and plugins agree on layout
//! regardless of which compiler built them.

use std::ffi::{c_char, c_void};
use bitflags::bitflags;

/// Plugin ABI major version. Plugins exporting `kiosk_prop_abi_version`
/// must report exactly this value.
pub const KIOSK_PROP_ABI_VERSION: u32 = 1;

/// Maximum length for error messages (including the terminating NUL)
pub const KIOSK_ERROR_MESSAGE_SIZE: usize = 256;

pub const SYM_INIT: &str = "kiosk_prop_init";
pub const SYM_SHUTDOWN: &str = "kiosk_prop_shutdown";
pub const SYM_TYPE_NAME: &str = "kiosk_prop_type_name";
pub const SYM_INSTANCE_INIT: &str = "kiosk_prop_instance_init";
pub const SYM_INSTANCE_UPDATE: &str = "kiosk_prop_instance_update";
pub const SYM_INSTANCE_RENDER: &str = "kiosk_prop_instance_render";
pub const SYM_INSTANCE_DESTROY: &str = "kiosk_prop_instance_destroy";

/// Optional: a plugin without it is assumed to speak the current ABI.
pub const SYM_ABI_VERSION: &str = "kiosk_prop_abi_version";

/// Every symbol a plugin must export to be accepted
pub const REQUIRED_SYMBOLS: [&str; 7] = [
    SYM_INIT,
    SYM_SHUTDOWN,
    SYM_TYPE_NAME,
    SYM_INSTANCE_INIT,
    SYM_INSTANCE_UPDATE,
    SYM_INSTANCE_RENDER,
    SYM_INSTANCE_DESTROY,
];

/// Status codes returned by plugin functions
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KioskStatus {
    /// Operation completed successfully
    Ok = 0,

    /// The plugin could not do what was asked
    Failed = 1,

    /// Bad argument, e.g. a payload that is not a JSON object
    InvalidArgument = 2,

    /// Null pointer passed where non-null expected
    NullPointer = 3,

    /// Panic occurred in plugin code
    Panic = 4,
}

/// Error information structure
#[repr(C)]
pub struct KioskError {
    /// Error code
    pub code: KioskStatus,

    /// Human-readable error message (null-terminated)
    pub message: [c_char; KIOSK_ERROR_MESSAGE_SIZE],
}

impl KioskError {
    /// Create a new error with code and message
    pub fn new(code: KioskStatus, message: &str) -> Self {
        let mut error = Self {
            code,
            message: [0; KIOSK_ERROR_MESSAGE_SIZE],
        };

        let bytes = message.as_bytes();
        let len = bytes.len().min(KIOSK_ERROR_MESSAGE_SIZE - 1);

        for (i, &byte) in bytes.iter().take(len).enumerate() {
            error.message[i] = byte as c_char;
        }

        error
    }

    /// Create a success error (no error)
    pub fn success() -> Self {
        Self::new(KioskStatus::Ok, "")
    }

    /// Extract error message as Rust string
    pub fn message_str(&self) -> String {
        let len = self.message.iter()
            .position(|&c| c == 0)
            .unwrap_or(KIOSK_ERROR_MESSAGE_SIZE);

        let bytes: Vec<u8> = self.message[..len]
            .iter()
            .map(|&c| c as u8)
            .collect();

        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Default for KioskError {
    fn default() -> Self {
        Self::success()
    }
}

/// Read-only view of a prop handed to every instance call
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct KioskPropInfo {
    /// Prop name (null-terminated UTF-8), unique within its type
    pub name: *const c_char,
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

/// The host render target: premultiplied RGBA8888, row-major
#[repr(C)]
#[derive(Debug)]
pub struct KioskSurface {
    pub pixels: *mut u8,
    pub width: u32,
    pub height: u32,
    /// Bytes per row
    pub stride: u32,
}

bitflags! {
    /// Geometry fields whose value changed in an update
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PropChanged: u32 {
        const X = 1;
        const Y = 2;
        const W = 4;
        const H = 8;
    }
}

impl PropChanged {
    /// True when either dimension changed, the usual trigger to re-rasterise
    pub fn resized(self) -> bool {
        self.intersects(PropChanged::W | PropChanged::H)
    }

    /// Flag names, lower case, in X, Y, W, H order
    pub fn field_names(self) -> Vec<&'static str> {
        self.iter_names()
            .map(|(name, _)| match name {
                "X" => "x",
                "Y" => "y",
                "W" => "w",
                _ => "h",
            })
            .collect()
    }
}

pub type InitFn = extern "C" fn(error: *mut KioskError) -> KioskStatus;

pub type ShutdownFn = extern "C" fn();

pub type TypeNameFn = extern "C" fn() -> *const c_char;

pub type InstanceInitFn = extern "C" fn(
    prop: *const KioskPropInfo,
    data: *mut *mut c_void,
    error: *mut KioskError
) -> KioskStatus;

pub type InstanceUpdateFn = extern "C" fn(
    prop: *const KioskPropInfo,
    data: *mut c_void,
    payload: *const u8,
    payload_len: usize,
    surface: *mut KioskSurface,
    changed: u32,
    error: *mut KioskError
) -> KioskStatus;

pub type InstanceRenderFn = extern "C" fn(
    prop: *const KioskPropInfo,
    data: *mut c_void,
    surface: *mut KioskSurface,
    error: *mut KioskError
) -> KioskStatus;

pub type InstanceDestroyFn = extern "C" fn(
    prop: *const KioskPropInfo,
    data: *mut c_void
);

pub type AbiVersionFn = extern "C" fn() -> u32;
