/*
 *  kioskd prop plugin API
 *
 *  kioskd - the show must go on
 *  (c) 2020-26 Stuart Hunter
 *
 *  Shared C ABI between the kioskd host and its prop plugins
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

//! # kioskd prop plugin API
//!
//! A prop type is a shared library exporting seven C functions, looked up
//! by fixed symbol name when the host loads it:
//!
//! | Symbol | Called |
//! |---|---|
//! | `kiosk_prop_init` | once, after the library is opened |
//! | `kiosk_prop_shutdown` | once, when the host tears the type down |
//! | `kiosk_prop_type_name` | to learn the type name the host registers |
//! | `kiosk_prop_instance_init` | when a prop of this type is first named |
//! | `kiosk_prop_instance_update` | on every control-plane update |
//! | `kiosk_prop_instance_render` | once per render tick |
//! | `kiosk_prop_instance_destroy` | on explicit destroy or shutdown |
//!
//! The [`ffi`] module holds the `#[repr(C)]` types both sides agree on.
//! The [`plugin`] module is for plugin authors: implement [`PropPlugin`]
//! and call [`export_prop_plugin!`] to get all seven symbols generated.
//!
//! ```ignore
//! struct Clock { text: String }
//!
//! impl PropPlugin for Clock {
//!     const TYPE_NAME: &'static CStr = c"clock";
//!     fn create(_prop: &PropInfo<'_>) -> Result<Self, String> { ... }
//!     fn update(&mut self, ...) -> Result<(), String> { ... }
//!     fn render(&mut self, ...) -> Result<(), String> { ... }
//! }
//!
//! kioskd_prop_api::export_prop_plugin!(Clock);
//! ```

pub mod ffi;
pub mod plugin;

pub use ffi::{
    KioskError,
    KioskPropInfo,
    KioskStatus,
    KioskSurface,
    PropChanged,
    KIOSK_PROP_ABI_VERSION,
};

pub use plugin::{Payload, PropInfo, PropPlugin, SurfaceMut};
