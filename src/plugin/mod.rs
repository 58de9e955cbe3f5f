/*
 *  plugin/mod.rs
 *
 *  kioskd - the show must go on
 *  (c) 2020-26 Stuart Hunter
 *
 *  Dynamic plugin system for prop types
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

//! Dynamic plugin system for kioskd prop types
//!
//! Prop types ship as shared libraries loaded at runtime, so a new kind of
//! prop needs no rebuild of the host.
//!
//! ## Architecture
//!
//! 1. **FFI Layer** (`ffi.rs`) - symbol resolution into a checked vtable
//! 2. **Loader** (`loader.rs`) - finds and opens `.so` files
//! 3. **Adapter** (`adapter.rs`) - wraps a vtable as a [`crate::props::PropType`]
//!
//! ## Plugin Discovery
//!
//! For logical name `prop_text` the file is `libprop_text.so`, tried in:
//!
//! 1. the working directory
//! 2. each directory of `$PROP_PLUGIN_PATH` (colon separated), in order

pub mod adapter;
pub mod ffi;
pub mod loader;

pub use adapter::PluginPropType;
pub use ffi::{PropVTable, RawVTable};
pub use loader::{LoadedPlugin, PluginLoader, PLUGIN_PATH_ENV};
