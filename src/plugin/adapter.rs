/*
 *  plugin/adapter.rs
 *
 *  kioskd - the show must go on
 *  (c) 2020-26 Stuart Hunter
 *
 *  Plugin adapter - wraps C ABI prop modules as PropType trait objects
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

use std::ffi::{c_void, CStr, CString};
use std::panic::{self, AssertUnwindSafe};
use log::{debug, error};

use kioskd_prop_api::{Payload, PropChanged};

use crate::error::KioskError;
use crate::props::guard::panic_message;
use crate::props::{PropData, PropError, PropType, PropView};
use crate::surface::Surface;
use super::ffi::{KioskError as FfiError, KioskPropInfo, KioskStatus};
use super::loader::LoadedPlugin;

/// Instance state as the host keeps it for a plugin prop
struct PluginData {
    /// The plugin's own pointer; may be null if it keeps no state
    ptr: *mut c_void,

    /// Backing store for `KioskPropInfo::name`
    name: CString,
}

/// A loaded module adapted to [`PropType`]
pub struct PluginPropType {
    plugin: LoadedPlugin,

    /// Reported once at load; the registry keys on it
    type_name: String,
}

impl PluginPropType {
    /// Ask the module for its type name and wrap it.
    ///
    /// A null, empty or non-UTF-8 name rejects the module.
    pub fn new(plugin: LoadedPlugin) -> Result<Self, KioskError> {
        let type_name_fn = plugin.vtable().type_name;

        let (ptr, panic_error) = catch_ffi_call(|| type_name_fn(), std::ptr::null());
        if let Some(e) = panic_error {
            error!("{}: {}", plugin.path().display(), e);
        }

        let type_name = if ptr.is_null() {
            None
        } else {
            unsafe { CStr::from_ptr(ptr) }.to_str().ok().map(str::to_string)
        };

        match type_name {
            Some(type_name) if !type_name.is_empty() => {
                debug!("{} provides prop type '{}'", plugin.path().display(), type_name);
                Ok(Self { plugin, type_name })
            }
            _ => Err(KioskError::InvalidTypeName {
                path: plugin.path().to_path_buf(),
            }),
        }
    }

    pub fn plugin(&self) -> &LoadedPlugin {
        &self.plugin
    }
}

fn prop_info(data: &PluginData, prop: &PropView<'_>) -> KioskPropInfo {
    KioskPropInfo {
        name: data.name.as_ptr(),
        x: prop.geometry.x,
        y: prop.geometry.y,
        w: prop.geometry.w,
        h: prop.geometry.h,
    }
}

fn plugin_data(data: &mut PropData) -> Result<&mut PluginData, PropError> {
    data.downcast_mut::<PluginData>()
        .ok_or_else(|| PropError::Failed("instance state does not belong to this type".to_string()))
}

/// Turn a status and its error record into a result
fn check(status: KioskStatus, error: &FfiError, panic_error: Option<PropError>) -> Result<(), PropError> {
    if let Some(e) = panic_error {
        return Err(e);
    }

    match status {
        KioskStatus::Ok => Ok(()),
        KioskStatus::Panic => Err(PropError::Panic(error.message_str())),
        other => {
            let message = error.message_str();
            if message.is_empty() {
                Err(PropError::Failed(format!("{:?}", other)))
            } else {
                Err(PropError::Failed(message))
            }
        }
    }
}

impl PropType for PluginPropType {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn init(&self) -> Result<(), PropError> {
        let vtable = self.plugin.vtable();
        let mut error = FfiError::default();

        let (status, panic_error) = catch_ffi_call(|| (vtable.init)(&mut error), KioskStatus::Panic);
        check(status, &error, panic_error)
    }

    fn shutdown(&self) {
        let vtable = self.plugin.vtable();
        let (_, panic_error) = catch_ffi_call(|| (vtable.shutdown)(), ());
        if let Some(e) = panic_error {
            error!("'{}' shutdown: {}", self.type_name, e);
        }
    }

    fn instance_init(&self, prop: PropView<'_>) -> Result<PropData, PropError> {
        let vtable = self.plugin.vtable();

        let name = CString::new(prop.name)
            .map_err(|_| PropError::Failed("prop name contains a NUL byte".to_string()))?;
        let mut data = PluginData {
            ptr: std::ptr::null_mut(),
            name,
        };

        let info = prop_info(&data, &prop);
        let mut error = FfiError::default();
        let (status, panic_error) = catch_ffi_call(
            || (vtable.instance_init)(&info, &mut data.ptr, &mut error),
            KioskStatus::Panic,
        );
        check(status, &error, panic_error)?;

        Ok(Box::new(data))
    }

    fn instance_update(
        &self,
        prop: PropView<'_>,
        data: &mut PropData,
        payload: &Payload,
        surface: &mut Surface,
        changed: PropChanged,
    ) -> Result<(), PropError> {
        let vtable = self.plugin.vtable();
        let data = plugin_data(data)?;

        let bytes = serde_json::to_vec(payload)
            .map_err(|e| PropError::Failed(format!("payload encode: {}", e)))?;

        let info = prop_info(data, &prop);
        let mut target = surface.as_ffi();
        let mut error = FfiError::default();

        let (status, panic_error) = catch_ffi_call(
            || {
                (vtable.instance_update)(
                    &info,
                    data.ptr,
                    bytes.as_ptr(),
                    bytes.len(),
                    &mut target,
                    changed.bits(),
                    &mut error,
                )
            },
            KioskStatus::Panic,
        );
        check(status, &error, panic_error)
    }

    fn instance_render(
        &self,
        prop: PropView<'_>,
        data: &mut PropData,
        surface: &mut Surface,
    ) -> Result<(), PropError> {
        let vtable = self.plugin.vtable();
        let data = plugin_data(data)?;

        let info = prop_info(data, &prop);
        let mut target = surface.as_ffi();
        let mut error = FfiError::default();

        let (status, panic_error) = catch_ffi_call(
            || (vtable.instance_render)(&info, data.ptr, &mut target, &mut error),
            KioskStatus::Panic,
        );
        check(status, &error, panic_error)
    }

    fn instance_destroy(&self, prop: PropView<'_>, mut data: PropData) {
        let vtable = self.plugin.vtable();
        let Ok(data) = plugin_data(&mut data) else {
            error!("'{}': cannot destroy foreign instance state for '{}'", self.type_name, prop.name);
            return;
        };

        let info = prop_info(data, &prop);
        let (_, panic_error) = catch_ffi_call(|| (vtable.instance_destroy)(&info, data.ptr), ());
        if let Some(e) = panic_error {
            error!("'{}' destroy of '{}': {}", self.type_name, prop.name, e);
        }
        data.ptr = std::ptr::null_mut();
    }
}

/// Wrap an FFI call with panic safety
///
/// Catches panics raised on the host side of the call and returns
/// `on_panic` with the panic as an error.
fn catch_ffi_call<T, F>(f: F, on_panic: T) -> (T, Option<PropError>)
where
    F: FnOnce() -> T,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => (value, None),
        Err(panic_info) => {
            let message = panic_message(panic_info);
            error!("Caught panic in plugin FFI call: {}", message);
            (on_panic, Some(PropError::Panic(message)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catch_ffi_call_success() {
        let (result, panic_error) = catch_ffi_call(|| KioskStatus::Ok, KioskStatus::Panic);
        assert_eq!(result, KioskStatus::Ok);
        assert!(panic_error.is_none());
    }

    #[test]
    fn test_catch_ffi_call_panic() {
        let (result, panic_error) = catch_ffi_call(|| -> KioskStatus { panic!("Test panic") }, KioskStatus::Panic);
        assert_eq!(result, KioskStatus::Panic);
        assert_eq!(panic_error, Some(PropError::Panic("Test panic".into())));
    }

    #[test]
    fn test_check_maps_status() {
        let ok = FfiError::default();
        assert!(check(KioskStatus::Ok, &ok, None).is_ok());

        let failed = FfiError::new(KioskStatus::Failed, "no such font");
        assert_eq!(
            check(KioskStatus::Failed, &failed, None),
            Err(PropError::Failed("no such font".into()))
        );

        let blank = FfiError::default();
        assert_eq!(
            check(KioskStatus::NullPointer, &blank, None),
            Err(PropError::Failed("NullPointer".into()))
        );

        let panicked = FfiError::new(KioskStatus::Panic, "Plugin panic: boom");
        assert_eq!(
            check(KioskStatus::Panic, &panicked, None),
            Err(PropError::Panic("Plugin panic: boom".into()))
        );
    }
}
