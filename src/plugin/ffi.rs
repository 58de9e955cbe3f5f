/*
 *  plugin/ffi.rs
 *
 *  kioskd - the show must go on
 *  (c) 2020-26 Stuart Hunter
 *
 *  Host side of the prop plugin ABI: symbol resolution into a vtable
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

use libloading::Library;

pub use kioskd_prop_api::ffi::*;

/// The seven capability slots, all present
#[derive(Debug, Clone, Copy)]
pub struct PropVTable {
    pub init: InitFn,
    pub shutdown: ShutdownFn,
    pub type_name: TypeNameFn,
    pub instance_init: InstanceInitFn,
    pub instance_update: InstanceUpdateFn,
    pub instance_render: InstanceRenderFn,
    pub instance_destroy: InstanceDestroyFn,

    /// Optional ABI probe
    pub abi_version: Option<AbiVersionFn>,
}

/// Whatever a module actually exports; any slot may be missing
#[derive(Debug, Clone, Copy, Default)]
pub struct RawVTable {
    pub init: Option<InitFn>,
    pub shutdown: Option<ShutdownFn>,
    pub type_name: Option<TypeNameFn>,
    pub instance_init: Option<InstanceInitFn>,
    pub instance_update: Option<InstanceUpdateFn>,
    pub instance_render: Option<InstanceRenderFn>,
    pub instance_destroy: Option<InstanceDestroyFn>,
    pub abi_version: Option<AbiVersionFn>,
}

/// Look up one symbol, copying the function pointer out
///
/// # Safety
/// `T` must be the true type of the exported symbol.
unsafe fn symbol<T: Copy>(library: &Library, name: &str) -> Option<T> {
    let mut bytes = Vec::with_capacity(name.len() + 1);
    bytes.extend_from_slice(name.as_bytes());
    bytes.push(0);

    unsafe { library.get::<T>(&bytes).ok().map(|s| *s) }
}

impl RawVTable {
    /// Resolve every slot by its fixed symbol name
    ///
    /// # Safety
    /// The library must export these symbols with the kioskd prop ABI
    /// signatures, if it exports them at all.
    pub unsafe fn resolve(library: &Library) -> Self {
        unsafe {
            Self {
                init: symbol(library, SYM_INIT),
                shutdown: symbol(library, SYM_SHUTDOWN),
                type_name: symbol(library, SYM_TYPE_NAME),
                instance_init: symbol(library, SYM_INSTANCE_INIT),
                instance_update: symbol(library, SYM_INSTANCE_UPDATE),
                instance_render: symbol(library, SYM_INSTANCE_RENDER),
                instance_destroy: symbol(library, SYM_INSTANCE_DESTROY),
                abi_version: symbol(library, SYM_ABI_VERSION),
            }
        }
    }

    /// Required symbols this table lacks, in ABI order
    pub fn missing(&self) -> Vec<&'static str> {
        let present = [
            self.init.is_some(),
            self.shutdown.is_some(),
            self.type_name.is_some(),
            self.instance_init.is_some(),
            self.instance_update.is_some(),
            self.instance_render.is_some(),
            self.instance_destroy.is_some(),
        ];

        REQUIRED_SYMBOLS
            .iter()
            .zip(present)
            .filter(|(_, present)| !present)
            .map(|(name, _)| *name)
            .collect()
    }

    /// All seven slots filled, or the list of missing symbols
    pub fn complete(self) -> Result<PropVTable, Vec<&'static str>> {
        match self {
            RawVTable {
                init: Some(init),
                shutdown: Some(shutdown),
                type_name: Some(type_name),
                instance_init: Some(instance_init),
                instance_update: Some(instance_update),
                instance_render: Some(instance_render),
                instance_destroy: Some(instance_destroy),
                abi_version,
            } => Ok(PropVTable {
                init,
                shutdown,
                type_name,
                instance_init,
                instance_update,
                instance_render,
                instance_destroy,
                abi_version,
            }),
            partial => Err(partial.missing()),
        }
    }
}

impl From<PropVTable> for RawVTable {
    fn from(v: PropVTable) -> Self {
        Self {
            init: Some(v.init),
            shutdown: Some(v.shutdown),
            type_name: Some(v.type_name),
            instance_init: Some(v.instance_init),
            instance_update: Some(v.instance_update),
            instance_render: Some(v.instance_render),
            instance_destroy: Some(v.instance_destroy),
            abi_version: v.abi_version,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::{c_char, c_void};

    extern "C" fn init(_error: *mut KioskError) -> KioskStatus {
        KioskStatus::Ok
    }
    extern "C" fn shutdown() {}
    extern "C" fn type_name() -> *const c_char {
        c"probe".as_ptr()
    }
    extern "C" fn instance_init(
        _prop: *const KioskPropInfo,
        _data: *mut *mut c_void,
        _error: *mut KioskError,
    ) -> KioskStatus {
        KioskStatus::Ok
    }
    extern "C" fn instance_update(
        _prop: *const KioskPropInfo,
        _data: *mut c_void,
        _payload: *const u8,
        _payload_len: usize,
        _surface: *mut KioskSurface,
        _changed: u32,
        _error: *mut KioskError,
    ) -> KioskStatus {
        KioskStatus::Ok
    }
    extern "C" fn instance_render(
        _prop: *const KioskPropInfo,
        _data: *mut c_void,
        _surface: *mut KioskSurface,
        _error: *mut KioskError,
    ) -> KioskStatus {
        KioskStatus::Ok
    }
    extern "C" fn instance_destroy(_prop: *const KioskPropInfo, _data: *mut c_void) {}

    fn full() -> RawVTable {
        RawVTable {
            init: Some(init),
            shutdown: Some(shutdown),
            type_name: Some(type_name),
            instance_init: Some(instance_init),
            instance_update: Some(instance_update),
            instance_render: Some(instance_render),
            instance_destroy: Some(instance_destroy),
            abi_version: None,
        }
    }

    #[test]
    fn test_complete_table() {
        let raw = full();
        assert!(raw.missing().is_empty());
        let vtable = raw.complete().unwrap();
        assert!(vtable.abi_version.is_none());
    }

    #[test]
    fn test_each_missing_slot_rejected() {
        for slot in 0..REQUIRED_SYMBOLS.len() {
            let mut raw = full();
            match slot {
                0 => raw.init = None,
                1 => raw.shutdown = None,
                2 => raw.type_name = None,
                3 => raw.instance_init = None,
                4 => raw.instance_update = None,
                5 => raw.instance_render = None,
                _ => raw.instance_destroy = None,
            }
            assert_eq!(raw.complete().unwrap_err(), vec![REQUIRED_SYMBOLS[slot]]);
        }
    }

    #[test]
    fn test_empty_table_lists_everything() {
        assert_eq!(RawVTable::default().missing(), REQUIRED_SYMBOLS.to_vec());
    }
}
