/*
 *  kioskd prop plugin API - plugin side
 *
 *  kioskd - the show must go on
 *  (c) 2020-26 Stuart Hunter
 *
 *  Safe trait for prop plugins and the glue that exports it over the C ABI
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

use std::ffi::{c_char, c_void, CStr};
use std::panic::{catch_unwind, AssertUnwindSafe};

use serde_json::{Map, Value};
use tiny_skia::PixmapMut;

use crate::ffi::{KioskError, KioskPropInfo, KioskStatus, KioskSurface, PropChanged};

/// The raw update object, type-specific fields included
pub type Payload = Map<String, Value>;

/// Safe view of [`KioskPropInfo`]
#[derive(Debug, Clone, Copy)]
pub struct PropInfo<'a> {
    pub name: &'a str,
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl<'a> PropInfo<'a> {
    /// # Safety
    /// `info.name` must be null or point to a NUL-terminated string that
    /// outlives `'a`.
    pub unsafe fn from_ffi(info: &'a KioskPropInfo) -> Self {
        let name = if info.name.is_null() {
            ""
        } else {
            CStr::from_ptr(info.name).to_str().unwrap_or("")
        };

        Self {
            name,
            x: info.x,
            y: info.y,
            w: info.w,
            h: info.h,
        }
    }
}

/// Safe view of the host surface for the duration of one call
pub struct SurfaceMut<'a> {
    pixels: &'a mut [u8],
    width: u32,
    height: u32,
    stride: u32,
}

impl<'a> SurfaceMut<'a> {
    /// Returns `None` for a null or inconsistent surface.
    ///
    /// # Safety
    /// `surface.pixels` must point to `stride * height` writable bytes that
    /// stay valid and unaliased for `'a`.
    pub unsafe fn from_ffi(surface: &'a mut KioskSurface) -> Option<Self> {
        if surface.pixels.is_null() || surface.stride < surface.width.checked_mul(4)? {
            return None;
        }

        let len = (surface.stride as usize).checked_mul(surface.height as usize)?;
        let pixels = std::slice::from_raw_parts_mut(surface.pixels, len);

        Some(Self {
            pixels,
            width: surface.width,
            height: surface.height,
            stride: surface.stride,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Borrow the surface as a tiny-skia canvas.
    ///
    /// Only tightly packed surfaces (stride == width * 4) can be viewed this
    /// way; the host always allocates them like that.
    pub fn pixmap_mut(&mut self) -> Option<PixmapMut<'_>> {
        if self.stride != self.width * 4 {
            return None;
        }
        PixmapMut::from_bytes(&mut self.pixels[..], self.width, self.height)
    }
}

/// A prop type implemented in Rust.
///
/// One value of the implementing type is one prop instance; dropping it is
/// the instance teardown.
pub trait PropPlugin: Sized + 'static {
    /// The name the host registers this type under
    const TYPE_NAME: &'static CStr;

    /// One-time setup when the library is loaded
    fn init() -> Result<(), String> {
        Ok(())
    }

    /// One-time teardown when the host shuts down
    fn shutdown() {}

    fn create(prop: &PropInfo<'_>) -> Result<Self, String>;

    fn update(
        &mut self,
        prop: &PropInfo<'_>,
        payload: &Payload,
        surface: &mut SurfaceMut<'_>,
        changed: PropChanged,
    ) -> Result<(), String>;

    fn render(&mut self, prop: &PropInfo<'_>, surface: &mut SurfaceMut<'_>) -> Result<(), String>;
}

/// Generate the seven C entry points (plus the ABI version probe) for a
/// [`PropPlugin`] implementation. Use exactly once per cdylib.
#[macro_export]
macro_rules! export_prop_plugin {
    ($prop:ty) => {
        #[no_mangle]
        pub extern "C" fn kiosk_prop_abi_version() -> u32 {
            $crate::ffi::KIOSK_PROP_ABI_VERSION
        }

        #[no_mangle]
        pub extern "C" fn kiosk_prop_init(
            error: *mut $crate::ffi::KioskError,
        ) -> $crate::ffi::KioskStatus {
            $crate::plugin::shim::init::<$prop>(error)
        }

        #[no_mangle]
        pub extern "C" fn kiosk_prop_shutdown() {
            $crate::plugin::shim::shutdown::<$prop>()
        }

        #[no_mangle]
        pub extern "C" fn kiosk_prop_type_name() -> *const ::std::ffi::c_char {
            $crate::plugin::shim::type_name::<$prop>()
        }

        #[no_mangle]
        pub extern "C" fn kiosk_prop_instance_init(
            prop: *const $crate::ffi::KioskPropInfo,
            data: *mut *mut ::std::ffi::c_void,
            error: *mut $crate::ffi::KioskError,
        ) -> $crate::ffi::KioskStatus {
            $crate::plugin::shim::instance_init::<$prop>(prop, data, error)
        }

        #[no_mangle]
        pub extern "C" fn kiosk_prop_instance_update(
            prop: *const $crate::ffi::KioskPropInfo,
            data: *mut ::std::ffi::c_void,
            payload: *const u8,
            payload_len: usize,
            surface: *mut $crate::ffi::KioskSurface,
            changed: u32,
            error: *mut $crate::ffi::KioskError,
        ) -> $crate::ffi::KioskStatus {
            $crate::plugin::shim::instance_update::<$prop>(
                prop, data, payload, payload_len, surface, changed, error,
            )
        }

        #[no_mangle]
        pub extern "C" fn kiosk_prop_instance_render(
            prop: *const $crate::ffi::KioskPropInfo,
            data: *mut ::std::ffi::c_void,
            surface: *mut $crate::ffi::KioskSurface,
            error: *mut $crate::ffi::KioskError,
        ) -> $crate::ffi::KioskStatus {
            $crate::plugin::shim::instance_render::<$prop>(prop, data, surface, error)
        }

        #[no_mangle]
        pub extern "C" fn kiosk_prop_instance_destroy(
            prop: *const $crate::ffi::KioskPropInfo,
            data: *mut ::std::ffi::c_void,
        ) {
            $crate::plugin::shim::instance_destroy::<$prop>(prop, data)
        }
    };
}

/// Plumbing behind [`export_prop_plugin!`]. Every entry point validates its
/// pointers and runs the plugin code behind a panic boundary, since
/// unwinding across `extern "C"` aborts the host.
#[doc(hidden)]
pub mod shim {
    use super::*;

    type Fault = (KioskStatus, String);

    fn null(what: &str) -> Fault {
        (KioskStatus::NullPointer, format!("Null pointer passed to {}", what))
    }

    fn failed(message: String) -> Fault {
        (KioskStatus::Failed, message)
    }

    fn panic_message(panic_info: Box<dyn std::any::Any + Send>) -> String {
        if let Some(s) = panic_info.downcast_ref::<&str>() {
            format!("Plugin panic: {}", s)
        } else if let Some(s) = panic_info.downcast_ref::<String>() {
            format!("Plugin panic: {}", s)
        } else {
            "Plugin panic: unknown error".to_string()
        }
    }

    fn guard<F>(error: *mut KioskError, f: F) -> KioskStatus
    where
        F: FnOnce() -> Result<(), Fault>,
    {
        let (code, message) = match catch_unwind(AssertUnwindSafe(f)) {
            Ok(Ok(())) => return KioskStatus::Ok,
            Ok(Err(fault)) => fault,
            Err(panic_info) => (KioskStatus::Panic, panic_message(panic_info)),
        };

        if !error.is_null() {
            unsafe {
                *error = KioskError::new(code, &message);
            }
        }
        code
    }

    pub fn init<P: PropPlugin>(error: *mut KioskError) -> KioskStatus {
        guard(error, || P::init().map_err(failed))
    }

    pub fn shutdown<P: PropPlugin>() {
        let _ = catch_unwind(P::shutdown);
    }

    pub fn type_name<P: PropPlugin>() -> *const c_char {
        P::TYPE_NAME.as_ptr()
    }

    pub fn instance_init<P: PropPlugin>(
        prop: *const KioskPropInfo,
        data: *mut *mut c_void,
        error: *mut KioskError,
    ) -> KioskStatus {
        guard(error, || {
            if prop.is_null() || data.is_null() {
                return Err(null("instance_init"));
            }

            let info = unsafe { PropInfo::from_ffi(&*prop) };
            let instance = P::create(&info).map_err(failed)?;

            unsafe {
                *data = Box::into_raw(Box::new(instance)) as *mut c_void;
            }
            Ok(())
        })
    }

    pub fn instance_update<P: PropPlugin>(
        prop: *const KioskPropInfo,
        data: *mut c_void,
        payload: *const u8,
        payload_len: usize,
        surface: *mut KioskSurface,
        changed: u32,
        error: *mut KioskError,
    ) -> KioskStatus {
        guard(error, || {
            if prop.is_null() || data.is_null() || payload.is_null() || surface.is_null() {
                return Err(null("instance_update"));
            }

            let info = unsafe { PropInfo::from_ffi(&*prop) };
            let instance = unsafe { &mut *(data as *mut P) };
            let bytes = unsafe { std::slice::from_raw_parts(payload, payload_len) };

            let payload: Payload = serde_json::from_slice(bytes)
                .map_err(|e| (KioskStatus::InvalidArgument, format!("Bad payload: {}", e)))?;

            let mut surface = unsafe { SurfaceMut::from_ffi(&mut *surface) }
                .ok_or_else(|| (KioskStatus::InvalidArgument, "Bad surface".to_string()))?;

            instance
                .update(&info, &payload, &mut surface, PropChanged::from_bits_truncate(changed))
                .map_err(failed)
        })
    }

    pub fn instance_render<P: PropPlugin>(
        prop: *const KioskPropInfo,
        data: *mut c_void,
        surface: *mut KioskSurface,
        error: *mut KioskError,
    ) -> KioskStatus {
        guard(error, || {
            if prop.is_null() || data.is_null() || surface.is_null() {
                return Err(null("instance_render"));
            }

            let info = unsafe { PropInfo::from_ffi(&*prop) };
            let instance = unsafe { &mut *(data as *mut P) };

            let mut surface = unsafe { SurfaceMut::from_ffi(&mut *surface) }
                .ok_or_else(|| (KioskStatus::InvalidArgument, "Bad surface".to_string()))?;

            instance.render(&info, &mut surface).map_err(failed)
        })
    }

    pub fn instance_destroy<P: PropPlugin>(_prop: *const KioskPropInfo, data: *mut c_void) {
        if !data.is_null() {
            let _ = catch_unwind(AssertUnwindSafe(|| unsafe {
                drop(Box::from_raw(data as *mut P));
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static DROPS: AtomicUsize = AtomicUsize::new(0);

    struct Counter {
        updates: usize,
        last_text: Option<String>,
        last_changed: PropChanged,
    }

    impl Drop for Counter {
        fn drop(&mut self) {
            DROPS.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl PropPlugin for Counter {
        const TYPE_NAME: &'static CStr = c"counter";

        fn create(prop: &PropInfo<'_>) -> Result<Self, String> {
            if prop.name == "refuse" {
                return Err("refused".to_string());
            }
            Ok(Self { updates: 0, last_text: None, last_changed: PropChanged::empty() })
        }

        fn update(
            &mut self,
            _prop: &PropInfo<'_>,
            payload: &Payload,
            _surface: &mut SurfaceMut<'_>,
            changed: PropChanged,
        ) -> Result<(), String> {
            self.updates += 1;
            self.last_changed = changed;
            self.last_text = payload.get("text").and_then(Value::as_str).map(str::to_string);
            Ok(())
        }

        fn render(&mut self, prop: &PropInfo<'_>, surface: &mut SurfaceMut<'_>) -> Result<(), String> {
            if prop.name == "boom" {
                panic!("render exploded");
            }
            let pixmap = surface.pixmap_mut().ok_or("no pixmap")?;
            assert_eq!(pixmap.width(), 2);
            Ok(())
        }
    }

    fn info(name: &CString) -> KioskPropInfo {
        KioskPropInfo { name: name.as_ptr(), x: 1.0, y: 2.0, w: 3.0, h: 4.0 }
    }

    fn surface(pixels: &mut [u8]) -> KioskSurface {
        KioskSurface { pixels: pixels.as_mut_ptr(), width: 2, height: 2, stride: 8 }
    }

    #[test]
    fn test_type_name() {
        let name = unsafe { CStr::from_ptr(shim::type_name::<Counter>()) };
        assert_eq!(name.to_str().unwrap(), "counter");
    }

    #[test]
    fn test_instance_lifecycle() {
        let name = CString::new("clock").unwrap();
        let prop = info(&name);
        let mut data: *mut c_void = std::ptr::null_mut();
        let mut error = KioskError::default();

        let status = shim::instance_init::<Counter>(&prop, &mut data, &mut error);
        assert_eq!(status, KioskStatus::Ok);
        assert!(!data.is_null());

        let payload = br#"{"name":"clock","type":"counter","text":"Hi"}"#;
        let mut pixels = vec![0u8; 16];
        let mut target = surface(&mut pixels);
        let status = shim::instance_update::<Counter>(
            &prop, data, payload.as_ptr(), payload.len(), &mut target, 0b0101, &mut error,
        );
        assert_eq!(status, KioskStatus::Ok);

        let counter = unsafe { &*(data as *const Counter) };
        assert_eq!(counter.updates, 1);
        assert_eq!(counter.last_text.as_deref(), Some("Hi"));
        assert_eq!(counter.last_changed, PropChanged::X | PropChanged::W);

        let status = shim::instance_render::<Counter>(&prop, data, &mut target, &mut error);
        assert_eq!(status, KioskStatus::Ok);

        let before = DROPS.load(Ordering::SeqCst);
        shim::instance_destroy::<Counter>(&prop, data);
        assert!(DROPS.load(Ordering::SeqCst) >= before + 1);
    }

    #[test]
    fn test_create_failure_reported() {
        let name = CString::new("refuse").unwrap();
        let prop = info(&name);
        let mut data: *mut c_void = std::ptr::null_mut();
        let mut error = KioskError::default();

        let status = shim::instance_init::<Counter>(&prop, &mut data, &mut error);
        assert_eq!(status, KioskStatus::Failed);
        assert_eq!(error.message_str(), "refused");
        assert!(data.is_null());
    }

    #[test]
    fn test_panic_is_contained() {
        let name = CString::new("boom").unwrap();
        let prop = info(&name);
        let mut data: *mut c_void = std::ptr::null_mut();
        let mut error = KioskError::default();
        shim::instance_init::<Counter>(&prop, &mut data, &mut error);

        let mut pixels = vec![0u8; 16];
        let mut target = surface(&mut pixels);
        let status = shim::instance_render::<Counter>(&prop, data, &mut target, &mut error);
        assert_eq!(status, KioskStatus::Panic);
        assert!(error.message_str().contains("render exploded"));

        shim::instance_destroy::<Counter>(&prop, data);
    }

    #[test]
    fn test_bad_payload_rejected() {
        let name = CString::new("clock").unwrap();
        let prop = info(&name);
        let mut data: *mut c_void = std::ptr::null_mut();
        let mut error = KioskError::default();
        shim::instance_init::<Counter>(&prop, &mut data, &mut error);

        let payload = b"[1,2,3]";
        let mut pixels = vec![0u8; 16];
        let mut target = surface(&mut pixels);
        let status = shim::instance_update::<Counter>(
            &prop, data, payload.as_ptr(), payload.len(), &mut target, 0, &mut error,
        );
        assert_eq!(status, KioskStatus::InvalidArgument);

        shim::instance_destroy::<Counter>(&prop, data);
    }

    #[test]
    fn test_null_pointers_rejected() {
        let mut error = KioskError::default();
        let status = shim::instance_init::<Counter>(
            std::ptr::null(), std::ptr::null_mut(), &mut error,
        );
        assert_eq!(status, KioskStatus::NullPointer);

        // a null error record must not be written through
        let status = shim::instance_render::<Counter>(
            std::ptr::null(), std::ptr::null_mut(), std::ptr::null_mut(), std::ptr::null_mut(),
        );
        assert_eq!(status, KioskStatus::NullPointer);
    }

    #[test]
    fn test_surface_rejects_short_stride() {
        let mut pixels = vec![0u8; 16];
        let mut raw = KioskSurface { pixels: pixels.as_mut_ptr(), width: 4, height: 2, stride: 8 };
        assert!(unsafe { SurfaceMut::from_ffi(&mut raw) }.is_none());
    }
}
