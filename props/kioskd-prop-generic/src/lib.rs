/*
 *  kioskd generic prop plugin
 *
 *  kioskd - the show must go on
 *  (c) 2020-26 Stuart Hunter
 *
 *  A prop type that keeps its geometry and draws nothing. Start here when
 *  writing a new prop type.
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 */

//! # kioskd generic prop
//!
//! Loaded by kioskd as `libprop_generic.so`, registers the type `generic`.
//!
//! ```json
//! {"method": "Update", "params": {"type": "generic", "name": "spacer", "x": 0, "y": 0}}
//! ```

use std::ffi::CStr;

use kioskd_prop_api::{Payload, PropChanged, PropInfo, PropPlugin, SurfaceMut};

/// Per-prop state; nothing to keep yet
pub struct GenericProp {
    updates: u64,
}

impl PropPlugin for GenericProp {
    const TYPE_NAME: &'static CStr = c"generic";

    fn create(_prop: &PropInfo<'_>) -> Result<Self, String> {
        Ok(Self { updates: 0 })
    }

    fn update(
        &mut self,
        _prop: &PropInfo<'_>,
        _payload: &Payload,
        _surface: &mut SurfaceMut<'_>,
        _changed: PropChanged,
    ) -> Result<(), String> {
        self.updates += 1;

        #[cfg(feature = "debug-logging")]
        log::debug!("generic prop {} update #{} ({:?})", _prop.name, self.updates, _changed);

        Ok(())
    }

    fn render(&mut self, _prop: &PropInfo<'_>, _surface: &mut SurfaceMut<'_>) -> Result<(), String> {
        Ok(())
    }
}

kioskd_prop_api::export_prop_plugin!(GenericProp);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_name() {
        assert_eq!(GenericProp::TYPE_NAME.to_str().unwrap(), "generic");
    }

    #[test]
    fn test_update_counts() {
        let info = PropInfo { name: "spacer", x: 0.0, y: 0.0, w: 0.0, h: 0.0 };
        let mut prop = GenericProp::create(&info).unwrap();

        let mut pixels = vec![0u8; 4];
        let mut raw = kioskd_prop_api::KioskSurface {
            pixels: pixels.as_mut_ptr(),
            width: 1,
            height: 1,
            stride: 4,
        };
        let mut surface = unsafe { SurfaceMut::from_ffi(&mut raw) }.unwrap();

        prop.update(&info, &Payload::new(), &mut surface, PropChanged::empty()).unwrap();
        prop.update(&info, &Payload::new(), &mut surface, PropChanged::X).unwrap();
        assert_eq!(prop.updates, 2);
        assert!(prop.render(&info, &mut surface).is_ok());
    }
}
