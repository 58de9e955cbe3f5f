/*
 *  props/dispatch.rs
 *
 *  kioskd - the show must go on
 *  (c) 2020-26 Stuart Hunter
 *
 *  Geometry diffing and update dispatch
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

use log::{debug, warn};
use serde_json::Value;

use kioskd_prop_api::{Payload, PropChanged};

use crate::error::{KioskError, RequestFault};
use crate::surface::Surface;
use super::guard::catch_prop_call;
use super::store::PropInstance;
use super::traits::Geometry;

/// The geometry fields an update carries; absent fields stay `None`
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GeometryUpdate {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub w: Option<f64>,
    pub h: Option<f64>,
}

fn number(payload: &Payload, field: &'static str) -> Result<Option<f64>, RequestFault> {
    match payload.get(field) {
        None => Ok(None),
        Some(Value::Number(n)) => n.as_f64().map(Some).ok_or(RequestFault::BadGeometry(field)),
        Some(_) => Err(RequestFault::BadGeometry(field)),
    }
}

impl GeometryUpdate {
    /// Pick x, y, w, h out of a raw update. Any of them present but not a
    /// number rejects the whole update.
    pub fn from_payload(payload: &Payload) -> Result<Self, RequestFault> {
        Ok(Self {
            x: number(payload, "x")?,
            y: number(payload, "y")?,
            w: number(payload, "w")?,
            h: number(payload, "h")?,
        })
    }

    /// Merge into `geometry`, returning the fields whose value changed.
    ///
    /// Comparison is exact: a field sent with its current value is not a
    /// change.
    pub fn apply(&self, geometry: &mut Geometry) -> PropChanged {
        let mut changed = PropChanged::empty();

        let fields = [
            (self.x, &mut geometry.x, PropChanged::X),
            (self.y, &mut geometry.y, PropChanged::Y),
            (self.w, &mut geometry.w, PropChanged::W),
            (self.h, &mut geometry.h, PropChanged::H),
        ];

        for (incoming, current, flag) in fields {
            if let Some(value) = incoming {
                if value != *current {
                    *current = value;
                    changed |= flag;
                }
            }
        }

        changed
    }
}

/// Apply an update to a resolved instance: merge geometry, then hand the
/// change mask and the full payload to the instance's type.
///
/// The previous geometry is restored when the type's update routine fails.
pub fn apply_update(
    instance: &mut PropInstance,
    update: &GeometryUpdate,
    payload: &Payload,
    surface: &mut Surface,
) -> Result<PropChanged, KioskError> {
    let previous = instance.geometry();
    let changed = update.apply(instance.geometry_mut());

    let type_name = instance.type_name().to_string();
    let name = instance.name().to_string();

    let Some((prop_type, view, data)) = instance.parts() else {
        return Ok(changed);
    };

    debug!("Update '{}' ({}) changed {:?}", name, type_name, changed.field_names());

    let result = catch_prop_call(|| prop_type.instance_update(view, data, payload, surface, changed));
    if let Err(source) = result {
        warn!("Prop '{}' of type '{}' rejected update: {}", name, type_name, source);
        *instance.geometry_mut() = previous;
        return Err(KioskError::UpdateFailed { type_name, name, source });
    }

    Ok(changed)
}
