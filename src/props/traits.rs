/*
 *  props/traits.rs
 *
 *  kioskd - the show must go on
 *  (c) 2020-26 Stuart Hunter
 *
 *  The interface every prop type satisfies, wherever it came from
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

use std::any::Any;
use thiserror::Error;

use kioskd_prop_api::{Payload, PropChanged};

use crate::surface::Surface;

/// Type-private instance state; the host never looks inside
pub type PropData = Box<dyn Any>;

/// Prop rectangle, all fields default to 0.0
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Geometry {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

/// What a prop type sees of an instance on every call
#[derive(Debug, Clone, Copy)]
pub struct PropView<'a> {
    pub name: &'a str,
    pub geometry: Geometry,
}

/// Failure reported by prop type code
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PropError {
    #[error("{0}")]
    Failed(String),

    #[error("panicked: {0}")]
    Panic(String),
}

/// A loaded prop type: lifecycle hooks plus the per-instance operations.
///
/// Dynamically loaded plugins are adapted to this trait by
/// [`crate::plugin::PluginPropType`]; in-process types implement it
/// directly.
pub trait PropType {
    /// The name this type registers under. Must be stable and non-empty.
    fn type_name(&self) -> &str;

    /// Called once before the type is registered
    fn init(&self) -> Result<(), PropError>;

    /// Called once when the host tears the type down
    fn shutdown(&self);

    fn instance_init(&self, prop: PropView<'_>) -> Result<PropData, PropError>;

    fn instance_update(
        &self,
        prop: PropView<'_>,
        data: &mut PropData,
        payload: &Payload,
        surface: &mut Surface,
        changed: PropChanged,
    ) -> Result<(), PropError>;

    fn instance_render(
        &self,
        prop: PropView<'_>,
        data: &mut PropData,
        surface: &mut Surface,
    ) -> Result<(), PropError>;

    /// Releases the state created by `instance_init`
    fn instance_destroy(&self, prop: PropView<'_>, data: PropData);
}
