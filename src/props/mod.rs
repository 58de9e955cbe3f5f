/*
 *  props/mod.rs
 *
 *  kioskd - the show must go on
 *  (c) 2020-26 Stuart Hunter
 *
 *  Prop types, instances and update dispatch
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

//! The prop runtime
//!
//! - [`TypeRegistry`] holds every prop type that loaded, keyed by the name
//!   the type reports
//! - [`InstanceStore`] holds every live prop, keyed by (type, name)
//! - [`dispatch`] turns an update into a change mask and calls the type
//!
//! Every call into type code goes through [`catch_prop_call`], so a
//! panicking type costs one prop, not the host.

pub mod dispatch;
pub mod guard;
pub mod registry;
pub mod store;
pub mod traits;

pub use dispatch::{apply_update, GeometryUpdate};
pub use guard::catch_prop_call;
pub use registry::TypeRegistry;
pub use store::{InstanceStore, PropInstance, PropKey};
pub use traits::{Geometry, PropData, PropError, PropType, PropView};
