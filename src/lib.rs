/*
 *  lib.rs
 *
 *  kioskd - the show must go on
 *  (c) 2020-26 Stuart Hunter
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

//! kioskd hosts named "props" on a single render surface.
//!
//! Prop types come from dynamically loaded plugins; a remote client creates,
//! updates and destroys props over a JSON-RPC control plane while the host
//! redraws every prop on a fixed interval.

pub mod config;
pub mod control;
pub mod error;
pub mod kiosk;
pub mod plugin;
pub mod props;
pub mod render;
pub mod surface;

pub use error::KioskError;
pub use kiosk::{run, Kiosk, PropSummary};
pub use kioskd_prop_api::{Payload, PropChanged};
