/*
 *  kiosk.rs
 *
 *  kioskd - the show must go on
 *  (c) 2020-26 Stuart Hunter
 *
 *  The host: owns types, props, the surface and the presenter, and runs
 *  the render / control loop
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

use std::future::Future;
use std::rc::Rc;
use std::time::{Duration, Instant};
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use kioskd_prop_api::{Payload, PropChanged};

use crate::control::{ControlCall, ControlRequest, UpdateRequest};
use crate::error::KioskError;
use crate::plugin::{PluginLoader, PluginPropType};
use crate::props::{apply_update, GeometryUpdate, InstanceStore, PropType, TypeRegistry};
use crate::render::{FrameReport, RenderDriver};
use crate::surface::{Presenter, Surface};

pub const HELLO_REPLY: &str = "Hello!";
pub const EXIT_REPLY: &str = "Bye!";
pub const DONE_REPLY: &str = "Done";

/// Prop types loaded at start-up unless configured otherwise
pub const DEFAULT_PLUGINS: [&str; 3] = ["prop_generic", "prop_text", "prop_image"];

/// One live prop as `ListProps` reports it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropSummary {
    #[serde(rename = "type")]
    pub type_name: String,
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

pub struct Kiosk {
    // declared before `registry` so instances go before their types
    store: InstanceStore,
    registry: TypeRegistry,
    loader: PluginLoader,
    surface: Surface,
    presenter: Box<dyn Presenter>,
    driver: RenderDriver,
    exit_requested: bool,
}

impl Kiosk {
    pub fn new(loader: PluginLoader, surface: Surface, presenter: Box<dyn Presenter>) -> Self {
        Self {
            store: InstanceStore::new(),
            registry: TypeRegistry::new(),
            loader,
            surface,
            presenter,
            driver: RenderDriver::new(),
            exit_requested: false,
        }
    }

    pub fn store(&self) -> &InstanceStore {
        &self.store
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    pub fn frames(&self) -> u64 {
        self.driver.frames()
    }

    pub fn exit_requested(&self) -> bool {
        self.exit_requested
    }

    /// Load the module for a logical name and register the type it
    /// reports. Returns the registered type name, which may differ from
    /// `name`.
    pub fn load_plugin(&mut self, name: &str) -> Result<String, KioskError> {
        let plugin = self.loader.open(name)?;
        let prop_type = PluginPropType::new(plugin)?;
        self.install_type(Rc::new(prop_type))
    }

    /// Load each plugin, logging the ones that fail; returns how many loaded
    pub fn load_plugins<S: AsRef<str>>(&mut self, names: &[S]) -> usize {
        let mut loaded = 0;
        for name in names {
            let name = name.as_ref();
            match self.load_plugin(name) {
                Ok(type_name) => {
                    info!("Plugin {} provides '{}'", name, type_name);
                    loaded += 1;
                }
                Err(e) => warn!("Plugin {} unavailable: {}", name, e),
            }
        }
        loaded
    }

    /// Register a type that is already in memory
    pub fn install_type(&mut self, prop_type: Rc<dyn PropType>) -> Result<String, KioskError> {
        self.registry.install(prop_type)
    }

    /// Create-or-update the prop (type, name) from a raw payload.
    ///
    /// Malformed geometry and unknown types are rejected before anything
    /// changes. When the type refuses the update, the prop keeps its old
    /// geometry, and a prop created by this call is destroyed again.
    pub fn update(&mut self, type_name: &str, name: &str, payload: &Payload) -> Result<PropChanged, KioskError> {
        let update = GeometryUpdate::from_payload(payload)?;

        let (instance, created) = self.store.get_or_create(&self.registry, type_name, name)?;

        match apply_update(instance, &update, payload, &mut self.surface) {
            Ok(changed) => {
                if created {
                    info!("New prop '{}' ({})", name, type_name);
                }
                Ok(changed)
            }
            Err(e) => {
                if created {
                    debug!("Dropping prop '{}' ({}) after failed first update", name, type_name);
                    self.store.unlink_and_destroy(type_name, name)?;
                }
                Err(e)
            }
        }
    }

    /// Destroy an existing prop
    pub fn destroy(&mut self, type_name: &str, name: &str) -> Result<(), KioskError> {
        if !self.registry.contains(type_name) {
            return Err(KioskError::TypeNotFound(type_name.to_string()));
        }

        if !self.store.contains(type_name, name) {
            debug!("Destroy of unknown prop '{}' ({})", name, type_name);
            return Err(KioskError::InstanceNotFound {
                type_name: type_name.to_string(),
                name: name.to_string(),
            });
        }

        self.store.unlink_and_destroy(type_name, name)?;
        info!("Destroyed prop '{}' ({})", name, type_name);
        Ok(())
    }

    /// Live props in render order
    pub fn list_props(&self) -> Vec<PropSummary> {
        self.store
            .iter()
            .map(|prop| {
                let g = prop.geometry();
                PropSummary {
                    type_name: prop.type_name().to_string(),
                    name: prop.name().to_string(),
                    x: g.x,
                    y: g.y,
                    w: g.w,
                    h: g.h,
                }
            })
            .collect()
    }

    pub fn list_types(&self) -> Vec<String> {
        self.registry.names()
    }

    /// Execute one control call
    pub fn handle(&mut self, call: ControlCall) -> Result<Value, KioskError> {
        match call {
            ControlCall::Hello => Ok(json!(HELLO_REPLY)),
            ControlCall::ExitKiosk => {
                info!("Exit requested over the control plane");
                self.exit_requested = true;
                Ok(json!(EXIT_REPLY))
            }
            ControlCall::Update(UpdateRequest { type_name, name, payload }) => {
                self.update(&type_name, &name, &payload)?;
                Ok(json!(DONE_REPLY))
            }
            ControlCall::Destroy { type_name, name } => {
                self.destroy(&type_name, &name)?;
                Ok(json!(DONE_REPLY))
            }
            ControlCall::ListProps => Ok(json!(self.list_props())),
            ControlCall::ListTypes => Ok(json!(self.list_types())),
        }
    }

    pub fn render_frame(&mut self) -> FrameReport {
        self.driver.tick(&mut self.store, &mut self.surface, self.presenter.as_mut())
    }

    /// Tear down every prop, then every type. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if !self.store.is_empty() {
            info!("Destroying {} props", self.store.len());
        }
        self.store.teardown();

        if !self.registry.is_empty() {
            info!("Shutting down {} prop types", self.registry.len());
        }
        self.registry.teardown_all();
    }
}

impl Drop for Kiosk {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Run the host loop until `shutdown` resolves or a client calls
/// `ExitKiosk`, then tear everything down.
///
/// Render ticks and control calls are handled one at a time on the calling
/// task; ticks missed while busy are skipped.
pub async fn run<F>(kiosk: &mut Kiosk, mut requests: mpsc::Receiver<ControlRequest>, period: Duration, shutdown: F)
where
    F: Future<Output = ()>,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tokio::pin!(shutdown);
    let mut requests_open = true;

    info!("Rendering every {:?}", period);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }

            _ = ticker.tick() => {
                let started = Instant::now();
                kiosk.render_frame();
                let elapsed = started.elapsed();
                if elapsed > period {
                    debug!("Slow frame: {:?} (interval {:?})", elapsed, period);
                }
            }

            request = requests.recv(), if requests_open => {
                match request {
                    Some(ControlRequest { call, reply }) => {
                        let result = kiosk.handle(call);
                        let _ = reply.send(result);
                        if kiosk.exit_requested() {
                            break;
                        }
                    }
                    None => {
                        debug!("Control plane closed");
                        requests_open = false;
                    }
                }
            }
        }
    }

    kiosk.shutdown();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::HeadlessPresenter;

    fn kiosk() -> Kiosk {
        let surface = Surface::new(16, 16).unwrap();
        Kiosk::new(PluginLoader::new(Vec::new()), surface, Box::new(HeadlessPresenter::new()))
    }

    #[test]
    fn test_fixed_replies() {
        let mut kiosk = kiosk();
        assert_eq!(kiosk.handle(ControlCall::Hello).unwrap(), json!("Hello!"));
        assert!(!kiosk.exit_requested());
        assert_eq!(kiosk.handle(ControlCall::ExitKiosk).unwrap(), json!("Bye!"));
        assert!(kiosk.exit_requested());
    }

    #[test]
    fn test_unknown_type() {
        let mut kiosk = kiosk();
        let err = kiosk.update("text", "clock", &Payload::new()).unwrap_err();
        assert!(matches!(err, KioskError::TypeNotFound(_)));

        let err = kiosk.destroy("text", "clock").unwrap_err();
        assert_eq!(err.code(), -46);
    }

    #[test]
    fn test_missing_plugin_is_not_fatal() {
        let mut kiosk = kiosk();
        assert_eq!(kiosk.load_plugins(&["prop_not_installed_anywhere"]), 0);
        assert!(kiosk.list_types().is_empty());
    }

    #[test]
    fn test_render_frame_presents() {
        let mut kiosk = kiosk();
        let report = kiosk.render_frame();
        assert!(report.presented);
        assert_eq!(kiosk.frames(), 1);
    }
}
