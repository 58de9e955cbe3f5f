/*
 *  render.rs
 *
 *  kioskd - the show must go on
 *  (c) 2020-26 Stuart Hunter
 *
 *  Render driver: clear, draw every prop, present
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

use log::{debug, info, warn};

use crate::props::{catch_prop_call, InstanceStore};
use crate::surface::{Presenter, Surface};

/// Outcome of one tick
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FrameReport {
    pub rendered: usize,
    pub failed: usize,
    pub presented: bool,
}

/// Draws every live prop once per tick.
///
/// A prop whose render fails is skipped for that tick; the rest of the
/// frame is still drawn and presented.
#[derive(Debug, Default)]
pub struct RenderDriver {
    frames: u64,
    present_failing: bool,
}

impl RenderDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn tick(
        &mut self,
        store: &mut InstanceStore,
        surface: &mut Surface,
        presenter: &mut dyn Presenter,
    ) -> FrameReport {
        let mut report = FrameReport::default();

        surface.clear();

        for instance in store.iter_mut() {
            let Some((prop_type, view, data)) = instance.parts() else {
                continue;
            };
            let name = view.name.to_string();

            match catch_prop_call(|| prop_type.instance_render(view, data, surface)) {
                Ok(()) => {
                    report.rendered += 1;
                    if instance.render_failing {
                        info!("Prop '{}' ({}) is rendering again", name, instance.type_name());
                        instance.render_failing = false;
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    if instance.render_failing {
                        debug!("Prop '{}' ({}) render failed: {}", name, instance.type_name(), e);
                    } else {
                        warn!("Prop '{}' ({}) render failed: {}", name, instance.type_name(), e);
                        instance.render_failing = true;
                    }
                }
            }
        }

        match presenter.present(surface) {
            Ok(()) => {
                report.presented = true;
                if self.present_failing {
                    info!("{} presenter recovered", presenter.name());
                    self.present_failing = false;
                }
            }
            Err(e) => {
                if self.present_failing {
                    debug!("{} present failed: {}", presenter.name(), e);
                } else {
                    warn!("{} present failed: {}", presenter.name(), e);
                    self.present_failing = true;
                }
            }
        }

        self.frames += 1;
        report
    }
}
