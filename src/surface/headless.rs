/*
 *  surface/headless.rs
 *
 *  kioskd - the show must go on
 *  (c) 2020-26 Stuart Hunter
 *
 *  Presenter for running without a display
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

use std::cell::Cell;
use std::rc::Rc;

use super::{Presenter, Surface, SurfaceError};

/// Discards frames, counting them
#[derive(Debug, Default)]
pub struct HeadlessPresenter {
    frames: Rc<Cell<u64>>,
}

impl HeadlessPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared frame counter, readable after the presenter is boxed away
    pub fn counter(&self) -> Rc<Cell<u64>> {
        Rc::clone(&self.frames)
    }

    pub fn frames(&self) -> u64 {
        self.frames.get()
    }
}

impl Presenter for HeadlessPresenter {
    fn name(&self) -> &str {
        "headless"
    }

    fn present(&mut self, _surface: &Surface) -> Result<(), SurfaceError> {
        self.frames.set(self.frames.get() + 1);
        Ok(())
    }
}
