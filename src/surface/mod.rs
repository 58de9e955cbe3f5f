/*
 *  surface/mod.rs
 *
 *  kioskd - the show must go on
 *  (c) 2020-26 Stuart Hunter
 *
 *  The shared render surface and the presenters that put it on screen
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

use thiserror::Error;
use tiny_skia::{Color, Pixmap};

use kioskd_prop_api::KioskSurface;

pub mod fbdev;
pub mod headless;

pub use fbdev::FbdevPresenter;
pub use headless::HeadlessPresenter;

#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("invalid surface size {width}x{height}")]
    InvalidSize { width: u32, height: u32 },

    #[error("unsupported framebuffer depth: {0} bpp")]
    UnsupportedDepth(u32),

    #[error("framebuffer device error: {0}")]
    Device(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Premultiplied RGBA8888 render target, cleared once per tick
pub struct Surface {
    pixmap: Pixmap,
    clear_colour: Color,
}

impl Surface {
    pub fn new(width: u32, height: u32) -> Result<Self, SurfaceError> {
        let pixmap = Pixmap::new(width, height).ok_or(SurfaceError::InvalidSize { width, height })?;
        Ok(Self {
            pixmap,
            clear_colour: Color::BLACK,
        })
    }

    /// Straight (not premultiplied) RGBA
    pub fn with_clear_colour(mut self, rgba: [u8; 4]) -> Self {
        let [r, g, b, a] = rgba;
        self.clear_colour = Color::from_rgba8(r, g, b, a);
        self
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    pub fn clear(&mut self) {
        self.pixmap.fill(self.clear_colour);
    }

    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }

    pub fn pixmap_mut(&mut self) -> &mut Pixmap {
        &mut self.pixmap
    }

    /// Premultiplied RGBA of one pixel
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        let p = self.pixmap.pixel(x, y)?;
        Some([p.red(), p.green(), p.blue(), p.alpha()])
    }

    /// C view for plugin calls; valid until the surface is next borrowed
    pub fn as_ffi(&mut self) -> KioskSurface {
        let width = self.pixmap.width();
        let height = self.pixmap.height();
        KioskSurface {
            pixels: self.pixmap.data_mut().as_mut_ptr(),
            width,
            height,
            stride: width * 4,
        }
    }
}

/// Puts a finished frame somewhere visible
pub trait Presenter {
    fn name(&self) -> &str;

    fn present(&mut self, surface: &Surface) -> Result<(), SurfaceError>;
}
