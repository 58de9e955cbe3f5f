/*
 *  kioskd image prop plugin
 *
 *  kioskd - the show must go on
 *  (c) 2020-26 Stuart Hunter
 *
 *  PNG and SVG images stretched into the prop rectangle
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 */

//! # kioskd image prop
//!
//! Loaded by kioskd as `libprop_image.so`, registers the type `image`.
//!
//! Set `image_path` to a `.png` or `.svg` file. The image is drawn into
//! (x, y, w, h); a zero width or height falls back to the image's own size.
//! A path that fails to load leaves the prop empty and fails the update.

use std::ffi::CStr;
use std::path::Path;

use resvg::usvg::{Options as UsvgOptions, Tree as UsvgTree};
use serde_json::Value;
use tiny_skia::{FilterQuality, Pixmap, PixmapMut, PixmapPaint, Transform};

use kioskd_prop_api::{Payload, PropChanged, PropInfo, PropPlugin, SurfaceMut};

enum Picture {
    Raster(Pixmap),
    Vector(UsvgTree),
}

impl Picture {
    fn load(path: &Path) -> Result<Self, String> {
        let is_svg = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("svg"));

        if is_svg {
            let data = std::fs::read(path)
                .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
            let tree = UsvgTree::from_data(&data, &UsvgOptions::default())
                .map_err(|e| format!("Failed to parse SVG {}: {:?}", path.display(), e))?;
            Ok(Picture::Vector(tree))
        } else {
            let pixmap = Pixmap::load_png(path)
                .map_err(|e| format!("Failed to load {}: {}", path.display(), e))?;
            Ok(Picture::Raster(pixmap))
        }
    }

    fn natural_size(&self) -> (f32, f32) {
        match self {
            Picture::Raster(pixmap) => (pixmap.width() as f32, pixmap.height() as f32),
            Picture::Vector(tree) => (tree.size().width(), tree.size().height()),
        }
    }

    /// Draw into the rectangle at (x, y), w by h
    fn draw(&self, canvas: &mut PixmapMut<'_>, x: f32, y: f32, w: f32, h: f32) {
        let (natural_w, natural_h) = self.natural_size();
        if natural_w <= 0.0 || natural_h <= 0.0 {
            return;
        }

        let (w, h) = if w > 0.0 && h > 0.0 { (w, h) } else { (natural_w, natural_h) };
        let transform = Transform::from_row(w / natural_w, 0.0, 0.0, h / natural_h, x, y);

        match self {
            Picture::Raster(pixmap) => {
                let paint = PixmapPaint {
                    quality: FilterQuality::Bilinear,
                    ..PixmapPaint::default()
                };
                canvas.draw_pixmap(0, 0, pixmap.as_ref(), &paint, transform, None);
            }
            Picture::Vector(tree) => resvg::render(tree, transform, canvas),
        }
    }
}

pub struct ImageProp {
    path: Option<String>,
    picture: Option<Picture>,
}

impl PropPlugin for ImageProp {
    const TYPE_NAME: &'static CStr = c"image";

    fn create(_prop: &PropInfo<'_>) -> Result<Self, String> {
        Ok(Self { path: None, picture: None })
    }

    fn update(
        &mut self,
        _prop: &PropInfo<'_>,
        payload: &Payload,
        _surface: &mut SurfaceMut<'_>,
        _changed: PropChanged,
    ) -> Result<(), String> {
        let Some(path) = payload.get("image_path").and_then(Value::as_str) else {
            return Ok(());
        };

        // always reload, the file may have changed on disk
        self.path = Some(path.to_string());
        self.picture = None;

        let picture = Picture::load(Path::new(path))?;

        #[cfg(feature = "debug-logging")]
        {
            let (w, h) = picture.natural_size();
            log::debug!("image prop {} loaded {} ({}x{})", _prop.name, path, w, h);
        }

        self.picture = Some(picture);
        Ok(())
    }

    fn render(&mut self, prop: &PropInfo<'_>, surface: &mut SurfaceMut<'_>) -> Result<(), String> {
        let Some(picture) = self.picture.as_ref() else {
            return Ok(());
        };

        let mut canvas = surface.pixmap_mut().ok_or("Surface is not a packed RGBA canvas")?;
        picture.draw(
            &mut canvas,
            prop.x as f32,
            prop.y as f32,
            prop.w as f32,
            prop.h as f32,
        );
        Ok(())
    }
}

kioskd_prop_api::export_prop_plugin!(ImageProp);
