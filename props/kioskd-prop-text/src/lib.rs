/*
 *  kioskd text prop plugin
 *
 *  kioskd - the show must go on
 *  (c) 2020-26 Stuart Hunter
 *
 *  Text props rasterised with embedded-graphics mono fonts
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 */

//! # kioskd text prop
//!
//! Loaded by kioskd as `libprop_text.so`, registers the type `text`.
//!
//! ## Fields
//!
//! - `text`: the string to show, `\n` breaks lines
//! - `font_point_size`: nominal size; the nearest mono font is chosen and
//!   scaled up by a whole factor for large sizes (default 16)
//! - `colour`: `[r, g, b]` or `[r, g, b, a]` (default opaque white)
//! - `wrap`: wrap at the prop width (default true, needs `w` > 0)
//!
//! The text is rasterised once per change into a private texture and
//! copied to the surface at (x, y) every tick at its natural size.

use std::ffi::CStr;

use embedded_graphics::{
    mono_font::{
        ascii::{FONT_10X20, FONT_4X6, FONT_5X8, FONT_6X10, FONT_7X13, FONT_9X15, FONT_9X18},
        MonoFont,
        MonoTextStyle,
    },
    pixelcolor::Rgb888,
    prelude::*,
    primitives::Rectangle,
    text::{Baseline, Text},
};
use embedded_text::{
    alignment::HorizontalAlignment,
    style::{HeightMode, TextBoxStyleBuilder},
    TextBox,
};
use serde_json::Value;
use tiny_skia::{FilterQuality, Pixmap, PixmapPaint, Transform};

use kioskd_prop_api::{Payload, PropChanged, PropInfo, PropPlugin, SurfaceMut};

const DEFAULT_POINT_SIZE: u32 = 16;
const MAX_POINT_SIZE: u32 = 1000;

/// Fonts by pixel height, smallest first
const FONTS: [(u32, &MonoFont<'static>); 7] = [
    (6, &FONT_4X6),
    (8, &FONT_5X8),
    (10, &FONT_6X10),
    (13, &FONT_7X13),
    (15, &FONT_9X15),
    (18, &FONT_9X18),
    (20, &FONT_10X20),
];

/// Pick the font for a point size and the whole-number scale to draw it at
fn font_for(point_size: u32) -> (&'static MonoFont<'static>, u32) {
    let largest = FONTS[FONTS.len() - 1].0;
    let scale = if point_size > largest {
        point_size.saturating_add(largest / 2) / largest
    } else {
        1
    };
    let target = point_size / scale;

    let font = FONTS
        .iter()
        .min_by_key(|(height, _)| height.abs_diff(target))
        .map(|(_, font)| *font)
        .unwrap_or(&FONT_6X10);

    (font, scale.max(1))
}

/// Parse `[r, g, b]` or `[r, g, b, a]`
fn parse_colour(value: &Value) -> Option<[u8; 4]> {
    let items = value.as_array()?;
    if items.len() != 3 && items.len() != 4 {
        return None;
    }

    let mut colour = [255u8; 4];
    for (slot, item) in colour.iter_mut().zip(items) {
        *slot = item.as_u64()?.min(255) as u8;
    }
    Some(colour)
}

fn premultiply(channel: u8, alpha: u8) -> u8 {
    ((channel as u16 * alpha as u16 + 127) / 255) as u8
}

/// embedded-graphics target over a tiny-skia pixmap
struct Canvas {
    pixmap: Pixmap,
    alpha: u8,
}

impl OriginDimensions for Canvas {
    fn size(&self) -> Size {
        Size::new(self.pixmap.width(), self.pixmap.height())
    }
}

impl DrawTarget for Canvas {
    type Color = Rgb888;
    type Error = core::convert::Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let width = self.pixmap.width() as i32;
        let height = self.pixmap.height() as i32;
        let alpha = self.alpha;
        let data = self.pixmap.data_mut();

        for Pixel(point, colour) in pixels {
            if point.x < 0 || point.y < 0 || point.x >= width || point.y >= height {
                continue;
            }
            let i = ((point.y * width + point.x) * 4) as usize;
            data[i] = premultiply(colour.r(), alpha);
            data[i + 1] = premultiply(colour.g(), alpha);
            data[i + 2] = premultiply(colour.b(), alpha);
            data[i + 3] = alpha;
        }
        Ok(())
    }
}

pub struct TextProp {
    text: Option<String>,
    point_size: u32,
    colour: [u8; 4],
    wrap: bool,

    /// Rasterised text and the scale to blit it at
    texture: Option<(Pixmap, u32)>,
}

impl TextProp {
    /// Rasterise the text for a prop `width` wide. The texture never
    /// outgrows what the `limit` surface can show at the chosen scale.
    fn rasterise(&self, width: f64, limit: Size) -> Result<Option<(Pixmap, u32)>, String> {
        let Some(text) = self.text.as_deref() else {
            return Ok(None);
        };
        if text.is_empty() {
            return Ok(None);
        }

        let (font, scale) = font_for(self.point_size);
        let [r, g, b, a] = self.colour;
        let style = MonoTextStyle::new(font, Rgb888::new(r, g, b));

        let max_width = limit.width.div_ceil(scale);
        let max_height = limit.height.div_ceil(scale);
        let wrap_width = ((width.max(0.0) as u32) / scale).min(max_width);

        if self.wrap && wrap_width > 0 {
            let textbox_style = TextBoxStyleBuilder::new()
                .alignment(HorizontalAlignment::Left)
                .height_mode(HeightMode::FitToText)
                .build();

            let height = textbox_style
                .measure_text_height(&style, text, wrap_width)
                .clamp(1, max_height.max(1));
            let Some(pixmap) = Pixmap::new(wrap_width, height) else {
                return Ok(None);
            };

            let mut canvas = Canvas { pixmap, alpha: a };
            let bounds = Rectangle::new(Point::zero(), Size::new(wrap_width, height));
            TextBox::with_textbox_style(text, bounds, style, textbox_style)
                .draw(&mut canvas)
                .map_err(|_| "Failed to draw text".to_string())?;

            Ok(Some((canvas.pixmap, scale)))
        } else {
            let label = Text::with_baseline(text, Point::zero(), style, Baseline::Top);
            let size = label.bounding_box().size;
            let Some(pixmap) = Pixmap::new(size.width.min(max_width), size.height.min(max_height)) else {
                return Ok(None);
            };

            let mut canvas = Canvas { pixmap, alpha: a };
            label
                .draw(&mut canvas)
                .map_err(|_| "Failed to draw text".to_string())?;

            Ok(Some((canvas.pixmap, scale)))
        }
    }
}

impl PropPlugin for TextProp {
    const TYPE_NAME: &'static CStr = c"text";

    fn create(_prop: &PropInfo<'_>) -> Result<Self, String> {
        Ok(Self {
            text: None,
            point_size: DEFAULT_POINT_SIZE,
            colour: [255, 255, 255, 255],
            wrap: true,
            texture: None,
        })
    }

    fn update(
        &mut self,
        prop: &PropInfo<'_>,
        payload: &Payload,
        surface: &mut SurfaceMut<'_>,
        changed: PropChanged,
    ) -> Result<(), String> {
        let mut redraw = changed.resized();

        if let Some(size) = payload.get("font_point_size").and_then(Value::as_u64) {
            self.point_size = u32::try_from(size).unwrap_or(u32::MAX).clamp(1, MAX_POINT_SIZE);
            redraw = true;
        }

        if let Some(text) = payload.get("text").and_then(Value::as_str) {
            self.text = Some(text.to_string());
            redraw = true;
        }

        if let Some(value) = payload.get("colour") {
            match parse_colour(value) {
                Some(colour) => {
                    self.colour = colour;
                    redraw = true;
                }
                None => {
                    #[cfg(feature = "debug-logging")]
                    log::warn!("text prop {}: invalid colour {}", prop.name, value);
                }
            }
        }

        match payload.get("wrap") {
            Some(Value::Bool(wrap)) => {
                self.wrap = *wrap;
                redraw = true;
            }
            Some(Value::Number(n)) => {
                self.wrap = n.as_f64().is_some_and(|v| v != 0.0);
                redraw = true;
            }
            _ => {}
        }

        if redraw {
            let limit = Size::new(surface.width(), surface.height());
            self.texture = self.rasterise(prop.w, limit)?;
        }
        Ok(())
    }

    fn render(&mut self, prop: &PropInfo<'_>, surface: &mut SurfaceMut<'_>) -> Result<(), String> {
        let Some((texture, scale)) = self.texture.as_ref() else {
            return Ok(());
        };

        let mut canvas = surface.pixmap_mut().ok_or("Surface is not a packed RGBA canvas")?;
        let paint = PixmapPaint {
            quality: FilterQuality::Nearest,
            ..PixmapPaint::default()
        };
        let scale = *scale as f32;
        let transform = Transform::from_row(scale, 0.0, 0.0, scale, prop.x as f32, prop.y as f32);

        canvas.draw_pixmap(0, 0, texture.as_ref(), &paint, transform, None);
        Ok(())
    }
}

kioskd_prop_api::export_prop_plugin!(TextProp);
