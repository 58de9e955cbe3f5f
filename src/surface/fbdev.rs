/*
 *  surface/fbdev.rs
 *
 *  kioskd - the show must go on
 *  (c) 2020-26 Stuart Hunter
 *
 *  Linux framebuffer presenter
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

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use log::{debug, info};
use memmap2::{MmapMut, MmapOptions};

use super::{Presenter, Surface, SurfaceError};

/// Geometry of a framebuffer device as sysfs reports it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FbGeometry {
    pub width: u32,
    pub height: u32,
    pub bits_per_pixel: u32,
    /// Bytes per row
    pub stride: u32,
}

impl FbGeometry {
    /// Read `/sys/class/graphics/<fbN>/` for a device such as `/dev/fb0`
    pub fn from_sysfs(device: &Path) -> Result<Self, SurfaceError> {
        let node = device
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| SurfaceError::Device(format!("not a framebuffer device: {}", device.display())))?;
        let sysfs = PathBuf::from("/sys/class/graphics").join(node);

        let read = |attr: &str| -> Result<String, SurfaceError> {
            Ok(fs::read_to_string(sysfs.join(attr))?.trim().to_string())
        };

        let (width, height) = parse_virtual_size(&read("virtual_size")?)
            .ok_or_else(|| SurfaceError::Device(format!("bad virtual_size for {}", node)))?;
        let bits_per_pixel = read("bits_per_pixel")?
            .parse()
            .map_err(|_| SurfaceError::Device(format!("bad bits_per_pixel for {}", node)))?;
        let stride = read("stride")?
            .parse()
            .map_err(|_| SurfaceError::Device(format!("bad stride for {}", node)))?;

        Self::checked(width, height, bits_per_pixel, stride)
            .map_err(|e| SurfaceError::Device(format!("{} for {}", e, node)))
    }

    /// Reject geometry the blitters cannot write into: every row must fit
    /// inside the stride.
    pub fn checked(width: u32, height: u32, bits_per_pixel: u32, stride: u32) -> Result<Self, String> {
        if width == 0 || height == 0 {
            return Err(format!("empty framebuffer {}x{}", width, height));
        }

        let row_bytes = width
            .checked_mul(bits_per_pixel.div_ceil(8))
            .ok_or_else(|| format!("row of {} pixels at {} bpp overflows", width, bits_per_pixel))?;
        if stride < row_bytes {
            return Err(format!("stride {} shorter than a {} byte row", stride, row_bytes));
        }

        Ok(Self { width, height, bits_per_pixel, stride })
    }
}

/// Parse sysfs `virtual_size`, e.g. `1920,1080`
pub fn parse_virtual_size(s: &str) -> Option<(u32, u32)> {
    let (w, h) = s.trim().split_once(',')?;
    Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
}

/// Copy premultiplied RGBA into XRGB8888 (little endian B, G, R, X).
///
/// Premultiplied channels are exactly the frame composited over black.
pub fn blit_xrgb8888(src: &[u8], src_width: u32, src_height: u32, dst: &mut [u8], fb: &FbGeometry) {
    let cols = src_width.min(fb.width) as usize;
    let rows = src_height.min(fb.height) as usize;

    for y in 0..rows {
        let src_row = &src[y * src_width as usize * 4..][..cols * 4];
        let dst_row = &mut dst[y * fb.stride as usize..][..cols * 4];

        for (s, d) in src_row.chunks_exact(4).zip(dst_row.chunks_exact_mut(4)) {
            d[0] = s[2];
            d[1] = s[1];
            d[2] = s[0];
            d[3] = 0xff;
        }
    }
}

/// Copy premultiplied RGBA into RGB565 (little endian)
pub fn blit_rgb565(src: &[u8], src_width: u32, src_height: u32, dst: &mut [u8], fb: &FbGeometry) {
    let cols = src_width.min(fb.width) as usize;
    let rows = src_height.min(fb.height) as usize;

    for y in 0..rows {
        let src_row = &src[y * src_width as usize * 4..][..cols * 4];
        let dst_row = &mut dst[y * fb.stride as usize..][..cols * 2];

        for (s, d) in src_row.chunks_exact(4).zip(dst_row.chunks_exact_mut(2)) {
            let pixel = ((s[0] as u16 >> 3) << 11) | ((s[1] as u16 >> 2) << 5) | (s[2] as u16 >> 3);
            d.copy_from_slice(&pixel.to_le_bytes());
        }
    }
}

/// Presents frames by writing straight into a memory-mapped `/dev/fbN`
pub struct FbdevPresenter {
    device: PathBuf,
    geometry: FbGeometry,
    mmap: MmapMut,
}

impl FbdevPresenter {
    pub fn open(device: &Path) -> Result<Self, SurfaceError> {
        let geometry = FbGeometry::from_sysfs(device)?;
        match geometry.bits_per_pixel {
            16 | 32 => {}
            other => return Err(SurfaceError::UnsupportedDepth(other)),
        }

        let file = OpenOptions::new().read(true).write(true).open(device)?;
        let len = geometry.stride as usize * geometry.height as usize;
        let mmap = unsafe { MmapOptions::new().len(len).map_mut(&file)? };

        info!(
            "Framebuffer {} is {}x{} at {} bpp",
            device.display(),
            geometry.width,
            geometry.height,
            geometry.bits_per_pixel
        );

        Ok(Self {
            device: device.to_path_buf(),
            geometry,
            mmap,
        })
    }

    pub fn geometry(&self) -> FbGeometry {
        self.geometry
    }
}

impl Presenter for FbdevPresenter {
    fn name(&self) -> &str {
        "fbdev"
    }

    fn present(&mut self, surface: &Surface) -> Result<(), SurfaceError> {
        let src = surface.pixmap().data();
        match self.geometry.bits_per_pixel {
            32 => blit_xrgb8888(src, surface.width(), surface.height(), &mut self.mmap, &self.geometry),
            16 => blit_rgb565(src, surface.width(), surface.height(), &mut self.mmap, &self.geometry),
            other => return Err(SurfaceError::UnsupportedDepth(other)),
        }
        Ok(())
    }
}

impl Drop for FbdevPresenter {
    fn drop(&mut self) {
        debug!("Releasing framebuffer {}", self.device.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_virtual_size() {
        assert_eq!(parse_virtual_size("1920,1080\n"), Some((1920, 1080)));
        assert_eq!(parse_virtual_size("800, 480"), Some((800, 480)));
        assert_eq!(parse_virtual_size("800x480"), None);
        assert_eq!(parse_virtual_size(""), None);
    }

    #[test]
    fn test_geometry_stride_checked() {
        let fb = FbGeometry::checked(800, 480, 32, 3200).unwrap();
        assert_eq!(fb.stride, 3200);
        assert!(FbGeometry::checked(800, 480, 16, 1600).is_ok());

        assert!(FbGeometry::checked(800, 480, 32, 1600).is_err());
        assert!(FbGeometry::checked(800, 480, 16, 1599).is_err());
        assert!(FbGeometry::checked(0, 480, 32, 3200).is_err());
        assert!(FbGeometry::checked(u32::MAX, 1, 32, u32::MAX).is_err());
    }

    #[test]
    fn test_blit_xrgb8888_swaps_and_pads() {
        // 2x1 source into a 3x1 device with a padded stride
        let src = [10, 20, 30, 255, 1, 2, 3, 255];
        let fb = FbGeometry { width: 3, height: 1, bits_per_pixel: 32, stride: 16 };
        let mut dst = vec![0u8; 16];

        blit_xrgb8888(&src, 2, 1, &mut dst, &fb);

        assert_eq!(&dst[..8], &[30, 20, 10, 255, 3, 2, 1, 255]);
        assert_eq!(&dst[8..], &[0; 8]);
    }

    #[test]
    fn test_blit_clips_to_device() {
        let src = vec![255u8; 4 * 4 * 4];
        let fb = FbGeometry { width: 2, height: 2, bits_per_pixel: 32, stride: 8 };
        let mut dst = vec![0u8; 16];

        blit_xrgb8888(&src, 4, 4, &mut dst, &fb);
        assert!(dst.iter().all(|&b| b == 255));
    }

    #[test]
    fn test_blit_rgb565() {
        let src = [255, 0, 0, 255, 0, 255, 0, 255, 0, 0, 255, 255];
        let fb = FbGeometry { width: 3, height: 1, bits_per_pixel: 16, stride: 6 };
        let mut dst = vec![0u8; 6];

        blit_rgb565(&src, 3, 1, &mut dst, &fb);

        assert_eq!(u16::from_le_bytes([dst[0], dst[1]]), 0xf800);
        assert_eq!(u16::from_le_bytes([dst[2], dst[3]]), 0x07e0);
        assert_eq!(u16::from_le_bytes([dst[4], dst[5]]), 0x001f);
    }
}
