// 该文件是 Liangfang （量房） 项目的一部分。
// src/output/draw.rs - 分割结果可视化
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use tracing::debug;

use crate::frame::RoomFrame;
use crate::model::{MaskRegion, SegmentResult};

/// 三类表面的固定配色。
pub const SURFACE_COLORS: [(&str, [u8; 3]); 3] = [
  ("Ceiling", [66, 135, 245]),
  ("Wall", [76, 175, 80]),
  ("Floor", [255, 152, 0]),
];

/// 掩码叠加不透明度。
const MASK_ALPHA: f32 = 0.45;
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_TEXT_HEIGHT: i32 = 24;

/// 常见系统字体位置。包里不带字体文件，找不到就只画框不写字。
const FONT_CANDIDATES: [&str; 4] = [
  "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
  "/usr/share/fonts/TTF/DejaVuSans.ttf",
  "/System/Library/Fonts/Supplemental/Arial.ttf",
  "C:\\Windows\\Fonts\\arial.ttf",
];

/// 可视化工具：把掩码、边界框与标签合成到原图上。
pub struct OverlayDraw {
  font: Option<FontArc>,
  font_scale: PxScale,
}

impl Default for OverlayDraw {
  fn default() -> Self {
    let font = load_system_font();
    if font.is_none() {
      debug!("没有找到可用字体，结果图不绘制标签文字");
    }
    OverlayDraw {
      font,
      font_scale: PxScale::from(LABEL_FONT_SIZE),
    }
  }
}

fn load_system_font() -> Option<FontArc> {
  for path in FONT_CANDIDATES {
    if let Ok(bytes) = std::fs::read(path)
      && let Ok(font) = FontArc::try_from_vec(bytes)
    {
      debug!("使用字体: {}", path);
      return Some(font);
    }
  }
  None
}

impl OverlayDraw {
  /// 合成叠加图：逐区域着色掩码、描边、写标签。
  pub fn render(&self, frame: &RoomFrame, result: &SegmentResult) -> RgbImage {
    let mut image = frame.image().clone();
    for (index, region) in result.regions.iter().enumerate() {
      let color = surface_color(&region.label, index);
      blend_mask(&mut image, region, color);
      draw_region_box(&mut image, region, color);
      if let Some(font) = &self.font {
        let x = region.bbox.xmin.max(0.0) as i32;
        let y = (region.bbox.ymin as i32 - LABEL_TEXT_HEIGHT).max(0);
        draw_text_mut(
          &mut image,
          color,
          x,
          y,
          self.font_scale,
          font,
          &region.label,
        );
      }
    }
    image
  }
}

/// 固定配色查表，未知标签按序号从色环取色。
fn surface_color(label: &str, index: usize) -> Rgb<u8> {
  for (name, rgb) in SURFACE_COLORS {
    if label.eq_ignore_ascii_case(name) {
      return Rgb(rgb);
    }
  }
  let hue = (index as f32 * 77.0) % 360.0;
  hsv_to_rgb(hue, 0.8, 0.9)
}

/// HSV 转 RGB
fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
  let c = v * s;
  let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
  let m = v - c;

  let (r, g, b) = if h < 60.0 {
    (c, x, 0.0)
  } else if h < 120.0 {
    (x, c, 0.0)
  } else if h < 180.0 {
    (0.0, c, x)
  } else if h < 240.0 {
    (0.0, x, c)
  } else if h < 300.0 {
    (x, 0.0, c)
  } else {
    (c, 0.0, x)
  };

  Rgb([
    ((r + m) * 255.0) as u8,
    ((g + m) * 255.0) as u8,
    ((b + m) * 255.0) as u8,
  ])
}

/// 掩码命中的像素与底图按固定不透明度混合。
fn blend_mask(image: &mut RgbImage, region: &MaskRegion, color: Rgb<u8>) {
  let (w, h) = image.dimensions();
  let (mw, mh) = region.mask.dimensions();
  for y in 0..h.min(mh) {
    for x in 0..w.min(mw) {
      if region.mask.get_pixel(x, y)[0] == 0 {
        continue;
      }
      let pixel = image.get_pixel_mut(x, y);
      for c in 0..3 {
        pixel[c] =
          (pixel[c] as f32 * (1.0 - MASK_ALPHA) + color[c] as f32 * MASK_ALPHA) as u8;
      }
    }
  }
}

/// 边界框描边（双线加粗，与掩码同色）。
fn draw_region_box(image: &mut RgbImage, region: &MaskRegion, color: Rgb<u8>) {
  let x = region.bbox.xmin.max(0.0) as i32;
  let y = region.bbox.ymin.max(0.0) as i32;
  let width = region
    .bbox
    .width()
    .min(image.width() as f32 - region.bbox.xmin.max(0.0)) as u32;
  let height = region
    .bbox
    .height()
    .min(image.height() as f32 - region.bbox.ymin.max(0.0)) as u32;

  if width == 0 || height == 0 {
    return;
  }

  let rect = Rect::at(x, y).of_size(width, height);
  draw_hollow_rect_mut(image, rect, color);
  if width > 2 && height > 2 {
    let inner = Rect::at(x + 1, y + 1).of_size(width - 2, height - 2);
    draw_hollow_rect_mut(image, inner, color);
  }
}

#[cfg(test)]
mod tests {
  use image::GrayImage;

  use super::*;
  use crate::geometry::PixelBox;

  #[test]
  fn known_labels_use_fixed_palette() {
    assert_eq!(surface_color("Floor", 7), Rgb([255, 152, 0]));
    assert_eq!(surface_color("ceiling", 0), Rgb([66, 135, 245]));
  }

  #[test]
  fn unknown_labels_get_distinct_colors() {
    assert_ne!(surface_color("Manual", 0), surface_color("Manual", 1));
  }

  #[test]
  fn blend_only_touches_masked_pixels() {
    let mut image = RgbImage::from_pixel(4, 4, Rgb([0, 0, 0]));
    let mut mask = GrayImage::new(4, 4);
    mask.put_pixel(1, 1, image::Luma([255]));
    let region = MaskRegion {
      label: "Wall".to_string(),
      bbox: PixelBox::new(0.0, 0.0, 4.0, 4.0),
      mask,
    };
    blend_mask(&mut image, &region, Rgb([200, 100, 50]));
    assert_eq!(*image.get_pixel(0, 0), Rgb([0, 0, 0]));
    assert_ne!(*image.get_pixel(1, 1), Rgb([0, 0, 0]));
  }

  #[test]
  fn render_keeps_image_dimensions() {
    let frame = crate::frame::RoomFrame::from_image(RgbImage::new(32, 16));
    let result = SegmentResult {
      regions: vec![MaskRegion {
        label: "Floor".to_string(),
        bbox: PixelBox::new(2.0, 2.0, 30.0, 14.0),
        mask: GrayImage::from_pixel(32, 16, image::Luma([255])),
      }],
    };
    let draw = OverlayDraw::default();
    let rendered = draw.render(&frame, &result);
    assert_eq!(rendered.dimensions(), (32, 16));
  }
}
