// 该文件是 Liangfang （量房） 项目的一部分。
// src/canvas.rs - 交互画布坐标映射
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use crate::geometry::PixelBox;

/// 画布默认最大显示宽度。
pub const DEFAULT_CANVAS_WIDTH: u32 = 700;

/// 用户在画布显示坐标系中画出的矩形 (left, top, width, height)。
#[derive(Debug, Clone, PartialEq)]
pub struct DrawnRect {
  pub left: f32,
  pub top: f32,
  pub width: f32,
  pub height: f32,
}

/// 画布显示几何：原图尺寸与整数化后的显示尺寸。
///
/// 原图宽度超过上限时按宽度等比缩小显示，否则原尺寸显示。
/// 逆向映射按轴使用实际显示尺寸推出的比例，两轴比例只有在
/// 宽度驱动缩放未取整误差时才恰好相等。
#[derive(Debug, Clone, Copy)]
pub struct CanvasView {
  origin_w: u32,
  origin_h: u32,
  display_w: u32,
  display_h: u32,
}

impl CanvasView {
  pub fn fit(origin_w: u32, origin_h: u32, max_width: u32) -> Self {
    let scale = if origin_w > max_width {
      max_width as f32 / origin_w as f32
    } else {
      1.0
    };
    CanvasView {
      origin_w,
      origin_h,
      display_w: (origin_w as f32 * scale) as u32,
      display_h: (origin_h as f32 * scale) as u32,
    }
  }

  pub fn display_size(&self) -> (u32, u32) {
    (self.display_w, self.display_h)
  }

  pub fn scale(&self) -> f32 {
    self.display_w as f32 / self.origin_w as f32
  }

  /// 显示坐标系矩形 → 原图像素坐标系边界框。
  pub fn to_pixel_box(&self, rect: &DrawnRect) -> PixelBox {
    let sx = self.origin_w as f32 / self.display_w as f32;
    let sy = self.origin_h as f32 / self.display_h as f32;
    PixelBox {
      xmin: rect.left * sx,
      ymin: rect.top * sy,
      xmax: (rect.left + rect.width) * sx,
      ymax: (rect.top + rect.height) * sy,
    }
  }
}

/// 画布上可能残留多个矩形，只有最后画出的矩形有效。
pub fn latest_rect(rects: &[DrawnRect]) -> Option<&DrawnRect> {
  rects.last()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn wide_image_is_scaled_down_by_width() {
    let view = CanvasView::fit(1400, 1000, 700);
    assert_eq!(view.display_size(), (700, 500));
    assert!((view.scale() - 0.5).abs() < 1e-6);
  }

  #[test]
  fn narrow_image_is_displayed_as_is() {
    let view = CanvasView::fit(500, 400, 700);
    assert_eq!(view.display_size(), (500, 400));
    assert!((view.scale() - 1.0).abs() < 1e-6);
  }

  #[test]
  fn rect_maps_back_to_pixel_space() {
    let view = CanvasView::fit(1400, 1000, 700);
    let rect = DrawnRect {
      left: 100.0,
      top: 50.0,
      width: 200.0,
      height: 100.0,
    };
    let bbox = view.to_pixel_box(&rect);
    assert_eq!(bbox, PixelBox::new(200.0, 100.0, 600.0, 300.0));
  }

  #[test]
  fn unscaled_view_maps_identically() {
    let view = CanvasView::fit(640, 480, 700);
    let rect = DrawnRect {
      left: 10.0,
      top: 20.0,
      width: 30.0,
      height: 40.0,
    };
    let bbox = view.to_pixel_box(&rect);
    assert_eq!(bbox, PixelBox::new(10.0, 20.0, 40.0, 60.0));
  }

  #[test]
  fn only_last_rect_is_authoritative() {
    let rects = vec![
      DrawnRect {
        left: 0.0,
        top: 0.0,
        width: 1.0,
        height: 1.0,
      },
      DrawnRect {
        left: 5.0,
        top: 6.0,
        width: 7.0,
        height: 8.0,
      },
    ];
    assert_eq!(latest_rect(&rects), Some(&rects[1]));
    assert_eq!(latest_rect(&[]), None);
  }
}
