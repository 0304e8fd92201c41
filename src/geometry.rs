// 该文件是 Liangfang （量房） 项目的一部分。
// src/geometry.rs - 坐标系定义与转换
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

/// 远程模型使用的归一化坐标刻度。
pub const NORM_SCALE: f32 = 1000.0;

/// 远程模型返回的归一化边界框，顺序为 [ymin, xmin, ymax, xmax]，
/// 坐标范围 0–1000。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormBox(pub [f32; 4]);

/// 原图像素坐标系下的边界框，顺序为 [x_min, y_min, x_max, y_max]。
/// 进入分割模型的边界框必须全部位于该坐标系。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelBox {
  pub xmin: f32,
  pub ymin: f32,
  pub xmax: f32,
  pub ymax: f32,
}

impl NormBox {
  /// 转换为原图像素坐标：x 分量按宽度缩放，y 分量按高度缩放，
  /// 并重排为 [x_min, y_min, x_max, y_max]。
  pub fn to_pixel(&self, width: u32, height: u32) -> PixelBox {
    let [ymin, xmin, ymax, xmax] = self.0;
    PixelBox {
      xmin: xmin / NORM_SCALE * width as f32,
      ymin: ymin / NORM_SCALE * height as f32,
      xmax: xmax / NORM_SCALE * width as f32,
      ymax: ymax / NORM_SCALE * height as f32,
    }
  }
}

impl PixelBox {
  pub fn new(xmin: f32, ymin: f32, xmax: f32, ymax: f32) -> Self {
    PixelBox {
      xmin,
      ymin,
      xmax,
      ymax,
    }
  }

  pub fn width(&self) -> f32 {
    (self.xmax - self.xmin).max(0.0)
  }

  pub fn height(&self) -> f32 {
    (self.ymax - self.ymin).max(0.0)
  }

  pub fn area(&self) -> f32 {
    self.width() * self.height()
  }

  pub fn is_well_formed(&self) -> bool {
    self.xmin <= self.xmax && self.ymin <= self.ymax
  }

  /// 按轴独立缩放，用于不同分辨率坐标系之间的换算。
  pub fn scaled(&self, sx: f32, sy: f32) -> PixelBox {
    PixelBox {
      xmin: self.xmin * sx,
      ymin: self.ymin * sy,
      xmax: self.xmax * sx,
      ymax: self.ymax * sy,
    }
  }
}

/// 两个边界框的交并比。
pub fn iou(a: &PixelBox, b: &PixelBox) -> f32 {
  let ix = (a.xmax.min(b.xmax) - a.xmin.max(b.xmin)).max(0.0);
  let iy = (a.ymax.min(b.ymax) - a.ymin.max(b.ymin)).max(0.0);
  let inter = ix * iy;
  let union = a.area() + b.area() - inter;
  if union <= 0.0 { 0.0 } else { inter / union }
}
