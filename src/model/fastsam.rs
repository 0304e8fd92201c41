// 该文件是 Liangfang （量房） 项目的一部分。
// src/model/fastsam.rs - FastSAM 分割模型
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

use std::path::PathBuf;
use std::sync::Mutex;

use image::GrayImage;
use image::imageops::FilterType;
use ndarray::Array;
use ort::session::Session;
use ort::value::TensorRef;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::detect::DetectedRegion;
use crate::frame::RoomFrame;
use crate::geometry::{PixelBox, iou};
use crate::model::{MaskRegion, SegmentModel, SegmentResult};

/// 模型输入边长，RGB CHW。
const FASTSAM_INPUT_SIZE: u32 = 1024;
/// 输入张量名。
const FASTSAM_INPUT_NAME: &str = "images";
/// 候选张量每锚点的通道数: 4 box + 1 conf + 32 掩码系数。
const FASTSAM_CAND_CHANNELS: usize = 37;
const FASTSAM_COEFF_OFFSET: usize = 5;
const FASTSAM_CONF_CHANNEL: usize = 4;
/// 候选置信度阈值。
const FASTSAM_CONF_THRESH: f32 = 0.4;
/// 掩码二值化阈值（sigmoid 之后）。
const FASTSAM_MASK_THRESH: f32 = 0.5;

pub struct FastSamBuilder {
  model_path: PathBuf,
  intra_threads: usize,
}

#[derive(Error, Debug)]
pub enum FastSamError {
  #[error("模型权重文件不存在: {}", .0.display())]
  WeightMissing(PathBuf),
  #[error("ONNX Runtime 错误: {0}")]
  Ort(#[from] ort::Error),
  #[error("模型输出异常: {0}")]
  BadOutput(String),
}

impl FastSamBuilder {
  pub fn new(model_path: impl Into<PathBuf>) -> Self {
    FastSamBuilder {
      model_path: model_path.into(),
      intra_threads: 4,
    }
  }

  pub fn intra_threads(mut self, intra_threads: usize) -> Self {
    self.intra_threads = intra_threads;
    self
  }

  pub fn build(self) -> Result<FastSam, FastSamError> {
    if !self.model_path.is_file() {
      return Err(FastSamError::WeightMissing(self.model_path));
    }

    info!("加载分割模型: {}", self.model_path.display());
    if let Ok(meta) = std::fs::metadata(&self.model_path) {
      debug!(
        "权重文件大小: {:.2} MB",
        meta.len() as f64 / (1024.0 * 1024.0)
      );
    }

    let session = Session::builder()?
      .with_intra_threads(self.intra_threads)?
      .commit_from_file(&self.model_path)?;
    info!("分割模型加载完成");

    Ok(FastSam {
      session: Mutex::new(session),
    })
  }
}

/// FastSAM 推理句柄。整图分割一次完成，提示框用于在候选中
/// 挑选掩码，因此一次调用即可服务任意数量的提示框。
pub struct FastSam {
  session: Mutex<Session>,
}

impl SegmentModel for FastSam {
  type Error = FastSamError;

  fn segment(
    &self,
    frame: &RoomFrame,
    regions: &[DetectedRegion],
  ) -> Result<SegmentResult, Self::Error> {
    let (width, height) = (frame.width(), frame.height());
    let size = FASTSAM_INPUT_SIZE as usize;

    // 预处理: 缩放到模型输入边长，CHW, [0,1]
    let resized = image::imageops::resize(
      frame.image(),
      FASTSAM_INPUT_SIZE,
      FASTSAM_INPUT_SIZE,
      FilterType::Triangle,
    );
    let mut input = Array::zeros((1, 3, size, size));
    for y in 0..size {
      for x in 0..size {
        let pixel = resized.get_pixel(x as u32, y as u32);
        input[[0, 0, y, x]] = pixel[0] as f32 / 255.0;
        input[[0, 1, y, x]] = pixel[1] as f32 / 255.0;
        input[[0, 2, y, x]] = pixel[2] as f32 / 255.0;
      }
    }

    debug!("执行分割模型推理");
    let now = std::time::Instant::now();
    let (cand_dims, cand, proto_dims, protos) = {
      let mut session = self.session.lock().expect("分割模型会话锁中毒");
      let input_tensor = TensorRef::from_array_view(&input)?;
      let outputs = session.run(ort::inputs![FASTSAM_INPUT_NAME => input_tensor])?;

      // 候选张量 [1, C, N]，原型张量 [1, 32, H', W']，按维数识别
      let mut cand: Option<(Vec<usize>, Vec<f32>)> = None;
      let mut proto: Option<(Vec<usize>, Vec<f32>)> = None;
      for (name, value) in outputs.iter() {
        let Ok((shape, data)) = value.try_extract_tensor::<f32>() else {
          continue;
        };
        let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
        debug!("模型输出 '{}': {:?}", name, dims);
        match dims.len() {
          3 if cand.is_none() => cand = Some((dims, data.to_vec())),
          4 if proto.is_none() => proto = Some((dims, data.to_vec())),
          _ => {}
        }
      }

      let (cand_dims, cand) =
        cand.ok_or_else(|| FastSamError::BadOutput("缺少候选张量".to_string()))?;
      let (proto_dims, protos) =
        proto.ok_or_else(|| FastSamError::BadOutput("缺少掩码原型张量".to_string()))?;
      (cand_dims, cand, proto_dims, protos)
    };
    debug!("推理完成，耗时: {:.2?}", now.elapsed());

    let [_, channels, anchors] = cand_dims[..] else {
      return Err(FastSamError::BadOutput(format!(
        "候选张量形状异常: {cand_dims:?}"
      )));
    };
    if channels != FASTSAM_CAND_CHANNELS {
      return Err(FastSamError::BadOutput(format!(
        "预期候选通道数为 {FASTSAM_CAND_CHANNELS}, 实际为 {channels}"
      )));
    }
    let [_, proto_channels, proto_h, proto_w] = proto_dims[..] else {
      return Err(FastSamError::BadOutput(format!(
        "原型张量形状异常: {proto_dims:?}"
      )));
    };
    if proto_channels != channels - FASTSAM_COEFF_OFFSET {
      return Err(FastSamError::BadOutput(format!(
        "掩码系数与原型通道不匹配: {} vs {}",
        channels - FASTSAM_COEFF_OFFSET,
        proto_channels
      )));
    }

    // 提示框从原图像素坐标换算到模型输入坐标
    let sx = FASTSAM_INPUT_SIZE as f32 / width as f32;
    let sy = FASTSAM_INPUT_SIZE as f32 / height as f32;

    let mut result = Vec::with_capacity(regions.len());
    for region in regions {
      let prompt = region.bbox.scaled(sx, sy);
      let mask = match best_candidate(&cand, anchors, &prompt, FASTSAM_CONF_THRESH) {
        Some((index, overlap)) => {
          debug!(
            "提示框 '{}' 命中候选 {} (IoU {:.3})",
            region.label, index, overlap
          );
          let coeffs = candidate_coeffs(&cand, anchors, index);
          let proto_mask = combine_mask(
            &coeffs,
            &protos,
            proto_h,
            proto_w,
            FASTSAM_MASK_THRESH,
          );
          let mut mask =
            image::imageops::resize(&proto_mask, width, height, FilterType::Nearest);
          clip_to_box(&mut mask, &region.bbox);
          mask
        }
        None => {
          warn!("提示框 '{}' 没有匹配的候选，返回空掩码", region.label);
          GrayImage::new(width, height)
        }
      };

      result.push(MaskRegion {
        label: region.label.clone(),
        bbox: region.bbox,
        mask,
      });
    }

    Ok(SegmentResult { regions: result })
  }
}

/// 候选张量按通道优先排布: 值 [c, i] 位于 c * anchors + i。
fn candidate_box(cand: &[f32], anchors: usize, index: usize) -> PixelBox {
  let cx = cand[index];
  let cy = cand[anchors + index];
  let cw = cand[2 * anchors + index];
  let ch = cand[3 * anchors + index];
  PixelBox {
    xmin: cx - cw / 2.0,
    ymin: cy - ch / 2.0,
    xmax: cx + cw / 2.0,
    ymax: cy + ch / 2.0,
  }
}

fn candidate_coeffs(cand: &[f32], anchors: usize, index: usize) -> Vec<f32> {
  (0..FASTSAM_CAND_CHANNELS - FASTSAM_COEFF_OFFSET)
    .map(|c| cand[(FASTSAM_COEFF_OFFSET + c) * anchors + index])
    .collect()
}

/// 在置信度过关的候选中挑选与提示框 IoU 最大者。
/// 没有任何重叠候选时返回 None。
fn best_candidate(
  cand: &[f32],
  anchors: usize,
  prompt: &PixelBox,
  conf_thresh: f32,
) -> Option<(usize, f32)> {
  let mut best: Option<(usize, f32)> = None;
  for index in 0..anchors {
    let conf = cand[FASTSAM_CONF_CHANNEL * anchors + index];
    if conf < conf_thresh {
      continue;
    }
    let overlap = iou(&candidate_box(cand, anchors, index), prompt);
    if overlap <= 0.0 {
      continue;
    }
    if best.map(|(_, b)| overlap > b).unwrap_or(true) {
      best = Some((index, overlap));
    }
  }
  best
}

/// 掩码系数与原型做线性组合，sigmoid 后按阈值二值化。
/// 原型张量排布为 [c, y, x]，输出为原型分辨率的灰度掩码。
fn combine_mask(
  coeffs: &[f32],
  protos: &[f32],
  proto_h: usize,
  proto_w: usize,
  thresh: f32,
) -> GrayImage {
  let plane = proto_h * proto_w;
  let mut mask = GrayImage::new(proto_w as u32, proto_h as u32);
  for y in 0..proto_h {
    for x in 0..proto_w {
      let offset = y * proto_w + x;
      let logit: f32 = coeffs
        .iter()
        .enumerate()
        .map(|(c, k)| k * protos[c * plane + offset])
        .sum();
      if sigmoid(logit) > thresh {
        mask.put_pixel(x as u32, y as u32, image::Luma([255u8]));
      }
    }
  }
  mask
}

/// 提示框之外的掩码像素清零。
fn clip_to_box(mask: &mut GrayImage, bbox: &PixelBox) {
  let (w, h) = mask.dimensions();
  for y in 0..h {
    for x in 0..w {
      let inside = (x as f32) >= bbox.xmin.floor()
        && (x as f32) <= bbox.xmax.ceil()
        && (y as f32) >= bbox.ymin.floor()
        && (y as f32) <= bbox.ymax.ceil();
      if !inside {
        mask.put_pixel(x, y, image::Luma([0u8]));
      }
    }
  }
}

fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
  use super::*;

  // 构造 [1, 37, N] 通道优先候选张量
  fn cand_tensor(candidates: &[(PixelBox, f32, [f32; 32])]) -> (Vec<f32>, usize) {
    let anchors = candidates.len();
    let mut cand = vec![0.0f32; FASTSAM_CAND_CHANNELS * anchors];
    for (i, (bbox, conf, coeffs)) in candidates.iter().enumerate() {
      cand[i] = (bbox.xmin + bbox.xmax) / 2.0;
      cand[anchors + i] = (bbox.ymin + bbox.ymax) / 2.0;
      cand[2 * anchors + i] = bbox.width();
      cand[3 * anchors + i] = bbox.height();
      cand[FASTSAM_CONF_CHANNEL * anchors + i] = *conf;
      for (c, k) in coeffs.iter().enumerate() {
        cand[(FASTSAM_COEFF_OFFSET + c) * anchors + i] = *k;
      }
    }
    (cand, anchors)
  }

  #[test]
  fn best_candidate_prefers_highest_iou() {
    let prompt = PixelBox::new(0.0, 0.0, 100.0, 100.0);
    let (cand, anchors) = cand_tensor(&[
      (PixelBox::new(0.0, 0.0, 50.0, 50.0), 0.9, [0.0; 32]),
      (PixelBox::new(0.0, 0.0, 100.0, 100.0), 0.9, [0.0; 32]),
      (PixelBox::new(200.0, 200.0, 300.0, 300.0), 0.9, [0.0; 32]),
    ]);
    let (index, overlap) = best_candidate(&cand, anchors, &prompt, 0.4).unwrap();
    assert_eq!(index, 1);
    assert!((overlap - 1.0).abs() < 1e-6);
  }

  #[test]
  fn best_candidate_skips_low_confidence() {
    let prompt = PixelBox::new(0.0, 0.0, 100.0, 100.0);
    let (cand, anchors) = cand_tensor(&[
      (PixelBox::new(0.0, 0.0, 100.0, 100.0), 0.1, [0.0; 32]),
      (PixelBox::new(0.0, 0.0, 50.0, 50.0), 0.9, [0.0; 32]),
    ]);
    let (index, _) = best_candidate(&cand, anchors, &prompt, 0.4).unwrap();
    assert_eq!(index, 1);
  }

  #[test]
  fn best_candidate_requires_overlap() {
    let prompt = PixelBox::new(0.0, 0.0, 10.0, 10.0);
    let (cand, anchors) = cand_tensor(&[(
      PixelBox::new(500.0, 500.0, 600.0, 600.0),
      0.9,
      [0.0; 32],
    )]);
    assert!(best_candidate(&cand, anchors, &prompt, 0.4).is_none());
  }

  #[test]
  fn candidate_coeffs_follow_channel_major_layout() {
    let mut coeffs = [0.0f32; 32];
    for (c, k) in coeffs.iter_mut().enumerate() {
      *k = c as f32;
    }
    let (cand, anchors) = cand_tensor(&[
      (PixelBox::new(0.0, 0.0, 1.0, 1.0), 0.9, [9.0; 32]),
      (PixelBox::new(0.0, 0.0, 1.0, 1.0), 0.9, coeffs),
    ]);
    let extracted = candidate_coeffs(&cand, anchors, 1);
    assert_eq!(extracted.len(), 32);
    assert_eq!(extracted[0], 0.0);
    assert_eq!(extracted[31], 31.0);
  }

  #[test]
  fn combine_mask_thresholds_at_logit_zero() {
    // 两个原型通道，2x2 平面
    let protos = vec![
      1.0, -1.0, 1.0, -1.0, // 通道 0
      1.0, 1.0, -1.0, -1.0, // 通道 1
    ];
    let mask = combine_mask(&[1.0, 0.5], &protos, 2, 2, 0.5);
    // logit: [1.5, -0.5, 0.5, -1.5]
    assert_eq!(mask.get_pixel(0, 0)[0], 255);
    assert_eq!(mask.get_pixel(1, 0)[0], 0);
    assert_eq!(mask.get_pixel(0, 1)[0], 255);
    assert_eq!(mask.get_pixel(1, 1)[0], 0);
  }

  #[test]
  fn clip_to_box_zeroes_outside() {
    let mut mask = GrayImage::from_pixel(10, 10, image::Luma([255u8]));
    clip_to_box(&mut mask, &PixelBox::new(2.0, 2.0, 5.0, 5.0));
    assert_eq!(mask.get_pixel(0, 0)[0], 0);
    assert_eq!(mask.get_pixel(3, 3)[0], 255);
    assert_eq!(mask.get_pixel(9, 9)[0], 0);
  }
}
