// 该文件是 Liangfang （量房） 项目的一部分。
// src/model.rs - 分割模型
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

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use clap::ValueEnum;
use image::GrayImage;

use crate::detect::DetectedRegion;
use crate::frame::RoomFrame;
use crate::geometry::PixelBox;

/// 分割精度选择：两种权重只有文件名不同。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum Precision {
  /// 高速（权重小、掩码较粗）
  Fast,
  /// 高精度（权重大、掩码更细）
  Accurate,
}

impl Precision {
  pub fn weight_file(&self) -> &'static str {
    match self {
      Precision::Fast => "FastSAM-s.onnx",
      Precision::Accurate => "FastSAM-x.onnx",
    }
  }

  pub fn describe(&self) -> &'static str {
    match self {
      Precision::Fast => "高速",
      Precision::Accurate => "高精度",
    }
  }
}

/// 一块表面的分割结果：标签、提示框与原图分辨率的二值掩码。
#[derive(Debug, Clone)]
pub struct MaskRegion {
  pub label: String,
  pub bbox: PixelBox,
  pub mask: GrayImage,
}

impl MaskRegion {
  /// 掩码中被标记的像素数。
  pub fn coverage(&self) -> usize {
    self.mask.pixels().filter(|p| p[0] > 0).count()
  }
}

/// 一次分割调用的完整输出，生存期只有一个请求/应答周期。
#[derive(Debug, Clone)]
pub struct SegmentResult {
  pub regions: Vec<MaskRegion>,
}

impl SegmentResult {
  pub fn is_empty(&self) -> bool {
    self.regions.is_empty()
  }
}

/// 分割模型的统一入口：一次调用处理一张图与全部提示框。
/// 提示框必须位于原图像素坐标系。
pub trait SegmentModel {
  type Error: std::error::Error + Send + Sync + 'static;

  fn segment(
    &self,
    frame: &RoomFrame,
    regions: &[DetectedRegion],
  ) -> Result<SegmentResult, Self::Error>;
}

/// 按精度键缓存模型句柄的注册表。
///
/// 锁覆盖整个构建过程：同一精度的并发调用会阻塞在同一次
/// 在途加载上，而不是重复加载权重。句柄构建后只读，
/// 与进程同寿。
pub struct ModelRegistry<M, E> {
  load: Box<dyn Fn(Precision) -> Result<M, E> + Send + Sync>,
  cache: Mutex<HashMap<Precision, Arc<M>>>,
}

impl<M, E> ModelRegistry<M, E> {
  pub fn new(load: impl Fn(Precision) -> Result<M, E> + Send + Sync + 'static) -> Self {
    ModelRegistry {
      load: Box::new(load),
      cache: Mutex::new(HashMap::new()),
    }
  }

  /// 返回缓存的句柄，首次调用时构建。
  pub fn get(&self, precision: Precision) -> Result<Arc<M>, E> {
    let mut cache = self.cache.lock().expect("模型注册表锁中毒");
    if let Some(model) = cache.get(&precision) {
      return Ok(model.clone());
    }
    let model = Arc::new((self.load)(precision)?);
    cache.insert(precision, model.clone());
    Ok(model)
  }
}

mod fastsam;
pub use self::fastsam::{FastSam, FastSamBuilder, FastSamError};

#[cfg(test)]
mod tests {
  use std::convert::Infallible;
  use std::sync::atomic::{AtomicUsize, Ordering};

  use super::*;

  #[test]
  fn registry_loads_once_per_precision() {
    let loads = Arc::new(AtomicUsize::new(0));
    let counter = loads.clone();
    let registry: ModelRegistry<Precision, Infallible> = ModelRegistry::new(move |p| {
      counter.fetch_add(1, Ordering::SeqCst);
      Ok(p)
    });

    let a = registry.get(Precision::Fast).unwrap();
    let b = registry.get(Precision::Fast).unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(loads.load(Ordering::SeqCst), 1);

    registry.get(Precision::Accurate).unwrap();
    assert_eq!(loads.load(Ordering::SeqCst), 2);
  }

  #[test]
  fn registry_propagates_load_failure() {
    let registry: ModelRegistry<Precision, String> =
      ModelRegistry::new(|_| Err("权重文件缺失".to_string()));
    assert!(registry.get(Precision::Fast).is_err());
  }

  #[test]
  fn precision_weight_files_differ_only_by_name() {
    assert_ne!(
      Precision::Fast.weight_file(),
      Precision::Accurate.weight_file()
    );
  }
}
