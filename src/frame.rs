// 该文件是 Liangfang （量房） 项目的一部分。
// src/frame.rs - 房间照片帧定义
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

use std::io::Cursor;
use std::path::Path;

use image::{ImageFormat, ImageReader, RgbImage};
use thiserror::Error;
use tracing::debug;

/// 支持上传的图像格式。
pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// 一张房间照片。整条流水线的坐标换算均以本帧的像素尺寸为准，
/// 帧内容在流水线中保持只读。
#[derive(Debug, Clone)]
pub struct RoomFrame {
  image: RgbImage,
}

#[derive(Error, Debug)]
pub enum FrameError {
  #[error("不支持的图像格式: {0}")]
  UnsupportedFormat(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
}

impl RoomFrame {
  /// 从文件读取照片，仅接受 jpg/jpeg/png。
  pub fn open(path: &Path) -> Result<Self, FrameError> {
    let ext = path
      .extension()
      .and_then(|e| e.to_str())
      .map(|e| e.to_ascii_lowercase())
      .unwrap_or_default();
    if !SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
      return Err(FrameError::UnsupportedFormat(ext));
    }

    let image = ImageReader::open(path)?.decode()?;
    debug!(
      "读取图像: {} ({}x{})",
      path.display(),
      image.width(),
      image.height()
    );

    Ok(RoomFrame {
      image: image.into(),
    })
  }

  pub fn from_image(image: RgbImage) -> Self {
    RoomFrame { image }
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  pub fn image(&self) -> &RgbImage {
    &self.image
  }

  /// 重编码为 PNG 字节流，供远程调用内联传输。
  pub fn to_png_bytes(&self) -> Result<Vec<u8>, FrameError> {
    let mut bytes = Vec::new();
    self
      .image
      .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
  }
}
