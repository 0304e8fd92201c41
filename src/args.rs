// 该文件是 Liangfang （量房） 项目的一部分。
// src/args.rs - 项目参数配置
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use liangfang::canvas::DrawnRect;
use liangfang::model::Precision;
use liangfang::workflow::RetriggerPolicy;

/// Liangfang 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 房间照片路径 (jpg/jpeg/png)
  #[arg(long, value_name = "FILE")]
  pub image: PathBuf,

  /// 结果图像输出路径
  #[arg(long, value_name = "OUTPUT")]
  pub output: PathBuf,

  /// 工作流: auto 走远程检测, manual 直接分割画出的矩形
  #[arg(long, value_enum, default_value = "auto")]
  pub mode: Mode,

  /// 远程服务 API Key (自动模式必需)
  #[arg(long, value_name = "KEY")]
  pub api_key: Option<String>,

  /// 远程模型标识 (缺省时自动选择 flash 系模型)
  #[arg(long, value_name = "MODEL")]
  pub remote_model: Option<String>,

  /// 分割精度
  #[arg(long, value_enum, default_value = "fast")]
  pub precision: Precision,

  /// 分割模型权重所在目录
  #[arg(long, value_name = "DIR", default_value = ".")]
  pub weights_dir: PathBuf,

  /// 手动模式的矩形, 画布显示坐标系: left,top,width,height
  #[arg(long, value_name = "RECT")]
  pub rect: Option<String>,

  /// 画布最大显示宽度
  #[arg(long, value_name = "WIDTH", default_value = "700")]
  pub canvas_width: u32,

  /// 手动模式重新分割策略
  #[arg(long, value_enum, default_value = "always")]
  pub retrigger: RetriggerPolicy,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
  Auto,
  Manual,
}

/// 解析 "left,top,width,height" 形式的矩形参数。
pub fn parse_rect(raw: &str) -> Result<DrawnRect, String> {
  let parts: Vec<f32> = raw
    .split(',')
    .map(|part| part.trim().parse::<f32>())
    .collect::<Result<_, _>>()
    .map_err(|e| format!("矩形参数解析失败: {e}"))?;
  let [left, top, width, height] = parts[..] else {
    return Err(format!(
      "矩形参数必须是 left,top,width,height 四个数, 实际 {} 个",
      parts.len()
    ));
  };
  Ok(DrawnRect {
    left,
    top,
    width,
    height,
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parse_rect_accepts_four_numbers() {
    let rect = parse_rect("100, 50, 200, 100").unwrap();
    assert_eq!(
      rect,
      DrawnRect {
        left: 100.0,
        top: 50.0,
        width: 200.0,
        height: 100.0,
      }
    );
  }

  #[test]
  fn parse_rect_rejects_wrong_arity() {
    assert!(parse_rect("1,2,3").is_err());
    assert!(parse_rect("1,2,3,4,5").is_err());
  }

  #[test]
  fn parse_rect_rejects_non_numbers() {
    assert!(parse_rect("a,b,c,d").is_err());
  }
}
