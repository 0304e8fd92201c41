// 该文件是 Liangfang （量房） 项目的一部分。
// src/bin/simple_detect.rs - 远程检测测试代码
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use liangfang::detect::{Detect, GeminiClient, GeminiDetector};
use liangfang::frame::RoomFrame;

/// 只跑远程检测，打印检出的表面与像素坐标
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 房间照片路径
  #[arg(long, value_name = "FILE")]
  pub image: PathBuf,
  /// 远程服务 API Key
  #[arg(long, value_name = "KEY")]
  pub api_key: String,
  /// 远程模型标识 (缺省时自动选择)
  #[arg(long, value_name = "MODEL")]
  pub remote_model: Option<String>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  let frame = RoomFrame::open(&args.image)?;
  info!("图像尺寸: {}x{}", frame.width(), frame.height());

  let client = GeminiClient::new(args.api_key.clone())?;
  let model = match args.remote_model {
    Some(model) => model,
    None => {
      let models = client.list_models()?;
      GeminiClient::preferred_model(&models)
        .ok_or_else(|| anyhow::anyhow!("没有可用的远程模型"))?
        .to_string()
    }
  };
  info!("远程模型: {}", model);

  let detector = GeminiDetector::new(client, model);
  let now = std::time::Instant::now();
  let regions = detector.detect_surfaces(&frame)?;
  info!("检测完成，耗时: {:.2?}", now.elapsed());

  if regions.is_empty() {
    info!("検出対象なし");
    return Ok(());
  }
  for region in &regions {
    info!(
      "{}: ({:.0}, {:.0}) - ({:.0}, {:.0})",
      region.label, region.bbox.xmin, region.bbox.ymin, region.bbox.xmax, region.bbox.ymax
    );
  }

  Ok(())
}
