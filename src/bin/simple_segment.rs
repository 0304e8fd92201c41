// 该文件是 Liangfang （量房） 项目的一部分。
// src/bin/simple_segment.rs - 本地分割测试代码
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use anyhow::{Result, anyhow};
use clap::Parser;
use tracing::info;

use liangfang::canvas::{CanvasView, DEFAULT_CANVAS_WIDTH, DrawnRect};
use liangfang::detect::DetectedRegion;
use liangfang::frame::RoomFrame;
use liangfang::model::{FastSamBuilder, SegmentModel};
use liangfang::output::{Render, SaveImageFileOutput};
use liangfang::workflow::MANUAL_LABEL;

/// 不走远程检测，直接把画布矩形送进本地分割模型
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 房间照片路径
  #[arg(long, value_name = "FILE")]
  pub image: PathBuf,
  /// 分割模型权重文件路径
  #[arg(long, value_name = "MODEL")]
  pub model: PathBuf,
  /// 画布显示坐标系下的矩形: left,top,width,height
  #[arg(long, value_name = "RECT")]
  pub rect: String,
  /// 画布最大显示宽度
  #[arg(long, value_name = "WIDTH", default_value_t = DEFAULT_CANVAS_WIDTH)]
  pub canvas_width: u32,
  /// 结果图像输出路径
  #[arg(long, value_name = "OUTPUT", default_value = "segment.png")]
  pub output: PathBuf,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  let frame = RoomFrame::open(&args.image)?;
  info!("图像尺寸: {}x{}", frame.width(), frame.height());

  let rect = parse_rect(&args.rect).map_err(|e| anyhow!(e))?;
  let view = CanvasView::fit(frame.width(), frame.height(), args.canvas_width);
  let bbox = view.to_pixel_box(&rect);
  info!(
    "提示框: ({:.0}, {:.0}) - ({:.0}, {:.0})",
    bbox.xmin, bbox.ymin, bbox.xmax, bbox.ymax
  );

  let model = FastSamBuilder::new(&args.model).build()?;
  let region = DetectedRegion {
    label: MANUAL_LABEL.to_string(),
    bbox,
  };

  let now = std::time::Instant::now();
  let result = model.segment(&frame, std::slice::from_ref(&region))?;
  info!("分割完成，耗时: {:.2?}", now.elapsed());

  let output = SaveImageFileOutput::new(&args.output);
  output.render_result(&frame, &result)?;
  info!("切り抜き完成");

  Ok(())
}

fn parse_rect(raw: &str) -> Result<DrawnRect, String> {
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
