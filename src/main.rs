// 该文件是 Liangfang （量房） 项目的一部分。
// src/main.rs - 项目主程序
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

mod args;

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use tracing::{error, info, warn};

use args::{Args, Mode, parse_rect};
use liangfang::canvas::CanvasView;
use liangfang::detect::{GeminiClient, GeminiDetector};
use liangfang::frame::RoomFrame;
use liangfang::model::{FastSamBuilder, ModelRegistry};
use liangfang::output::{Render, SaveImageFileOutput};
use liangfang::session::Session;
use liangfang::workflow::{
  AutoOutcome, AutoState, AutoWorkflow, ManualState, ManualWorkflow,
};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("读取照片: {}", args.image.display());
  let frame = RoomFrame::open(&args.image).context("读取照片失败")?;
  info!("图像尺寸: {}x{}", frame.width(), frame.height());

  let mut session = Session {
    api_key: args.api_key.clone(),
    remote_model: args.remote_model.clone(),
    precision: args.precision,
    max_canvas_width: args.canvas_width,
    retrigger: args.retrigger,
  };

  // 未指定远程模型时向远程服务询问可用模型，优先 flash 系。
  // 查询失败不中断会话，留给校验门报“未选择模型”。
  if args.mode == Mode::Auto
    && session.remote_model.is_none()
    && let Some(api_key) = session.api_key.clone()
  {
    match GeminiClient::new(api_key).and_then(|client| client.list_models()) {
      Ok(models) => {
        session.remote_model = GeminiClient::preferred_model(&models).map(str::to_string);
        if let Some(model) = &session.remote_model {
          info!("自动选择远程模型: {}", model);
        }
      }
      Err(err) => warn!("查询可用模型失败: {}", err),
    }
  }

  // 模型加载失败是致命错误，直接结束会话
  info!("精度选择: {}", session.precision.describe());
  let weights_dir = args.weights_dir.clone();
  let registry = ModelRegistry::new(move |precision| {
    FastSamBuilder::new(weights_dir.join(precision.weight_file())).build()
  });
  let model = registry
    .get(session.precision)
    .context("分割模型加载失败")?;

  let output = SaveImageFileOutput::new(&args.output);

  match args.mode {
    Mode::Auto => {
      let mut workflow = AutoWorkflow::new();
      workflow.submit(
        &session,
        &frame,
        |api_key, remote_model| {
          Ok(GeminiDetector::new(GeminiClient::new(api_key)?, remote_model))
        },
        model.as_ref(),
      );

      match workflow.state() {
        AutoState::Succeeded {
          info: status,
          outcome: AutoOutcome::Annotated(result),
        } => {
          output.render_result(&frame, result)?;
          info!("{}", status);
        }
        AutoState::Succeeded { info: status, .. } => {
          info!("{}", status);
        }
        AutoState::Failed { message } => {
          error!("解析失败: {}", message);
          bail!("解析失败: {message}");
        }
        state => bail!("工作流停在意外状态: {state:?}"),
      }
    }
    Mode::Manual => {
      let raw = args
        .rect
        .as_deref()
        .ok_or_else(|| anyhow!("手动模式需要 --rect 参数"))?;
      let rect = parse_rect(raw).map_err(|e| anyhow!(e))?;

      let view = CanvasView::fit(frame.width(), frame.height(), session.max_canvas_width);
      let (display_w, display_h) = view.display_size();
      info!(
        "画布显示尺寸: {}x{} (比例 {:.3})",
        display_w,
        display_h,
        view.scale()
      );

      let mut workflow = ManualWorkflow::new(session.retrigger);
      workflow.canvas_changed(&view, std::slice::from_ref(&rect), &frame, model.as_ref())?;

      match workflow.state() {
        ManualState::Displayed { result } => {
          output.render_result(&frame, result)?;
          info!("切り抜き完成");
        }
        state => bail!("工作流停在意外状态: {state:?}"),
      }
    }
  }

  Ok(())
}
