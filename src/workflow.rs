// 该文件是 Liangfang （量房） 项目的一部分。
// src/workflow.rs - 自动/手动工作流状态机
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

use clap::ValueEnum;
use tracing::{info, warn};

use crate::canvas::{CanvasView, DrawnRect, latest_rect};
use crate::detect::{Detect, DetectError, DetectedRegion};
use crate::frame::RoomFrame;
use crate::model::{SegmentModel, SegmentResult};
use crate::session::Session;

/// 手动画出的矩形使用的标签。
pub const MANUAL_LABEL: &str = "Manual";

/// 自动工作流的成功载荷：检出并分割，或什么都没检出。
/// “未检出”是信息性结果，不是错误。
#[derive(Debug)]
pub enum AutoOutcome {
  Annotated(SegmentResult),
  NothingFound,
}

/// 自动工作流状态。submit 事件触发一次完整流转，
/// 校验失败在任何网络调用之前短路到 Failed。
#[derive(Debug)]
pub enum AutoState {
  Idle,
  Running,
  Succeeded { info: String, outcome: AutoOutcome },
  Failed { message: String },
}

#[derive(Debug, Default)]
pub struct AutoWorkflow {
  state: AutoState,
}

impl Default for AutoState {
  fn default() -> Self {
    AutoState::Idle
  }
}

impl AutoWorkflow {
  pub fn new() -> Self {
    AutoWorkflow::default()
  }

  pub fn state(&self) -> &AutoState {
    &self.state
  }

  /// submit 事件：校验会话 → 远程检测 → 本地分割。
  /// 检测器在校验通过后才构建，保证缺配置时不触网。
  pub fn submit<D, M>(
    &mut self,
    session: &Session,
    frame: &RoomFrame,
    make_detector: impl FnOnce(&str, &str) -> Result<D, DetectError>,
    model: &M,
  ) -> &AutoState
  where
    D: Detect,
    M: SegmentModel,
  {
    self.state = AutoState::Running;

    let (api_key, remote_model) = match session.validate_auto() {
      Ok(pair) => pair,
      Err(err) => {
        warn!("配置校验失败: {}", err);
        self.state = AutoState::Failed {
          message: err.to_string(),
        };
        return &self.state;
      }
    };

    let detector = match make_detector(api_key, remote_model) {
      Ok(detector) => detector,
      Err(err) => {
        self.state = AutoState::Failed {
          message: err.to_string(),
        };
        return &self.state;
      }
    };

    let regions = match detector.detect_surfaces(frame) {
      Ok(regions) => regions,
      Err(err) => {
        warn!("远程检测失败: {}", err);
        self.state = AutoState::Failed {
          message: err.to_string(),
        };
        return &self.state;
      }
    };

    if regions.is_empty() {
      info!("远程模型没有检出任何表面");
      self.state = AutoState::Succeeded {
        info: "検出対象なし".to_string(),
        outcome: AutoOutcome::NothingFound,
      };
      return &self.state;
    }

    match model.segment(frame, &regions) {
      Ok(result) => {
        self.state = AutoState::Succeeded {
          info: format!("成功 (Model: {remote_model})"),
          outcome: AutoOutcome::Annotated(result),
        };
      }
      Err(err) => {
        self.state = AutoState::Failed {
          message: err.to_string(),
        };
      }
    }
    &self.state
  }
}

/// 手动工作流的重新分割策略。
/// 原始行为是画布一有变化就重新分割（Always）；
/// OnChange 在最后一个矩形没变时跳过，作为可配置的去抖。
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RetriggerPolicy {
  Always,
  OnChange,
}

/// 手动工作流状态。
#[derive(Debug)]
pub enum ManualState {
  Idle,
  Segmenting,
  Displayed { result: SegmentResult },
}

pub struct ManualWorkflow {
  policy: RetriggerPolicy,
  last: Option<DrawnRect>,
  state: ManualState,
}

impl ManualWorkflow {
  pub fn new(policy: RetriggerPolicy) -> Self {
    ManualWorkflow {
      policy,
      last: None,
      state: ManualState::Idle,
    }
  }

  pub fn state(&self) -> &ManualState {
    &self.state
  }

  /// canvas-changed 事件：取最后画出的矩形，映射回原图像素坐标，
  /// 直接交给分割模型。没有矩形时保持现状。
  /// 返回本次事件是否触发了一次分割。
  pub fn canvas_changed<M>(
    &mut self,
    view: &CanvasView,
    rects: &[DrawnRect],
    frame: &RoomFrame,
    model: &M,
  ) -> Result<bool, M::Error>
  where
    M: SegmentModel,
  {
    let Some(rect) = latest_rect(rects) else {
      return Ok(false);
    };
    if self.policy == RetriggerPolicy::OnChange && self.last.as_ref() == Some(rect) {
      return Ok(false);
    }

    self.state = ManualState::Segmenting;
    let bbox = view.to_pixel_box(rect);
    info!(
      "手动矩形映射到像素坐标: ({:.0}, {:.0}, {:.0}, {:.0})",
      bbox.xmin, bbox.ymin, bbox.xmax, bbox.ymax
    );

    let region = DetectedRegion {
      label: MANUAL_LABEL.to_string(),
      bbox,
    };
    let result = model.segment(frame, std::slice::from_ref(&region))?;

    self.last = Some(rect.clone());
    self.state = ManualState::Displayed { result };
    Ok(true)
  }
}
