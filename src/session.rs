// 该文件是 Liangfang （量房） 项目的一部分。
// src/session.rs - 会话配置
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

use thiserror::Error;

use crate::canvas::DEFAULT_CANVAS_WIDTH;
use crate::model::Precision;
use crate::workflow::RetriggerPolicy;

/// 一次交互会话收集到的全部配置。
/// 凭证与模型选择只在会话存续期间持有，不做任何持久化。
#[derive(Debug, Clone)]
pub struct Session {
  /// 远程视觉语言服务的凭证。
  pub api_key: Option<String>,
  /// 远程模型标识。
  pub remote_model: Option<String>,
  /// 本地分割模型精度选择。
  pub precision: Precision,
  /// 画布最大显示宽度。
  pub max_canvas_width: u32,
  /// 手动工作流的重新分割策略。
  pub retrigger: RetriggerPolicy,
}

impl Default for Session {
  fn default() -> Self {
    Session {
      api_key: None,
      remote_model: None,
      precision: Precision::Fast,
      max_canvas_width: DEFAULT_CANVAS_WIDTH,
      retrigger: RetriggerPolicy::Always,
    }
  }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SessionError {
  #[error("未提供 API Key")]
  MissingCredential,
  #[error("未选择远程模型")]
  MissingModel,
}

impl Session {
  /// 自动工作流的校验门：凭证与远程模型都必须就位，
  /// 否则在发起任何网络调用之前短路返回。
  pub fn validate_auto(&self) -> Result<(&str, &str), SessionError> {
    let key = self
      .api_key
      .as_deref()
      .filter(|k| !k.is_empty())
      .ok_or(SessionError::MissingCredential)?;
    let model = self
      .remote_model
      .as_deref()
      .filter(|m| !m.is_empty())
      .ok_or(SessionError::MissingModel)?;
    Ok((key, model))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn validate_auto_requires_credential() {
    let session = Session {
      remote_model: Some("models/gemini-1.5-flash".into()),
      ..Session::default()
    };
    assert_eq!(
      session.validate_auto().unwrap_err(),
      SessionError::MissingCredential
    );
  }

  #[test]
  fn validate_auto_requires_model() {
    let session = Session {
      api_key: Some("key".into()),
      ..Session::default()
    };
    assert_eq!(
      session.validate_auto().unwrap_err(),
      SessionError::MissingModel
    );
  }

  #[test]
  fn empty_credential_counts_as_missing() {
    let session = Session {
      api_key: Some(String::new()),
      remote_model: Some("m".into()),
      ..Session::default()
    };
    assert_eq!(
      session.validate_auto().unwrap_err(),
      SessionError::MissingCredential
    );
  }

  #[test]
  fn validate_auto_passes_with_both() {
    let session = Session {
      api_key: Some("key".into()),
      remote_model: Some("models/gemini-1.5-flash".into()),
      ..Session::default()
    };
    assert_eq!(
      session.validate_auto().unwrap(),
      ("key", "models/gemini-1.5-flash")
    );
  }
}
