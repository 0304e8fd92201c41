// 该文件是 Liangfang （量房） 项目的一部分。
// src/detect.rs - 远程检测适配器
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

use serde::Deserialize;
use thiserror::Error;

use crate::frame::{FrameError, RoomFrame};
use crate::geometry::{NormBox, PixelBox};

mod gemini;
pub use self::gemini::{DEFAULT_ENDPOINT, GeminiClient, GeminiDetector};

/// 发给远程视觉语言模型的固定指令。
/// 要求仅输出 JSON 数组，坐标为 0–1000 归一化 [ymin, xmin, ymax, xmax]。
pub const SURFACE_PROMPT: &str = r#"Detect the "Ceiling", "Wall" and "Floor" in this image.
If there are windows or doors, decide whether to exclude them from the wall or include them in it.
Output ONLY the following JSON format (no Markdown).
Coordinates are normalized to 0-1000 relative to the image size, as [ymin, xmin, ymax, xmax].

[
    {"label": "Ceiling", "box_2d": [ymin, xmin, ymax, xmax]},
    {"label": "Wall", "box_2d": [ymin, xmin, ymax, xmax]},
    {"label": "Floor", "box_2d": [ymin, xmin, ymax, xmax]}
]
"#;

/// 解析失败时向用户报告的原始应答截断长度。
pub const RESPONSE_EXCERPT_LEN: usize = 100;

/// 缺少 label 字段时使用的缺省标签。
pub const DEFAULT_LABEL: &str = "Object";

/// 远程模型检出的一块表面区域，边界框已换算为原图像素坐标。
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedRegion {
  pub label: String,
  pub bbox: PixelBox,
}

#[derive(Error, Debug)]
pub enum DetectError {
  #[error("远程调用失败: {0}")]
  Http(#[from] reqwest::Error),
  #[error("远程服务返回错误 ({status}): {message}")]
  Api { status: u16, message: String },
  #[error("应答中未找到 JSON 数组。应答: {excerpt}...")]
  NoJsonArray { excerpt: String },
  #[error("JSON 解析失败: {0}")]
  Json(#[from] serde_json::Error),
  #[error("应答中没有文本内容")]
  EmptyResponse,
  #[error("端点地址错误: {0}")]
  Endpoint(#[from] url::ParseError),
  #[error("图像编码失败: {0}")]
  Frame(#[from] FrameError),
}

/// 检测适配器的统一入口。空结果表示“未检出”，不是错误。
pub trait Detect {
  fn detect_surfaces(&self, frame: &RoomFrame) -> Result<Vec<DetectedRegion>, DetectError>;
}

#[derive(Deserialize)]
struct RawRegion {
  #[serde(default)]
  label: Option<String>,
  box_2d: [f32; 4],
}

/// 从自由文本中定位第一个 `[` 到最后一个 `]` 的跨行区段。
/// 远程应答可能混有说明性文字或 Markdown 围栏，这里只认方括号。
pub fn extract_json_array(text: &str) -> Option<&str> {
  let start = text.find('[')?;
  let end = text.rfind(']')?;
  if end < start {
    return None;
  }
  Some(&text[start..=end])
}

/// 截取应答前缀用于诊断。
pub fn response_excerpt(text: &str) -> String {
  text.chars().take(RESPONSE_EXCERPT_LEN).collect()
}

/// 解析远程应答文本：提取 JSON 数组并把每个归一化框换算为像素框。
/// 空数组是正常的“未检出”结果。
pub fn parse_regions(
  text: &str,
  width: u32,
  height: u32,
) -> Result<Vec<DetectedRegion>, DetectError> {
  let span = extract_json_array(text).ok_or_else(|| DetectError::NoJsonArray {
    excerpt: response_excerpt(text),
  })?;

  let raw: Vec<RawRegion> = serde_json::from_str(span)?;

  Ok(
    raw
      .into_iter()
      .map(|region| {
        let [ymin, xmin, ymax, xmax] = region.box_2d;
        DetectedRegion {
          label: region
            .label
            .unwrap_or_else(|| DEFAULT_LABEL.to_string()),
          bbox: NormBox([ymin, xmin, ymax, xmax]).to_pixel(width, height),
        }
      })
      .collect(),
  )
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn extracts_array_surrounded_by_prose() {
    let text = "Sure! Here is the result:\n[{\"label\": \"Floor\", \"box_2d\": [1, 2, 3, 4]}]\nHope it helps.";
    let span = extract_json_array(text).unwrap();
    assert!(span.starts_with('['));
    assert!(span.ends_with(']'));
    assert!(span.contains("Floor"));
  }

  #[test]
  fn extraction_is_greedy_across_lines() {
    let text = "a [1,\n2] b [3,\n4] c";
    assert_eq!(extract_json_array(text), Some("[1,\n2] b [3,\n4]"));
  }

  #[test]
  fn missing_array_reports_truncated_excerpt() {
    let text = "x".repeat(500);
    let err = parse_regions(&text, 100, 100).unwrap_err();
    match err {
      DetectError::NoJsonArray { excerpt } => {
        assert_eq!(excerpt.chars().count(), RESPONSE_EXCERPT_LEN)
      }
      other => panic!("意外的错误: {other:?}"),
    }
  }

  #[test]
  fn fenced_empty_array_is_no_detection() {
    let text = "Sure! Here is the result: ```json\n[]\n```";
    let regions = parse_regions(text, 640, 480).unwrap();
    assert!(regions.is_empty());
  }

  #[test]
  fn scenario_floor_box_on_wide_image() {
    let text = r#"[{"label":"Floor","box_2d":[700,0,1000,1000]}]"#;
    let regions = parse_regions(text, 2000, 1000).unwrap();
    assert_eq!(regions.len(), 1);
    assert_eq!(regions[0].label, "Floor");
    assert_eq!(regions[0].bbox, PixelBox::new(0.0, 700.0, 2000.0, 1000.0));
  }

  #[test]
  fn missing_label_falls_back_to_default() {
    let text = r#"[{"box_2d":[0,0,500,500]}]"#;
    let regions = parse_regions(text, 100, 100).unwrap();
    assert_eq!(regions[0].label, DEFAULT_LABEL);
  }

  #[test]
  fn missing_box_is_a_parse_failure() {
    let text = r#"[{"label":"Wall"}]"#;
    assert!(matches!(
      parse_regions(text, 100, 100),
      Err(DetectError::Json(_))
    ));
  }

  #[test]
  fn malformed_json_is_a_parse_failure() {
    let text = "[{\"label\": \"Wall\", \"box_2d\": [1, 2,]";
    assert!(extract_json_array(text).is_some());
    assert!(matches!(
      parse_regions(text, 100, 100),
      Err(DetectError::Json(_))
    ));
  }
}
