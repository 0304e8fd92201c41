// 该文件是 Liangfang （量房） 项目的一部分。
// src/detect/gemini.rs - Gemini 远程调用
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

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::detect::{Detect, DetectError, DetectedRegion, SURFACE_PROMPT, parse_regions};
use crate::frame::RoomFrame;

pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/";

const GENERATE_CONTENT_METHOD: &str = "generateContent";
const PNG_MIME_TYPE: &str = "image/png";

/// Gemini REST 客户端。凭证只是一个不透明字符串，
/// 不做重试与退避，也不设置超时（挂起的请求会一直阻塞）。
pub struct GeminiClient {
  http: reqwest::blocking::Client,
  endpoint: Url,
  api_key: String,
}

impl GeminiClient {
  pub fn new(api_key: impl Into<String>) -> Result<Self, DetectError> {
    let http = reqwest::blocking::Client::builder()
      .timeout(None)
      .build()?;
    Ok(GeminiClient {
      http,
      endpoint: Url::parse(DEFAULT_ENDPOINT)?,
      api_key: api_key.into(),
    })
  }

  pub fn with_endpoint(mut self, endpoint: Url) -> Self {
    self.endpoint = endpoint;
    self
  }

  /// 列出支持 generateContent 的远程模型名。
  pub fn list_models(&self) -> Result<Vec<String>, DetectError> {
    let url = self.endpoint.join("models")?;
    debug!("查询可用模型: {}", url);

    let resp = self
      .http
      .get(url)
      .query(&[("key", self.api_key.as_str())])
      .send()?;
    let status = resp.status();
    if !status.is_success() {
      return Err(DetectError::Api {
        status: status.as_u16(),
        message: resp.text().unwrap_or_default(),
      });
    }

    let body: ListModelsResponse = resp.json()?;
    Ok(
      body
        .models
        .into_iter()
        .filter(|m| {
          m.supported_generation_methods
            .iter()
            .any(|method| method == GENERATE_CONTENT_METHOD)
        })
        .map(|m| m.name)
        .collect(),
    )
  }

  /// 缺省模型选择：优先 flash 系 1.5 模型，否则取第一个。
  pub fn preferred_model(models: &[String]) -> Option<&str> {
    models
      .iter()
      .find(|name| name.contains("flash") && name.contains("1.5"))
      .or_else(|| models.first())
      .map(|name| name.as_str())
  }

  /// 一次 generateContent 调用：指令文本 + 内联 PNG，返回拼接后的应答文本。
  pub fn generate_content(
    &self,
    model: &str,
    prompt: &str,
    png: &[u8],
  ) -> Result<String, DetectError> {
    let model_path = if model.starts_with("models/") {
      model.to_string()
    } else {
      format!("models/{model}")
    };
    let url = self
      .endpoint
      .join(&format!("{model_path}:{GENERATE_CONTENT_METHOD}"))?;

    let request = GenerateContentRequest {
      contents: vec![Content {
        parts: vec![
          Part {
            text: Some(prompt.to_string()),
            inline_data: None,
          },
          Part {
            text: None,
            inline_data: Some(InlineData {
              mime_type: PNG_MIME_TYPE.to_string(),
              data: BASE64.encode(png),
            }),
          },
        ],
      }],
    };

    let resp = self
      .http
      .post(url)
      .query(&[("key", self.api_key.as_str())])
      .json(&request)
      .send()?;
    let status = resp.status();
    if !status.is_success() {
      return Err(DetectError::Api {
        status: status.as_u16(),
        message: resp.text().unwrap_or_default(),
      });
    }

    let body: GenerateContentResponse = resp.json()?;
    let text: String = body
      .candidates
      .into_iter()
      .next()
      .map(|candidate| {
        candidate
          .content
          .parts
          .into_iter()
          .filter_map(|part| part.text)
          .collect::<Vec<_>>()
          .join("")
      })
      .unwrap_or_default();

    if text.is_empty() {
      return Err(DetectError::EmptyResponse);
    }
    Ok(text)
  }
}

/// 固定指令 + 指定远程模型的检测适配器。
pub struct GeminiDetector {
  client: GeminiClient,
  model: String,
}

impl GeminiDetector {
  pub fn new(client: GeminiClient, model: impl Into<String>) -> Self {
    GeminiDetector {
      client,
      model: model.into(),
    }
  }
}

impl Detect for GeminiDetector {
  fn detect_surfaces(&self, frame: &RoomFrame) -> Result<Vec<DetectedRegion>, DetectError> {
    let png = frame.to_png_bytes()?;
    info!("调用远程模型检测表面: {}", self.model);

    let text = self
      .client
      .generate_content(&self.model, SURFACE_PROMPT, &png)?;
    debug!("远程应答文本: {}", text);

    let regions = parse_regions(&text, frame.width(), frame.height())?;
    info!("远程模型检出 {} 个区域", regions.len());
    Ok(regions)
  }
}

#[derive(Serialize)]
struct GenerateContentRequest {
  contents: Vec<Content>,
}

#[derive(Serialize, Deserialize, Default)]
struct Content {
  #[serde(default)]
  parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  text: Option<String>,
  #[serde(
    default,
    rename = "inlineData",
    skip_serializing_if = "Option::is_none"
  )]
  inline_data: Option<InlineData>,
}

#[derive(Serialize, Deserialize)]
struct InlineData {
  #[serde(rename = "mimeType")]
  mime_type: String,
  data: String,
}

#[derive(Deserialize)]
struct ListModelsResponse {
  #[serde(default)]
  models: Vec<ModelInfo>,
}

#[derive(Deserialize)]
struct ModelInfo {
  name: String,
  #[serde(default, rename = "supportedGenerationMethods")]
  supported_generation_methods: Vec<String>,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
  #[serde(default)]
  candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
  #[serde(default)]
  content: Content,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn preferred_model_picks_flash_15() {
    let models = vec![
      "models/gemini-1.0-pro".to_string(),
      "models/gemini-1.5-pro".to_string(),
      "models/gemini-1.5-flash".to_string(),
    ];
    assert_eq!(
      GeminiClient::preferred_model(&models),
      Some("models/gemini-1.5-flash")
    );
  }

  #[test]
  fn preferred_model_falls_back_to_first() {
    let models = vec!["models/gemini-1.0-pro".to_string()];
    assert_eq!(
      GeminiClient::preferred_model(&models),
      Some("models/gemini-1.0-pro")
    );
    assert_eq!(GeminiClient::preferred_model(&[]), None);
  }

  #[test]
  fn response_text_is_concatenated_from_parts() {
    let raw = r#"{
      "candidates": [
        {"content": {"parts": [{"text": "前半"}, {"text": "后半"}], "role": "model"}}
      ]
    }"#;
    let body: GenerateContentResponse = serde_json::from_str(raw).unwrap();
    let text: String = body.candidates[0]
      .content
      .parts
      .iter()
      .filter_map(|p| p.text.clone())
      .collect::<Vec<_>>()
      .join("");
    assert_eq!(text, "前半后半");
  }

  #[test]
  fn request_serializes_camel_case_inline_data() {
    let request = GenerateContentRequest {
      contents: vec![Content {
        parts: vec![Part {
          text: None,
          inline_data: Some(InlineData {
            mime_type: PNG_MIME_TYPE.to_string(),
            data: "QUJD".to_string(),
          }),
        }],
      }],
    };
    let json = serde_json::to_string(&request).unwrap();
    assert!(json.contains("\"inlineData\""));
    assert!(json.contains("\"mimeType\""));
    assert!(!json.contains("\"text\""));
  }
}
