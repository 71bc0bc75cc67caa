// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Gemini REST 客户端
//! - 场景 → 音效调色板 (`generateContent`)
//! - 场景 → 视频 (Veo `predictLongRunning` + 轮询 + 下载)

use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use super::backoff::Backoff;
use crate::error::UpstreamError;
use crate::gen_time_string;
use crate::pipeline::StopSignal;
use crate::sound::{SoundId, Vocabulary};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// 场景描述 → 可用音效子集
pub trait PaletteService: Send + Sync {
    fn suggest(&self, scene: &str, vocabulary: &Vocabulary) -> Result<Vec<SoundId>, UpstreamError>;
}

/// 场景描述 → 本地视频文件
pub trait VideoService: Send + Sync {
    fn generate(&self, scene: &str, stop: &StopSignal) -> Result<PathBuf, UpstreamError>;
}

#[derive(Debug, Clone)]
pub struct GeminiOptions {
    pub api_key: String,
    pub palette_model: String,
    pub video_model: String,
    pub video_duration_secs: u32,
    pub video_aspect_ratio: String,
    pub video_dir: PathBuf,
    pub backoff: Backoff,
    pub request_timeout: Duration,
}

impl Default for GeminiOptions {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            palette_model: "gemini-2.0-flash".to_string(),
            video_model: "veo-2.0-generate-001".to_string(),
            video_duration_secs: 8,
            video_aspect_ratio: "16:9".to_string(),
            video_dir: PathBuf::from("."),
            backoff: Backoff::default(),
            request_timeout: Duration::from_secs(60),
        }
    }
}

// ========== generateContent ==========

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: ResponseContent,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

pub struct GeminiClient {
    options: GeminiOptions,
    agent: ureq::Agent,
}

impl GeminiClient {
    pub fn new(options: GeminiOptions) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(options.request_timeout)
            .build();
        Self { options, agent }
    }

    fn api_key(&self) -> Result<&str, UpstreamError> {
        match self.options.api_key.trim() {
            "" => Err(UpstreamError::MissingApiKey),
            key => Ok(key),
        }
    }

    fn post_json(&self, url: &str, body: &impl Serialize) -> Result<Value, UpstreamError> {
        let key = self.api_key()?;
        let response = self
            .agent
            .post(url)
            .set("x-goog-api-key", key)
            .send_json(body)?;
        response
            .into_json::<Value>()
            .map_err(|e| UpstreamError::Decode(format!("response body: {}", e)))
    }

    fn get_json(&self, url: &str) -> Result<Value, UpstreamError> {
        let key = self.api_key()?;
        let response = self.agent.get(url).set("x-goog-api-key", key).call()?;
        response
            .into_json::<Value>()
            .map_err(|e| UpstreamError::Decode(format!("response body: {}", e)))
    }

    fn download(&self, uri: &str, dest: &Path) -> Result<u64, UpstreamError> {
        let key = self.api_key()?;
        let response = self.agent.get(uri).set("x-goog-api-key", key).call()?;
        if let Some(dir) = dest.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let mut writer = BufWriter::new(File::create(dest)?);
        let bytes = io::copy(&mut response.into_reader(), &mut writer)?;
        Ok(bytes)
    }
}

pub fn palette_prompt(scene: &str, vocabulary: &Vocabulary) -> String {
    format!(
        "You are a sound designer. Given a memory/dream/scene and a list of available sound \
         effects, select which ones would fit.\n\n\
         Available sound effects: {}\n\n\
         Scene: {}\n\n\
         Respond with ONLY the applicable sound effect names from the list, separated by \
         commas. No explanations - just the exact label names.",
        vocabulary.names().join(", "),
        scene
    )
}

pub fn video_prompt(scene: &str) -> String {
    format!(
        "A beautiful, atmospheric, cinematic video of: {}. Dreamlike quality, soft lighting, \
         gentle movement, nostalgic mood.",
        scene
    )
}

/// `candidates[0].content.parts[0].text`
fn extract_text(body: Value) -> Result<String, UpstreamError> {
    let response: GenerateResponse = serde_json::from_value(body)
        .map_err(|e| UpstreamError::Decode(format!("generateContent: {}", e)))?;
    response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content.parts.into_iter().next())
        .map(|p| p.text)
        .ok_or_else(|| UpstreamError::Decode("no content in Gemini response".into()))
}

impl PaletteService for GeminiClient {
    fn suggest(&self, scene: &str, vocabulary: &Vocabulary) -> Result<Vec<SoundId>, UpstreamError> {
        info!("🎨 [Gemini] 分析场景音效...");
        let url = format!(
            "{}/models/{}:generateContent",
            API_BASE, self.options.palette_model
        );
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: palette_prompt(scene, vocabulary),
                }],
            }],
        };
        let text = extract_text(self.post_json(&url, &request)?)?;
        let palette = vocabulary.filter_palette(&text);
        info!(
            "✅ [Gemini] 音效调色板: [{}] (原始回答: {})",
            palette.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", "),
            text.trim()
        );
        Ok(palette)
    }
}

// ========== Veo ==========

pub fn video_request(prompt: &str, duration_secs: u32, aspect_ratio: &str) -> Value {
    json!({
        "instances": [{ "prompt": prompt }],
        "parameters": {
            "durationSeconds": duration_secs,
            "aspectRatio": aspect_ratio,
            "sampleCount": 1,
        }
    })
}

/// 长任务状态: 未完成 / 完成 (视频地址) / 失败
#[derive(Debug, PartialEq)]
pub enum OperationStatus {
    Pending,
    Done(String),
}

pub fn operation_status(op: &Value) -> Result<OperationStatus, UpstreamError> {
    if !op.get("done").and_then(Value::as_bool).unwrap_or(false) {
        return Ok(OperationStatus::Pending);
    }
    if let Some(err) = op.get("error") {
        return Err(UpstreamError::Http(format!("video operation failed: {}", err)));
    }
    op.pointer("/response/generateVideoResponse/generatedSamples/0/video/uri")
        .and_then(Value::as_str)
        .map(|uri| OperationStatus::Done(uri.to_string()))
        .ok_or(UpstreamError::NoVideo)
}

impl VideoService for GeminiClient {
    fn generate(&self, scene: &str, stop: &StopSignal) -> Result<PathBuf, UpstreamError> {
        info!("🎬 [Gemini] Veo 视频生成中, 可能需要几分钟...");
        let url = format!(
            "{}/models/{}:predictLongRunning",
            API_BASE, self.options.video_model
        );
        let request = video_request(
            &video_prompt(scene),
            self.options.video_duration_secs,
            &self.options.video_aspect_ratio,
        );
        let operation = self.post_json(&url, &request)?;
        let name = operation
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| UpstreamError::Decode("operation has no name".into()))?
            .to_string();

        let mut latest = Some(operation);
        let uri = self.options.backoff.poll(stop, |attempt| {
            let op = match latest.take() {
                Some(op) => op,
                None => self.get_json(&format!("{}/{}", API_BASE, name))?,
            };
            match operation_status(&op)? {
                OperationStatus::Done(uri) => Ok(Some(uri)),
                OperationStatus::Pending => {
                    if attempt > 0 {
                        info!("⏳ [Gemini] 仍在生成... (第{}次查询)", attempt);
                    }
                    Ok(None)
                }
            }
        })?;

        let dest = self
            .options
            .video_dir
            .join(format!("memory_{}.mp4", gen_time_string("")));
        info!("⬇️ [Gemini] 下载视频...");
        match self.download(&uri, &dest) {
            Ok(bytes) => {
                info!("✅ [Gemini] 视频已保存: {} ({} bytes)", dest.display(), bytes);
                Ok(dest)
            }
            Err(e) => {
                warn!("❌ [Gemini] 视频下载失败: {}", e);
                // 不保留残缺文件
                let _ = fs::remove_file(&dest);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_text() {
        let body = json!({
            "candidates": [{ "content": { "parts": [{ "text": "rain, THUNDER" }] } }]
        });
        assert_eq!(extract_text(body).unwrap(), "rain, THUNDER");
        assert!(matches!(
            extract_text(json!({ "candidates": [] })),
            Err(UpstreamError::Decode(_))
        ));
    }

    #[test]
    fn test_palette_prompt_lists_vocabulary() {
        let vocab = Vocabulary::new(["rain", "wind"]);
        let prompt = palette_prompt("a stormy night", &vocab);
        assert!(prompt.contains("Available sound effects: rain, wind"));
        assert!(prompt.contains("Scene: a stormy night"));
    }

    #[test]
    fn test_video_request_shape() {
        let req = video_request(&video_prompt("old harbour"), 8, "16:9");
        assert_eq!(req["parameters"]["durationSeconds"], 8);
        assert_eq!(req["parameters"]["aspectRatio"], "16:9");
        assert!(req["instances"][0]["prompt"]
            .as_str()
            .unwrap()
            .contains("cinematic video of: old harbour."));
    }

    #[test]
    fn test_operation_status() {
        assert_eq!(
            operation_status(&json!({ "name": "op" })).unwrap(),
            OperationStatus::Pending
        );
        let done = json!({
            "done": true,
            "response": { "generateVideoResponse": { "generatedSamples": [
                { "video": { "uri": "https://example.invalid/v.mp4" } }
            ] } }
        });
        assert_eq!(
            operation_status(&done).unwrap(),
            OperationStatus::Done("https://example.invalid/v.mp4".into())
        );
        assert!(matches!(
            operation_status(&json!({ "done": true, "response": {} })),
            Err(UpstreamError::NoVideo)
        ));
        assert!(matches!(
            operation_status(&json!({ "done": true, "error": { "code": 400 } })),
            Err(UpstreamError::Http(_))
        ));
    }

    #[test]
    fn test_missing_key_fails_fast() {
        let client = GeminiClient::new(GeminiOptions::default());
        let vocab = Vocabulary::new(["rain"]);
        assert!(matches!(
            client.suggest("scene", &vocab),
            Err(UpstreamError::MissingApiKey)
        ));
        assert!(matches!(
            client.generate("scene", &StopSignal::new()),
            Err(UpstreamError::MissingApiKey)
        ));
    }
}
