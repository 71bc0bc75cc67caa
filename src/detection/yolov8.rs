// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// YOLOv8 检测模型 (ONNX Runtime)
// 包含: 模型加载、预处理、推理、后处理

use std::path::PathBuf;

use fast_image_resize as fr;
use image::RgbaImage;
use ndarray::{s, ArrayView2, Axis};
use ort::execution_providers::{CUDAExecutionProvider, TensorRTExecutionProvider};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor, Value};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::detector::{DetectorFactory, ObjectDetector};
use super::labels;
use super::types::{BBox, Detection};
use crate::error::DetectorError;
use crate::non_max_suppression;

const CXYWH_OFFSET: usize = 4;
// 灰色填充 (letterbox)
const PAD_VALUE: f32 = 144.0 / 255.0;

/// 推理后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionProvider {
    #[default]
    Cpu,
    Cuda,
    TensorRt,
}

impl std::str::FromStr for ExecutionProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu),
            "cuda" => Ok(Self::Cuda),
            "tensorrt" | "trt" => Ok(Self::TensorRt),
            other => Err(format!("unknown execution provider: {}", other)),
        }
    }
}

/// YOLOv8 模型参数
#[derive(Debug, Clone)]
pub struct YoloConfig {
    pub model_path: PathBuf,
    pub input_size: u32,
    pub conf_threshold: f32,
    pub iou_threshold: f32,
    pub execution_provider: ExecutionProvider,
    pub intra_threads: usize,
}

impl Default for YoloConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("yolov8n.onnx"),
            input_size: super::types::INF_SIZE,
            conf_threshold: 0.25,
            iou_threshold: 0.45,
            execution_provider: ExecutionProvider::Cpu,
            intra_threads: 2,
        }
    }
}

/// 每次调用加载一个独立会话, 供各采集工作线程使用
pub struct YoloFactory {
    config: YoloConfig,
}

impl YoloFactory {
    pub fn new(config: YoloConfig) -> Self {
        Self { config }
    }
}

impl DetectorFactory for YoloFactory {
    fn create(&self) -> Result<Box<dyn ObjectDetector>, DetectorError> {
        Ok(Box::new(YOLOv8::new(&self.config)?))
    }
}

pub struct YOLOv8 {
    session: Session,
    output_name: String,
    names: Vec<String>,
    size: u32,
    conf: f32,
    iou: f32,
}

fn unavailable<E: std::fmt::Display>(stage: &str) -> impl Fn(E) -> DetectorError + '_ {
    move |e| DetectorError::InferenceUnavailable(format!("ORT {}: {}", stage, e))
}

impl YOLOv8 {
    pub fn new(config: &YoloConfig) -> Result<Self, DetectorError> {
        if !config.model_path.exists() {
            return Err(DetectorError::InferenceUnavailable(format!(
                "model not found at {}",
                config.model_path.display()
            )));
        }

        let builder = Session::builder()
            .map_err(unavailable("session builder"))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(unavailable("opt level"))?
            .with_intra_threads(config.intra_threads.max(1))
            .map_err(unavailable("intra threads"))?;

        let builder = match config.execution_provider {
            ExecutionProvider::Cpu => builder,
            ExecutionProvider::Cuda => builder
                .with_execution_providers([CUDAExecutionProvider::default().build()])
                .map_err(unavailable("cuda"))?,
            ExecutionProvider::TensorRt => builder
                .with_execution_providers([
                    TensorRTExecutionProvider::default().build(),
                    CUDAExecutionProvider::default().build(),
                ])
                .map_err(unavailable("tensorrt"))?,
        };

        let session = builder
            .commit_from_file(&config.model_path)
            .map_err(unavailable("load model"))?;

        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| DetectorError::InferenceUnavailable("model has no outputs".into()))?;

        let names = session
            .metadata()
            .ok()
            .and_then(|m| m.custom("names").ok().flatten())
            .map(|raw| labels::parse_names(&raw))
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| {
                warn!("⚠️ 模型未携带类别表, 使用 COCO 默认类别");
                labels::coco_names()
            });

        info!(
            "✅ YOLOv8 检测模型加载成功: {} ({}类, {}x{}, {:?})",
            config.model_path.display(),
            names.len(),
            config.input_size,
            config.input_size,
            config.execution_provider
        );

        Ok(Self {
            session,
            output_name,
            names,
            size: config.input_size,
            conf: config.conf_threshold,
            iou: config.iou_threshold,
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

impl ObjectDetector for YOLOv8 {
    fn infer(&mut self, image: &RgbaImage) -> Result<Vec<Detection>, DetectorError> {
        let (input, ratio) = preprocess(image, self.size)?;
        let side = self.size as usize;
        let tensor: Value = Tensor::from_array((vec![1usize, 3, side, side], input.into_boxed_slice()))
            .map(Value::from)
            .map_err(|e| DetectorError::Inference(format!("ORT tensor: {}", e)))?;

        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .map_err(|e| DetectorError::Inference(format!("ORT run failed: {}", e)))?;
        let output = outputs
            .get(self.output_name.as_str())
            .ok_or_else(|| DetectorError::Inference("ORT returned no outputs".into()))?;
        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::Inference(format!("ORT extract: {}", e)))?;
        let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();

        let params = Postprocess {
            ratio,
            width: image.width() as f32,
            height: image.height() as f32,
            conf: self.conf,
            iou: self.iou,
        };
        postprocess(data, &dims, &self.names, &params)
    }

    fn name(&self) -> &str {
        "yolov8"
    }
}

/// Letterbox: 等比缩放到左上角, 其余填灰; 返回 CHW 张量数据与缩放比
pub fn preprocess(image: &RgbaImage, size: u32) -> Result<(Vec<f32>, f32), DetectorError> {
    let (w0, h0) = image.dimensions();
    if w0 == 0 || h0 == 0 {
        return Err(DetectorError::Inference("empty frame".into()));
    }
    let ratio = (size as f32 / w0 as f32).min(size as f32 / h0 as f32);
    let w_new = ((w0 as f32 * ratio).round() as u32).clamp(1, size);
    let h_new = ((h0 as f32 * ratio).round() as u32).clamp(1, size);

    let src = fr::images::Image::from_vec_u8(w0, h0, image.as_raw().clone(), fr::PixelType::U8x4)
        .map_err(|e| DetectorError::Inference(format!("resize source: {}", e)))?;
    let mut dst = fr::images::Image::new(w_new, h_new, fr::PixelType::U8x4);
    fr::Resizer::new()
        .resize(
            &src,
            &mut dst,
            &fr::ResizeOptions::new()
                .resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear)),
        )
        .map_err(|e| DetectorError::Inference(format!("resize: {}", e)))?;

    let side = size as usize;
    let plane = side * side;
    let mut chw = vec![PAD_VALUE; 3 * plane];
    for (i, px) in dst.buffer().chunks_exact(4).enumerate() {
        let x = i % w_new as usize;
        let y = i / w_new as usize;
        let idx = y * side + x;
        chw[idx] = px[0] as f32 / 255.0;
        chw[plane + idx] = px[1] as f32 / 255.0;
        chw[2 * plane + idx] = px[2] as f32 / 255.0;
    }
    Ok((chw, ratio))
}

pub struct Postprocess {
    pub ratio: f32,
    pub width: f32,
    pub height: f32,
    pub conf: f32,
    pub iou: f32,
}

/// 解码 `[1, 4 + nc, anchors]` 输出 → 原图坐标检测框 (NMS 后)
pub fn postprocess(
    data: &[f32],
    dims: &[usize],
    names: &[String],
    p: &Postprocess,
) -> Result<Vec<Detection>, DetectorError> {
    let (rows, anchors) = match dims {
        [1, rows, anchors] | [rows, anchors] => (*rows, *anchors),
        _ => {
            return Err(DetectorError::Inference(format!(
                "unexpected output shape {:?}",
                dims
            )))
        }
    };
    if rows <= CXYWH_OFFSET || data.len() < rows * anchors {
        return Err(DetectorError::Inference(format!(
            "output shape {:?} does not match {} values",
            dims,
            data.len()
        )));
    }
    let preds = ArrayView2::from_shape((rows, anchors), &data[..rows * anchors])
        .map_err(|e| DetectorError::Inference(e.to_string()))?;

    let mut candidates = Vec::new();
    for pred in preds.axis_iter(Axis(1)) {
        let bbox = pred.slice(s![0..CXYWH_OFFSET]);
        let clss = pred.slice(s![CXYWH_OFFSET..]);
        let (id, &confidence) = clss
            .iter()
            .enumerate()
            .reduce(|max, x| if x.1 > max.1 { x } else { max })
            .unwrap_or((0, &0.0));
        if confidence < p.conf {
            continue;
        }
        let bbox = BBox::from_cxcywh(
            bbox[0] / p.ratio,
            bbox[1] / p.ratio,
            bbox[2] / p.ratio,
            bbox[3] / p.ratio,
        )
        .clamp(p.width, p.height);
        let label = names
            .get(id)
            .cloned()
            .unwrap_or_else(|| format!("class_{}", id));
        candidates.push(Detection::new(label, confidence, bbox));
    }

    non_max_suppression(&mut candidates, p.iou);
    Ok(candidates)
}
