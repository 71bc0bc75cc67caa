// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod config; // 命令行参数与配置文件
pub mod detection; // 智能检测系统
pub mod error; // 错误分类
pub mod input; // 视频输入系统
pub mod pipeline; // 多路检测流水线
pub mod renderer; // macroquad 操作员窗口
pub mod services; // Gemini / 播放器
pub mod session; // 会话编排
pub mod sound; // 音效触发系统

pub use crate::config::{Args, Settings};
pub use crate::detection::{Detection, YOLOv8};
pub use crate::pipeline::{MultiSourcePipeline, PipelineState, PipelineTopology, StopSignal};
pub use crate::session::{MemorySession, SessionOutcome};

/// 按置信度降序贪心抑制重叠框: 只在同类之间比较, IoU 大于阈值的低分框被丢弃
pub fn non_max_suppression(xs: &mut Vec<Detection>, iou_threshold: f32) {
    xs.sort_by(|b1, b2| b2.confidence.total_cmp(&b1.confidence));

    let mut current_index = 0;
    for index in 0..xs.len() {
        let mut drop = false;
        for prev_index in 0..current_index {
            if xs[prev_index].class_label != xs[index].class_label {
                continue;
            }
            let iou = xs[prev_index].bbox.iou(&xs[index].bbox);
            if iou > iou_threshold {
                drop = true;
                break;
            }
        }
        if !drop {
            xs.swap(current_index, index);
            current_index += 1;
        }
    }
    xs.truncate(current_index);
}

pub fn gen_time_string(delimiter: &str) -> String {
    let t_now = chrono::Local::now();
    let fmt = format!(
        "%Y{}%m{}%d{}%H{}%M{}%S{}%f",
        delimiter, delimiter, delimiter, delimiter, delimiter, delimiter
    );
    t_now.format(&fmt).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::BBox;

    #[test]
    fn test_nms_keeps_best_of_overlapping() {
        let mut xs = vec![
            Detection::new("car", 0.6, BBox::new(0., 0., 10., 10.)),
            Detection::new("car", 0.9, BBox::new(1., 1., 11., 11.)),
            Detection::new("person", 0.5, BBox::new(50., 50., 60., 60.)),
        ];
        non_max_suppression(&mut xs, 0.45);
        assert_eq!(xs.len(), 2);
        assert_eq!(xs[0].confidence, 0.9);
        assert_eq!(xs[1].class_label, "person");
    }

    #[test]
    fn test_nms_keeps_overlapping_different_classes() {
        // 骑车的人: 人和摩托车大面积重叠, 两者都要保留
        let mut xs = vec![
            Detection::new("person", 0.92, BBox::new(100., 50., 200., 300.)),
            Detection::new("motorcycle", 0.88, BBox::new(95., 120., 205., 310.)),
            Detection::new("person", 0.5, BBox::new(102., 52., 202., 302.)),
        ];
        assert!(xs[0].bbox.iou(&xs[1].bbox) > 0.45);
        non_max_suppression(&mut xs, 0.45);
        let labels: Vec<&str> = xs.iter().map(|d| d.class_label.as_str()).collect();
        assert_eq!(labels, vec!["person", "motorcycle"]);
    }

    #[test]
    fn test_gen_time_string() {
        let s = gen_time_string("");
        assert!(s.len() >= 20);
        assert!(s.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(gen_time_string("-").matches('-').count(), 6);
    }
}
