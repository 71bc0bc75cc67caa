// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 类别名称: 优先读取模型元数据 `names`, 缺失时使用 COCO 80 类

use once_cell::sync::Lazy;
use regex::Regex;

pub const COCO_NAMES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
    "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch", "potted plant",
    "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote", "keyboard", "cell phone",
    "microwave", "oven", "toaster", "sink", "refrigerator", "book", "clock", "vase", "scissors",
    "teddy bear", "hair drier", "toothbrush",
];

// Ultralytics 导出的元数据形如 {0: 'person', 1: 'bicycle', ...}
static NAMES_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r#"(\d+)\s*:\s*['"]([^'"]*)['"]"#).ok());

/// 解析模型元数据中的类别表, 按类别编号排序
pub fn parse_names(metadata: &str) -> Vec<String> {
    let Some(re) = NAMES_RE.as_ref() else {
        return vec![];
    };
    let mut pairs: Vec<(usize, String)> = re
        .captures_iter(metadata)
        .filter_map(|c| {
            let id = c.get(1)?.as_str().parse().ok()?;
            Some((id, c.get(2)?.as_str().to_string()))
        })
        .collect();
    pairs.sort_by_key(|(id, _)| *id);
    pairs.into_iter().map(|(_, name)| name).collect()
}

pub fn coco_names() -> Vec<String> {
    COCO_NAMES.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names_metadata() {
        let meta = "{1: 'bicycle', 0: 'person', 2: \"potted plant\"}";
        assert_eq!(parse_names(meta), vec!["person", "bicycle", "potted plant"]);
    }

    #[test]
    fn test_parse_names_garbage() {
        assert!(parse_names("not a dict").is_empty());
    }

    #[test]
    fn test_coco_table() {
        assert_eq!(COCO_NAMES[2], "car");
        assert_eq!(COCO_NAMES[25], "umbrella");
        assert_eq!(coco_names().len(), 80);
    }
}
