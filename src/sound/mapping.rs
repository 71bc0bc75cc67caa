// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 检测类别 → 音效标识 映射表
//!
//! 编译期生成的静态表, 启动后只读. 多对一: 多种车辆都映射到 "city".

use phf::phf_map;

use super::SoundId;

static CLASS_TO_SOUND: phf::Map<&'static str, &'static str> = phf_map! {
    "person" => "wind",
    "umbrella" => "rain",
    "car" => "city",
    "truck" => "city",
    "bus" => "city",
    "motorcycle" => "city",
    "bird" => "forest",
    "cat" => "forest",
    "dog" => "forest",
    "potted plant" => "forest",
    "boat" => "water",
    "kite" => "wind",
};

/// 查询检测类别对应的音效. 未映射的类别返回 `None`, 调用方视为无操作.
pub fn lookup(class_label: &str) -> Option<SoundId> {
    CLASS_TO_SOUND
        .get(class_label)
        .or_else(|| CLASS_TO_SOUND.get(class_label.trim().to_lowercase().as_str()))
        .map(|s| SoundId::new(s))
}

/// 所有被映射到的音效 (去重, 用于启动时提示词表覆盖情况)
pub fn mapped_sounds() -> Vec<SoundId> {
    let mut sounds: Vec<SoundId> = CLASS_TO_SOUND.values().map(|s| SoundId::new(s)).collect();
    sounds.sort();
    sounds.dedup();
    sounds
}
