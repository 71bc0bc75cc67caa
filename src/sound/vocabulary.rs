// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 音效词表: 每行一个音效标识, 忽略空行和 `#` 注释行.
//! 文件不存在不是错误, 得到空词表 (触发变为无操作, 画面仍然运行).

use std::fs;
use std::path::Path;

use tracing::{info, warn};

use super::SoundId;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Vocabulary {
    labels: Vec<SoundId>,
}

impl Vocabulary {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut vocabulary = Self::default();
        for label in labels {
            vocabulary.push(label.as_ref());
        }
        vocabulary
    }

    /// 从文本文件加载词表
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(text) => {
                let vocabulary = Self::parse(&text);
                info!(
                    "🎵 已加载 {} 个音效: {:?}",
                    vocabulary.len(),
                    vocabulary.names()
                );
                vocabulary
            }
            Err(e) => {
                warn!("⚠️ 音效词表 {} 无法读取 ({}), 使用空词表", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn parse(text: &str) -> Self {
        let mut vocabulary = Self::default();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            vocabulary.push(line);
        }
        vocabulary
    }

    fn push(&mut self, raw: &str) {
        let id = SoundId::new(raw);
        if !id.is_empty() && !self.labels.contains(&id) {
            self.labels.push(id);
        }
    }

    pub fn contains(&self, id: &SoundId) -> bool {
        self.labels.contains(id)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[SoundId] {
        &self.labels
    }

    pub fn names(&self) -> Vec<&str> {
        self.labels.iter().map(|l| l.as_str()).collect()
    }

    /// 过滤模型返回的逗号分隔音效列表: 统一小写, 丢弃词表之外的条目, 保序去重
    pub fn filter_palette(&self, raw: &str) -> Vec<SoundId> {
        let mut selected: Vec<SoundId> = Vec::new();
        for item in raw.split(',') {
            let id = SoundId::new(item);
            if self.contains(&id) && !selected.contains(&id) {
                selected.push(id);
            }
        }
        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_skips_blank_and_comment_lines() {
        let vocabulary = Vocabulary::parse("# ambient\nrain\n\n  Wind \n#city\ncity\nrain\n");
        assert_eq!(vocabulary.names(), vec!["rain", "wind", "city"]);
    }

    #[test]
    fn test_filter_palette_drops_unknown_entries() {
        let vocabulary = Vocabulary::new(["rain", "wind", "city"]);
        let palette = vocabulary.filter_palette("rain, THUNDER, nonsense_effect");
        assert_eq!(palette, vec![SoundId::new("rain")]);
    }

    #[test]
    fn test_filter_palette_normalizes_case_and_dedups() {
        let vocabulary = Vocabulary::new(["rain", "wind", "city"]);
        let palette = vocabulary.filter_palette(" Wind ,CITY,\nwind, rain\n");
        let names: Vec<&str> = palette.iter().map(|s| s.as_str()).collect();
        assert_eq!(names, vec!["wind", "city", "rain"]);
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let vocabulary = Vocabulary::load(dir.path().join("missing.txt"));
        assert!(vocabulary.is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# labels").unwrap();
        writeln!(file, "Forest").unwrap();
        writeln!(file, "water").unwrap();
        let vocabulary = Vocabulary::load(file.path());
        assert_eq!(vocabulary.names(), vec!["forest", "water"]);
        assert!(vocabulary.contains(&SoundId::new("FOREST")));
    }
}
