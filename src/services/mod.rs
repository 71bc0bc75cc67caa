/// 外部服务 (External Services)
///
/// - Gemini:   场景 → 音效调色板 / 视频生成
/// - Backoff:  长任务轮询
/// - Playback: 全屏播放生成的视频 (mpv, 找不到时用内置窗口)
pub mod backoff;
pub mod gemini;
pub mod playback;

pub use backoff::Backoff;
pub use gemini::{GeminiClient, GeminiOptions, PaletteService, VideoService};
pub use playback::{feed_looping, FallbackPlayer, MpvPlayer, Playback, WindowPlayer};
