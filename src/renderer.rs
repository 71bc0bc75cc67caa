// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 操作员窗口 (macroquad)
//!
//! 只负责显示: 接收流水线合成好的画面, 按 Q / Esc 请求停止.
//! 流水线结束 (发送端全部释放) 后窗口自动关闭.
//! 无检测时也用作内置全屏播放窗口 (不显示状态栏).

use std::time::Instant;

use crossbeam_channel::{Receiver, TryRecvError};
use macroquad::prelude::*;
use macroquad::window::Conf;
use macroquad::Window;
use tracing::info;

use crate::pipeline::{DisplayFrame, StopSignal};
use crate::sound::SoundId;

pub const WINDOW_TITLE: &str = "Soundscape";

/// 取出通道中最新的一帧, 丢弃旧帧; 第二个返回值表示发送端已全部关闭
pub fn drain_latest(rx: &Receiver<DisplayFrame>) -> (Option<DisplayFrame>, bool) {
    let mut latest = None;
    loop {
        match rx.try_recv() {
            Ok(frame) => latest = Some(frame),
            Err(TryRecvError::Empty) => return (latest, false),
            Err(TryRecvError::Disconnected) => return (latest, true),
        }
    }
}

/// 保持宽高比缩放到窗口并居中: (x, y, w, h)
pub fn fit_rect(tex_w: f32, tex_h: f32, screen_w: f32, screen_h: f32) -> (f32, f32, f32, f32) {
    if tex_w <= 0.0 || tex_h <= 0.0 {
        return (0.0, 0.0, 0.0, 0.0);
    }
    let scale = (screen_w / tex_w).min(screen_h / tex_h);
    let (w, h) = (tex_w * scale, tex_h * scale);
    ((screen_w - w) / 2.0, (screen_h - h) / 2.0, w, h)
}

pub fn hud_line(triggered: &[SoundId]) -> String {
    if triggered.is_empty() {
        "sounds: -".to_string()
    } else {
        let names: Vec<&str> = triggered.iter().map(SoundId::as_str).collect();
        format!("sounds: {}", names.join(", "))
    }
}

pub struct Renderer {
    frames: Receiver<DisplayFrame>,
    stop: StopSignal,
    last_frame: Option<Texture2D>,
    triggered: Vec<SoundId>,
    iteration: u64,
    closed: bool,
    show_hud: bool,

    render_count: u64,
    render_last: Instant,
    render_fps: f64,
}

impl Renderer {
    pub fn new(frames: Receiver<DisplayFrame>, stop: StopSignal) -> Self {
        info!("🎨 渲染器启动");
        Self {
            frames,
            stop,
            last_frame: None,
            triggered: Vec::new(),
            iteration: 0,
            closed: false,
            show_hud: true,
            render_count: 0,
            render_last: Instant::now(),
            render_fps: 0.0,
        }
    }

    pub fn window_conf() -> Conf {
        Conf {
            window_title: WINDOW_TITLE.to_string(),
            window_width: 1280,
            window_height: 960,
            window_resizable: true,
            ..Default::default()
        }
    }

    pub fn without_hud(mut self) -> Self {
        self.show_hud = false;
        self
    }

    pub fn playback_conf() -> Conf {
        Conf {
            fullscreen: true,
            ..Self::window_conf()
        }
    }

    /// 在主线程运行窗口, 直到流水线结束或窗口被关闭
    pub fn run(frames: Receiver<DisplayFrame>, stop: StopSignal) {
        Self::new(frames, stop).launch(Self::window_conf());
    }

    /// 全屏播放窗口, 直到送帧线程结束或按 Q / Esc
    pub fn run_playback(frames: Receiver<DisplayFrame>, stop: StopSignal) {
        Self::new(frames, stop)
            .without_hud()
            .launch(Self::playback_conf());
    }

    fn launch(self, conf: Conf) {
        let mut renderer = self;
        Window::from_config(conf, async move {
            loop {
                renderer.update();
                renderer.handle_input();
                if renderer.should_close() {
                    break;
                }
                renderer.draw();
                next_frame().await;
            }
            info!("🎨 渲染器退出");
        });
    }

    pub fn should_close(&self) -> bool {
        self.closed
    }

    pub fn update(&mut self) {
        let (latest, disconnected) = drain_latest(&self.frames);
        if let Some(frame) = latest {
            self.upload(&frame);
            self.iteration = frame.iteration;
            self.triggered = frame.triggered;
        }
        self.closed = disconnected;
    }

    fn upload(&mut self, frame: &DisplayFrame) {
        let (width, height) = (frame.image.width() as u16, frame.image.height() as u16);
        // 只在分辨率变化时重建纹理
        match &self.last_frame {
            Some(tex) if tex.width() == width as f32 && tex.height() == height as f32 => {
                tex.update(&Image {
                    bytes: frame.image.as_raw().clone(),
                    width,
                    height,
                });
            }
            _ => {
                let texture = Texture2D::from_rgba8(width, height, frame.image.as_raw());
                texture.set_filter(FilterMode::Linear);
                self.last_frame = Some(texture);
            }
        }
    }

    pub fn handle_input(&mut self) {
        if is_key_pressed(KeyCode::Q) || is_key_pressed(KeyCode::Escape) {
            if !self.stop.is_triggered() {
                info!("⏹️ 用户请求退出");
            }
            self.stop.trigger();
        }
    }

    pub fn draw(&mut self) {
        clear_background(BLACK);

        match &self.last_frame {
            Some(texture) => {
                let (x, y, w, h) =
                    fit_rect(texture.width(), texture.height(), screen_width(), screen_height());
                draw_texture_ex(
                    texture,
                    x,
                    y,
                    WHITE,
                    DrawTextureParams {
                        dest_size: Some(vec2(w, h)),
                        ..Default::default()
                    },
                );
            }
            None => {
                draw_text("waiting for frames...", 20.0, screen_height() / 2.0, 32.0, GRAY);
            }
        }

        if !self.show_hud {
            return;
        }

        self.render_count += 1;
        let now = Instant::now();
        if now.duration_since(self.render_last).as_secs() >= 1 {
            self.render_fps =
                self.render_count as f64 / now.duration_since(self.render_last).as_secs_f64();
            self.render_count = 0;
            self.render_last = now;
        }

        draw_rectangle(0.0, 0.0, screen_width(), 56.0, Color::new(0.0, 0.0, 0.0, 0.6));
        draw_text(&hud_line(&self.triggered), 10.0, 22.0, 22.0, GREEN);
        let status = format!(
            "frame {}  render {:.0} fps  [Q/Esc] quit",
            self.iteration, self.render_fps
        );
        draw_text(&status, 10.0, 46.0, 18.0, WHITE);
    }
}
