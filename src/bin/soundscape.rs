/// 场景音效 (Soundscape)
///
/// 场景描述 → Gemini 音效调色板 → 实时目标检测 → SuperCollider 音效
///
/// 系统架构:
/// 1. 会话线程: 调色板 / 视频生成 / 检测流水线 (采集 + 检测 + 仲裁工作线程)
/// 2. 主线程:   操作员窗口 (macroquad 事件循环)
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::thread;

use anyhow::{anyhow, Result};
use clap::Parser;
use mimalloc::MiMalloc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use yolo_soundscape::config::{Args, Settings};
use yolo_soundscape::detection::{Overlay, YoloFactory};
use yolo_soundscape::input::list_camera_devices;
use yolo_soundscape::pipeline::{ChannelSink, StopSignal};
use yolo_soundscape::renderer::Renderer;
use yolo_soundscape::services::{FallbackPlayer, GeminiClient, MpvPlayer, WindowPlayer};
use yolo_soundscape::session::{Collaborators, MemorySession, SessionOptions};
use yolo_soundscape::sound::{SessionTriggerTracker, TriggerDispatcher, UdpOscSink, Vocabulary};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn read_prompt() -> Result<String> {
    print!("\n请输入你的回忆或梦境: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_level.as_deref());

    if args.list_cameras {
        let devices = list_camera_devices();
        if devices.is_empty() {
            warn!("⚠️ 未发现摄像头设备");
        }
        for (index, name) in devices {
            println!("  [{}] {}", index, name);
        }
        return Ok(());
    }

    info!("🚀 场景音效系统启动");
    let mut settings = Settings::load(&args.config);
    settings.apply_args(&args);
    settings.resolve_api_key();
    settings.validate()?;
    settings.print_summary();

    let scene = match args.prompt_text() {
        text if !text.is_empty() => text,
        _ => read_prompt()?,
    };
    if scene.is_empty() {
        warn!("⚠️ 没有输入场景描述");
        return Ok(());
    }

    // ========== 音频引擎 ==========
    let vocabulary = Arc::new(Vocabulary::load(&settings.labels_file));
    let sink = UdpOscSink::connect(&settings.osc_host, settings.osc_port)?;
    info!("🔊 音频引擎: {}", sink.target());
    let dispatcher = Arc::new(TriggerDispatcher::new(
        Arc::new(sink),
        vocabulary,
        Arc::new(SessionTriggerTracker::new()),
        settings.osc_paths(),
    ));

    // ========== 会话 ==========
    let gemini = Arc::new(GeminiClient::new(settings.gemini()));
    let stop = StopSignal::new();
    let (frame_tx, frame_rx) = crossbeam_channel::bounded(2);
    let opener = Arc::new(settings.opener());
    // 没有 mpv 时在主线程打开内置全屏窗口
    let playback = FallbackPlayer::new(
        Arc::new(MpvPlayer::default()),
        Arc::new(WindowPlayer::new(opener.clone())),
    );
    let parts = Collaborators {
        palette: gemini.clone(),
        video: gemini,
        playback: Arc::new(playback),
        opener,
        detectors: Arc::new(YoloFactory::new(settings.yolo())),
        overlay: Arc::new(Overlay::load(settings.font_path.as_deref())),
        display: Arc::new(ChannelSink::new(frame_tx)),
    };
    let session = MemorySession::new(
        SessionOptions::from_settings(&settings, args.video.clone()),
        dispatcher,
        parts,
        stop.clone(),
    );

    let outcome = if settings.enable_detection {
        let worker = thread::Builder::new()
            .name("session".into())
            .spawn(move || session.run(&scene))?;

        // ========== 主线程: 操作员窗口 ==========
        Renderer::run(frame_rx, stop.clone());
        // 窗口关闭也视为退出请求
        stop.trigger();
        worker
            .join()
            .map_err(|_| anyhow!("session thread panicked"))??
    } else {
        drop(frame_rx);
        session.run(&scene)?
    };

    if let Some(report) = &outcome.report {
        info!(
            "📊 {} 共 {} 次迭代, 状态 {}",
            report.topology, report.iterations, report.state
        );
    }
    info!("✅ 完成");
    Ok(())
}
