// 构建脚本: ez-ffmpeg 静态链接时补充 FFmpeg 依赖的系统库
fn main() {
    #[cfg(all(target_os = "windows", target_env = "msvc"))]
    {
        // Intel QSV 硬件解码
        println!("cargo:rustc-link-lib=dylib=libmfx");
        println!("cargo:rustc-link-lib=dylib=libx264");

        // DirectShow 摄像头采集 (OLE / VFW)
        println!("cargo:rustc-link-lib=dylib=oleaut32");
        println!("cargo:rustc-link-lib=dylib=vfw32");

        // TLS
        println!("cargo:rustc-link-lib=dylib=secur32");
    }
}
