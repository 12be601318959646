//! procsched 构建脚本
//!
//! 这个脚本在编译前运行，负责：
//! 1. 解析工作空间根目录的 Kernel.toml
//! 2. 生成 config.rs 常量（写入 OUT_DIR，由 src/config.rs include）

use std::env;
use std::fs;
use std::path::PathBuf;

fn main() {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let config_path = manifest_dir.join("../Kernel.toml");
    println!("cargo:rerun-if-changed={}", config_path.display());

    // 没有 Kernel.toml 时使用内置默认值
    let config: toml::Value = match fs::read_to_string(&config_path) {
        Ok(content) => toml::from_str(&content).expect("Kernel.toml 解析失败"),
        Err(_) => {
            println!("cargo:warning=Kernel.toml not found, using built-in defaults");
            toml::Value::Table(toml::map::Map::new())
        }
    };

    if let Some(name) = get_str(&config, "general", "name") {
        println!("cargo:rustc-env=CARGO_KERNEL_NAME={}", name);
    }

    generate_config_code(&config);
}

fn get_str<'a>(config: &'a toml::Value, section: &str, key: &str) -> Option<&'a str> {
    config.get(section).and_then(|s| s.get(key)).and_then(|v| v.as_str())
}

fn get_int(config: &toml::Value, section: &str, key: &str, default: i64) -> i64 {
    config
        .get(section)
        .and_then(|s| s.get(key))
        .and_then(|v| v.as_integer())
        .unwrap_or(default)
}

fn generate_config_code(config: &toml::Value) {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());

    let kernel_name = get_str(config, "general", "name").unwrap_or("procsched");
    let kernel_version = get_str(config, "general", "version").unwrap_or("0.1.0");

    let page_size = get_int(config, "memory", "page_size", 4096);
    assert!(
        page_size > 0 && (page_size & (page_size - 1)) == 0,
        "memory.page_size 必须是 2 的幂"
    );
    let page_shift = page_size.trailing_zeros();
    let phys_frames = get_int(config, "memory", "phys_frames", 1024);

    let nproc = get_int(config, "process", "nproc", 64);
    let nofile = get_int(config, "process", "nofile", 16);

    let max_cpus = get_int(config, "smp", "max_cpus", 8);
    let default_cpus = get_int(config, "smp", "default_cpus", 1);

    let default_policy = get_str(config, "sched", "default_policy").unwrap_or("rr");
    let mlfq_levels = get_int(config, "sched", "mlfq_levels", 5);
    let mlfq_aging_ticks = get_int(config, "sched", "mlfq_aging_ticks", 30);
    let default_tickets = get_int(config, "sched", "default_tickets", 1);
    let default_priority = get_int(config, "sched", "default_priority", 60);

    let config_code = format!(
        r#"// procsched 内核配置（自动生成）
//
// 此文件由 build.rs 根据 Kernel.toml 自动生成，请勿手动修改

// ============================================================
// 基本信息
// ============================================================

/// 内核名称
pub const KERNEL_NAME: &str = "{kernel_name}";

/// 内核版本
pub const KERNEL_VERSION: &str = "{kernel_version}";

// ============================================================
// 内存配置
// ============================================================

/// 页大小
pub const PAGE_SIZE: usize = {page_size};

/// 页大小位移
pub const PAGE_SHIFT: usize = {page_shift};

/// 默认托管的物理页帧数
pub const DEFAULT_PHYS_FRAMES: usize = {phys_frames};

// ============================================================
// 进程配置
// ============================================================

/// 进程表容量
pub const NPROC: usize = {nproc};

/// 每进程打开文件数上限
pub const NOFILE: usize = {nofile};

// ============================================================
// SMP 配置
// ============================================================

/// 最大CPU数量
pub const MAX_CPUS: usize = {max_cpus};

/// 默认启动的CPU数量
pub const DEFAULT_CPUS: usize = {default_cpus};

// ============================================================
// 调度器配置
// ============================================================

/// 默认调度策略
pub const DEFAULT_SCHED_POLICY: &str = "{default_policy}";

/// MLFQ 队列层数
pub const MLFQ_LEVELS: usize = {mlfq_levels};

/// MLFQ 老化阈值 (滴答)
pub const MLFQ_AGING_TICKS: u64 = {mlfq_aging_ticks};

/// 新进程默认彩票数
pub const DEFAULT_TICKETS: u32 = {default_tickets};

/// 新进程默认静态优先级
pub const DEFAULT_PRIORITY: u32 = {default_priority};
"#
    );

    fs::write(out_dir.join("config.rs"), config_code).expect("无法写入 config.rs");
}
