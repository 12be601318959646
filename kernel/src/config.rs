//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 内核配置
//!
//! 编译期常量由 build.rs 根据 Kernel.toml 生成；运行期配置
//! [`KernelConfig`] 通过 TOML 文本加载，用于选择 CPU 数量、物理页帧数量
//! 与调度策略。

use core::fmt;
use core::str::FromStr;

use serde::Deserialize;

include!(concat!(env!("OUT_DIR"), "/config.rs"));

/// 调度策略
///
/// 启动时选定，运行期间不变。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedPolicy {
    /// 先来先服务
    Fcfs,
    /// 轮转
    Rr,
    /// 彩票调度
    Lottery,
    /// 基于动态优先级的调度
    Pbs,
    /// 多级反馈队列
    Mlfq,
}

impl SchedPolicy {
    pub const ALL: [SchedPolicy; 5] = [
        SchedPolicy::Fcfs,
        SchedPolicy::Rr,
        SchedPolicy::Lottery,
        SchedPolicy::Pbs,
        SchedPolicy::Mlfq,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SchedPolicy::Fcfs => "fcfs",
            SchedPolicy::Rr => "rr",
            SchedPolicy::Lottery => "lottery",
            SchedPolicy::Pbs => "pbs",
            SchedPolicy::Mlfq => "mlfq",
        }
    }
}

impl FromStr for SchedPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SchedPolicy::ALL
            .into_iter()
            .find(|p| p.name() == s)
            .ok_or_else(|| ConfigError::UnknownPolicy(s.into()))
    }
}

impl fmt::Display for SchedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 机器配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    /// 启动的 CPU 数量
    pub cpus: usize,
    /// 分配器托管的物理页帧数量
    pub frames: usize,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            cpus: DEFAULT_CPUS,
            frames: DEFAULT_PHYS_FRAMES,
        }
    }
}

/// 调度配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedConfig {
    pub policy: SchedPolicy,
}

impl Default for SchedConfig {
    fn default() -> Self {
        Self {
            policy: DEFAULT_SCHED_POLICY.parse().unwrap_or(SchedPolicy::Rr),
        }
    }
}

/// 运行期内核配置
///
/// ```toml
/// [machine]
/// cpus = 2
/// frames = 1024
///
/// [sched]
/// policy = "mlfq"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    pub machine: MachineConfig,
    pub sched: SchedConfig,
}

impl KernelConfig {
    /// 从 TOML 文本加载并校验配置
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: KernelConfig = toml::from_str(text).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// 便捷构造：指定策略与 CPU 数量，其余取默认值
    pub fn with_policy(policy: SchedPolicy, cpus: usize) -> Self {
        let mut config = KernelConfig::default();
        config.sched.policy = policy;
        config.machine.cpus = cpus;
        config
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.machine.cpus == 0 || self.machine.cpus > MAX_CPUS {
            return Err(ConfigError::InvalidCpus(self.machine.cpus));
        }
        // 每个进程槽位在启动时需要一个内核栈页帧
        if self.machine.frames <= NPROC {
            return Err(ConfigError::InvalidFrames(self.machine.frames));
        }
        Ok(())
    }
}

/// 配置错误
#[derive(Debug)]
pub enum ConfigError {
    Parse(toml::de::Error),
    UnknownPolicy(String),
    InvalidCpus(usize),
    InvalidFrames(usize),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Parse(e) => write!(f, "config parse error: {}", e),
            ConfigError::UnknownPolicy(p) => write!(f, "unknown scheduling policy '{}'", p),
            ConfigError::InvalidCpus(n) => write!(f, "cpus must be in 1..={}, got {}", MAX_CPUS, n),
            ConfigError::InvalidFrames(n) => {
                write!(f, "frames must exceed the process table size {}, got {}", NPROC, n)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
