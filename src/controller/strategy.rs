//! 策略选择
//!
//! 控制器来源、蒸馏门控选项，以及可执行的解码策略。

use std::fmt;

/// 控制器来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControllerSource {
    #[default]
    Auto,
    Distilled,
    Ppo,
    Baseline,
}

impl ControllerSource {
    /// UI 中可选的全部取值（按显示顺序）
    pub const ALL: [Self; 4] = [Self::Auto, Self::Distilled, Self::Ppo, Self::Baseline];

    /// 解析来源，大小写不敏感；空值或未知值视为 `auto`
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("distilled") => Self::Distilled,
            Some("ppo") => Self::Ppo,
            Some("baseline") => Self::Baseline,
            _ => Self::Auto,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Distilled => "distilled",
            Self::Ppo => "ppo",
            Self::Baseline => "baseline",
        }
    }
}

impl fmt::Display for ControllerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 蒸馏门控模型选项
///
/// 各层都会接收并透传，但目前没有任何逻辑读取它。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistilledGate {
    #[default]
    Auto,
    Logreg,
    Mlp32,
}

impl DistilledGate {
    pub const ALL: [Self; 3] = [Self::Auto, Self::Logreg, Self::Mlp32];

    /// 解析选项，大小写不敏感；空值或未知值视为 `auto`
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("logreg") => Self::Logreg,
            Some("mlp32") => Self::Mlp32,
            _ => Self::Auto,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Logreg => "logreg",
            Self::Mlp32 => "mlp32",
        }
    }
}

impl fmt::Display for DistilledGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 解码策略
///
/// 新策略 = 新增变体 + 在控制器的分派中加一个分支。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// 直接调用模型
    Baseline,
    /// 记忆增强（检索尚未接入，当前等同于 baseline）
    Memory,
}

impl Strategy {
    /// 策略编号
    pub fn action_id(&self) -> u32 {
        match self {
            Self::Baseline => 0,
            Self::Memory => 1,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Baseline => "baseline",
            Self::Memory => "memory",
        }
    }
}

/// 控制器输出
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyResult {
    pub answer: String,
    pub strategy: String,
    pub action_id: u32,
}

impl StrategyResult {
    pub fn new(answer: impl Into<String>, strategy: Strategy) -> Self {
        Self {
            answer: answer.into(),
            strategy: strategy.name().to_string(),
            action_id: strategy.action_id(),
        }
    }
}

/// 策略门控
pub trait StrategyGate: Send + Sync {
    /// 为一次请求选择策略
    fn select(&self, source: ControllerSource, distilled: DistilledGate) -> Strategy;
}

/// 总是选择 baseline 的门控
///
/// 蒸馏分类器和 PPO 策略接入前使用。
#[derive(Debug, Default, Clone, Copy)]
pub struct BaselineGate;

impl StrategyGate for BaselineGate {
    fn select(&self, _source: ControllerSource, _distilled: DistilledGate) -> Strategy {
        Strategy::Baseline
    }
}
