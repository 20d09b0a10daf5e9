// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 计数策略 (Counting Policy)
///
/// 三种可互换的状态机, 每次部署只启用其中一种:
/// - Presence: 画面从"无目标"变为"有目标"时计数一次
/// - Dwell:    轨迹连续跟踪超过 N 帧后确认计数
/// - Line:     轨迹质心穿越水平线 y = L 时计数
pub mod dwell;
pub mod line;
pub mod presence;

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Local};
use phf::phf_map;
use serde::{Deserialize, Serialize};

use crate::config::CounterConfig;
use crate::detection::Track;

pub use dwell::DwellPolicy;
pub use line::LinePolicy;
pub use presence::PresencePolicy;

// ========== 状态与事件 ==========

/// 运动方向 (越线策略)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Unknown,
    Up,
    Down,
}

/// 每条轨迹的策略私有状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum PolicyState {
    /// 策略不需要轨迹级状态
    Stateless,
    Dwell {
        confirmed: bool,
    },
    Line {
        direction: Direction,
        crossed: bool,
    },
}

/// 计数事件 (+1)
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CountEvent {
    pub timestamp: DateTime<Local>,
    pub delta: u32,
    pub class_id: Option<u32>,
    pub track_id: Option<u32>,
    pub direction: Option<Direction>,
}

impl CountEvent {
    /// 帧级事件 (不关联轨迹)
    pub fn frame(timestamp: DateTime<Local>) -> Self {
        Self {
            timestamp,
            delta: 1,
            class_id: None,
            track_id: None,
            direction: None,
        }
    }

    pub fn for_track(track: &Track, timestamp: DateTime<Local>) -> Self {
        Self {
            timestamp,
            delta: 1,
            class_id: Some(track.class_id),
            track_id: Some(track.id),
            direction: None,
        }
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }
}

// ========== 策略统一接口 ==========

/// 计数策略 Trait
pub trait CountingPolicy {
    fn name(&self) -> &'static str;

    /// 新建轨迹的初始状态
    fn initial_state(&self) -> PolicyState;

    /// 轨迹新建或重新匹配后调用, 每条轨迹每帧最多产生一个事件
    fn on_track_updated(&mut self, _track: &mut Track, _now: DateTime<Local>) -> Option<CountEvent> {
        None
    }

    /// 每帧调用一次, 传入过滤后的检测数量
    fn on_frame_detections(&mut self, _count: usize, _now: DateTime<Local>) -> Option<CountEvent> {
        None
    }
}

// ========== 策略选择 ==========

/// 策略类型 (配置时选择)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    Presence,
    Dwell,
    Line,
}

static POLICIES: [PolicyKind; 3] = [PolicyKind::Presence, PolicyKind::Dwell, PolicyKind::Line];
static POLICY_INDICES: phf::Map<&'static str, usize> = phf_map! {
    "presence" => 0,
    "transition" => 0,
    "dwell" => 1,
    "confirm" => 1,
    "line" => 2,
    "crossing" => 2,
};

impl PolicyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Presence => "presence",
            Self::Dwell => "dwell",
            Self::Line => "line",
        }
    }

    /// 根据配置构建策略实例
    pub fn build(&self, config: &CounterConfig) -> Box<dyn CountingPolicy> {
        match self {
            Self::Presence => Box::new(PresencePolicy::new()),
            Self::Dwell => Box::new(DwellPolicy::new(config.dwell_frames)),
            Self::Line => Box::new(LinePolicy::new(config.line_y, config.direction_threshold)),
        }
    }
}

impl FromStr for PolicyKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        POLICY_INDICES
            .get(s.trim().to_lowercase().as_str())
            .map(|&idx| POLICIES[idx])
            .ok_or_else(|| anyhow!("unknown counting policy '{}' (presence|dwell|line)", s))
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_kind_parse() {
        assert_eq!("presence".parse::<PolicyKind>().unwrap(), PolicyKind::Presence);
        assert_eq!("Crossing".parse::<PolicyKind>().unwrap(), PolicyKind::Line);
        assert_eq!(" dwell ".parse::<PolicyKind>().unwrap(), PolicyKind::Dwell);
        assert!("hungarian".parse::<PolicyKind>().is_err());
    }

    #[test]
    fn test_build_selects_variant() {
        let config = CounterConfig::default();
        assert_eq!(PolicyKind::Presence.build(&config).name(), "presence");
        assert_eq!(PolicyKind::Dwell.build(&config).name(), "dwell");
        assert_eq!(PolicyKind::Line.build(&config).name(), "line");
        assert_eq!(
            PolicyKind::Dwell.build(&config).initial_state(),
            PolicyState::Dwell { confirmed: false }
        );
    }
}
