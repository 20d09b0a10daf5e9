//! 驻留确认计数: 轨迹连续跟踪超过 N 帧后计数一次

use chrono::{DateTime, Local};

use super::{CountEvent, CountingPolicy, PolicyState};
use crate::detection::Track;

/// 默认确认帧数 (age > 5 才计数)
pub const DEFAULT_DWELL_FRAMES: u32 = 5;

pub struct DwellPolicy {
    min_frames: u32,
}

impl DwellPolicy {
    pub fn new(min_frames: u32) -> Self {
        Self { min_frames }
    }
}

impl Default for DwellPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_DWELL_FRAMES)
    }
}

impl CountingPolicy for DwellPolicy {
    fn name(&self) -> &'static str {
        "dwell"
    }

    fn initial_state(&self) -> PolicyState {
        PolicyState::Dwell { confirmed: false }
    }

    fn on_track_updated(&mut self, track: &mut Track, now: DateTime<Local>) -> Option<CountEvent> {
        let PolicyState::Dwell { confirmed } = track.policy_state else {
            track.policy_state = self.initial_state();
            return None;
        };
        if confirmed || track.age <= self.min_frames {
            return None;
        }
        track.policy_state = PolicyState::Dwell { confirmed: true };
        Some(CountEvent::for_track(track, now))
    }
}
