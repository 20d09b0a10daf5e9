//! 出现计数: 画面从无目标变为有目标时 +1

use chrono::{DateTime, Local};

use super::{CountEvent, CountingPolicy, PolicyState};

/// 帧级状态 (不按轨迹区分)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Presence {
    NoObject,
    ObjectPresent,
}

pub struct PresencePolicy {
    state: Presence,
}

impl PresencePolicy {
    pub fn new() -> Self {
        Self {
            state: Presence::NoObject,
        }
    }

    pub fn state(&self) -> Presence {
        self.state
    }
}

impl Default for PresencePolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl CountingPolicy for PresencePolicy {
    fn name(&self) -> &'static str {
        "presence"
    }

    fn initial_state(&self) -> PolicyState {
        PolicyState::Stateless
    }

    fn on_frame_detections(&mut self, count: usize, now: DateTime<Local>) -> Option<CountEvent> {
        let next = if count > 0 {
            Presence::ObjectPresent
        } else {
            Presence::NoObject
        };
        let entered = self.state == Presence::NoObject && next == Presence::ObjectPresent;
        self.state = next;
        entered.then(|| CountEvent::frame(now))
    }
}
