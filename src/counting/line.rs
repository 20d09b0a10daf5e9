//! 越线计数 (Line crossing)
//!
//! 水平线 y = L, 质心从线一侧移动到另一侧 (或落在线上) 时计数一次。
//! 方向在第一次纵向位移超过阈值时确定, 仅用于显示。

use chrono::{DateTime, Local};

use super::{CountEvent, CountingPolicy, Direction, PolicyState};
use crate::detection::Track;

/// 默认方向判定阈值 (像素)
pub const DEFAULT_DIRECTION_THRESHOLD: i32 = 10;

pub struct LinePolicy {
    line_y: i32,
    direction_threshold: i32,
}

impl LinePolicy {
    pub fn new(line_y: i32, direction_threshold: i32) -> Self {
        Self {
            line_y,
            direction_threshold,
        }
    }

    fn crosses(&self, y_prev: i32, y_cur: i32) -> bool {
        let l = self.line_y;
        (y_prev < l && l <= y_cur) || (y_prev > l && l >= y_cur)
    }
}

impl CountingPolicy for LinePolicy {
    fn name(&self) -> &'static str {
        "line"
    }

    fn initial_state(&self) -> PolicyState {
        PolicyState::Line {
            direction: Direction::Unknown,
            crossed: false,
        }
    }

    fn on_track_updated(&mut self, track: &mut Track, now: DateTime<Local>) -> Option<CountEvent> {
        let PolicyState::Line {
            mut direction,
            mut crossed,
        } = track.policy_state
        else {
            track.policy_state = self.initial_state();
            return None;
        };

        // 新建轨迹没有上一帧位置
        let prev = track.previous_centroid?;
        let (y_prev, y_cur) = (prev.y, track.centroid.y);

        let dy = i64::from(y_cur) - i64::from(y_prev);
        if direction == Direction::Unknown && dy.abs() > i64::from(self.direction_threshold) {
            direction = if y_cur < y_prev {
                Direction::Up
            } else {
                Direction::Down
            };
        }

        let mut event = None;
        if !crossed && self.crosses(y_prev, y_cur) {
            crossed = true;
            event = Some(CountEvent::for_track(track, now).with_direction(direction));
        }

        track.policy_state = PolicyState::Line { direction, crossed };
        event
    }
}
