// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 最近质心跟踪器 (关联引擎)
//! Greedy nearest-centroid association engine
//!
//! 每帧流程:
//! 1. 按输入顺序遍历检测框, 在同类别且未被占用的轨迹中找最近质心
//! 2. 距离小于阈值 → 更新轨迹 (age + 1, 保留计数状态)
//! 3. 否则新建轨迹 (age = 1)
//! 4. 本帧未匹配的轨迹直接删除, 不做丢失恢复

use log::debug;
use serde::Serialize;

use super::types::{BBox, Centroid};
use crate::counting::PolicyState;

/// 默认匹配距离阈值 (像素)
pub const DEFAULT_MATCH_DISTANCE: f32 = 150.0;

// ========== 公共数据结构 ==========

/// 跟踪对象
#[derive(Clone, Debug)]
pub struct Track {
    /// 唯一跟踪ID (删除后不再复用)
    pub id: u32,

    /// 最近一次匹配的检测框
    pub bbox: BBox,

    /// 当前中心点
    pub centroid: Centroid,

    /// 上一帧中心点 (新建轨迹为 None)
    pub previous_centroid: Option<Centroid>,

    pub class_id: u32,

    /// 连续匹配帧数, 新建时为 1
    pub age: u32,

    /// 计数策略私有状态
    pub policy_state: PolicyState,
}

impl Track {
    fn new(id: u32, bbox: BBox, policy_state: PolicyState) -> Self {
        Self {
            id,
            centroid: bbox.centroid(),
            previous_centroid: None,
            class_id: bbox.class_id,
            age: 1,
            policy_state,
            bbox,
        }
    }

    fn observe(&mut self, bbox: BBox) {
        self.previous_centroid = Some(self.centroid);
        self.centroid = bbox.centroid();
        self.bbox = bbox;
        self.age += 1;
    }

    /// 只读快照 (用于显示)
    pub fn snapshot(&self) -> TrackSnapshot {
        TrackSnapshot {
            id: self.id,
            class_id: self.class_id,
            bbox: self.bbox.clone(),
            centroid: self.centroid,
            age: self.age,
            policy_state: self.policy_state,
        }
    }
}

/// 轨迹快照, 不回流到计数逻辑
#[derive(Clone, Debug, Serialize)]
pub struct TrackSnapshot {
    pub id: u32,
    pub class_id: u32,
    pub bbox: BBox,
    pub centroid: Centroid,
    pub age: u32,
    pub policy_state: PolicyState,
}

// ========== 跟踪器统一接口 ==========

/// 多目标跟踪器 Trait
pub trait Tracker {
    /// 用当前帧检测框更新跟踪器, 返回新的活跃轨迹集合
    fn update(&mut self, detections: &[BBox]) -> &[Track];

    /// 活跃轨迹 (可变, 供计数策略更新状态)
    fn tracks_mut(&mut self) -> &mut [Track];

    fn tracks(&self) -> &[Track];
}

/// 贪心最近质心跟踪器
pub struct CentroidTracker {
    tracks: Vec<Track>,

    /// 下一个分配的ID
    next_id: u32,

    /// 匹配距离阈值 (严格小于才匹配)
    match_distance: f32,

    /// 新建轨迹的初始策略状态
    initial_state: PolicyState,
}

impl CentroidTracker {
    pub fn new(match_distance: f32, initial_state: PolicyState) -> Self {
        Self {
            tracks: Vec::new(),
            next_id: 1,
            match_distance,
            initial_state,
        }
    }

    /// 在未占用的同类轨迹中找最近的一条
    ///
    /// 距离相同时取ID最小者
    fn nearest(previous: &[Option<Track>], det: &BBox) -> Option<(usize, f32)> {
        let centroid = det.centroid();
        let mut best: Option<(usize, u32, f32)> = None;

        for (idx, slot) in previous.iter().enumerate() {
            let Some(track) = slot else { continue };
            if track.class_id != det.class_id {
                continue;
            }
            let dist = centroid.distance(&track.centroid);
            let better = match best {
                None => true,
                Some((_, best_id, best_dist)) => {
                    dist < best_dist || (dist == best_dist && track.id < best_id)
                }
            };
            if better {
                best = Some((idx, track.id, dist));
            }
        }

        best.map(|(idx, _, dist)| (idx, dist))
    }

    fn allocate(&mut self, det: &BBox) -> Track {
        let id = self.next_id;
        self.next_id += 1;
        Track::new(id, det.clone(), self.initial_state)
    }
}

impl Default for CentroidTracker {
    fn default() -> Self {
        Self::new(DEFAULT_MATCH_DISTANCE, PolicyState::Stateless)
    }
}

impl Tracker for CentroidTracker {
    fn update(&mut self, detections: &[BBox]) -> &[Track] {
        // 上一帧轨迹放入槽位, 被匹配后取走 (每条轨迹最多匹配一次)
        let mut previous: Vec<Option<Track>> =
            std::mem::take(&mut self.tracks).into_iter().map(Some).collect();
        let mut next = Vec::with_capacity(detections.len());

        for det in detections {
            let matched = match Self::nearest(&previous, det) {
                Some((idx, dist)) if dist < self.match_distance => previous[idx].take(),
                _ => None,
            };

            let track = match matched {
                Some(mut track) => {
                    track.observe(det.clone());
                    track
                }
                None => self.allocate(det),
            };
            next.push(track);
        }

        let dropped: Vec<u32> = previous.iter().flatten().map(|t| t.id).collect();
        if !dropped.is_empty() {
            debug!("轨迹删除: {:?}", dropped);
        }

        self.tracks = next;
        &self.tracks
    }

    fn tracks_mut(&mut self) -> &mut [Track] {
        &mut self.tracks
    }

    fn tracks(&self) -> &[Track] {
        &self.tracks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    const PERSON: u32 = 0;
    const CAR: u32 = 2;

    fn det(cx: f32, cy: f32, class_id: u32) -> BBox {
        BBox::new(cx - 10.0, cy - 10.0, cx + 10.0, cy + 10.0, class_id, 0.9)
    }

    fn ids(tracks: &[Track]) -> Vec<u32> {
        tracks.iter().map(|t| t.id).collect()
    }

    #[test]
    fn test_new_tracks_start_at_age_one() {
        let mut tracker = CentroidTracker::default();
        let tracks = tracker.update(&[det(100.0, 100.0, PERSON), det(400.0, 100.0, PERSON)]);
        assert_eq!(ids(tracks), vec![1, 2]);
        assert!(tracks.iter().all(|t| t.age == 1 && t.previous_centroid.is_none()));
    }

    #[test]
    fn test_match_within_threshold_increments_age() {
        let mut tracker = CentroidTracker::default();
        tracker.update(&[det(100.0, 100.0, PERSON)]);
        let tracks = tracker.update(&[det(130.0, 140.0, PERSON)]);
        assert_eq!(ids(tracks), vec![1]);
        assert_eq!(tracks[0].age, 2);
        assert_eq!(tracks[0].previous_centroid, Some(Centroid::new(100, 100)));
        assert_eq!(tracks[0].centroid, Centroid::new(130, 140));
    }

    #[test]
    fn test_threshold_is_strict() {
        let mut tracker = CentroidTracker::default();
        tracker.update(&[det(0.0, 100.0, PERSON)]);
        // 距离正好 150, 不匹配
        let tracks = tracker.update(&[det(150.0, 100.0, PERSON)]);
        assert_eq!(ids(tracks), vec![2]);
    }

    #[test]
    fn test_class_aware_matching() {
        let mut tracker = CentroidTracker::default();
        tracker.update(&[det(100.0, 100.0, PERSON)]);
        let tracks = tracker.update(&[det(100.0, 100.0, CAR)]);
        assert_eq!(ids(tracks), vec![2]);
        assert_eq!(tracks[0].class_id, CAR);
    }

    #[test]
    fn test_no_resurrection() {
        let mut tracker = CentroidTracker::default();
        tracker.update(&[det(100.0, 100.0, PERSON)]);
        assert_eq!(tracker.update(&[]).len(), 0);
        // 原位置重新出现 → 新ID
        let tracks = tracker.update(&[det(100.0, 100.0, PERSON)]);
        assert_eq!(ids(tracks), vec![2]);
        assert_eq!(tracks[0].age, 1);
    }

    #[test]
    fn test_each_track_claimed_once() {
        let mut tracker = CentroidTracker::default();
        tracker.update(&[det(100.0, 100.0, PERSON)]);
        // 两个检测都靠近轨迹1, 只有第一个能匹配
        let tracks = tracker.update(&[det(105.0, 100.0, PERSON), det(102.0, 100.0, PERSON)]);
        assert_eq!(ids(tracks), vec![1, 2]);
        assert_eq!(tracks[0].centroid, Centroid::new(105, 100));
    }

    #[test]
    fn test_equidistant_tie_prefers_lowest_id() {
        let mut tracker = CentroidTracker::default();
        tracker.update(&[det(200.0, 100.0, PERSON), det(100.0, 100.0, PERSON)]);
        // 检测点到两条轨迹距离相同
        let tracks = tracker.update(&[det(150.0, 100.0, PERSON)]);
        assert_eq!(ids(tracks), vec![1]);
    }

    #[test]
    fn test_ids_unique_across_frames() {
        let mut tracker = CentroidTracker::default();
        let frames: Vec<Vec<BBox>> = vec![
            vec![det(10.0, 10.0, PERSON), det(300.0, 10.0, PERSON)],
            vec![det(20.0, 10.0, PERSON), det(600.0, 10.0, PERSON), det(300.0, 20.0, CAR)],
            vec![],
            vec![det(20.0, 10.0, PERSON), det(25.0, 10.0, PERSON)],
        ];
        let mut seen_dropped: HashSet<u32> = HashSet::new();
        let mut last: HashSet<u32> = HashSet::new();
        for frame in &frames {
            let current: Vec<u32> = ids(tracker.update(frame));
            let unique: HashSet<u32> = current.iter().copied().collect();
            assert_eq!(unique.len(), current.len());
            assert!(current.len() <= frame.len());
            assert!(unique.is_disjoint(&seen_dropped));
            seen_dropped.extend(last.difference(&unique));
            last = unique;
        }
    }

    #[test]
    fn test_policy_state_carried_forward() {
        let mut tracker = CentroidTracker::new(150.0, PolicyState::Dwell { confirmed: false });
        tracker.update(&[det(100.0, 100.0, PERSON)]);
        tracker.tracks_mut()[0].policy_state = PolicyState::Dwell { confirmed: true };
        let tracks = tracker.update(&[det(110.0, 100.0, PERSON), det(500.0, 100.0, PERSON)]);
        assert_eq!(tracks[0].policy_state, PolicyState::Dwell { confirmed: true });
        assert_eq!(tracks[1].policy_state, PolicyState::Dwell { confirmed: false });
    }

    #[test]
    fn test_extreme_coordinates_do_not_overflow() {
        let mut tracker = CentroidTracker::default();
        tracker.update(&[BBox::new(-3.0e9, -3.0e9, -2.9e9, -2.9e9, PERSON, 0.9)]);
        let tracks = tracker.update(&[BBox::new(2.9e9, 2.9e9, 3.0e9, 3.0e9, PERSON, 0.9)]);
        // 距离远超阈值, 旧轨迹删除并新建
        assert_eq!(ids(tracks), vec![2]);
        assert_eq!(tracks[0].centroid, Centroid::new(i32::MAX, i32::MAX));
    }
}
