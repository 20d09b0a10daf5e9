//! 遮挡过滤器 (Occlusion Filter)
//!
//! 去除完全位于"容器"类别框内的"被包含"类别检测框,
//! 例如车内的人不参与跟踪与计数。

use log::warn;
use serde::{Deserialize, Serialize};

use super::classes;
use super::types::BBox;

/// 包含关系规则 (按类别名称配置)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OcclusionRule {
    /// 被包含的类别, 如 "person"
    pub contained: String,
    /// 容器类别, 如 ["car", "bus", "truck"]
    pub containers: Vec<String>,
}

impl OcclusionRule {
    pub fn new(contained: &str, containers: &[&str]) -> Self {
        Self {
            contained: contained.to_string(),
            containers: containers.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// 规则解析为类别ID后的过滤器
#[derive(Clone, Debug, Default)]
pub struct OcclusionFilter {
    rules: Vec<(u32, Vec<u32>)>,
}

impl OcclusionFilter {
    /// 解析规则; 未知类别名称会被忽略
    pub fn new(rules: &[OcclusionRule]) -> Self {
        let mut resolved = Vec::with_capacity(rules.len());
        for rule in rules {
            let Some(contained) = classes::class_id(&rule.contained) else {
                warn!("⚠️ 遮挡规则: 未知类别 '{}', 已忽略", rule.contained);
                continue;
            };
            let containers: Vec<u32> = rule
                .containers
                .iter()
                .filter_map(|name| {
                    let id = classes::class_id(name);
                    if id.is_none() {
                        warn!("⚠️ 遮挡规则: 未知容器类别 '{}', 已忽略", name);
                    }
                    id
                })
                .collect();
            if !containers.is_empty() {
                resolved.push((contained, containers));
            }
        }
        Self { rules: resolved }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn containers_for(&self, class_id: u32) -> Vec<u32> {
        self.rules
            .iter()
            .filter(|(contained, _)| *contained == class_id)
            .flat_map(|(_, containers)| containers.iter().copied())
            .collect()
    }

    /// 过滤一帧的检测结果
    ///
    /// 每个检测框都与未过滤的原始集合独立比较, 结果与输入顺序无关
    pub fn apply(&self, detections: &[BBox]) -> Vec<BBox> {
        if self.rules.is_empty() {
            return detections.to_vec();
        }

        detections
            .iter()
            .enumerate()
            .filter(|(idx, det)| !self.is_occluded(*idx, det, detections))
            .map(|(_, det)| det.clone())
            .collect()
    }

    fn is_occluded(&self, idx: usize, det: &BBox, all: &[BBox]) -> bool {
        let containers = self.containers_for(det.class_id);
        if containers.is_empty() {
            return false;
        }
        all.iter().enumerate().any(|(other_idx, other)| {
            other_idx != idx && containers.contains(&other.class_id) && other.contains(det)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PERSON: u32 = 0;
    const CAR: u32 = 2;

    fn person_in_vehicle() -> OcclusionFilter {
        OcclusionFilter::new(&[OcclusionRule::new("person", &["car", "bus", "truck"])])
    }

    #[test]
    fn test_person_inside_car_removed() {
        let dets = vec![
            BBox::new(0.0, 0.0, 100.0, 100.0, CAR, 0.9),
            BBox::new(10.0, 10.0, 20.0, 20.0, PERSON, 0.8),
        ];
        let out = person_in_vehicle().apply(&dets);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].class_id, CAR);
    }

    #[test]
    fn test_person_partially_outside_retained() {
        let dets = vec![
            BBox::new(0.0, 0.0, 100.0, 100.0, CAR, 0.9),
            BBox::new(10.0, 10.0, 120.0, 20.0, PERSON, 0.8),
        ];
        assert_eq!(person_in_vehicle().apply(&dets).len(), 2);
    }

    #[test]
    fn test_order_independent() {
        let car = BBox::new(0.0, 0.0, 100.0, 100.0, CAR, 0.9);
        let inside = BBox::new(10.0, 10.0, 20.0, 20.0, PERSON, 0.8);
        let outside = BBox::new(200.0, 10.0, 220.0, 50.0, PERSON, 0.8);
        let filter = person_in_vehicle();

        let a = filter.apply(&[car.clone(), inside.clone(), outside.clone()]);
        let b = filter.apply(&[outside.clone(), inside, car.clone()]);
        assert_eq!(a.len(), 2);
        assert_eq!(b.len(), 2);
        assert!(a.contains(&car) && a.contains(&outside));
        assert!(b.contains(&car) && b.contains(&outside));
    }

    #[test]
    fn test_same_class_never_contains() {
        // 人框套人框: 没有 person->person 规则
        let dets = vec![
            BBox::new(0.0, 0.0, 100.0, 100.0, PERSON, 0.9),
            BBox::new(10.0, 10.0, 20.0, 20.0, PERSON, 0.8),
        ];
        assert_eq!(person_in_vehicle().apply(&dets).len(), 2);
    }

    #[test]
    fn test_unknown_labels_have_no_relation() {
        let filter = OcclusionFilter::new(&[OcclusionRule::new("ghost", &["car"])]);
        assert!(filter.is_empty());

        let dets = vec![
            BBox::new(0.0, 0.0, 100.0, 100.0, 999, 0.9),
            BBox::new(10.0, 10.0, 20.0, 20.0, PERSON, 0.8),
        ];
        assert_eq!(person_in_vehicle().apply(&dets).len(), 2);
    }
}
