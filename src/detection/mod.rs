/// 检测系统 (Detection System)
///
/// 单帧处理的前半段:
/// - Types:     检测框与中心点
/// - Classes:   COCO 类别表
/// - Occlusion: 容器内目标过滤
/// - Tracker:   最近质心目标追踪
pub mod classes;
pub mod occlusion;
pub mod tracker;
pub mod types;

pub use occlusion::{OcclusionFilter, OcclusionRule};
pub use tracker::{CentroidTracker, Track, TrackSnapshot, Tracker, DEFAULT_MATCH_DISTANCE};
pub use types::{BBox, Centroid};
