/// 检测数据结构定义
/// Data structures for per-frame detections
use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

// ========== 数据结构 ==========

/// 检测框 (Detection bounding box)
///
/// 像素坐标, 要求 `x1 < x2` 且 `y1 < y2`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class_id: u32,
}

/// 中心点 (整数像素坐标, 用于匹配)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Centroid {
    pub x: i32,
    pub y: i32,
}

impl Centroid {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// 欧氏距离 (差值用 f64 计算, 极端坐标不会溢出)
    pub fn distance(&self, other: &Centroid) -> f32 {
        let dx = f64::from(self.x) - f64::from(other.x);
        let dy = f64::from(self.y) - f64::from(other.y);
        (dx * dx + dy * dy).sqrt() as f32
    }
}

impl BBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32, class_id: u32, confidence: f32) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            confidence,
            class_id,
        }
    }

    /// 获取中心点 (截断为整数)
    pub fn centroid(&self) -> Centroid {
        Centroid {
            x: ((self.x1 + self.x2) / 2.0) as i32,
            y: ((self.y1 + self.y2) / 2.0) as i32,
        }
    }

    /// `other` 是否完全位于本框内 (边界重合也算包含)
    pub fn contains(&self, other: &BBox) -> bool {
        other.x1 >= self.x1 && other.y1 >= self.y1 && other.x2 <= self.x2 && other.y2 <= self.y2
    }

    /// 校验检测框是否合法
    pub fn validate(&self) -> Result<()> {
        ensure!(
            [self.x1, self.y1, self.x2, self.y2, self.confidence]
                .iter()
                .all(|v| v.is_finite()),
            "non-finite value in bbox {:?}",
            self
        );
        ensure!(
            self.x1 < self.x2,
            "x1 ({}) must be less than x2 ({})",
            self.x1,
            self.x2
        );
        ensure!(
            self.y1 < self.y2,
            "y1 ({}) must be less than y2 ({})",
            self.y1,
            self.y2
        );
        ensure!(
            (0.0..=1.0).contains(&self.confidence),
            "confidence {} outside [0, 1]",
            self.confidence
        );
        Ok(())
    }
}
