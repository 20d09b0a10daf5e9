//! 计数器配置 - 通过JSON文件调整参数

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::counting::dwell::DEFAULT_DWELL_FRAMES;
use crate::counting::line::DEFAULT_DIRECTION_THRESHOLD;
use crate::counting::PolicyKind;
use crate::detection::{classes, OcclusionRule, DEFAULT_MATCH_DISTANCE};

/// 计数器参数配置
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CounterConfig {
    // === 计数策略 ===
    pub policy: PolicyKind,        // presence | dwell | line
    pub dwell_frames: u32,         // 驻留确认帧数 (age > N 计数)
    pub line_y: i32,               // 计数线 y 坐标
    pub direction_threshold: i32,  // 方向判定位移阈值(像素)

    // === 跟踪参数 ===
    pub match_distance: f32, // 质心匹配距离阈值

    // === 检测过滤 ===
    pub count_classes: Vec<String>, // 参与计数的类别
    pub min_confidence: f32,        // 最低置信度

    // === 遮挡过滤 ===
    pub occlusion_enabled: bool,
    pub occlusion_rules: Vec<OcclusionRule>,

    // === 存储 ===
    pub store_path: PathBuf, // 按天计数的JSON文件
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            policy: PolicyKind::Presence,
            dwell_frames: DEFAULT_DWELL_FRAMES,
            line_y: 240,
            direction_threshold: DEFAULT_DIRECTION_THRESHOLD,

            match_distance: DEFAULT_MATCH_DISTANCE,

            count_classes: vec!["person".to_string()],
            min_confidence: 0.25,

            occlusion_enabled: false,
            occlusion_rules: vec![OcclusionRule::new("person", &["car", "bus", "truck"])],

            store_path: PathBuf::from("counts.json"),
        }
    }
}

impl CounterConfig {
    /// 从JSON文件加载配置
    ///
    /// 文件不存在时写出默认配置; 解析失败时使用默认值
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(config) => {
                    info!("✅ 配置已从 {} 加载", path.display());
                    config
                }
                Err(e) => {
                    warn!("⚠️  配置文件解析失败: {}, 使用默认值", e);
                    Self::default()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("📝 配置文件不存在,创建默认配置...");
                let config = Self::default();
                config.save(path);
                config
            }
            Err(e) => {
                warn!("⚠️  无法读取配置文件 {}: {}, 使用默认值", path.display(), e);
                Self::default()
            }
        }
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = fs::write(path, json) {
                    warn!("❌ 保存配置失败: {}", e);
                } else {
                    info!("💾 配置已保存到 {}", path.display());
                }
            }
            Err(e) => warn!("❌ 序列化配置失败: {}", e),
        }
    }

    /// 参与计数的类别ID, 未知名称被忽略
    pub fn count_class_ids(&self) -> Vec<u32> {
        self.count_classes
            .iter()
            .filter_map(|name| {
                let id = classes::class_id(name);
                if id.is_none() {
                    warn!("⚠️ 未知计数类别 '{}', 已忽略", name);
                }
                id
            })
            .collect()
    }

    /// 打印当前配置
    pub fn print_summary(&self) {
        info!("🎛️  当前计数配置:");
        info!("  计数策略: {}", self.policy);
        match self.policy {
            PolicyKind::Presence => {}
            PolicyKind::Dwell => info!("  确认帧数: > {}", self.dwell_frames),
            PolicyKind::Line => info!(
                "  计数线: y = {} (方向阈值 {}px)",
                self.line_y, self.direction_threshold
            ),
        }
        info!("  匹配距离: {:.0}px", self.match_distance);
        info!(
            "  计数类别: {:?} | 最低置信度: {:.2}",
            self.count_classes, self.min_confidence
        );
        if self.occlusion_enabled {
            info!("  遮挡过滤: {} 条规则", self.occlusion_rules.len());
        }
        info!("  存储文件: {}", self.store_path.display());
    }
}
