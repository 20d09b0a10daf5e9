// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod config; // 计数配置参数
pub mod counting; // 计数策略状态机
pub mod detection; // 检测框/过滤/跟踪
pub mod pipeline; // 逐帧处理主循环
pub mod storage; // 按天计数存储与查询

pub use crate::config::CounterConfig;
pub use crate::counting::{CountEvent, CountingPolicy, Direction, PolicyKind, PolicyState};
pub use crate::detection::{BBox, CentroidTracker, OcclusionFilter, OcclusionRule, Track, Tracker};
pub use crate::pipeline::{Counter, DetectionAdapter, FrameReport, RunSummary, SystemControl};
pub use crate::storage::{CountQuery, CountSink, DailyCount, DailyCountStore, DateGranularity};

pub fn gen_time_string(delimiter: &str) -> String {
    let t_now = chrono::Local::now();
    let fmt = format!(
        "%Y{}%m{}%d{}%H{}%M{}%S",
        delimiter, delimiter, delimiter, delimiter, delimiter
    );
    t_now.format(&fmt).to_string()
}
