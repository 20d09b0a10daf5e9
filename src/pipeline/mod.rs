/// 计数流水线 (Counting Pipeline)
///
/// 单线程逐帧处理, 一帧完整结束后才读取下一帧:
/// 检测 → 遮挡过滤 → 关联 → 计数策略 → 按天累计
///
/// 停止请求通过 `SystemControl` 通道发送, 只在帧与帧之间生效
pub mod adapter;
pub mod counter;

pub use adapter::{DetectionAdapter, JsonLinesAdapter, ReplayFrame};
pub use counter::Counter;

use serde::Serialize;

use crate::counting::CountEvent;
use crate::detection::TrackSnapshot;

// ========== 消息类型定义 ==========

/// 系统控制
#[derive(Clone, Debug)]
pub enum SystemControl {
    Shutdown,
}

/// 未能写入存储的事件 (由调用方决定重试或丢弃)
#[derive(Clone, Debug, Serialize)]
pub struct UndeliveredEvent {
    pub event: CountEvent,
    pub error: String,
}

/// 单帧处理结果 (只读快照, 用于显示)
#[derive(Clone, Debug, Serialize)]
pub struct FrameReport {
    pub frame_id: u64,
    /// 通过校验和过滤后的检测数
    pub detections: usize,
    /// 因格式错误被丢弃的检测数 (含无法解析的检测对象)
    pub rejected: usize,
    pub tracks: Vec<TrackSnapshot>,
    pub events: Vec<CountEvent>,
    pub undelivered: Vec<UndeliveredEvent>,
    /// 运行期间累计的事件总数
    pub total_count: u64,
}

/// 整个运行的汇总
#[derive(Clone, Debug, Default, Serialize)]
pub struct RunSummary {
    pub frames: u64,
    pub total_count: u64,
    pub undelivered: Vec<UndeliveredEvent>,
    /// 是否因停止请求提前结束
    pub stopped: bool,
    /// 输入错误导致提前结束时的错误信息
    pub error: Option<String>,
}
