//! 计数器 (Counter)
//! 职责: 读取检测结果 → 过滤 → 跟踪 → 计数策略 → 写入按天计数

use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use crossbeam_channel::{Receiver, TryRecvError};
use log::{debug, error, info, warn};

use super::{DetectionAdapter, FrameReport, RunSummary, SystemControl, UndeliveredEvent};
use crate::config::CounterConfig;
use crate::counting::{CountEvent, CountingPolicy};
use crate::detection::{classes, BBox, CentroidTracker, OcclusionFilter, Track, Tracker};
use crate::storage::CountSink;

pub struct Counter {
    count_classes: Vec<u32>,
    min_confidence: f32,
    occlusion: Option<OcclusionFilter>,
    tracker: Box<dyn Tracker>,
    policy: Box<dyn CountingPolicy>,
    sink: Box<dyn CountSink>,

    frame_id: u64,
    total_count: u64,

    // 统计
    count: u64,
    last: Instant,
    current_fps: f64,
}

impl Counter {
    /// 根据配置组装过滤器、跟踪器和计数策略
    pub fn new(config: &CounterConfig, sink: Box<dyn CountSink>) -> Self {
        let policy = config.policy.build(config);
        let tracker = CentroidTracker::new(config.match_distance, policy.initial_state());
        let occlusion = if config.occlusion_enabled {
            let filter = OcclusionFilter::new(&config.occlusion_rules);
            (!filter.is_empty()).then_some(filter)
        } else {
            None
        };

        info!("🎯 计数策略: {}", policy.name());
        Self::with_parts(
            config.count_class_ids(),
            config.min_confidence,
            occlusion,
            Box::new(tracker),
            policy,
            sink,
        )
    }

    pub fn with_parts(
        count_classes: Vec<u32>,
        min_confidence: f32,
        occlusion: Option<OcclusionFilter>,
        tracker: Box<dyn Tracker>,
        policy: Box<dyn CountingPolicy>,
        sink: Box<dyn CountSink>,
    ) -> Self {
        Self {
            count_classes,
            min_confidence,
            occlusion,
            tracker,
            policy,
            sink,
            frame_id: 0,
            total_count: 0,
            count: 0,
            last: Instant::now(),
            current_fps: 0.0,
        }
    }

    /// 当前活跃轨迹 (只读)
    pub fn tracks(&self) -> &[Track] {
        self.tracker.tracks()
    }

    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }

    /// 校验检测框, 返回 (合法检测, 丢弃的非法检测数)
    fn validated(&self, detections: Vec<BBox>) -> (Vec<BBox>, usize) {
        let mut rejected = 0;
        let mut kept = Vec::with_capacity(detections.len());
        for det in detections {
            if let Err(e) = det.validate() {
                warn!("⚠️ 帧 {} 丢弃非法检测框: {}", self.frame_id, e);
                rejected += 1;
                continue;
            }
            kept.push(det);
        }
        (kept, rejected)
    }

    /// 是否参与计数 (类别 + 置信度)
    fn is_counted(&self, det: &BBox) -> bool {
        self.count_classes.contains(&det.class_id) && det.confidence >= self.min_confidence
    }

    /// 处理一帧检测结果
    pub fn process_frame(&mut self, detections: Vec<BBox>, now: DateTime<Local>) -> FrameReport {
        self.frame_id += 1;

        // 1. 校验 → 遮挡过滤 (容器类别不计数也参与) → 类别/置信度选择
        let (valid, rejected) = self.validated(detections);
        let visible = match &self.occlusion {
            Some(filter) => filter.apply(&valid),
            None => valid,
        };
        let filtered: Vec<BBox> = visible.into_iter().filter(|d| self.is_counted(d)).collect();

        // 2. 帧级策略
        let mut events: Vec<CountEvent> = Vec::new();
        events.extend(self.policy.on_frame_detections(filtered.len(), now));

        // 3. 关联 (本帧结果替换上一帧活跃集合)
        self.tracker.update(&filtered);

        // 4. 轨迹级策略
        for track in self.tracker.tracks_mut() {
            events.extend(self.policy.on_track_updated(track, now));
        }

        // 5. 写入存储, 失败的事件返回给调用方
        let mut undelivered = Vec::new();
        for event in &events {
            self.total_count += u64::from(event.delta);
            match self.sink.record_event(event.timestamp) {
                Ok(()) => debug!(
                    "➕ 计数 +1 ({} track {:?})",
                    event
                        .class_id
                        .and_then(classes::class_name)
                        .unwrap_or("frame"),
                    event.track_id
                ),
                Err(e) => {
                    warn!("❌ 计数写入失败: {:#}", e);
                    undelivered.push(UndeliveredEvent {
                        event: event.clone(),
                        error: format!("{:#}", e),
                    });
                }
            }
        }

        if !events.is_empty() {
            info!(
                "🔔 帧 {}: +{} | 累计 {}",
                self.frame_id,
                events.len(),
                self.total_count
            );
        }

        FrameReport {
            frame_id: self.frame_id,
            detections: filtered.len(),
            rejected,
            tracks: self.tracker.tracks().iter().map(Track::snapshot).collect(),
            events,
            undelivered,
            total_count: self.total_count,
        }
    }

    /// 主循环: 直到流结束或收到停止请求
    pub fn run<A: DetectionAdapter>(
        &mut self,
        adapter: &mut A,
        control: &Receiver<SystemControl>,
    ) -> Result<RunSummary> {
        self.run_with(adapter, control, |_| {})
    }

    /// 主循环, 每帧结束后回调 `on_frame`
    pub fn run_with<A, F>(
        &mut self,
        adapter: &mut A,
        control: &Receiver<SystemControl>,
        mut on_frame: F,
    ) -> Result<RunSummary>
    where
        A: DetectionAdapter,
        F: FnMut(&FrameReport),
    {
        info!("🔍 计数模块启动");
        let mut summary = RunSummary::default();

        loop {
            // 停止请求只在帧间检查
            match control.try_recv() {
                Ok(SystemControl::Shutdown) => {
                    info!("🛑 收到停止请求");
                    summary.stopped = true;
                    break;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {}
            }

            // 输入错误结束运行, 已处理帧的汇总仍然返回
            let frame = match adapter.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    info!("📭 输入结束");
                    break;
                }
                Err(e) => {
                    error!("❌ 读取输入失败: {:#}", e);
                    summary.error = Some(format!("{:#}", e));
                    break;
                }
            };

            let start = Instant::now();
            let detections = match adapter
                .detect(&frame)
                .with_context(|| format!("detection failed at frame {}", self.frame_id + 1))
            {
                Ok(detections) => detections,
                Err(e) => {
                    error!("❌ {:#}", e);
                    summary.error = Some(format!("{:#}", e));
                    break;
                }
            };
            let mut report = self.process_frame(detections, Local::now());
            report.rejected += adapter.malformed(&frame);
            let frame_ms = start.elapsed().as_secs_f64() * 1000.0;

            self.update_stats(&report, frame_ms);
            summary.frames += 1;
            summary.undelivered.extend(report.undelivered.iter().cloned());
            on_frame(&report);
        }

        summary.total_count = self.total_count;
        info!(
            "✅ 处理完成: {} 帧 | 计数 {} | 未写入 {}",
            summary.frames,
            summary.total_count,
            summary.undelivered.len()
        );
        Ok(summary)
    }

    fn update_stats(&mut self, report: &FrameReport, frame_ms: f64) {
        self.count += 1;
        let now = Instant::now();
        if now.duration_since(self.last).as_secs() >= 1 {
            self.current_fps = self.count as f64 / now.duration_since(self.last).as_secs_f64();
            self.count = 0;
            self.last = now;
        }

        // 每60帧打印一次
        if report.frame_id % 60 == 0 {
            info!(
                "🎯 帧 {} | 目标 {} | 轨迹 {} | {:.2}ms/帧 | {:.1}fps | 累计 {}",
                report.frame_id,
                report.detections,
                report.tracks.len(),
                frame_ms,
                self.current_fps,
                report.total_count
            );
        }
    }
}
