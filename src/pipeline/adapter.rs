//! 检测适配器 (Detection Adapter)
//!
//! 核心循环只依赖这个接口, 模型/视频源由调用方注入

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use log::warn;
use serde::Deserialize;
use serde_json::Value;

use crate::detection::BBox;

/// 帧来源 + 检测器
pub trait DetectionAdapter {
    type Frame;

    /// 下一帧, 流结束时返回 `None`
    fn next_frame(&mut self) -> Result<Option<Self::Frame>>;

    fn detect(&mut self, frame: &Self::Frame) -> Result<Vec<BBox>>;

    /// 本帧在解析阶段被丢弃的检测数
    fn malformed(&self, _frame: &Self::Frame) -> usize {
        0
    }
}

/// 回放帧 (检测结果已离线生成)
#[derive(Clone, Debug)]
pub struct ReplayFrame {
    pub line_no: u64,
    pub detections: Vec<BBox>,
    /// 缺字段或类型错误的检测对象数
    pub malformed: usize,
}

/// 检测对象逐个解析, 单个错误不影响整行
#[derive(Deserialize)]
struct ReplayLine {
    #[serde(default)]
    detections: Vec<Value>,
}

/// JSON Lines 回放适配器
///
/// 每行一帧: `{"detections":[{"x1":..,"y1":..,"x2":..,"y2":..,"class_id":0,"confidence":0.9}]}`
pub struct JsonLinesAdapter<R> {
    reader: R,
    line_no: u64,
}

impl<R: BufRead> JsonLinesAdapter<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, line_no: 0 }
    }
}

impl JsonLinesAdapter<Box<dyn BufRead>> {
    /// 打开文件, `-` 表示标准输入
    pub fn open(source: &str) -> Result<Self> {
        let reader: Box<dyn BufRead> = if source == "-" {
            Box::new(BufReader::new(io::stdin()))
        } else {
            let file = File::open(Path::new(source))
                .with_context(|| format!("failed to open detection source {}", source))?;
            Box::new(BufReader::new(file))
        };
        Ok(Self::new(reader))
    }
}

impl<R: BufRead> DetectionAdapter for JsonLinesAdapter<R> {
    type Frame = ReplayFrame;

    fn next_frame(&mut self) -> Result<Option<ReplayFrame>> {
        let mut line = String::new();
        loop {
            line.clear();
            let read = self
                .reader
                .read_line(&mut line)
                .context("failed to read detection source")?;
            if read == 0 {
                return Ok(None);
            }
            self.line_no += 1;

            // 空行跳过
            let text = line.trim();
            if text.is_empty() {
                continue;
            }
            let parsed: ReplayLine = serde_json::from_str(text)
                .with_context(|| format!("invalid detection record at line {}", self.line_no))?;

            let mut detections = Vec::with_capacity(parsed.detections.len());
            let mut malformed = 0;
            for (idx, value) in parsed.detections.into_iter().enumerate() {
                match serde_json::from_value::<BBox>(value) {
                    Ok(bbox) => detections.push(bbox),
                    Err(e) => {
                        warn!(
                            "⚠️ 第 {} 行第 {} 个检测对象无法解析, 已丢弃: {}",
                            self.line_no,
                            idx + 1,
                            e
                        );
                        malformed += 1;
                    }
                }
            }
            return Ok(Some(ReplayFrame {
                line_no: self.line_no,
                detections,
                malformed,
            }));
        }
    }

    fn detect(&mut self, frame: &ReplayFrame) -> Result<Vec<BBox>> {
        Ok(frame.detections.clone())
    }

    fn malformed(&self, frame: &ReplayFrame) -> usize {
        frame.malformed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_reads_frames_until_end() {
        let input = concat!(
            r#"{"detections":[{"x1":0,"y1":0,"x2":10,"y2":10,"class_id":0,"confidence":0.9}]}"#,
            "\n\n",
            r#"{"detections":[]}"#,
            "\n",
            "{}\n",
        );
        let mut adapter = JsonLinesAdapter::new(Cursor::new(input));

        let first = adapter.next_frame().unwrap().unwrap();
        assert_eq!(adapter.detect(&first).unwrap().len(), 1);
        assert_eq!(first.line_no, 1);

        let second = adapter.next_frame().unwrap().unwrap();
        assert_eq!(second.line_no, 3);
        assert!(second.detections.is_empty());

        let third = adapter.next_frame().unwrap().unwrap();
        assert!(third.detections.is_empty());

        assert!(adapter.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_bad_detection_object_dropped_alone() {
        let input = concat!(
            r#"{"detections":[{"x1":0,"y1":0,"x2":10,"y2":10,"class_id":0},"#,
            r#"{"x1":0,"y1":0,"x2":10,"y2":10,"class_id":-3,"confidence":0.5},"#,
            r#"{"x1":5,"y1":5,"x2":20,"y2":20,"class_id":2,"confidence":0.7}]}"#,
            "\n",
        );
        let mut adapter = JsonLinesAdapter::new(Cursor::new(input));
        let frame = adapter.next_frame().unwrap().unwrap();
        assert_eq!(adapter.malformed(&frame), 2);
        let dets = adapter.detect(&frame).unwrap();
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].class_id, 2);
    }

    #[test]
    fn test_invalid_line_reports_position() {
        let mut adapter = JsonLinesAdapter::new(Cursor::new("{\"detections\":[]}\nnope\n"));
        adapter.next_frame().unwrap();
        let err = adapter.next_frame().unwrap_err();
        assert!(format!("{:#}", err).contains("line 2"));
    }
}
