/// 计数存储 (Count Aggregator)
///
/// 按自然日 (本地时间) 累计计数:
/// - DailyCountStore: JSON文件持久化, 内存表由 Mutex 保护
/// - CountSink:       核心循环使用的 "+1" 接口
/// - query:           只读查询 (全部/今日/按年月日汇总)
pub mod query;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate};
use log::{info, warn};
use serde::{Deserialize, Serialize};

pub use query::{CountQuery, DateGranularity};

/// 单日计数记录
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub count: u64,
}

/// 计数事件接收端
pub trait CountSink {
    /// 对 `timestamp` 所在本地日期的记录 +1 (不存在则创建)
    fn record_event(&self, timestamp: DateTime<Local>) -> Result<()>;
}

impl<T: CountSink + ?Sized> CountSink for Arc<T> {
    fn record_event(&self, timestamp: DateTime<Local>) -> Result<()> {
        (**self).record_event(timestamp)
    }
}

/// 按天计数表
///
/// 每次递增在锁内完成"创建或累加 + 落盘", 可与查询端共享
pub struct DailyCountStore {
    path: Option<PathBuf>,
    records: Mutex<BTreeMap<NaiveDate, u64>>,
}

impl DailyCountStore {
    /// 仅内存 (测试/演示)
    pub fn in_memory() -> Self {
        Self {
            path: None,
            records: Mutex::new(BTreeMap::new()),
        }
    }

    /// 打开JSON文件, 不存在时从空表开始
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut records = BTreeMap::new();

        if path.exists() {
            let json = fs::read_to_string(&path)
                .with_context(|| format!("failed to read count store {}", path.display()))?;
            let list: Vec<DailyCount> = if json.trim().is_empty() {
                Vec::new()
            } else {
                serde_json::from_str(&json)
                    .with_context(|| format!("failed to parse count store {}", path.display()))?
            };
            for record in list {
                let entry = records.entry(record.date).or_insert(0);
                if *entry > 0 {
                    warn!("⚠️ 存储中 {} 有重复记录, 已合并", record.date);
                }
                *entry += record.count;
            }
            info!("📂 计数存储已加载: {} ({} 天)", path.display(), records.len());
        } else {
            info!("📝 计数存储不存在, 将创建: {}", path.display());
        }

        Ok(Self {
            path: Some(path),
            records: Mutex::new(records),
        })
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<NaiveDate, u64>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 当日计数 +1, 返回累加后的值
    ///
    /// 落盘失败时回滚内存中的累加并返回错误
    pub fn increment(&self, date: NaiveDate) -> Result<u64> {
        let mut records = self.lock();
        let count = {
            let entry = records.entry(date).or_insert(0);
            *entry += 1;
            *entry
        };

        if let Err(e) = self.persist(&records) {
            if count == 1 {
                records.remove(&date);
            } else {
                records.insert(date, count - 1);
            }
            return Err(e);
        }
        Ok(count)
    }

    /// 临时文件 + rename, 避免写一半的文件
    fn persist(&self, records: &BTreeMap<NaiveDate, u64>) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let list: Vec<DailyCount> = records
            .iter()
            .map(|(&date, &count)| DailyCount { date, count })
            .collect();
        let json = serde_json::to_string_pretty(&list)?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).with_context(|| format!("failed to write {}", tmp.display()))?;
        fs::rename(&tmp, path)
            .with_context(|| format!("failed to replace count store {}", path.display()))?;
        Ok(())
    }

    /// 全部记录, 日期从新到旧
    pub fn all(&self) -> Vec<DailyCount> {
        self.lock()
            .iter()
            .rev()
            .map(|(&date, &count)| DailyCount { date, count })
            .collect()
    }

    pub fn get(&self, date: NaiveDate) -> Option<DailyCount> {
        self.lock()
            .get(&date)
            .map(|&count| DailyCount { date, count })
    }

    /// [start, end) 区间内计数之和
    pub fn sum_range(&self, start: NaiveDate, end: NaiveDate) -> u64 {
        self.lock().range(start..end).map(|(_, &count)| count).sum()
    }
}

impl CountSink for DailyCountStore {
    fn record_event(&self, timestamp: DateTime<Local>) -> Result<()> {
        self.increment(timestamp.date_naive()).map(|_| ())
    }
}
