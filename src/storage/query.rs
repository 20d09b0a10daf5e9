//! 计数查询 (只读)
//! Read-only queries over the day buckets

use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{Local, NaiveDate};
use serde::Serialize;

use super::{DailyCount, DailyCountStore};

/// 汇总粒度
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DateGranularity {
    Year(i32),
    Month(i32, u32),
    Day(i32, u32, u32),
}

impl DateGranularity {
    /// 年 / 年+月 / 年+月+日
    ///
    /// 只给日不给月时按整年汇总
    pub fn from_parts(year: i32, month: Option<u32>, day: Option<u32>) -> Self {
        match (month, day) {
            (Some(m), Some(d)) => Self::Day(year, m, d),
            (Some(m), None) => Self::Month(year, m),
            (None, _) => Self::Year(year),
        }
    }

    /// 日期区间 [start, end)
    pub fn range(&self) -> Result<(NaiveDate, NaiveDate)> {
        let ymd = |y: i32, m: u32, d: u32| {
            NaiveDate::from_ymd_opt(y, m, d)
                .ok_or_else(|| anyhow!("invalid date {:04}-{:02}-{:02}", y, m, d))
        };
        match *self {
            Self::Year(y) => Ok((ymd(y, 1, 1)?, ymd(y + 1, 1, 1)?)),
            Self::Month(y, m) => {
                let start = ymd(y, m, 1)?;
                let end = if m == 12 {
                    ymd(y + 1, 1, 1)?
                } else {
                    ymd(y, m + 1, 1)?
                };
                Ok((start, end))
            }
            Self::Day(y, m, d) => {
                let start = ymd(y, m, d)?;
                let end = start
                    .succ_opt()
                    .ok_or_else(|| anyhow!("date out of range: {}", start))?;
                Ok((start, end))
            }
        }
    }
}

/// `{"count": n}`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CountResponse {
    pub count: u64,
}

/// 查询服务 (与计数循环共享同一个存储)
pub struct CountQuery {
    store: Arc<DailyCountStore>,
}

impl CountQuery {
    pub fn new(store: Arc<DailyCountStore>) -> Self {
        Self { store }
    }

    pub fn all(&self) -> Vec<DailyCount> {
        self.store.all()
    }

    /// 指定日期的记录, 不存在时返回计数为 0 的记录
    pub fn day_record(&self, date: NaiveDate) -> DailyCount {
        self.store
            .get(date)
            .unwrap_or(DailyCount { date, count: 0 })
    }

    pub fn today(&self) -> DailyCount {
        self.day_record(Local::now().date_naive())
    }

    pub fn today_count(&self) -> CountResponse {
        CountResponse {
            count: self.today().count,
        }
    }

    pub fn count_by_date(&self, granularity: DateGranularity) -> Result<CountResponse> {
        let (start, end) = granularity.range()?;
        Ok(CountResponse {
            count: self.store.sum_range(start, end),
        })
    }

    pub fn count_by_parts(
        &self,
        year: i32,
        month: Option<u32>,
        day: Option<u32>,
    ) -> Result<CountResponse> {
        self.count_by_date(DateGranularity::from_parts(year, month, day))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn seeded() -> CountQuery {
        let store = DailyCountStore::in_memory();
        for (d, n) in [
            (date(2023, 12, 31), 4),
            (date(2024, 1, 1), 1),
            (date(2024, 1, 15), 2),
            (date(2024, 2, 29), 3),
            (date(2024, 12, 31), 5),
        ] {
            for _ in 0..n {
                store.increment(d).unwrap();
            }
        }
        CountQuery::new(Arc::new(store))
    }

    #[test]
    fn test_granularity_from_parts() {
        assert_eq!(DateGranularity::from_parts(2024, None, None), DateGranularity::Year(2024));
        assert_eq!(
            DateGranularity::from_parts(2024, Some(2), None),
            DateGranularity::Month(2024, 2)
        );
        assert_eq!(
            DateGranularity::from_parts(2024, Some(2), Some(29)),
            DateGranularity::Day(2024, 2, 29)
        );
        // 只有日没有月 → 按年
        assert_eq!(DateGranularity::from_parts(2024, None, Some(3)), DateGranularity::Year(2024));
    }

    #[test]
    fn test_count_by_year_month_day() {
        let q = seeded();
        assert_eq!(q.count_by_parts(2024, None, None).unwrap().count, 11);
        assert_eq!(q.count_by_parts(2024, Some(1), None).unwrap().count, 3);
        assert_eq!(q.count_by_parts(2024, Some(12), None).unwrap().count, 5);
        assert_eq!(q.count_by_parts(2024, Some(2), Some(29)).unwrap().count, 3);
        assert_eq!(q.count_by_parts(2023, None, None).unwrap().count, 4);
        assert_eq!(q.count_by_parts(2022, Some(6), Some(1)).unwrap().count, 0);
    }

    #[test]
    fn test_invalid_dates_rejected() {
        let q = seeded();
        assert!(q.count_by_parts(2023, Some(2), Some(29)).is_err());
        assert!(q.count_by_parts(2024, Some(13), None).is_err());
    }

    #[test]
    fn test_missing_day_is_zero_record() {
        let q = seeded();
        let record = q.day_record(date(2020, 1, 1));
        assert_eq!(record.count, 0);
        assert_eq!(record.date, date(2020, 1, 1));
    }

    #[test]
    fn test_today_reads_shared_store() {
        let store = Arc::new(DailyCountStore::in_memory());
        let q = CountQuery::new(Arc::clone(&store));
        assert_eq!(q.today_count().count, 0);
        store.increment(Local::now().date_naive()).unwrap();
        assert_eq!(q.today_count().count, 1);
        assert_eq!(q.today().date, Local::now().date_naive());
    }

    #[test]
    fn test_response_json_shape() {
        let json = serde_json::to_string(&CountResponse { count: 7 }).unwrap();
        assert_eq!(json, r#"{"count":7}"#);
        let record = serde_json::to_string(&DailyCount {
            date: date(2024, 3, 9),
            count: 2,
        })
        .unwrap();
        assert_eq!(record, r#"{"date":"2024-03-09","count":2}"#);
    }
}
