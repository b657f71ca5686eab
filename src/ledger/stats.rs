// 统计聚合 - 按价值分类汇总时长

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::entities::{ActivityDetail, ValueRating};

/// 汇总结果；三个分类的时长之和始终等于总时长
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityStats {
    pub total_minutes: u64,
    pub valuable_minutes: u64,
    pub neutral_minutes: u64,
    pub wasteful_minutes: u64,
    pub count: usize,
}

impl ActivityStats {
    pub fn add(&mut self, minutes: u32, rating: Option<ValueRating>) {
        let minutes = u64::from(minutes);
        self.total_minutes += minutes;
        self.count += 1;
        match rating.unwrap_or(ValueRating::Neutral) {
            ValueRating::Valuable => self.valuable_minutes += minutes,
            ValueRating::Neutral => self.neutral_minutes += minutes,
            ValueRating::Wasteful => self.wasteful_minutes += minutes,
        }
    }

    pub fn minutes_for(&self, rating: ValueRating) -> u64 {
        match rating {
            ValueRating::Valuable => self.valuable_minutes,
            ValueRating::Neutral => self.neutral_minutes,
            ValueRating::Wasteful => self.wasteful_minutes,
        }
    }

    /// 占比（0-100）；总时长为 0 时返回 0
    pub fn percentage(&self, rating: ValueRating) -> f64 {
        if self.total_minutes == 0 {
            return 0.0;
        }
        self.minutes_for(rating) as f64 * 100.0 / self.total_minutes as f64
    }
}

/// 可参与统计的条目
pub trait Rated {
    fn minutes(&self) -> u32;
    fn rating(&self) -> Option<ValueRating>;
}

impl Rated for ActivityDetail {
    fn minutes(&self) -> u32 {
        self.duration_minutes
    }

    fn rating(&self) -> Option<ValueRating> {
        Some(self.value_rating)
    }
}

impl Rated for super::entry::ActivityEntry {
    fn minutes(&self) -> u32 {
        self.minutes
    }

    fn rating(&self) -> Option<ValueRating> {
        self.value_rating
    }
}

impl Rated for (u32, Option<ValueRating>) {
    fn minutes(&self) -> u32 {
        self.0
    }

    fn rating(&self) -> Option<ValueRating> {
        self.1
    }
}

pub fn aggregate<'a, T, I>(items: I) -> ActivityStats
where
    T: Rated + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let mut stats = ActivityStats::default();
    for item in items {
        stats.add(item.minutes(), item.rating());
    }
    stats
}

/// 分组周期
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Day,
    Week,
    Month,
}

impl Period {
    pub fn key(&self, date: NaiveDate) -> String {
        match self {
            Period::Day => date.format("%Y-%m-%d").to_string(),
            Period::Week => {
                let week = date.iso_week();
                format!("{}-W{:02}", week.year(), week.week())
            }
            Period::Month => date.format("%Y-%m").to_string(),
        }
    }
}

impl std::str::FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day" => Ok(Period::Day),
            "week" => Ok(Period::Week),
            "month" => Ok(Period::Month),
            other => Err(format!("未知的统计周期: {}", other)),
        }
    }
}

/// 按周期分组汇总带日期的条目
pub fn aggregate_by_period<'a, T, I>(items: I, period: Period) -> BTreeMap<String, ActivityStats>
where
    T: Rated + 'a,
    I: IntoIterator<Item = (NaiveDate, &'a T)>,
{
    let mut groups: BTreeMap<String, ActivityStats> = BTreeMap::new();
    for (date, item) in items {
        groups
            .entry(period.key(date))
            .or_default()
            .add(item.minutes(), item.rating());
    }
    groups
}
