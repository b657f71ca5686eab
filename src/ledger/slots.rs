// 时间槽 - 将一天离散为半小时粒度
//
// 可选时间槽为 05:00 到 23:30，外加一个“睡觉”哨兵（没有具体时钟时间）。
// 槽值为 `hour + {0, 0.5}`；值 >= 24 表示次日 `hour - 24`。

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{LedgerError, Result};

/// 05:00 对应的半小时序号
pub const FIRST_HALF_HOUR: u8 = 10;
/// 23:30 对应的半小时序号
pub const LAST_HALF_HOUR: u8 = 47;
/// 次日 23:30 之后不再接受
const MAX_HALF_HOUR: u8 = 95;
/// 睡觉哨兵在列表中的位置
pub const SLEEP_INDEX: usize = (LAST_HALF_HOUR - FIRST_HALF_HOUR + 1) as usize;
/// 每个时间槽的分钟数
pub const SLOT_MINUTES: u32 = 30;

const SLEEP_LABEL: &str = "睡觉";
const NEXT_DAY_PREFIX: &str = "次日";

/// 时间槽；派生的排序保证所有时钟槽都排在哨兵之前
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TimeSlot {
    /// 自当天 00:00 起的半小时数
    Clock(u8),
    Asleep,
}

impl TimeSlot {
    /// 列表中的全部时间槽（38 个时钟槽 + 哨兵）
    pub fn all() -> Vec<TimeSlot> {
        (FIRST_HALF_HOUR..=LAST_HALF_HOUR)
            .map(TimeSlot::Clock)
            .chain(std::iter::once(TimeSlot::Asleep))
            .collect()
    }

    /// 由连续值（如 9.5 表示 09:30）构造
    pub fn from_value(value: f64) -> Option<TimeSlot> {
        let half_hours = value * 2.0;
        if half_hours.fract() != 0.0 || half_hours < 0.0 {
            return None;
        }
        let h = half_hours as u32;
        if h < FIRST_HALF_HOUR as u32 || h > MAX_HALF_HOUR as u32 {
            return None;
        }
        Some(TimeSlot::Clock(h as u8))
    }

    /// 连续值；哨兵没有值
    pub fn value(&self) -> Option<f64> {
        match self {
            TimeSlot::Clock(h) => Some(f64::from(*h) / 2.0),
            TimeSlot::Asleep => None,
        }
    }

    /// 在列表中的位置；次日槽不在列表里
    pub fn index(&self) -> Option<usize> {
        match self {
            TimeSlot::Clock(h) if (FIRST_HALF_HOUR..=LAST_HALF_HOUR).contains(h) => {
                Some((h - FIRST_HALF_HOUR) as usize)
            }
            TimeSlot::Clock(_) => None,
            TimeSlot::Asleep => Some(SLEEP_INDEX),
        }
    }

    pub fn from_index(index: usize) -> Option<TimeSlot> {
        if index < SLEEP_INDEX {
            Some(TimeSlot::Clock(FIRST_HALF_HOUR + index as u8))
        } else if index == SLEEP_INDEX {
            Some(TimeSlot::Asleep)
        } else {
            None
        }
    }

    pub fn is_asleep(&self) -> bool {
        matches!(self, TimeSlot::Asleep)
    }

    pub fn label(&self) -> String {
        match self {
            TimeSlot::Clock(h) => {
                let hour = h / 2;
                let minute = (h % 2) * 30;
                if hour >= 24 {
                    format!("{}{:02}:{:02}", NEXT_DAY_PREFIX, hour - 24, minute)
                } else {
                    format!("{:02}:{:02}", hour, minute)
                }
            }
            TimeSlot::Asleep => SLEEP_LABEL.to_string(),
        }
    }

    /// 解析 `label()` 的输出
    pub fn parse(label: &str) -> Option<TimeSlot> {
        let label = label.trim();
        if label == SLEEP_LABEL {
            return Some(TimeSlot::Asleep);
        }
        let (next_day, clock) = match label.strip_prefix(NEXT_DAY_PREFIX) {
            Some(rest) => (true, rest),
            None => (false, label),
        };
        let time = NaiveTime::parse_from_str(clock, "%H:%M").ok()?;
        let minute = chrono::Timelike::minute(&time);
        if minute != 0 && minute != 30 {
            return None;
        }
        let mut value = f64::from(chrono::Timelike::hour(&time)) + f64::from(minute) / 60.0;
        if next_day {
            value += 24.0;
        }
        TimeSlot::from_value(value)
    }

    /// 转换为指定日期的墙上时间；小时 >= 24 顺延到次日
    pub fn to_datetime(&self, date: NaiveDate) -> Option<NaiveDateTime> {
        let h = match self {
            TimeSlot::Clock(h) => *h,
            TimeSlot::Asleep => return None,
        };
        let hour = u32::from(h / 2);
        let minute = u32::from(h % 2) * 30;
        let (day, hour) = if hour >= 24 {
            (date + Duration::days(1), hour - 24)
        } else {
            (date, hour)
        };
        day.and_hms_opt(hour, minute, 0)
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// 起止时间段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawSlotRange")]
pub struct SlotRange {
    start: TimeSlot,
    end: TimeSlot,
}

/// 反序列化时先读入原始两端，再按构造规则校验
#[derive(Deserialize)]
struct RawSlotRange {
    start: TimeSlot,
    end: TimeSlot,
}

impl TryFrom<RawSlotRange> for SlotRange {
    type Error = LedgerError;

    fn try_from(raw: RawSlotRange) -> Result<Self> {
        for slot in [raw.start, raw.end] {
            if let TimeSlot::Clock(v) = slot {
                if v > MAX_HALF_HOUR {
                    return Err(LedgerError::validation(
                        "time_slot",
                        format!("无效的时间槽序号 {}", v),
                    ));
                }
            }
        }
        match (raw.start, raw.end) {
            (TimeSlot::Clock(_), TimeSlot::Asleep) => Ok(Self::asleep(raw.start)),
            (start, end) => Self::new(start, end),
        }
    }
}

impl SlotRange {
    /// 两端必须都是时钟槽且 end > start；睡眠时段用 [`SlotRange::asleep`]
    pub fn new(start: TimeSlot, end: TimeSlot) -> Result<Self> {
        match (start, end) {
            (TimeSlot::Clock(s), TimeSlot::Clock(e)) if e > s => Ok(Self { start, end }),
            (TimeSlot::Clock(_), TimeSlot::Clock(_)) => Err(LedgerError::validation(
                "end_time",
                format!("结束时间 {} 必须晚于开始时间 {}", end, start),
            )),
            _ => Err(LedgerError::validation("end_time", "普通时段不能包含睡觉")),
        }
    }

    /// 从 `start` 开始睡觉
    pub fn asleep(start: TimeSlot) -> Self {
        Self {
            start,
            end: TimeSlot::Asleep,
        }
    }

    pub fn start(&self) -> TimeSlot {
        self.start
    }

    pub fn end(&self) -> TimeSlot {
        self.end
    }

    pub fn is_asleep(&self) -> bool {
        self.start.is_asleep() || self.end.is_asleep()
    }

    /// 时长（分钟）；睡眠时段没有时长
    pub fn duration_minutes(&self) -> Option<u32> {
        match (self.start, self.end) {
            (TimeSlot::Clock(s), TimeSlot::Clock(e)) => Some(u32::from(e - s) * SLOT_MINUTES),
            _ => None,
        }
    }

    /// 时长展示文本
    pub fn display_duration(&self) -> String {
        match self.duration_minutes() {
            Some(minutes) => format_minutes(minutes),
            None => "睡眠中".to_string(),
        }
    }

    pub fn to_datetimes(&self, date: NaiveDate) -> (Option<NaiveDateTime>, Option<NaiveDateTime>) {
        (self.start.to_datetime(date), self.end.to_datetime(date))
    }
}

/// 分钟数格式化为“1小时30分钟”
pub fn format_minutes(minutes: u32) -> String {
    let hours = minutes / 60;
    let rest = minutes % 60;
    match (hours, rest) {
        (0, m) => format!("{}分钟", m),
        (h, 0) => format!("{}小时", h),
        (h, m) => format!("{}小时{}分钟", h, m),
    }
}

/// 起止时间选择器
///
/// 移动开始时间越过结束时间时，结束时间至少顺延一格；反之亦然。
/// 调整不会越过睡觉哨兵。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotPicker {
    start: TimeSlot,
    end: TimeSlot,
}

impl Default for SlotPicker {
    fn default() -> Self {
        Self {
            start: TimeSlot::Clock(FIRST_HALF_HOUR),
            end: TimeSlot::Clock(FIRST_HALF_HOUR + 1),
        }
    }
}

impl SlotPicker {
    pub fn new(range: SlotRange) -> Self {
        Self {
            start: range.start,
            end: range.end,
        }
    }

    pub fn start(&self) -> TimeSlot {
        self.start
    }

    pub fn end(&self) -> TimeSlot {
        self.end
    }

    pub fn set_start(&mut self, slot: TimeSlot) {
        let h = match slot {
            TimeSlot::Asleep => {
                self.start = TimeSlot::Asleep;
                return;
            }
            TimeSlot::Clock(h) => h.clamp(FIRST_HALF_HOUR, LAST_HALF_HOUR - 1),
        };
        self.start = TimeSlot::Clock(h);
        match self.end {
            TimeSlot::Clock(e) if e <= h => self.end = TimeSlot::Clock(h + 1),
            TimeSlot::Clock(_) => {}
            // 结束为哨兵时改回时钟槽，避免越过哨兵
            TimeSlot::Asleep => self.end = TimeSlot::Clock(h + 1),
        }
    }

    pub fn set_end(&mut self, slot: TimeSlot) {
        let h = match slot {
            TimeSlot::Asleep => {
                self.end = TimeSlot::Asleep;
                return;
            }
            TimeSlot::Clock(h) => h.clamp(FIRST_HALF_HOUR + 1, LAST_HALF_HOUR),
        };
        self.end = TimeSlot::Clock(h);
        match self.start {
            TimeSlot::Clock(s) if s >= h => self.start = TimeSlot::Clock(h - 1),
            TimeSlot::Clock(_) => {}
            TimeSlot::Asleep => self.start = TimeSlot::Clock(h - 1),
        }
    }

    pub fn range(&self) -> SlotRange {
        // 两个 setter 维持了 end > start，这里不会失败
        SlotRange {
            start: self.start,
            end: self.end,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(label: &str) -> TimeSlot {
        TimeSlot::parse(label).unwrap()
    }

    #[test]
    fn test_slot_list() {
        let all = TimeSlot::all();
        assert_eq!(all.len(), 39);
        assert_eq!(all[0].label(), "05:00");
        assert_eq!(all[37].label(), "23:30");
        assert!(all[38].is_asleep());
        for (i, s) in all.iter().enumerate() {
            assert_eq!(s.index(), Some(i));
            assert_eq!(TimeSlot::from_index(i), Some(*s));
        }
        assert_eq!(TimeSlot::from_index(39), None);
    }

    #[test]
    fn test_value_and_parse() {
        assert_eq!(TimeSlot::from_value(9.5), Some(slot("09:30")));
        assert_eq!(slot("09:30").value(), Some(9.5));
        assert_eq!(TimeSlot::from_value(9.25), None);
        assert_eq!(TimeSlot::from_value(4.5), None);
        assert_eq!(TimeSlot::parse("睡觉"), Some(TimeSlot::Asleep));
        assert_eq!(TimeSlot::parse("09:15"), None);
        assert_eq!(slot("次日00:30").value(), Some(24.5));
    }

    #[test]
    fn test_duration_for_all_valid_pairs() {
        let clock: Vec<TimeSlot> = TimeSlot::all().into_iter().filter(|s| !s.is_asleep()).collect();
        for (i, start) in clock.iter().enumerate() {
            for (j, end) in clock.iter().enumerate() {
                let range = SlotRange::new(*start, *end);
                if j > i {
                    let minutes = range.unwrap().duration_minutes();
                    assert_eq!(minutes, Some(((j - i) * 30) as u32));
                } else {
                    assert!(range.is_err());
                }
            }
        }
    }

    #[test]
    fn test_asleep_has_no_duration() {
        assert!(SlotRange::new(slot("22:00"), TimeSlot::Asleep).is_err());
        let range = SlotRange::asleep(slot("22:00"));
        assert!(range.is_asleep());
        assert_eq!(range.duration_minutes(), None);
        assert_eq!(range.display_duration(), "睡眠中");

        let range = SlotRange::new(slot("09:00"), slot("10:30")).unwrap();
        assert_eq!(range.display_duration(), "1小时30分钟");
    }

    #[test]
    fn test_rollover_to_next_day() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        let dt = TimeSlot::from_value(25.0).unwrap().to_datetime(date).unwrap();
        assert_eq!(dt.to_string(), "2024-02-01 01:00:00");

        let dt = slot("23:30").to_datetime(date).unwrap();
        assert_eq!(dt.to_string(), "2024-01-31 23:30:00");
        assert_eq!(TimeSlot::Asleep.to_datetime(date), None);
    }

    #[test]
    fn test_picker_advances_end() {
        let mut picker = SlotPicker::default();
        picker.set_end(slot("10:00"));
        picker.set_start(slot("11:00"));
        assert_eq!(picker.start(), slot("11:00"));
        assert_eq!(picker.end(), slot("11:30"));

        // 开始移到最后一格时，开始退一格、结束占最后一格
        picker.set_start(slot("23:30"));
        assert_eq!(picker.start(), slot("23:00"));
        assert_eq!(picker.end(), slot("23:30"));
        assert_eq!(picker.range().duration_minutes(), Some(30));
    }

    #[test]
    fn test_picker_retreats_start() {
        let mut picker = SlotPicker::default();
        picker.set_start(slot("14:00"));
        picker.set_end(slot("13:00"));
        assert_eq!(picker.start(), slot("12:30"));
        assert_eq!(picker.end(), slot("13:00"));

        picker.set_end(slot("05:00"));
        assert_eq!(picker.start(), slot("05:00"));
        assert_eq!(picker.end(), slot("05:30"));
    }

    #[test]
    fn test_picker_sleep_sentinel() {
        let mut picker = SlotPicker::default();
        picker.set_start(slot("22:00"));
        picker.set_end(TimeSlot::Asleep);
        assert!(picker.range().is_asleep());

        // 从睡眠状态移回时钟槽不会产生负时长
        picker.set_start(slot("23:30"));
        let minutes = picker.range().duration_minutes().unwrap();
        assert!(minutes > 0);
    }

    #[test]
    fn test_deserialize_validates_range() {
        let inverted =
            serde_json::from_str::<SlotRange>(r#"{"start":{"Clock":20},"end":{"Clock":10}}"#);
        assert!(inverted.is_err());
        let out_of_range =
            serde_json::from_str::<SlotRange>(r#"{"start":{"Clock":20},"end":{"Clock":200}}"#);
        assert!(out_of_range.is_err());

        let range: SlotRange =
            serde_json::from_str(r#"{"start":{"Clock":20},"end":{"Clock":23}}"#).unwrap();
        assert_eq!(range.duration_minutes(), Some(90));

        let asleep: SlotRange =
            serde_json::from_str(r#"{"start":{"Clock":44},"end":"Asleep"}"#).unwrap();
        assert!(asleep.is_asleep());
        let json = serde_json::to_string(&asleep).unwrap();
        assert_eq!(serde_json::from_str::<SlotRange>(&json).unwrap(), asleep);
    }
}
