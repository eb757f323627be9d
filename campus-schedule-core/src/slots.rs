use std::borrow::Cow;

use chrono::{Duration, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::{Error, Result, WeekConfig};

/// 标准作息的节次时间（分钟），第1节 08:00 开始
const CAMPUS_LESSON_TIMES: [(i64, i64); 11] = [
    (8 * 60, 8 * 60 + 45),        // 第1节: 08:00-08:45
    (8 * 60 + 55, 9 * 60 + 40),   // 第2节: 08:55-09:40
    (10 * 60, 10 * 60 + 45),      // 第3节: 10:00-10:45
    (10 * 60 + 55, 11 * 60 + 40), // 第4节: 10:55-11:40
    (14 * 60, 14 * 60 + 45),      // 第5节: 14:00-14:45
    (14 * 60 + 55, 15 * 60 + 40), // 第6节: 14:55-15:40
    (16 * 60, 16 * 60 + 45),      // 第7节: 16:00-16:45
    (16 * 60 + 55, 17 * 60 + 40), // 第8节: 16:55-17:40
    (19 * 60, 19 * 60 + 45),      // 第9节: 19:00-19:45
    (19 * 60 + 55, 20 * 60 + 40), // 第10节: 19:55-20:40
    (20 * 60 + 50, 21 * 60 + 35), // 第11节: 20:50-21:35
];

/// 一节课的起止时间
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl Period {
    fn length(&self) -> Duration {
        self.end - self.start
    }
}

/// 节次的划分方式
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PeriodLayout {
    /// 将 `[calendar_start_hour, calendar_end_hour)` 均分为若干节
    Uniform { periods: u32 },
    /// 调用方给出的每节时间，原样使用
    Explicit { periods: Vec<Period> },
}

/// 节次到时间的映射结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SlotRange {
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub scale: u32,
}

/// 从某一节开始覆盖到给定结束时间所需的节数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotSpan {
    pub duration: u32,
    /// 结束时间是否恰好落在某节下课时刻
    pub exact: bool,
}

/// 节次表
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PeriodLayout", into = "PeriodLayout")]
pub struct TimeSlotTable {
    layout: PeriodLayout,
}

impl TimeSlotTable {
    /// 均分显示区间的节次表
    pub fn uniform(periods: u32) -> Result<Self> {
        if periods == 0 {
            return Err(Error::validation("periods", "must be at least 1"));
        }
        Ok(Self {
            layout: PeriodLayout::Uniform { periods },
        })
    }

    /// 显式给出每节时间的节次表，要求按时间升序且互不重叠
    pub fn explicit(periods: Vec<Period>) -> Result<Self> {
        if periods.is_empty() {
            return Err(Error::validation("periods", "must contain at least one period"));
        }
        for (idx, period) in periods.iter().enumerate() {
            if period.start >= period.end {
                return Err(Error::validation(
                    "periods",
                    format!("period {} ends before it starts", idx + 1),
                ));
            }
            if idx > 0 && period.start < periods[idx - 1].end {
                return Err(Error::validation(
                    "periods",
                    format!("period {} overlaps the previous one", idx + 1),
                ));
            }
        }
        Ok(Self {
            layout: PeriodLayout::Explicit { periods },
        })
    }

    /// 11节的标准校园作息
    pub fn campus_default() -> Self {
        let periods = CAMPUS_LESSON_TIMES
            .iter()
            .map(|&(start, end)| Period {
                start: minutes_to_time(start),
                end: minutes_to_time(end),
            })
            .collect();
        Self {
            layout: PeriodLayout::Explicit { periods },
        }
    }

    pub fn layout(&self) -> &PeriodLayout {
        &self.layout
    }

    /// 最大节次
    pub fn max_slot(&self) -> u32 {
        match &self.layout {
            PeriodLayout::Uniform { periods } => *periods,
            PeriodLayout::Explicit { periods } => periods.len() as u32,
        }
    }

    /// 按配置解析出每一节的具体时间
    pub fn periods(&self, config: &WeekConfig) -> Result<Cow<'_, [Period]>> {
        match &self.layout {
            PeriodLayout::Explicit { periods } => Ok(Cow::Borrowed(periods)),
            PeriodLayout::Uniform { periods } => {
                config.validate()?;
                let base = i64::from(config.calendar_start_hour) * 3600;
                let total = i64::from(config.calendar_end_hour - config.calendar_start_hour) * 3600;
                let slice = total / i64::from(*periods);
                if slice == 0 {
                    return Err(Error::validation(
                        "periods",
                        format!("{periods} periods do not fit the display range"),
                    ));
                }
                let resolved = (0..i64::from(*periods))
                    .map(|idx| {
                        let start = base + idx * slice;
                        Period {
                            start: seconds_to_time(start),
                            end: seconds_to_time(start + slice),
                        }
                    })
                    .collect();
                Ok(Cow::Owned(resolved))
            }
        }
    }

    /// 第 `slot` 节开始、连续 `duration` 节的起止时间
    pub fn time_range(&self, slot: u32, duration: u32, config: &WeekConfig) -> Result<SlotRange> {
        if duration == 0 {
            return Err(Error::validation("duration", "must be at least 1"));
        }
        let max_slot = self.max_slot();
        if slot == 0 || slot > max_slot {
            return Err(Error::validation(
                "time_slot",
                format!("{slot} is outside 1..={max_slot}"),
            ));
        }
        // slot <= max_slot，此处不会下溢
        if duration > max_slot - slot + 1 {
            return Err(Error::validation(
                "duration",
                format!("slot {slot} + {duration} periods runs past the last period {max_slot}"),
            ));
        }

        let last = slot + duration - 1;
        let periods = self.periods(config)?;
        Ok(SlotRange {
            start: periods[(slot - 1) as usize].start,
            end: periods[(last - 1) as usize].end,
            scale: config.timeline_display_mode.scale_factor(),
        })
    }

    /// 开始时间在半节课以内的最近节次；等距时取较早的一节
    pub fn slot_for_time(&self, time: NaiveTime, config: &WeekConfig) -> Option<u32> {
        let periods = self.periods(config).ok()?;
        let mut best: Option<(u32, i64)> = None;
        for (idx, period) in periods.iter().enumerate() {
            let distance = (time - period.start).num_seconds().abs();
            if distance * 2 > period.length().num_seconds() {
                continue;
            }
            if best.is_none_or(|(_, d)| distance < d) {
                best = Some((idx as u32 + 1, distance));
            }
        }
        best.map(|(slot, _)| slot)
    }

    /// 不限容差的最近节次
    pub fn nearest_slot(&self, time: NaiveTime, config: &WeekConfig) -> Option<u32> {
        let periods = self.periods(config).ok()?;
        periods
            .iter()
            .enumerate()
            .map(|(idx, period)| (idx as u32 + 1, (time - period.start).num_seconds().abs()))
            .min_by_key(|&(slot, distance)| (distance, slot))
            .map(|(slot, _)| slot)
    }

    /// 从 `slot` 开始覆盖到 `end` 所需的节数，超出节次表时返回 `None`
    pub fn span_ending_at(&self, slot: u32, end: NaiveTime, config: &WeekConfig) -> Option<SlotSpan> {
        let periods = self.periods(config).ok()?;
        if slot == 0 {
            return None;
        }
        periods
            .iter()
            .enumerate()
            .skip((slot - 1) as usize)
            .find(|(_, period)| period.end >= end)
            .map(|(idx, period)| SlotSpan {
                duration: idx as u32 + 2 - slot,
                exact: period.end == end,
            })
    }
}

impl Default for TimeSlotTable {
    fn default() -> Self {
        Self::campus_default()
    }
}

impl TryFrom<PeriodLayout> for TimeSlotTable {
    type Error = Error;

    fn try_from(layout: PeriodLayout) -> Result<Self> {
        match layout {
            PeriodLayout::Uniform { periods } => Self::uniform(periods),
            PeriodLayout::Explicit { periods } => Self::explicit(periods),
        }
    }
}

impl From<TimeSlotTable> for PeriodLayout {
    fn from(table: TimeSlotTable) -> Self {
        table.layout
    }
}

fn minutes_to_time(minutes: i64) -> NaiveTime {
    NaiveTime::default() + Duration::minutes(minutes)
}

fn seconds_to_time(seconds: i64) -> NaiveTime {
    NaiveTime::default() + Duration::seconds(seconds)
}
