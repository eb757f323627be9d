use std::{collections::BTreeSet, fmt, str::FromStr};

use chrono::{NaiveDate, NaiveDateTime, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, clock::Clock, slots::TimeSlotTable};

/// 未指定颜色时使用的默认课程颜色
pub const DEFAULT_COURSE_COLOR: &str = "#4A90D9";

/// 学期课表
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: Uuid,
    /// 显示名称
    pub name: String,
    /// 学期名称，如 "2024-2025 春季"
    pub term_name: String,
    /// 同一时间最多只有一个课表处于激活状态，由调用方（仓库层）保证
    pub is_active: bool,
    pub created_at: NaiveDateTime,
}

impl Schedule {
    /// 创建新的课表，创建时间取自注入的时钟
    pub fn new(name: impl Into<String>, term_name: impl Into<String>, clock: &dyn Clock) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            term_name: term_name.into(),
            is_active: false,
            created_at: clock.now(),
        }
    }
}

/// 考试时间
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "time", rename_all = "snake_case")]
pub enum ExamTime {
    Scheduled(NaiveDateTime),
    #[default]
    Unscheduled,
}

/// 每周重复的一门课程
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: Uuid,
    /// 课程名称
    pub name: String,
    /// 任课教师
    pub instructor: String,
    /// 上课地点
    pub location: String,
    /// 上课周次（学期第几周），可以不连续
    pub weeks: BTreeSet<u32>,
    /// 星期几，1=Monday ... 7=Sunday，与显示的周起始日无关
    pub day_of_week: u32,
    /// 开始节次（从1开始）
    pub time_slot: u32,
    /// 连续节数
    pub duration: u32,
    pub color: String,
    /// 所属课表
    pub schedule_id: Uuid,
    #[serde(default)]
    pub exam: ExamTime,
}

/// 创建课程所需的字段，经 [`Course::new`] 校验后才能成为 [`Course`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCourse {
    pub id: Uuid,
    pub schedule_id: Uuid,
    pub name: String,
    pub instructor: String,
    pub location: String,
    pub weeks: BTreeSet<u32>,
    pub day_of_week: u32,
    pub time_slot: u32,
    pub duration: u32,
    pub color: Option<String>,
    #[serde(default)]
    pub exam: ExamTime,
}

impl Course {
    /// 校验并创建课程，不满足约束时返回指明字段的校验错误
    pub fn new(fields: NewCourse, table: &TimeSlotTable) -> Result<Self> {
        let course = Self {
            id: fields.id,
            name: fields.name,
            instructor: fields.instructor,
            location: fields.location,
            weeks: fields.weeks,
            day_of_week: fields.day_of_week,
            time_slot: fields.time_slot,
            duration: fields.duration,
            color: fields
                .color
                .unwrap_or_else(|| DEFAULT_COURSE_COLOR.to_string()),
            schedule_id: fields.schedule_id,
            exam: fields.exam,
        };
        course.validate(table)?;
        Ok(course)
    }

    /// 检查课程不变量
    pub fn validate(&self, table: &TimeSlotTable) -> Result<()> {
        if self.weeks.is_empty() {
            return Err(Error::validation("weeks", "must contain at least one week"));
        }
        if self.weeks.contains(&0) {
            return Err(Error::validation("weeks", "week numbers must be positive"));
        }
        if !(1..=7).contains(&self.day_of_week) {
            return Err(Error::validation(
                "day_of_week",
                format!("{} is outside 1..=7", self.day_of_week),
            ));
        }
        if self.duration == 0 {
            return Err(Error::validation("duration", "must be at least 1"));
        }
        let max_slot = table.max_slot();
        if self.time_slot == 0 || self.time_slot > max_slot {
            return Err(Error::validation(
                "time_slot",
                format!("{} is outside 1..={}", self.time_slot, max_slot),
            ));
        }
        if self.duration > max_slot - self.time_slot + 1 {
            return Err(Error::validation(
                "duration",
                format!(
                    "slot {} + {} periods runs past the last period {}",
                    self.time_slot, self.duration, max_slot
                ),
            ));
        }
        Ok(())
    }

    /// 最后一节的节次
    pub fn last_slot(&self) -> u32 {
        self.time_slot
            .saturating_add(self.duration.saturating_sub(1))
    }

    pub fn weekday(&self) -> Option<Weekday> {
        iso_weekday(self.day_of_week)
    }
}

/// 1=Monday ... 7=Sunday
pub fn iso_weekday(day: u32) -> Option<Weekday> {
    match day {
        1 => Some(Weekday::Mon),
        2 => Some(Weekday::Tue),
        3 => Some(Weekday::Wed),
        4 => Some(Weekday::Thu),
        5 => Some(Weekday::Fri),
        6 => Some(Weekday::Sat),
        7 => Some(Weekday::Sun),
        _ => None,
    }
}

/// 显示时每周的第一列
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeekStart {
    #[serde(alias = "sun")]
    Sunday,
    #[default]
    #[serde(alias = "mon")]
    Monday,
}

impl WeekStart {
    pub fn weekday(self) -> Weekday {
        match self {
            Self::Sunday => Weekday::Sun,
            Self::Monday => Weekday::Mon,
        }
    }
}

impl FromStr for WeekStart {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sun" | "sunday" => Ok(Self::Sunday),
            "mon" | "monday" => Ok(Self::Monday),
            other => Err(Error::validation(
                "week_start_day",
                format!("'{other}' is not one of sun, mon"),
            )),
        }
    }
}

/// 时间轴显示模式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineDisplayMode {
    /// 按整点均匀分行
    #[default]
    Standard,
    /// 按实际节次压缩，行高加倍
    ClassTime,
}

impl TimelineDisplayMode {
    /// 相对于标准模式的纵向缩放倍数，只影响渲染，不影响实际时间
    pub fn scale_factor(self) -> u32 {
        match self {
            Self::Standard => 1,
            Self::ClassTime => 2,
        }
    }

    /// 是否绘制"当前时间线"。是否在 classTime 模式下关闭由调用方决定，
    /// 这里只给出默认建议。
    pub fn shows_current_time_line(self) -> bool {
        matches!(self, Self::Standard)
    }
}

impl FromStr for TimelineDisplayMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "standard" => Ok(Self::Standard),
            "class_time" | "classtime" => Ok(Self::ClassTime),
            other => Err(Error::validation(
                "timeline_display_mode",
                format!("'{other}' is not one of standard, class-time"),
            )),
        }
    }
}

/// 所有引擎操作共享的周配置，每次调用时显式传入
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekConfig {
    /// 第1周第1天
    pub semester_start_date: NaiveDate,
    #[serde(default)]
    pub week_start_day: WeekStart,
    #[serde(default = "default_start_hour")]
    pub calendar_start_hour: u32,
    #[serde(default = "default_end_hour")]
    pub calendar_end_hour: u32,
    #[serde(default)]
    pub timeline_display_mode: TimelineDisplayMode,
}

fn default_start_hour() -> u32 {
    8
}

fn default_end_hour() -> u32 {
    22
}

impl WeekConfig {
    pub fn new(semester_start_date: NaiveDate) -> Self {
        Self {
            semester_start_date,
            week_start_day: WeekStart::default(),
            calendar_start_hour: default_start_hour(),
            calendar_end_hour: default_end_hour(),
            timeline_display_mode: TimelineDisplayMode::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.calendar_end_hour > 23 {
            return Err(Error::validation(
                "calendar_end_hour",
                format!("{} is later than 23", self.calendar_end_hour),
            ));
        }
        if self.calendar_start_hour >= self.calendar_end_hour {
            return Err(Error::validation(
                "calendar_start_hour",
                format!(
                    "{} must be earlier than calendar_end_hour {}",
                    self.calendar_start_hour, self.calendar_end_hour
                ),
            ));
        }
        Ok(())
    }
}

/// 课程在某一天的一次具体上课，按需生成，不持久化
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Occurrence<'a> {
    pub course: &'a Course,
    pub date: NaiveDate,
    /// 学期第几周
    pub week: i64,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    /// 渲染缩放倍数，见 [`TimelineDisplayMode::scale_factor`]
    pub scale: u32,
}

impl Occurrence<'_> {
    /// 开区间意义上的时间重叠，首尾相接不算重叠
    pub fn overlaps(&self, other: &Occurrence<'_>) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// 交给渲染层的定位块
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PositionedBlock<'a> {
    #[serde(flatten)]
    pub occurrence: Occurrence<'a>,
    pub day_of_week: u32,
    pub column: usize,
    pub total_columns: usize,
}

impl fmt::Display for PositionedBlock<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{} {} @ {} [{}/{}]",
            self.occurrence.start.format("%H:%M"),
            self.occurrence.end.format("%H:%M"),
            self.occurrence.course.name,
            self.occurrence.course.location,
            self.column + 1,
            self.total_columns
        )
    }
}
