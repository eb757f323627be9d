//! iCalendar interchange for course schedules.
//!
//! Export writes one `VEVENT` per course (weekly `RRULE` plus `EXDATE`s) when the
//! course's weeks are dense, or one `VEVENT` per week when they are sparse.
//! Import reverses both shapes back into courses keyed by period and weekday.

mod export;
mod import;


use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

pub use import::{ImportWarning, ImportedCalendar, WarningKind};

/// 本地时间格式（无时区，浮动时间）
const DATETIME_FORMAT: &str = "%Y%m%dT%H%M%S";
const DATE_FORMAT: &str = "%Y%m%d";
/// RFC 5545 建议的单行最大字节数
const MAX_LINE_OCTETS: usize = 75;
const UID_DOMAIN: &str = "campus-schedule";
const PRODID: &str = "-//Campus Schedule//Course Calendar//CN";
const INSTRUCTOR_PREFIX: &str = "任课教师: ";
const EXAM_PREFIX: &str = "考试时间: ";
const EXAM_UNSCHEDULED: &str = "待定";
const EXAM_FORMAT: &str = "%Y-%m-%d %H:%M";

/// ICS 导入导出选项
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IcsOptions {
    /// 是否写入课程描述（教师、考试时间）
    pub include_description: bool,
    /// 课前提醒（分钟）
    pub reminder_minutes: Option<u32>,
    /// 导入时找不到匹配节次则取最近的节次，而不是丢弃该事件
    pub best_effort: bool,
    /// 用文件中最早的一次上课推断学期开始日期，而不是使用配置中的日期
    pub infer_semester_start: bool,
    /// 无 COUNT 的重复规则最多展开的周数
    pub max_horizon_weeks: u32,
}

impl Default for IcsOptions {
    fn default() -> Self {
        Self {
            include_description: true,
            reminder_minutes: None,
            best_effort: false,
            infer_semester_start: false,
            max_horizon_weeks: 52,
        }
    }
}

/// ICS 课表编解码器
pub struct IcsCodec {
    options: IcsOptions,
}

impl IcsCodec {
    pub fn new(options: IcsOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &IcsOptions {
        &self.options
    }
}

impl Default for IcsCodec {
    fn default() -> Self {
        Self::new(IcsOptions::default())
    }
}

/// 转义ICS文本内容
fn escape_text(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('\r', "")
        .replace('\n', "\\n")
        .replace(',', "\\,")
        .replace(';', "\\;")
}

fn unescape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n' | 'N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// 追加一行内容，超过75字节时按 RFC 5545 折行（不拆分 UTF-8 字符）
fn push_folded(out: &mut String, line: &str) {
    let mut width = 0;
    for ch in line.chars() {
        let len = ch.len_utf8();
        if width + len > MAX_LINE_OCTETS {
            out.push_str("\r\n ");
            width = 1;
        }
        out.push(ch);
        width += len;
    }
    out.push_str("\r\n");
}

fn day_code(day_of_week: u32) -> Option<&'static str> {
    match day_of_week {
        1 => Some("MO"),
        2 => Some("TU"),
        3 => Some("WE"),
        4 => Some("TH"),
        5 => Some("FR"),
        6 => Some("SA"),
        7 => Some("SU"),
        _ => None,
    }
}

fn day_from_code(code: &str) -> Option<u32> {
    // BYDAY 可能带序号前缀，如 "1MO"，周重复时忽略
    let code = code.trim_start_matches(|c: char| c.is_ascii_digit() || c == '+' || c == '-');
    match code.to_ascii_uppercase().as_str() {
        "MO" => Some(1),
        "TU" => Some(2),
        "WE" => Some(3),
        "TH" => Some(4),
        "FR" => Some(5),
        "SA" => Some(6),
        "SU" => Some(7),
        _ => None,
    }
}

fn format_datetime(value: NaiveDateTime) -> String {
    value.format(DATETIME_FORMAT).to_string()
}

/// 解析日期时间，`Z` 后缀按本地时间处理
fn parse_datetime(value: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    let value = value.trim().trim_end_matches('Z');
    NaiveDateTime::parse_from_str(value, DATETIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M"))
}

/// 解析日期或日期时间，只保留日期部分
fn parse_date(value: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .or_else(|_| parse_datetime(value).map(|dt| dt.date()))
}

fn is_date_only(value: &str) -> bool {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).is_ok()
}
