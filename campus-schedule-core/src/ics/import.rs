use std::{
    collections::{BTreeSet, HashMap},
    fmt,
    io::BufReader,
};

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use ical::{parser::ical::IcalParser, parser::ical::component::IcalEvent, property::Property};
use serde::Serialize;
use thiserror::Error as ThisError;
use uuid::Uuid;

use super::{
    EXAM_FORMAT, EXAM_PREFIX, INSTRUCTOR_PREFIX, IcsCodec, day_from_code, is_date_only,
    parse_date, parse_datetime, unescape_text,
};
use crate::{
    Course, Error, ExamTime, NewCourse, Result, Schedule, WeekConfig,
    clock::Clock,
    slots::TimeSlotTable,
    week::{WeekCalculator, iso_day},
};

/// 导入时跳过或调整某个事件的原因
#[derive(ThisError, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum WarningKind {
    #[error("missing {0}")]
    MissingProperty(&'static str),

    #[error("unparsable {property} value '{value}'")]
    InvalidDate { property: &'static str, value: String },

    #[error("all-day events have no class period")]
    AllDay,

    #[error("event has zero or negative length")]
    ZeroLength,

    #[error("event spans more than one day")]
    MultiDay,

    #[error("no period starts near {0}")]
    NoMatchingSlot(NaiveTime),

    #[error("start {time} snapped to nearest period {slot}")]
    SnappedToNearestSlot { time: NaiveTime, slot: u32 },

    #[error("end {end} is not a period boundary, rounded up to {duration} periods")]
    RoundedDuration { end: NaiveTime, duration: u32 },

    #[error("end {0} runs past the last period")]
    ExceedsTable(NaiveTime),

    #[error("unsupported RRULE: {0}")]
    UnsupportedRule(String),

    #[error("recurrence truncated after {0} weeks")]
    RuleTruncated(u32),

    #[error("occurrence on {0} falls before the semester start")]
    BeforeTermStart(NaiveDate),

    #[error("duration {found} differs from {kept} already imported for the same course")]
    ConflictingDuration { kept: u32, found: u32 },

    #[error("invalid course: {0}")]
    InvalidCourse(String),
}

/// 一条导入警告，指向文件中的第几个 VEVENT（从1开始）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportWarning {
    pub event: usize,
    pub summary: Option<String>,
    pub kind: WarningKind,
}

impl fmt::Display for ImportWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.summary {
            Some(summary) => write!(f, "VEVENT #{} ({}): {}", self.event, summary, self.kind),
            None => write!(f, "VEVENT #{}: {}", self.event, self.kind),
        }
    }
}

/// 导入结果
#[derive(Debug, Clone, Serialize)]
pub struct ImportedCalendar {
    /// 由日历名称和学期名称派生，重复导入同一日历得到同一个 id
    pub schedule_id: Uuid,
    pub name: String,
    pub term_name: String,
    /// 换算周次时使用的学期开始日期（配置值或推断值）
    pub semester_start: NaiveDate,
    pub courses: Vec<Course>,
    pub warnings: Vec<ImportWarning>,
}

impl ImportedCalendar {
    /// 生成对应的课表
    pub fn schedule(&self, clock: &dyn Clock) -> Schedule {
        Schedule {
            id: self.schedule_id,
            name: self.name.clone(),
            term_name: self.term_name.clone(),
            is_active: false,
            created_at: clock.now(),
        }
    }
}

/// 单个 VEVENT 解析后的中间结果
struct ParsedEvent {
    index: usize,
    summary: String,
    location: String,
    instructor: String,
    color: Option<String>,
    exam: ExamTime,
    time_slot: u32,
    duration: u32,
    dates: Vec<NaiveDate>,
}

/// 合并同一课程的多个事件
struct CourseAccumulator {
    event: usize,
    summary: String,
    location: String,
    instructor: String,
    color: Option<String>,
    exam: ExamTime,
    day_of_week: u32,
    time_slot: u32,
    duration: u32,
    weeks: BTreeSet<u32>,
    /// 已报告过时长冲突的事件
    conflicts: BTreeSet<usize>,
}

/// 周重复规则
struct WeeklyRule {
    interval: u32,
    count: Option<u32>,
    until: Option<NaiveDate>,
    by_day: Vec<u32>,
}

/// 有 COUNT 时的展开上限（周）
const MAX_COUNTED_WEEKS: u32 = 520;

impl IcsCodec {
    /// 解析 ICS 文本为课程列表
    ///
    /// 格式有误的 VEVENT 会被跳过并记录到 `warnings`，不会中断整个导入；
    /// 只有整个文件无法按 iCalendar 解析时才返回错误。
    pub fn import(
        &self,
        text: &str,
        table: &TimeSlotTable,
        config: &WeekConfig,
    ) -> Result<ImportedCalendar> {
        config.validate()?;

        let parser = IcalParser::new(BufReader::new(text.as_bytes()));
        let mut name = String::new();
        let mut term_name = String::new();
        let mut warnings = Vec::new();
        let mut parsed = Vec::new();
        let mut index = 0;

        for calendar in parser {
            let calendar = calendar.map_err(|err| Error::IcsParse(err.to_string()))?;

            if name.is_empty() {
                if let Some(value) = find_property(&calendar.properties, "X-WR-CALNAME") {
                    name = unescape_text(value);
                }
            }
            if term_name.is_empty() {
                if let Some(value) = find_property(&calendar.properties, "X-WR-CALDESC") {
                    term_name = unescape_text(value);
                }
            }

            for event in &calendar.events {
                index += 1;
                let summary = event_property(event, "SUMMARY").map(unescape_text);
                let mut event_warnings = Vec::new();
                match self.parse_event(index, event, table, config, &mut event_warnings) {
                    Ok(event) => parsed.push(event),
                    Err(kind) => event_warnings.push(kind),
                }
                for kind in event_warnings {
                    let warning = ImportWarning {
                        event: index,
                        summary: summary.clone(),
                        kind,
                    };
                    tracing::warn!("{}", warning);
                    warnings.push(warning);
                }
            }
        }

        // 推断时最早的一次上课就是学期第一天，第1周为 [earliest, earliest + 7)
        let semester_start = if self.options.infer_semester_start {
            parsed
                .iter()
                .flat_map(|event| event.dates.iter().copied())
                .min()
                .unwrap_or(config.semester_start_date)
        } else {
            config.semester_start_date
        };
        let week_config = WeekConfig {
            semester_start_date: semester_start,
            ..*config
        };

        let schedule_id = Uuid::new_v5(
            &Uuid::NAMESPACE_OID,
            format!("{name}\u{1f}{term_name}").as_bytes(),
        );
        let courses = fold_courses(parsed, schedule_id, table, &week_config, &mut warnings);

        tracing::debug!(
            courses = courses.len(),
            warnings = warnings.len(),
            %semester_start,
            "ICS import finished"
        );

        Ok(ImportedCalendar {
            schedule_id,
            name,
            term_name,
            semester_start,
            courses,
            warnings,
        })
    }

    fn parse_event(
        &self,
        index: usize,
        event: &IcalEvent,
        table: &TimeSlotTable,
        config: &WeekConfig,
        warnings: &mut Vec<WarningKind>,
    ) -> std::result::Result<ParsedEvent, WarningKind> {
        let start = event_datetime(event, "DTSTART")?;
        let end = event_datetime(event, "DTEND")?;

        if end <= start {
            return Err(WarningKind::ZeroLength);
        }
        if end.date() != start.date() {
            return Err(WarningKind::MultiDay);
        }

        let time_slot = match table.slot_for_time(start.time(), config) {
            Some(slot) => slot,
            None if self.options.best_effort => {
                let slot = table
                    .nearest_slot(start.time(), config)
                    .ok_or(WarningKind::NoMatchingSlot(start.time()))?;
                warnings.push(WarningKind::SnappedToNearestSlot {
                    time: start.time(),
                    slot,
                });
                slot
            }
            None => return Err(WarningKind::NoMatchingSlot(start.time())),
        };

        let duration = match table.span_ending_at(time_slot, end.time(), config) {
            Some(span) => {
                if !span.exact {
                    warnings.push(WarningKind::RoundedDuration {
                        end: end.time(),
                        duration: span.duration,
                    });
                }
                span.duration
            }
            None if self.options.best_effort => {
                warnings.push(WarningKind::ExceedsTable(end.time()));
                table.max_slot() - time_slot + 1
            }
            None => return Err(WarningKind::ExceedsTable(end.time())),
        };

        let mut dates = match event_property(event, "RRULE") {
            Some(rule) => {
                let rule = parse_weekly_rule(rule)?;
                self.expand_rule(&rule, start.date(), warnings)
            }
            None => vec![start.date()],
        };

        let exceptions = exception_dates(event)?;
        dates.retain(|date| !exceptions.contains(date));

        let (instructor, exam) = event_property(event, "DESCRIPTION")
            .map(|value| parse_description(&unescape_text(value)))
            .unwrap_or_default();

        Ok(ParsedEvent {
            index,
            summary: event_property(event, "SUMMARY")
                .map(unescape_text)
                .unwrap_or_default(),
            location: event_property(event, "LOCATION")
                .map(unescape_text)
                .unwrap_or_default(),
            instructor,
            color: event_property(event, "COLOR")
                .map(unescape_text)
                .filter(|color| !color.is_empty()),
            exam,
            time_slot,
            duration,
            dates,
        })
    }

    /// 展开周重复规则，第一个实例不早于 `start`
    fn expand_rule(
        &self,
        rule: &WeeklyRule,
        start: NaiveDate,
        warnings: &mut Vec<WarningKind>,
    ) -> Vec<NaiveDate> {
        let mut by_day = if rule.by_day.is_empty() {
            vec![iso_day(start)]
        } else {
            rule.by_day.clone()
        };
        by_day.sort_unstable();
        by_day.dedup();

        let horizon = if rule.count.is_some() {
            MAX_COUNTED_WEEKS
        } else {
            self.options.max_horizon_weeks
        };
        // WKST 默认为周一
        let first_monday = start - Duration::days(i64::from(iso_day(start) - 1));

        let mut dates = Vec::new();
        let mut offset = 0;
        while offset < horizon {
            let week_begin = first_monday + Duration::weeks(i64::from(offset));
            for &day in &by_day {
                let date = week_begin + Duration::days(i64::from(day - 1));
                if date < start {
                    continue;
                }
                if rule.until.is_some_and(|until| date > until) {
                    return dates;
                }
                dates.push(date);
                if rule.count.is_some_and(|count| dates.len() >= count as usize) {
                    return dates;
                }
            }
            offset += rule.interval;
        }

        // 走到上限时，只要下一个实例仍在 UNTIL 之内就算截断
        let next = first_monday
            + Duration::weeks(i64::from(offset))
            + Duration::days(i64::from(by_day[0] - 1));
        if rule.until.is_none_or(|until| next <= until) {
            warnings.push(WarningKind::RuleTruncated(horizon));
        }
        dates
    }
}

/// 按 `(SUMMARY, LOCATION, 星期, 节次)` 合并事件并换算周次
fn fold_courses(
    parsed: Vec<ParsedEvent>,
    schedule_id: Uuid,
    table: &TimeSlotTable,
    config: &WeekConfig,
    warnings: &mut Vec<ImportWarning>,
) -> Vec<Course> {
    let mut order: Vec<(String, String, u32, u32)> = Vec::new();
    let mut groups: HashMap<(String, String, u32, u32), CourseAccumulator> = HashMap::new();

    for event in parsed {
        for &date in &event.dates {
            let week = match u32::try_from(WeekCalculator::week_number(date, config)) {
                Ok(week) if week > 0 => week,
                _ => {
                    warnings.push(ImportWarning {
                        event: event.index,
                        summary: Some(event.summary.clone()),
                        kind: WarningKind::BeforeTermStart(date),
                    });
                    continue;
                }
            };

            let day_of_week = iso_day(date);
            let key = (
                event.summary.clone(),
                event.location.clone(),
                day_of_week,
                event.time_slot,
            );
            let entry = groups.entry(key.clone()).or_insert_with(|| {
                order.push(key);
                CourseAccumulator {
                    event: event.index,
                    summary: event.summary.clone(),
                    location: event.location.clone(),
                    instructor: event.instructor.clone(),
                    color: event.color.clone(),
                    exam: event.exam,
                    day_of_week,
                    time_slot: event.time_slot,
                    duration: event.duration,
                    weeks: BTreeSet::new(),
                    conflicts: BTreeSet::new(),
                }
            });
            if entry.duration != event.duration && entry.conflicts.insert(event.index) {
                warnings.push(ImportWarning {
                    event: event.index,
                    summary: Some(event.summary.clone()),
                    kind: WarningKind::ConflictingDuration {
                        kept: entry.duration,
                        found: event.duration,
                    },
                });
            }
            entry.weeks.insert(week);
        }
    }

    let mut courses = Vec::with_capacity(order.len());
    for key in order {
        let Some(acc) = groups.remove(&key) else {
            continue;
        };
        let course_key = format!("{}\u{1f}{}\u{1f}{}\u{1f}{}", key.0, key.1, key.2, key.3);
        let fields = NewCourse {
            id: Uuid::new_v5(&schedule_id, course_key.as_bytes()),
            schedule_id,
            name: acc.summary,
            instructor: acc.instructor,
            location: acc.location,
            weeks: acc.weeks,
            day_of_week: acc.day_of_week,
            time_slot: acc.time_slot,
            duration: acc.duration,
            color: acc.color,
            exam: acc.exam,
        };
        let summary = fields.name.clone();
        match Course::new(fields, table) {
            Ok(course) => courses.push(course),
            Err(err) => warnings.push(ImportWarning {
                event: acc.event,
                summary: Some(summary),
                kind: WarningKind::InvalidCourse(err.to_string()),
            }),
        }
    }
    courses
}

fn parse_weekly_rule(value: &str) -> std::result::Result<WeeklyRule, WarningKind> {
    let unsupported = || WarningKind::UnsupportedRule(value.to_string());

    let mut frequency = None;
    let mut rule = WeeklyRule {
        interval: 1,
        count: None,
        until: None,
        by_day: Vec::new(),
    };

    for part in value.split(';').filter(|part| !part.is_empty()) {
        let (key, val) = part.split_once('=').ok_or_else(unsupported)?;
        match key.to_ascii_uppercase().as_str() {
            "FREQ" => frequency = Some(val.to_ascii_uppercase()),
            "INTERVAL" => {
                rule.interval = val
                    .parse()
                    .ok()
                    .filter(|&n: &u32| n > 0)
                    .ok_or_else(unsupported)?;
            }
            "COUNT" => rule.count = Some(val.parse().map_err(|_| unsupported())?),
            "UNTIL" => rule.until = Some(parse_date(val).map_err(|_| unsupported())?),
            "BYDAY" => {
                rule.by_day = val
                    .split(',')
                    .map(day_from_code)
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(unsupported)?;
            }
            "WKST" => {}
            _ => return Err(unsupported()),
        }
    }

    match frequency.as_deref() {
        Some("WEEKLY") => Ok(rule),
        _ => Err(unsupported()),
    }
}

/// 从描述中恢复教师与考试时间
fn parse_description(description: &str) -> (String, ExamTime) {
    let mut instructor = String::new();
    let mut exam = ExamTime::Unscheduled;
    for line in description.lines() {
        if let Some(name) = line.strip_prefix(INSTRUCTOR_PREFIX) {
            instructor = name.trim().to_string();
        } else if let Some(time) = line.strip_prefix(EXAM_PREFIX) {
            if let Ok(time) = NaiveDateTime::parse_from_str(time.trim(), EXAM_FORMAT) {
                exam = ExamTime::Scheduled(time);
            }
        }
    }
    (instructor, exam)
}

fn exception_dates(event: &IcalEvent) -> std::result::Result<BTreeSet<NaiveDate>, WarningKind> {
    let mut dates = BTreeSet::new();
    for prop in event
        .properties
        .iter()
        .filter(|prop| prop.name.eq_ignore_ascii_case("EXDATE"))
    {
        let Some(value) = prop.value.as_deref() else {
            continue;
        };
        for item in value.split(',') {
            let date = parse_date(item).map_err(|_| WarningKind::InvalidDate {
                property: "EXDATE",
                value: item.to_string(),
            })?;
            dates.insert(date);
        }
    }
    Ok(dates)
}

fn event_datetime(
    event: &IcalEvent,
    name: &'static str,
) -> std::result::Result<NaiveDateTime, WarningKind> {
    let raw = event_property(event, name).ok_or(WarningKind::MissingProperty(name))?;
    if is_date_only(raw) {
        return Err(WarningKind::AllDay);
    }
    parse_datetime(raw).map_err(|_| WarningKind::InvalidDate {
        property: name,
        value: raw.to_string(),
    })
}

fn event_property<'a>(event: &'a IcalEvent, name: &str) -> Option<&'a str> {
    find_property(&event.properties, name)
}

fn find_property<'a>(properties: &'a [Property], name: &str) -> Option<&'a str> {
    properties
        .iter()
        .find(|prop| prop.name.eq_ignore_ascii_case(name))
        .and_then(|prop| prop.value.as_deref())
}
