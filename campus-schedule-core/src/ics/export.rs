use chrono::NaiveDateTime;
use uuid::Uuid;

use super::{
    EXAM_FORMAT, EXAM_PREFIX, EXAM_UNSCHEDULED, INSTRUCTOR_PREFIX, IcsCodec, PRODID, UID_DOMAIN,
    day_code, escape_text, format_datetime, push_folded,
};
use crate::{
    Course, Error, ExamTime, Result, Schedule, WeekConfig, slots::TimeSlotTable,
    week::WeekCalculator,
};

/// 一门课程的导出形式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EventForm {
    /// 单个 VEVENT + RRULE + EXDATE
    Recurring,
    /// 每周一个 VEVENT
    PerOccurrence,
}

impl EventForm {
    /// 周次覆盖了最小到最大周区间的一半及以上时使用 RRULE
    pub(crate) fn for_weeks(course: &Course) -> Self {
        let (Some(&first), Some(&last)) = (course.weeks.first(), course.weeks.last()) else {
            return Self::PerOccurrence;
        };
        let span = (last - first + 1) as usize;
        if course.weeks.len() * 2 >= span {
            Self::Recurring
        } else {
            Self::PerOccurrence
        }
    }
}

impl IcsCodec {
    /// 生成课表的 ICS 日历内容
    ///
    /// 同一课表、同一组课程多次导出的结果逐字节相同：UID 由课程和课表 id 派生，
    /// DTSTAMP 取课表的创建时间。
    pub fn export(
        &self,
        schedule: &Schedule,
        courses: &[Course],
        table: &TimeSlotTable,
        config: &WeekConfig,
    ) -> Result<String> {
        config.validate()?;

        let mut ics_content = String::new();

        // ICS文件头部
        push_folded(&mut ics_content, "BEGIN:VCALENDAR");
        push_folded(&mut ics_content, "VERSION:2.0");
        push_folded(&mut ics_content, &format!("PRODID:{PRODID}"));
        push_folded(&mut ics_content, "CALSCALE:GREGORIAN");
        push_folded(&mut ics_content, "METHOD:PUBLISH");
        push_folded(
            &mut ics_content,
            &format!("X-WR-CALNAME:{}", escape_text(&schedule.name)),
        );
        push_folded(
            &mut ics_content,
            &format!("X-WR-CALDESC:{}", escape_text(&schedule.term_name)),
        );

        for course in courses {
            course.validate(table)?;
            self.add_course_events(&mut ics_content, schedule, course, table, config)?;
        }

        push_folded(&mut ics_content, "END:VCALENDAR");

        Ok(ics_content)
    }

    fn add_course_events(
        &self,
        ics_content: &mut String,
        schedule: &Schedule,
        course: &Course,
        table: &TimeSlotTable,
        config: &WeekConfig,
    ) -> Result<()> {
        let form = EventForm::for_weeks(course);
        tracing::debug!(course = %course.name, weeks = course.weeks.len(), ?form, "exporting course");

        match form {
            EventForm::Recurring => {
                let (Some(&first), Some(&last)) = (course.weeks.first(), course.weeks.last())
                else {
                    return Ok(());
                };
                let uid = Uuid::new_v5(&schedule.id, course.id.as_bytes());
                let (start, end) = occurrence_times(course, first, table, config)?;

                let mut recurrence = Vec::new();
                let by_day = day_code(course.day_of_week)
                    .ok_or_else(|| Error::validation("day_of_week", "outside 1..=7"))?;
                recurrence.push(format!(
                    "RRULE:FREQ=WEEKLY;BYDAY={};COUNT={}",
                    by_day,
                    last - first + 1
                ));
                for week in first..=last {
                    if !course.weeks.contains(&week) {
                        let (exception_start, _) = occurrence_times(course, week, table, config)?;
                        recurrence.push(format!("EXDATE:{}", format_datetime(exception_start)));
                    }
                }

                self.add_event(ics_content, schedule, course, uid, start, end, &recurrence);
            }
            EventForm::PerOccurrence => {
                for &week in &course.weeks {
                    let uid = Uuid::new_v5(&schedule.id, format!("{}:{week}", course.id).as_bytes());
                    let (start, end) = occurrence_times(course, week, table, config)?;
                    self.add_event(ics_content, schedule, course, uid, start, end, &[]);
                }
            }
        }

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn add_event(
        &self,
        ics_content: &mut String,
        schedule: &Schedule,
        course: &Course,
        uid: Uuid,
        start: NaiveDateTime,
        end: NaiveDateTime,
        recurrence: &[String],
    ) {
        push_folded(ics_content, "BEGIN:VEVENT");
        push_folded(ics_content, &format!("UID:{uid}@{UID_DOMAIN}"));
        // 创建时间是本地时间，与 DTSTART 一样按浮动时间写出，不带 Z
        push_folded(
            ics_content,
            &format!("DTSTAMP:{}", format_datetime(schedule.created_at)),
        );
        push_folded(ics_content, &format!("DTSTART:{}", format_datetime(start)));
        push_folded(ics_content, &format!("DTEND:{}", format_datetime(end)));
        push_folded(
            ics_content,
            &format!("SUMMARY:{}", escape_text(&course.name)),
        );
        if !course.location.is_empty() {
            push_folded(
                ics_content,
                &format!("LOCATION:{}", escape_text(&course.location)),
            );
        }
        if self.options.include_description {
            push_folded(
                ics_content,
                &format!(
                    "DESCRIPTION:{}",
                    escape_text(&build_course_description(course))
                ),
            );
        }
        push_folded(ics_content, &format!("COLOR:{}", escape_text(&course.color)));

        for line in recurrence {
            push_folded(ics_content, line);
        }

        // 添加提醒
        if let Some(reminder_minutes) = self.options.reminder_minutes {
            push_folded(ics_content, "BEGIN:VALARM");
            push_folded(ics_content, "ACTION:DISPLAY");
            push_folded(
                ics_content,
                &format!("DESCRIPTION:{}", escape_text(&course.name)),
            );
            push_folded(ics_content, &format!("TRIGGER:-PT{reminder_minutes}M"));
            push_folded(ics_content, "END:VALARM");
        }

        push_folded(ics_content, "END:VEVENT");
    }
}

/// 构建课程描述：教师与考试时间
pub(crate) fn build_course_description(course: &Course) -> String {
    let exam = match course.exam {
        ExamTime::Scheduled(time) => time.format(EXAM_FORMAT).to_string(),
        ExamTime::Unscheduled => EXAM_UNSCHEDULED.to_string(),
    };
    format!(
        "{INSTRUCTOR_PREFIX}{}\n{EXAM_PREFIX}{exam}",
        course.instructor
    )
}

/// 第 `week` 周这门课的具体上下课时间
fn occurrence_times(
    course: &Course,
    week: u32,
    table: &TimeSlotTable,
    config: &WeekConfig,
) -> Result<(NaiveDateTime, NaiveDateTime)> {
    let date = WeekCalculator::date_for(week, course.day_of_week, config)
        .ok_or_else(|| Error::validation("weeks", format!("week {week} has no calendar date")))?;
    let range = table.time_range(course.time_slot, course.duration, config)?;
    Ok((date.and_time(range.start), date.and_time(range.end)))
}
