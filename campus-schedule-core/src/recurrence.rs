use chrono::{Duration, NaiveDate};

use crate::{
    Course, Occurrence, Result, WeekConfig,
    slots::TimeSlotTable,
    week::{WeekCalculator, iso_day},
};

/// 课程重复展开器
pub struct RecurrenceExpander;

impl RecurrenceExpander {
    /// 某一天实际上课的课程
    ///
    /// 结果按开始节次排序，同节次按课程 id 排序。学期开始前的日期返回空列表。
    pub fn occurrences<'a>(
        date: NaiveDate,
        courses: &'a [Course],
        table: &TimeSlotTable,
        config: &WeekConfig,
    ) -> Result<Vec<Occurrence<'a>>> {
        let week = WeekCalculator::week_number(date, config);
        let Ok(week_key) = u32::try_from(week) else {
            return Ok(Vec::new());
        };
        let day = iso_day(date);

        let mut active: Vec<&Course> = courses
            .iter()
            .filter(|course| course.day_of_week == day && course.weeks.contains(&week_key))
            .collect();
        active.sort_by_key(|course| (course.time_slot, course.id));

        active
            .into_iter()
            .map(|course| {
                let range = table.time_range(course.time_slot, course.duration, config)?;
                Ok(Occurrence {
                    course,
                    date,
                    week,
                    start: date.and_time(range.start),
                    end: date.and_time(range.end),
                    scale: range.scale,
                })
            })
            .collect()
    }

    /// 包含 `date` 的显示周内的全部上课，按日期再按节次排序
    pub fn occurrences_for_week<'a>(
        date: NaiveDate,
        courses: &'a [Course],
        table: &TimeSlotTable,
        config: &WeekConfig,
    ) -> Result<Vec<Occurrence<'a>>> {
        let mut all = Vec::new();
        for day in WeekCalculator::week_dates(date, config) {
            all.extend(Self::occurrences(day, courses, table, config)?);
        }
        Ok(all)
    }

    /// `[from, to]` 闭区间内的全部上课
    pub fn occurrences_between<'a>(
        from: NaiveDate,
        to: NaiveDate,
        courses: &'a [Course],
        table: &TimeSlotTable,
        config: &WeekConfig,
    ) -> Result<Vec<Occurrence<'a>>> {
        let mut all = Vec::new();
        let mut day = from;
        while day <= to {
            all.extend(Self::occurrences(day, courses, table, config)?);
            day += Duration::days(1);
        }
        Ok(all)
    }
}
