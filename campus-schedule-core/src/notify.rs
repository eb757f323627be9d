use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::{
    Course, Occurrence, Result, WeekConfig, clock::Clock, recurrence::RecurrenceExpander,
    slots::TimeSlotTable,
};

/// 交给系统通知调度器的一条提醒
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRequest {
    /// `课程id:日期`，同一次上课重复生成时保持不变，方便调度器去重
    pub id: String,
    pub title: String,
    pub body: String,
    pub fire_date: NaiveDateTime,
}

/// 上课提醒计划
#[derive(Debug, Clone, Copy)]
pub struct ReminderPlanner {
    lead_time: Duration,
}

impl ReminderPlanner {
    pub fn new(lead_minutes: u32) -> Self {
        Self {
            lead_time: Duration::minutes(i64::from(lead_minutes)),
        }
    }

    pub fn lead_time(&self) -> Duration {
        self.lead_time
    }

    pub fn request(&self, occurrence: &Occurrence<'_>) -> NotificationRequest {
        let course = occurrence.course;
        NotificationRequest {
            id: format!("{}:{}", course.id, occurrence.date.format("%Y%m%d")),
            title: course.name.clone(),
            body: course.location.clone(),
            fire_date: occurrence.start - self.lead_time,
        }
    }

    pub fn plan(&self, occurrences: &[Occurrence<'_>]) -> Vec<NotificationRequest> {
        occurrences.iter().map(|occ| self.request(occ)).collect()
    }

    /// 从今天起 `days` 天内尚未到提醒时间的上课
    ///
    /// 提醒时间已过但课程还没开始的不再生成，避免调度器立即弹出过期通知。
    pub fn upcoming(
        &self,
        courses: &[Course],
        table: &TimeSlotTable,
        config: &WeekConfig,
        clock: &dyn Clock,
        days: u32,
    ) -> Result<Vec<NotificationRequest>> {
        let now = clock.now();
        let from = now.date();
        let to = from + Duration::days(i64::from(days.saturating_sub(1)));

        let occurrences = RecurrenceExpander::occurrences_between(from, to, courses, table, config)?;
        let requests: Vec<NotificationRequest> = self
            .plan(&occurrences)
            .into_iter()
            .filter(|request| request.fire_date >= now)
            .collect();

        tracing::debug!(
            %from,
            %to,
            occurrences = occurrences.len(),
            reminders = requests.len(),
            "planned reminders"
        );
        Ok(requests)
    }
}

impl Default for ReminderPlanner {
    fn default() -> Self {
        Self::new(15)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ExamTime, NewCourse, clock::FixedClock};
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 2, 24).unwrap()
    }

    fn course(id: u128, day: u32, slot: u32) -> Course {
        Course::new(
            NewCourse {
                id: Uuid::from_u128(id),
                schedule_id: Uuid::nil(),
                name: format!("课程{id}"),
                instructor: String::new(),
                location: "2108".to_string(),
                weeks: (1..=4).collect(),
                day_of_week: day,
                time_slot: slot,
                duration: 2,
                color: None,
                exam: ExamTime::Unscheduled,
            },
            &TimeSlotTable::campus_default(),
        )
        .unwrap()
    }

    #[test]
    fn request_fires_before_start() {
        let courses = vec![course(1, 1, 1)];
        let table = TimeSlotTable::campus_default();
        let config = WeekConfig::new(start());
        let occurrences = RecurrenceExpander::occurrences(start(), &courses, &table, &config).unwrap();

        let request = ReminderPlanner::new(20).request(&occurrences[0]);
        assert_eq!(request.title, "课程1");
        assert_eq!(request.body, "2108");
        assert_eq!(request.fire_date, start().and_hms_opt(7, 40, 0).unwrap());
        assert_eq!(request.id, format!("{}:20250224", Uuid::from_u128(1)));
    }

    #[test]
    fn upcoming_skips_reminders_in_the_past() {
        let courses = vec![course(1, 1, 1), course(2, 1, 5), course(3, 2, 1)];
        let table = TimeSlotTable::campus_default();
        let config = WeekConfig::new(start());
        // 周一 10:00，上午的课提醒已过
        let clock = FixedClock(start().and_hms_opt(10, 0, 0).unwrap());

        let requests = ReminderPlanner::new(15)
            .upcoming(&courses, &table, &config, &clock, 2)
            .unwrap();
        let titles: Vec<&str> = requests.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, ["课程2", "课程3"]);
        assert_eq!(requests[0].fire_date, start().and_hms_opt(13, 45, 0).unwrap());
    }

    #[test]
    fn upcoming_before_term_is_empty() {
        let courses = vec![course(1, 1, 1)];
        let clock = FixedClock(NaiveDate::from_ymd_opt(2025, 2, 1).unwrap().and_hms_opt(8, 0, 0).unwrap());
        let requests = ReminderPlanner::default()
            .upcoming(&courses, &TimeSlotTable::campus_default(), &WeekConfig::new(start()), &clock, 7)
            .unwrap();
        assert!(requests.is_empty());
    }
}
