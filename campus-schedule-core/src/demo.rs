//! 演示数据
//!
//! 固定的一学期课表，id 由名称派生，重复生成的结果相同。

use std::collections::BTreeSet;

use uuid::Uuid;

use crate::{
    Course, ExamTime, NewCourse, Result, Schedule, clock::Clock, slots::TimeSlotTable,
};

pub const DEMO_SCHEDULE_NAME: &str = "示例课表";
pub const DEMO_TERM_NAME: &str = "2024-2025 春季";

struct DemoCourse {
    name: &'static str,
    instructor: &'static str,
    location: &'static str,
    weeks: &'static [u32],
    day_of_week: u32,
    time_slot: u32,
    duration: u32,
    color: &'static str,
}

const ALL_WEEKS: &[u32] = &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16];
const ODD_WEEKS: &[u32] = &[1, 3, 5, 7, 9, 11, 13, 15];

const DEMO_COURSES: &[DemoCourse] = &[
    DemoCourse {
        name: "高等数学",
        instructor: "王老师",
        location: "2108",
        weeks: ALL_WEEKS,
        day_of_week: 1,
        time_slot: 1,
        duration: 2,
        color: "#4A90D9",
    },
    DemoCourse {
        name: "大学英语",
        instructor: "李老师",
        location: "3201",
        weeks: ALL_WEEKS,
        day_of_week: 2,
        time_slot: 3,
        duration: 2,
        color: "#50B37A",
    },
    DemoCourse {
        name: "数据结构",
        instructor: "张老师",
        location: "4102",
        weeks: &[1, 2, 3, 5, 6, 7, 9, 10],
        day_of_week: 3,
        time_slot: 5,
        duration: 3,
        color: "#E67E22",
    },
    // 与数据结构部分重叠，周视图中分两列显示
    DemoCourse {
        name: "程序设计实验",
        instructor: "张老师",
        location: "综合实验楼 B305",
        weeks: ODD_WEEKS,
        day_of_week: 3,
        time_slot: 6,
        duration: 2,
        color: "#9B59B6",
    },
    DemoCourse {
        name: "形势与政策",
        instructor: "赵老师",
        location: "2402",
        weeks: &[4, 12],
        day_of_week: 4,
        time_slot: 9,
        duration: 2,
        color: "#C0392B",
    },
    DemoCourse {
        name: "体育",
        instructor: "陈老师",
        location: "风雨操场",
        weeks: ALL_WEEKS,
        day_of_week: 5,
        time_slot: 3,
        duration: 2,
        color: "#16A085",
    },
];

/// 演示课表的固定 id
pub fn demo_schedule_id() -> Uuid {
    Uuid::new_v5(
        &Uuid::NAMESPACE_OID,
        format!("{DEMO_SCHEDULE_NAME}\u{1f}{DEMO_TERM_NAME}").as_bytes(),
    )
}

/// 生成演示课表及其课程，课程节次按 `table` 校验
pub fn demo_schedule(clock: &dyn Clock, table: &TimeSlotTable) -> Result<(Schedule, Vec<Course>)> {
    let schedule = Schedule {
        id: demo_schedule_id(),
        ..Schedule::new(DEMO_SCHEDULE_NAME, DEMO_TERM_NAME, clock)
    };

    let courses = DEMO_COURSES
        .iter()
        .map(|demo| {
            Course::new(
                NewCourse {
                    id: Uuid::new_v5(&schedule.id, demo.name.as_bytes()),
                    schedule_id: schedule.id,
                    name: demo.name.to_string(),
                    instructor: demo.instructor.to_string(),
                    location: demo.location.to_string(),
                    weeks: demo.weeks.iter().copied().collect::<BTreeSet<u32>>(),
                    day_of_week: demo.day_of_week,
                    time_slot: demo.time_slot,
                    duration: demo.duration,
                    color: Some(demo.color.to_string()),
                    exam: ExamTime::Unscheduled,
                },
                table,
            )
        })
        .collect::<Result<Vec<_>>>()?;

    Ok((schedule, courses))
}
