use chrono::NaiveDateTime;

use crate::{Occurrence, PositionedBlock};

/// 重叠课程的分列布局
pub struct OverlapLayout;

impl OverlapLayout {
    /// 为同一天的上课分配显示列
    ///
    /// 按 `(开始, 结束, 课程id)` 排序后贪心地复用编号最小的空闲列。相互重叠
    /// 的一簇共享同一个 `total_columns`，等于簇内最多同时进行的课程数。
    pub fn layout<'a>(occurrences: &[Occurrence<'a>]) -> Vec<PositionedBlock<'a>> {
        let mut sorted = occurrences.to_vec();
        sorted.sort_by_key(|occ| (occ.start, occ.end, occ.course.id));

        let mut column_ends: Vec<NaiveDateTime> = Vec::new();
        let mut blocks: Vec<PositionedBlock<'a>> = Vec::with_capacity(sorted.len());
        let mut cluster_begin = 0;
        let mut cluster_end: Option<NaiveDateTime> = None;
        let mut cluster_width = 0;

        for occ in sorted {
            if cluster_end.is_some_and(|end| occ.start >= end) {
                close_cluster(&mut blocks[cluster_begin..], cluster_width);
                cluster_begin = blocks.len();
                cluster_end = None;
                cluster_width = 0;
            }

            let column = match column_ends.iter().position(|&end| end <= occ.start) {
                Some(idx) => {
                    column_ends[idx] = occ.end;
                    idx
                }
                None => {
                    column_ends.push(occ.end);
                    column_ends.len() - 1
                }
            };

            cluster_width = cluster_width.max(column + 1);
            cluster_end = Some(cluster_end.map_or(occ.end, |end| end.max(occ.end)));
            blocks.push(PositionedBlock {
                occurrence: occ,
                day_of_week: occ.course.day_of_week,
                column,
                total_columns: 0,
            });
        }
        close_cluster(&mut blocks[cluster_begin..], cluster_width);

        blocks
    }

    /// 对一周的上课逐日布局，结果按日期排列
    pub fn layout_week<'a>(occurrences: &[Occurrence<'a>]) -> Vec<PositionedBlock<'a>> {
        let mut by_date = occurrences.to_vec();
        by_date.sort_by_key(|occ| occ.date);
        by_date
            .chunk_by(|a, b| a.date == b.date)
            .flat_map(Self::layout)
            .collect()
    }
}

fn close_cluster(blocks: &mut [PositionedBlock<'_>], width: usize) {
    for block in blocks {
        block.total_columns = width;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Course, ExamTime, WeekConfig, recurrence::RecurrenceExpander, slots::TimeSlotTable};
    use chrono::{Duration, NaiveDate};
    use proptest::prelude::*;
    use uuid::Uuid;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 2, 24).unwrap()
    }

    fn course(id: u128, slot: u32, duration: u32) -> Course {
        Course {
            id: Uuid::from_u128(id),
            name: format!("course-{id}"),
            instructor: String::new(),
            location: String::new(),
            weeks: [1].into_iter().collect(),
            day_of_week: 1,
            time_slot: slot,
            duration,
            color: crate::DEFAULT_COURSE_COLOR.to_string(),
            schedule_id: Uuid::nil(),
            exam: ExamTime::Unscheduled,
        }
    }

    fn occurrence(course: &Course, start_min: i64, end_min: i64) -> Occurrence<'_> {
        let midnight = day().and_hms_opt(0, 0, 0).unwrap();
        Occurrence {
            course,
            date: day(),
            week: 1,
            start: midnight + Duration::minutes(start_min),
            end: midnight + Duration::minutes(end_min),
            scale: 1,
        }
    }

    fn placement(blocks: &[PositionedBlock<'_>], id: u128) -> (usize, usize) {
        let block = blocks
            .iter()
            .find(|b| b.occurrence.course.id == Uuid::from_u128(id))
            .unwrap();
        (block.column, block.total_columns)
    }

    #[test]
    fn overlapping_periods_share_width() {
        let table = TimeSlotTable::campus_default();
        let config = WeekConfig::new(day());
        let courses = vec![course(1, 1, 2), course(2, 2, 1), course(3, 5, 1)];
        let occurrences = RecurrenceExpander::occurrences(day(), &courses, &table, &config).unwrap();

        let blocks = OverlapLayout::layout(&occurrences);
        assert_eq!(placement(&blocks, 1), (0, 2));
        assert_eq!(placement(&blocks, 2), (1, 2));
        assert_eq!(placement(&blocks, 3), (0, 1));
        assert!(blocks.iter().all(|b| b.day_of_week == 1));
    }

    #[test]
    fn touching_endpoints_do_not_overlap() {
        let courses = vec![course(1, 1, 1), course(2, 2, 1)];
        let occurrences = vec![
            occurrence(&courses[0], 480, 525),
            occurrence(&courses[1], 525, 570),
        ];
        let blocks = OverlapLayout::layout(&occurrences);
        assert_eq!(placement(&blocks, 1), (0, 1));
        assert_eq!(placement(&blocks, 2), (0, 1));
    }

    #[test]
    fn freed_column_is_reused_inside_cluster() {
        let courses = vec![course(1, 1, 4), course(2, 1, 2), course(3, 3, 2)];
        let occurrences = vec![
            occurrence(&courses[0], 0, 240),
            occurrence(&courses[1], 0, 120),
            occurrence(&courses[2], 120, 240),
        ];
        let blocks = OverlapLayout::layout(&occurrences);
        assert_eq!(placement(&blocks, 1), (1, 2));
        assert_eq!(placement(&blocks, 2), (0, 2));
        assert_eq!(placement(&blocks, 3), (0, 2));
    }

    #[test]
    fn chained_overlaps_form_one_cluster() {
        let courses = vec![course(1, 1, 1), course(2, 1, 1), course(3, 1, 1), course(4, 1, 1)];
        let occurrences = vec![
            occurrence(&courses[0], 0, 180),
            occurrence(&courses[1], 120, 300),
            occurrence(&courses[2], 240, 360),
            occurrence(&courses[3], 400, 460),
        ];
        let blocks = OverlapLayout::layout(&occurrences);
        assert_eq!(placement(&blocks, 1), (0, 2));
        assert_eq!(placement(&blocks, 2), (1, 2));
        assert_eq!(placement(&blocks, 3), (0, 2));
        assert_eq!(placement(&blocks, 4), (0, 1));
    }

    #[test]
    fn week_layout_groups_by_date() {
        let courses = vec![course(1, 1, 2), course(2, 1, 2)];
        let mut second = occurrence(&courses[1], 480, 580);
        second.date = day() + Duration::days(1);
        second.start += Duration::days(1);
        second.end += Duration::days(1);
        let occurrences = vec![second, occurrence(&courses[0], 480, 580)];

        let blocks = OverlapLayout::layout_week(&occurrences);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].occurrence.date, day());
        assert!(blocks.iter().all(|b| b.column == 0 && b.total_columns == 1));
    }

    /// O(n²) 参考实现：连通分量内任一开始时刻同时进行的最大课程数
    fn brute_force_widths(occurrences: &[Occurrence<'_>]) -> Vec<usize> {
        let n = occurrences.len();
        let mut component: Vec<usize> = (0..n).collect();
        fn root(component: &mut [usize], mut i: usize) -> usize {
            while component[i] != i {
                i = component[i];
            }
            i
        }
        for i in 0..n {
            for j in 0..n {
                if i != j && occurrences[i].overlaps(&occurrences[j]) {
                    let (ri, rj) = (root(&mut component, i), root(&mut component, j));
                    component[ri] = rj;
                }
            }
        }
        let roots: Vec<usize> = (0..n).map(|i| root(&mut component, i)).collect();
        (0..n)
            .map(|i| {
                (0..n)
                    .filter(|&j| roots[j] == roots[i])
                    .map(|j| {
                        let point = occurrences[j].start;
                        (0..n)
                            .filter(|&k| roots[k] == roots[i])
                            .filter(|&k| occurrences[k].start <= point && point < occurrences[k].end)
                            .count()
                    })
                    .max()
                    .unwrap_or(1)
            })
            .collect()
    }

    proptest! {
        #[test]
        fn layout_matches_brute_force(intervals in prop::collection::vec((0i64..600, 1i64..180), 1..24)) {
            let courses: Vec<Course> = (0..intervals.len())
                .map(|i| course(i as u128, 1, 1))
                .collect();
            let occurrences: Vec<Occurrence<'_>> = intervals
                .iter()
                .zip(&courses)
                .map(|(&(start, len), course)| occurrence(course, start, start + len))
                .collect();

            let blocks = OverlapLayout::layout(&occurrences);
            prop_assert_eq!(blocks.len(), occurrences.len());

            for a in &blocks {
                for b in &blocks {
                    if a.occurrence.course.id != b.occurrence.course.id
                        && a.occurrence.overlaps(&b.occurrence)
                    {
                        prop_assert_ne!(a.column, b.column);
                    }
                }
                prop_assert!(a.column < a.total_columns);
            }

            let expected = brute_force_widths(&occurrences);
            for (occ, width) in occurrences.iter().zip(expected) {
                let block = blocks
                    .iter()
                    .find(|b| b.occurrence.course.id == occ.course.id)
                    .unwrap();
                prop_assert_eq!(block.total_columns, width);
            }
        }
    }
}
