use chrono::{Datelike, Duration, NaiveDate};

use crate::{WeekConfig, clock::Clock};

/// 周次计算器
pub struct WeekCalculator;

impl WeekCalculator {
    /// 日期所在的学期周次
    ///
    /// 第1周为 `[semester_start_date, semester_start_date + 7天)`，与显示用的
    /// 周起始日无关；学期开始前的日期得到 `<= 0` 的周次，由调用方过滤。
    pub fn week_number(date: NaiveDate, config: &WeekConfig) -> i64 {
        let days = date
            .signed_duration_since(config.semester_start_date)
            .num_days();
        days.div_euclid(7) + 1
    }

    /// 根据注入的时钟计算当前周次
    pub fn current_week(clock: &dyn Clock, config: &WeekConfig) -> i64 {
        Self::week_number(clock.today(), config)
    }

    /// 日期所在显示周的第一天（按 `week_start_day`）
    pub fn week_start(date: NaiveDate, config: &WeekConfig) -> NaiveDate {
        let offset = match config.week_start_day.weekday() {
            chrono::Weekday::Sun => date.weekday().num_days_from_sunday(),
            _ => date.weekday().num_days_from_monday(),
        };
        date - Duration::days(i64::from(offset))
    }

    /// 日期所在显示周的七天
    pub fn week_dates(date: NaiveDate, config: &WeekConfig) -> [NaiveDate; 7] {
        let first = Self::week_start(date, config);
        std::array::from_fn(|idx| first + Duration::days(idx as i64))
    }

    /// 第 `week` 周星期 `day_of_week`（1=Monday）对应的日期
    pub fn date_for(week: u32, day_of_week: u32, config: &WeekConfig) -> Option<NaiveDate> {
        if week == 0 || !(1..=7).contains(&day_of_week) {
            return None;
        }
        let start = config.semester_start_date;
        let week_begin = start.checked_add_signed(Duration::weeks(i64::from(week) - 1))?;
        let offset = (day_of_week + 7 - iso_day(start)) % 7;
        week_begin.checked_add_signed(Duration::days(i64::from(offset)))
    }
}

/// 1=Monday ... 7=Sunday
pub fn iso_day(date: NaiveDate) -> u32 {
    date.weekday().number_from_monday()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{WeekStart, clock::FixedClock};
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn config(week_start_day: WeekStart) -> WeekConfig {
        WeekConfig {
            week_start_day,
            ..WeekConfig::new(date(2025, 2, 24))
        }
    }

    #[test]
    fn week_numbers_from_semester_start() {
        let cfg = config(WeekStart::Monday);
        assert_eq!(WeekCalculator::week_number(date(2025, 2, 24), &cfg), 1);
        assert_eq!(WeekCalculator::week_number(date(2025, 3, 11), &cfg), 3);
        assert_eq!(WeekCalculator::week_number(date(2025, 3, 18), &cfg), 4);
    }

    #[test]
    fn first_week_is_anchored_for_every_week_start() {
        for week_start in [WeekStart::Sunday, WeekStart::Monday] {
            let cfg = config(week_start);
            for offset in 0..7 {
                let day = cfg.semester_start_date + Duration::days(offset);
                assert_eq!(WeekCalculator::week_number(day, &cfg), 1, "{week_start:?} +{offset}");
            }
            let next = cfg.semester_start_date + Duration::days(7);
            assert_eq!(WeekCalculator::week_number(next, &cfg), 2);
        }
    }

    #[test]
    fn dates_before_term_are_not_positive() {
        let cfg = config(WeekStart::Monday);
        assert_eq!(WeekCalculator::week_number(date(2025, 2, 23), &cfg), 0);
        assert_eq!(WeekCalculator::week_number(date(2025, 2, 17), &cfg), 0);
        assert_eq!(WeekCalculator::week_number(date(2025, 2, 16), &cfg), -1);
    }

    #[test]
    fn display_week_follows_week_start_day() {
        let tuesday = date(2025, 3, 11);
        assert_eq!(
            WeekCalculator::week_start(tuesday, &config(WeekStart::Monday)),
            date(2025, 3, 10)
        );
        assert_eq!(
            WeekCalculator::week_start(tuesday, &config(WeekStart::Sunday)),
            date(2025, 3, 9)
        );

        let dates = WeekCalculator::week_dates(tuesday, &config(WeekStart::Sunday));
        assert_eq!(dates[0], date(2025, 3, 9));
        assert_eq!(dates[6], date(2025, 3, 15));
    }

    #[test]
    fn date_for_inverts_week_number() {
        let cfg = config(WeekStart::Monday);
        assert_eq!(WeekCalculator::date_for(3, 2, &cfg), Some(date(2025, 3, 11)));
        assert_eq!(WeekCalculator::date_for(1, 7, &cfg), Some(date(2025, 3, 2)));
        assert_eq!(WeekCalculator::date_for(0, 1, &cfg), None);
        assert_eq!(WeekCalculator::date_for(1, 8, &cfg), None);

        // 学期从周三开始时，第1周的周一在下一个自然周
        let mid_week = WeekConfig::new(date(2025, 2, 26));
        let monday = WeekCalculator::date_for(1, 1, &mid_week).unwrap();
        assert_eq!(monday, date(2025, 3, 3));
        assert_eq!(WeekCalculator::week_number(monday, &mid_week), 1);
    }

    #[test]
    fn current_week_uses_injected_clock() {
        let cfg = config(WeekStart::Monday);
        let clock = FixedClock(date(2025, 3, 12).and_hms_opt(9, 0, 0).unwrap());
        assert_eq!(WeekCalculator::current_week(&clock, &cfg), 3);
    }

    proptest! {
        #[test]
        fn week_number_is_monotonic(a in -400i64..400, b in -400i64..400, sunday in any::<bool>()) {
            let cfg = config(if sunday { WeekStart::Sunday } else { WeekStart::Monday });
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let d1 = cfg.semester_start_date + Duration::days(lo);
            let d2 = cfg.semester_start_date + Duration::days(hi);
            prop_assert!(WeekCalculator::week_number(d1, &cfg) <= WeekCalculator::week_number(d2, &cfg));
        }

        #[test]
        fn date_for_round_trips(week in 1u32..30, day in 1u32..=7, start_offset in 0i64..7) {
            let cfg = WeekConfig::new(date(2025, 2, 24) + Duration::days(start_offset));
            let resolved = WeekCalculator::date_for(week, day, &cfg).unwrap();
            prop_assert_eq!(WeekCalculator::week_number(resolved, &cfg), i64::from(week));
            prop_assert_eq!(iso_day(resolved), day);
        }
    }
}
