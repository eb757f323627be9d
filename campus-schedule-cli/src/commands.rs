use std::{fs, path::PathBuf, sync::Arc};

use anyhow::{Context, Result, anyhow};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use clap::Args;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use campus_schedule_core::{demo, prelude::*};

use crate::store::FileStore;

const SETTINGS_KEY: &str = "settings";

/// 周配置与节次表参数，未指定的字段沿用上次保存的设置
#[derive(Debug, Clone, Default, Args)]
pub struct ConfigArgs {
    /// 学期开始日期，即第1周第1天（格式：YYYY-MM-DD，如 2025-02-24）
    #[arg(short = 's', long, global = true)]
    pub semester_start: Option<NaiveDate>,

    /// 显示周起始日 (mon, sun)
    #[arg(long, global = true)]
    pub week_start: Option<WeekStart>,

    /// 时间轴开始时刻
    #[arg(long, global = true)]
    pub start_hour: Option<u32>,

    /// 时间轴结束时刻（不晚于23）
    #[arg(long, global = true)]
    pub end_hour: Option<u32>,

    /// 时间轴显示模式 (standard, class-time)
    #[arg(long, global = true)]
    pub display_mode: Option<TimelineDisplayMode>,

    /// 把时间轴均分为N节；0 表示恢复11节标准作息
    #[arg(long, global = true)]
    pub periods: Option<u32>,
}

impl ConfigArgs {
    fn has_overrides(&self) -> bool {
        self.semester_start.is_some()
            || self.week_start.is_some()
            || self.start_hour.is_some()
            || self.end_hour.is_some()
            || self.display_mode.is_some()
            || self.periods.is_some()
    }
}

/// 保存在存储中的设置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub week: WeekConfig,
    pub table: TimeSlotTable,
}

/// 一次命令执行所需的存储与设置
pub struct Session {
    repo: ScheduleRepository<FileStore>,
    args: ConfigArgs,
    saved: Option<Settings>,
    clock: Arc<dyn Clock>,
}

impl Session {
    pub async fn open(store: FileStore, args: ConfigArgs, clock: Arc<dyn Clock>) -> Result<Self> {
        tracing::debug!(dir = %store.dir().display(), "opening store");
        let saved = store.get::<Settings>(SETTINGS_KEY).await?;
        Ok(Self {
            repo: ScheduleRepository::new(store),
            args,
            saved,
            clock,
        })
    }

    /// 合并保存的设置与命令行参数
    ///
    /// 没有任何来源提供学期开始日期时使用 `fallback_start`；两者都没有则报错。
    async fn settings(&self, fallback_start: Option<NaiveDate>) -> Result<Settings> {
        let saved_week = self.saved.as_ref().map(|s| s.week);
        let semester_start = self
            .args
            .semester_start
            .or(saved_week.map(|w| w.semester_start_date))
            .or(fallback_start)
            .ok_or_else(|| anyhow!("未设置学期开始日期，请使用 --semester-start 指定"))?;

        let mut week = saved_week.unwrap_or_else(|| WeekConfig::new(semester_start));
        week.semester_start_date = semester_start;
        if let Some(week_start) = self.args.week_start {
            week.week_start_day = week_start;
        }
        if let Some(hour) = self.args.start_hour {
            week.calendar_start_hour = hour;
        }
        if let Some(hour) = self.args.end_hour {
            week.calendar_end_hour = hour;
        }
        if let Some(mode) = self.args.display_mode {
            week.timeline_display_mode = mode;
        }
        week.validate()?;

        let table = match self.args.periods {
            Some(0) => TimeSlotTable::campus_default(),
            Some(periods) => TimeSlotTable::uniform(periods)?,
            None => self
                .saved
                .as_ref()
                .map(|s| s.table.clone())
                .unwrap_or_default(),
        };
        // 均分节次表要求每节至少一秒
        table.periods(&week)?;

        let settings = Settings { week, table };
        if self.args.has_overrides() || self.saved.is_none() {
            self.save_settings(&settings).await?;
        }
        Ok(settings)
    }

    async fn save_settings(&self, settings: &Settings) -> Result<()> {
        self.repo.store().put(SETTINGS_KEY, settings).await?;
        tracing::debug!(
            semester_start = %settings.week.semester_start_date,
            max_slot = settings.table.max_slot(),
            "saved settings"
        );
        Ok(())
    }

    /// 读取指定课表，未指定时读取激活课表
    async fn load(&self, id: Option<Uuid>) -> Result<(Schedule, Vec<Course>)> {
        let id = match id {
            Some(id) => id,
            None => self
                .repo
                .active()
                .await?
                .map(|schedule| schedule.id)
                .ok_or_else(|| anyhow!("没有激活的课表，请先导入课表或使用 activate 命令"))?,
        };
        Ok(self.repo.load(id).await?)
    }

    /// 保存课表；重新导入已有课表时保留原来的创建时间和激活状态
    async fn store_schedule(&self, mut schedule: Schedule, courses: &[Course], activate: bool) -> Result<Schedule> {
        if let Ok(existing) = self.repo.schedule(schedule.id).await {
            schedule.created_at = existing.created_at;
            schedule.is_active = existing.is_active;
        }
        if activate || self.repo.active().await?.is_none() {
            schedule.is_active = true;
        }
        self.repo.save(&schedule, courses).await?;
        Ok(schedule)
    }
}

/// 导入命令参数
pub struct ImportParams {
    pub file: PathBuf,
    pub best_effort: bool,
    pub infer_start: bool,
    pub activate: bool,
}

/// 从ICS文件导入课表
pub async fn import_command(session: &Session, params: ImportParams) -> Result<()> {
    let text = fs::read_to_string(&params.file)
        .with_context(|| format!("读取文件失败: {}", params.file.display()))?;

    let fallback = params.infer_start.then(|| session.clock.today());
    let settings = session.settings(fallback).await?;

    tracing::info!(
        "开始导入: 文件={}, 学期开始={}",
        params.file.display(),
        settings.week.semester_start_date
    );

    let codec = IcsCodec::new(IcsOptions {
        best_effort: params.best_effort,
        infer_semester_start: params.infer_start,
        ..IcsOptions::default()
    });
    let imported = codec.import(&text, &settings.table, &settings.week)?;

    if !imported.warnings.is_empty() {
        println!("导入时有 {} 条警告:", imported.warnings.len());
        for warning in &imported.warnings {
            println!("  ⚠ {}", warning);
        }
    }

    let mut schedule = imported.schedule(session.clock.as_ref());
    if schedule.name.is_empty() {
        schedule.name = params
            .file
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "导入的课表".to_string());
    }
    let schedule = session
        .store_schedule(schedule, &imported.courses, params.activate)
        .await?;

    if imported.semester_start != settings.week.semester_start_date {
        println!("推断学期开始日期: {}", imported.semester_start);
        session
            .save_settings(&Settings {
                week: WeekConfig {
                    semester_start_date: imported.semester_start,
                    ..settings.week
                },
                table: settings.table,
            })
            .await?;
    }

    println!(
        "✓ 成功导入 {} 门课程到课表 {} ({})",
        imported.courses.len(),
        schedule.name,
        schedule.id
    );
    if schedule.is_active {
        println!("✓ 当前激活课表: {}", schedule.name);
    }

    Ok(())
}

/// 导出命令参数
pub struct ExportParams {
    pub schedule: Option<Uuid>,
    pub output: Option<PathBuf>,
    pub reminder_minutes: Option<u32>,
    pub include_description: bool,
}

/// 导出课表为ICS文件
pub async fn export_command(session: &Session, params: ExportParams) -> Result<()> {
    let settings = session.settings(None).await?;
    let (schedule, courses) = session.load(params.schedule).await?;

    tracing::info!(
        "开始导出: 课表={}, 课程数={}",
        schedule.name,
        courses.len()
    );

    let codec = IcsCodec::new(IcsOptions {
        include_description: params.include_description,
        reminder_minutes: params.reminder_minutes,
        ..IcsOptions::default()
    });
    let ics_content = codec.export(&schedule, &courses, &settings.table, &settings.week)?;

    let output_file = params
        .output
        .unwrap_or_else(|| PathBuf::from(format!("campus-schedule-{}.ics", schedule.id)));
    if output_file.as_os_str() == "-" {
        print!("{}", ics_content);
        return Ok(());
    }

    fs::write(&output_file, ics_content)?;
    println!("✓ ICS文件已保存到: {}", output_file.display());

    Ok(())
}

/// 列出课表
pub async fn list_command(session: &Session) -> Result<()> {
    let schedules = session.repo.list().await?;

    if schedules.is_empty() {
        println!("暂无课表，可以使用 import 或 demo 命令创建");
        return Ok(());
    }

    println!("课表列表:");
    for schedule in schedules {
        let courses = session.repo.courses(schedule.id).await?;
        let marker = if schedule.is_active { "*" } else { " " };
        println!(
            "{} {}  {} ({})  {} 门课程  创建于 {}",
            marker,
            schedule.id,
            schedule.name,
            schedule.term_name,
            courses.len(),
            schedule.created_at.format("%Y-%m-%d %H:%M")
        );
    }

    Ok(())
}

/// 激活课表
pub async fn activate_command(session: &Session, id: Uuid) -> Result<()> {
    let schedule = session.repo.activate(id).await?;
    println!("✓ 已激活课表: {} ({})", schedule.name, schedule.id);
    Ok(())
}

/// 删除课表及其课程
pub async fn delete_command(session: &Session, id: Uuid) -> Result<()> {
    let schedule = session.repo.delete(id).await?;
    println!("✓ 已删除课表: {} ({})", schedule.name, schedule.id);
    if schedule.is_active {
        println!("当前没有激活的课表");
    }
    Ok(())
}

/// 显示某一天的课程
pub async fn day_command(session: &Session, date: Option<NaiveDate>, schedule: Option<Uuid>) -> Result<()> {
    let Settings { week: config, table } = session.settings(None).await?;
    let (_, courses) = session.load(schedule).await?;

    let now = session.clock.now();
    let date = date.unwrap_or(now.date());
    let week = WeekCalculator::week_number(date, &config);
    println!("{} {} 第{}周", date, weekday_label(date), week);

    let occurrences = RecurrenceExpander::occurrences(date, &courses, &table, &config)?;
    let blocks = OverlapLayout::layout(&occurrences);
    let now = (date == now.date() && config.timeline_display_mode.shows_current_time_line())
        .then_some(now);
    for line in day_lines(&blocks, now) {
        println!("  {}", line);
    }

    Ok(())
}

/// 一天的课程行；`now` 不为空时在对应位置插入当前时间线
fn day_lines(blocks: &[PositionedBlock<'_>], now: Option<NaiveDateTime>) -> Vec<String> {
    if blocks.is_empty() {
        return vec!["没有课".to_string()];
    }

    let mut lines = Vec::with_capacity(blocks.len() + 1);
    let mut now_line = now;
    for block in blocks {
        if let Some(now) = now_line.filter(|now| block.occurrence.start > *now) {
            lines.push(format!("── 现在 {} ──", now.format("%H:%M")));
            now_line = None;
        }
        lines.push(block.to_string());
    }
    if let Some(now) = now_line {
        lines.push(format!("── 现在 {} ──", now.format("%H:%M")));
    }
    lines
}

/// 显示一周的课程
pub async fn week_command(
    session: &Session,
    date: Option<NaiveDate>,
    schedule: Option<Uuid>,
    json: bool,
) -> Result<()> {
    let Settings { week: config, table } = session.settings(None).await?;
    let (schedule, courses) = session.load(schedule).await?;

    let date = date.unwrap_or_else(|| session.clock.today());
    let occurrences = RecurrenceExpander::occurrences_for_week(date, &courses, &table, &config)?;
    let blocks = OverlapLayout::layout_week(&occurrences);

    if json {
        println!("{}", serde_json::to_string_pretty(&blocks)?);
        return Ok(());
    }

    let dates = WeekCalculator::week_dates(date, &config);
    println!(
        "{} 第{}周 ({} ~ {})",
        schedule.name,
        WeekCalculator::week_number(date, &config),
        dates[0],
        dates[6]
    );
    for day in dates {
        println!("{} {}", day, weekday_label(day));
        let mut any = false;
        for block in blocks.iter().filter(|b| b.occurrence.date == day) {
            println!("  {}", block);
            any = true;
        }
        if !any {
            println!("  -");
        }
    }

    Ok(())
}

/// 列出接下来的上课提醒
pub async fn remind_command(
    session: &Session,
    lead_minutes: u32,
    days: u32,
    schedule: Option<Uuid>,
    json: bool,
) -> Result<()> {
    let Settings { week: config, table } = session.settings(None).await?;
    let (_, courses) = session.load(schedule).await?;

    let planner = ReminderPlanner::new(lead_minutes);
    let requests = planner.upcoming(&courses, &table, &config, session.clock.as_ref(), days)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&requests)?);
        return Ok(());
    }

    if requests.is_empty() {
        println!("接下来 {} 天没有需要提醒的课程", days);
        return Ok(());
    }
    for request in requests {
        if request.body.is_empty() {
            println!("{}  {}", request.fire_date.format("%m-%d %H:%M"), request.title);
        } else {
            println!(
                "{}  {} @ {}",
                request.fire_date.format("%m-%d %H:%M"),
                request.title,
                request.body
            );
        }
    }

    Ok(())
}

/// 写入演示课表并激活
pub async fn demo_command(session: &Session) -> Result<()> {
    let today = session.clock.today();
    // 未设置学期开始日期时，以本周一为第1周
    let this_monday = today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
    let settings = session.settings(Some(this_monday)).await?;

    let (schedule, courses) = demo::demo_schedule(session.clock.as_ref(), &settings.table)
        .map_err(|e| anyhow!("当前节次表无法容纳演示课表: {}", e))?;
    let schedule = session.store_schedule(schedule, &courses, true).await?;

    println!(
        "✓ 已创建演示课表: {} ({})，共 {} 门课程",
        schedule.name,
        schedule.id,
        courses.len()
    );
    println!("学期开始日期: {}", settings.week.semester_start_date);

    Ok(())
}

fn weekday_label(date: NaiveDate) -> &'static str {
    match date.weekday().number_from_monday() {
        1 => "周一",
        2 => "周二",
        3 => "周三",
        4 => "周四",
        5 => "周五",
        6 => "周六",
        _ => "周日",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("campus-schedule-cli-{}-{}", name, Uuid::new_v4()))
    }

    fn fixed_clock() -> Arc<dyn Clock> {
        Arc::new(FixedClock(
            NaiveDate::from_ymd_opt(2025, 3, 5)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
        ))
    }

    async fn open(dir: &std::path::Path, args: ConfigArgs) -> Session {
        Session::open(FileStore::new(dir.to_path_buf()).unwrap(), args, fixed_clock())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn settings_require_semester_start() {
        let dir = session_dir("settings");
        let session = open(&dir, ConfigArgs::default()).await;
        assert!(session.settings(None).await.is_err());

        let start = NaiveDate::from_ymd_opt(2025, 2, 24).unwrap();
        let settings = session.settings(Some(start)).await.unwrap();
        assert_eq!(settings.week.semester_start_date, start);
        assert_eq!(settings.table, TimeSlotTable::campus_default());

        // 重新打开后沿用保存的设置，参数只覆盖指定的字段
        let args = ConfigArgs {
            end_hour: Some(21),
            periods: Some(13),
            ..ConfigArgs::default()
        };
        let session = open(&dir, args).await;
        let settings = session.settings(None).await.unwrap();
        assert_eq!(settings.week.semester_start_date, start);
        assert_eq!(settings.week.calendar_end_hour, 21);
        assert_eq!(settings.table.max_slot(), 13);

        let _ = fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn invalid_hours_are_rejected() {
        let dir = session_dir("hours");
        let args = ConfigArgs {
            semester_start: NaiveDate::from_ymd_opt(2025, 2, 24),
            start_hour: Some(20),
            end_hour: Some(8),
            ..ConfigArgs::default()
        };
        let session = open(&dir, args).await;
        assert!(session.settings(None).await.is_err());

        let _ = fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn reimport_keeps_activation() {
        let dir = session_dir("reimport");
        let session = open(&dir, ConfigArgs::default()).await;
        let clock = FixedClock(
            NaiveDate::from_ymd_opt(2025, 2, 20)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
        );

        let first = session
            .store_schedule(Schedule::new("A", "T", &clock), &[], false)
            .await
            .unwrap();
        assert!(first.is_active, "第一个课表自动激活");

        let second = session
            .store_schedule(Schedule::new("B", "T", &clock), &[], false)
            .await
            .unwrap();
        assert!(!second.is_active);

        let again = session
            .store_schedule(first.clone(), &[], false)
            .await
            .unwrap();
        assert!(again.is_active);
        assert_eq!(again.created_at, first.created_at);

        let _ = fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn demo_uses_the_session_clock() {
        let dir = session_dir("demo");
        let session = open(&dir, ConfigArgs::default()).await;
        demo_command(&session).await.unwrap();

        let session = open(&dir, ConfigArgs::default()).await;
        // 2025-03-05 是周三，第1周从该周周一开始
        let settings = session.settings(None).await.unwrap();
        assert_eq!(
            settings.week.semester_start_date,
            NaiveDate::from_ymd_opt(2025, 3, 3).unwrap()
        );
        let (schedule, courses) = session.load(None).await.unwrap();
        assert_eq!(schedule.created_at, session.clock.now());
        assert!(!courses.is_empty());

        remind_command(&session, 15, 7, None, true).await.unwrap();
        day_command(&session, None, None).await.unwrap();

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn day_lines_place_current_time_marker() {
        let clock = fixed_clock();
        let table = TimeSlotTable::campus_default();
        let config = WeekConfig::new(NaiveDate::from_ymd_opt(2025, 3, 3).unwrap());
        let (_, courses) = demo::demo_schedule(clock.as_ref(), &table).unwrap();
        let today = clock.today();
        let occurrences = RecurrenceExpander::occurrences(today, &courses, &table, &config).unwrap();
        let blocks = OverlapLayout::layout(&occurrences);
        assert!(!blocks.is_empty());

        let lines = day_lines(&blocks, Some(clock.now()));
        assert_eq!(lines.len(), blocks.len() + 1);
        let marker = lines.iter().position(|l| l == "── 现在 09:00 ──").unwrap();
        let later = blocks
            .iter()
            .position(|b| b.occurrence.start > clock.now())
            .unwrap_or(blocks.len());
        assert_eq!(marker, later);

        assert_eq!(day_lines(&blocks, None).len(), blocks.len());
        assert_eq!(day_lines(&[], Some(clock.now())), vec!["没有课".to_string()]);
    }
}
