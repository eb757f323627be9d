mod commands;
mod store;

use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use campus_schedule_core::clock::SystemClock;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use crate::{
    commands::{ConfigArgs, ExportParams, ImportParams, Session},
    store::FileStore,
};

#[derive(Parser)]
#[command(name = "campus-schedule")]
#[command(about = "校园课程表工具：导入导出ICS、查看每日和每周课程")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 启用详细日志
    #[arg(short, long, global = true)]
    verbose: bool,

    /// 数据目录，默认为系统缓存目录下的 campus-schedule
    #[arg(long, global = true)]
    store_dir: Option<PathBuf>,

    #[command(flatten)]
    config: ConfigArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// 从ICS文件导入课表
    Import {
        /// ICS文件路径
        file: PathBuf,

        /// 找不到匹配节次时取最近的节次
        #[arg(long)]
        best_effort: bool,

        /// 用文件中最早的一次上课推断学期开始日期
        #[arg(long)]
        infer_start: bool,

        /// 导入后激活该课表
        #[arg(long)]
        activate: bool,
    },

    /// 导出课表为ICS文件
    Export {
        /// 课表id，默认为激活课表
        #[arg(long)]
        schedule: Option<Uuid>,

        /// 输出文件路径，"-" 表示输出到标准输出
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// 提醒时间（分钟）
        #[arg(long)]
        reminder_minutes: Option<u32>,

        /// 不写入教师和考试信息
        #[arg(long)]
        no_description: bool,
    },

    /// 列出所有课表
    List,

    /// 激活课表
    Activate {
        /// 课表id
        id: Uuid,
    },

    /// 删除课表及其课程
    Delete {
        /// 课表id
        id: Uuid,
    },

    /// 显示某一天的课程
    Day {
        /// 日期（格式：YYYY-MM-DD），默认为今天
        date: Option<NaiveDate>,

        /// 课表id，默认为激活课表
        #[arg(long)]
        schedule: Option<Uuid>,
    },

    /// 显示一周的课程
    Week {
        /// 该周内任意一天，默认为今天
        date: Option<NaiveDate>,

        /// 课表id，默认为激活课表
        #[arg(long)]
        schedule: Option<Uuid>,

        /// 以JSON输出定位块
        #[arg(long)]
        json: bool,
    },

    /// 列出接下来的上课提醒
    Remind {
        /// 提前多少分钟提醒
        #[arg(long, default_value = "15")]
        lead_minutes: u32,

        /// 向后查看的天数
        #[arg(long, default_value = "7")]
        days: u32,

        /// 课表id，默认为激活课表
        #[arg(long)]
        schedule: Option<Uuid>,

        /// 以JSON输出提醒
        #[arg(long)]
        json: bool,
    },

    /// 创建并激活演示课表
    Demo,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 设置日志级别
    let log_level = if cli.verbose { "debug" } else { "info" };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("campus_schedule_cli={0},campus_schedule_core={0}", log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let store = match cli.store_dir {
        Some(dir) => FileStore::new(dir)?,
        None => FileStore::with_default_dir("campus-schedule")?,
    };
    let session = Session::open(store, cli.config, Arc::new(SystemClock)).await?;

    match cli.command {
        Commands::Import {
            file,
            best_effort,
            infer_start,
            activate,
        } => {
            commands::import_command(
                &session,
                ImportParams {
                    file,
                    best_effort,
                    infer_start,
                    activate,
                },
            )
            .await
        }

        Commands::Export {
            schedule,
            output,
            reminder_minutes,
            no_description,
        } => {
            commands::export_command(
                &session,
                ExportParams {
                    schedule,
                    output,
                    reminder_minutes,
                    include_description: !no_description,
                },
            )
            .await
        }

        Commands::List => commands::list_command(&session).await,

        Commands::Activate { id } => commands::activate_command(&session, id).await,

        Commands::Delete { id } => commands::delete_command(&session, id).await,

        Commands::Day { date, schedule } => commands::day_command(&session, date, schedule).await,

        Commands::Week {
            date,
            schedule,
            json,
        } => commands::week_command(&session, date, schedule, json).await,

        Commands::Remind {
            lead_minutes,
            days,
            schedule,
            json,
        } => commands::remind_command(&session, lead_minutes, days, schedule, json).await,

        Commands::Demo => commands::demo_command(&session).await,
    }
}
