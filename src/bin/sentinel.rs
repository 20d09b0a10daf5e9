/// 数字卫兵 - 目标计数 (Digital Sentinel Counter)
///
/// 子命令:
/// 1. run:   回放检测结果 → 跟踪 → 计数 → 按天写入存储
/// 2. query: 读取按天计数 (全部/今日/按年月日汇总)
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use sentinel_counter::pipeline::JsonLinesAdapter;
use sentinel_counter::{
    gen_time_string, CountQuery, Counter, CounterConfig, DailyCountStore, PolicyKind,
    SystemControl,
};

/// 数字卫兵参数
#[derive(Parser, Debug)]
#[command(author, version, about = "数字卫兵 - 目标跟踪与按天计数", long_about = None)]
struct Args {
    /// 配置文件 (不存在时自动创建)
    #[arg(short, long, default_value = "counter.json")]
    config: PathBuf,

    /// 计数存储文件 (覆盖配置)
    #[arg(long)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 处理检测结果流
    Run {
        /// 检测结果 (JSON Lines, `-` 为标准输入)
        #[arg(short, long, default_value = "-")]
        source: String,

        /// 计数策略: presence / dwell / line
        #[arg(short, long)]
        policy: Option<PolicyKind>,

        /// 计数线 y 坐标 (line 策略)
        #[arg(long)]
        line_y: Option<i32>,

        /// 质心匹配距离阈值
        #[arg(long)]
        match_distance: Option<f32>,

        /// 启用遮挡过滤
        #[arg(long)]
        occlusion: bool,

        /// 运行时长 (秒), 到时在帧间停止
        #[arg(long)]
        duration: Option<u64>,

        /// 逐帧报告输出目录
        #[arg(long)]
        report_dir: Option<PathBuf>,
    },

    /// 查询按天计数
    Query {
        #[command(subcommand)]
        query: QueryCommand,
    },
}

#[derive(Subcommand, Debug)]
enum QueryCommand {
    /// 全部记录 (新 → 旧)
    All,
    /// 今日记录
    Today,
    /// 今日计数
    TodayCount,
    /// 按年 / 年月 / 年月日汇总
    ByDate {
        #[arg(long)]
        year: i32,
        #[arg(long)]
        month: Option<u32>,
        #[arg(long)]
        day: Option<u32>,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = CounterConfig::load(&args.config);
    if let Some(store) = args.store {
        config.store_path = store;
    }

    match args.command {
        Command::Run {
            source,
            policy,
            line_y,
            match_distance,
            occlusion,
            duration,
            report_dir,
        } => {
            if let Some(policy) = policy {
                config.policy = policy;
            }
            if let Some(line_y) = line_y {
                config.line_y = line_y;
            }
            if let Some(match_distance) = match_distance {
                config.match_distance = match_distance;
            }
            config.occlusion_enabled |= occlusion;
            run(&config, &source, duration, report_dir)
        }
        Command::Query { query } => {
            let store = Arc::new(DailyCountStore::open(&config.store_path)?);
            let q = CountQuery::new(store);
            let json = match query {
                QueryCommand::All => serde_json::to_string_pretty(&q.all())?,
                QueryCommand::Today => serde_json::to_string_pretty(&q.today())?,
                QueryCommand::TodayCount => serde_json::to_string_pretty(&q.today_count())?,
                QueryCommand::ByDate { year, month, day } => {
                    serde_json::to_string_pretty(&q.count_by_parts(year, month, day)?)?
                }
            };
            println!("{}", json);
            Ok(())
        }
    }
}

fn run(
    config: &CounterConfig,
    source: &str,
    duration: Option<u64>,
    report_dir: Option<PathBuf>,
) -> Result<()> {
    println!("🚀 数字卫兵计数启动");
    config.print_summary();
    println!("📹 输入: {}", source);
    println!();

    let store = Arc::new(DailyCountStore::open(&config.store_path)?);
    let mut counter = Counter::new(config, Box::new(Arc::clone(&store)));
    let mut adapter = JsonLinesAdapter::open(source)?;

    // 停止信号: 定时线程在到时后发送 Shutdown
    let (tx_control, rx_control) = crossbeam_channel::bounded::<SystemControl>(1);
    if let Some(secs) = duration {
        let tx = tx_control.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_secs(secs));
            let _ = tx.send(SystemControl::Shutdown);
        });
    }

    let mut report_writer = match report_dir {
        Some(dir) => {
            fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
            let path = dir.join(format!("frames_{}.jsonl", gen_time_string("")));
            info!("📝 逐帧报告: {}", path.display());
            Some(BufWriter::new(File::create(&path)?))
        }
        None => None,
    };

    let summary = counter.run_with(&mut adapter, &rx_control, |report| {
        if let Some(writer) = report_writer.as_mut() {
            let written = serde_json::to_string(report)
                .map_err(anyhow::Error::from)
                .and_then(|line| writeln!(writer, "{}", line).map_err(anyhow::Error::from));
            if let Err(e) = written {
                warn!("❌ 写入逐帧报告失败: {}", e);
            }
        }
    })?;
    drop(tx_control);

    if let Some(mut writer) = report_writer {
        writer.flush()?;
    }

    for undelivered in &summary.undelivered {
        warn!(
            "⚠️ 未写入事件: {} ({})",
            undelivered.event.timestamp, undelivered.error
        );
    }

    let today = CountQuery::new(store).today();
    println!(
        "\n📊 本次计数 {} | 今日 ({}) 累计 {}",
        summary.total_count, today.date, today.count
    );

    if let Some(e) = summary.error {
        bail!("run ended early after {} frames: {}", summary.frames, e);
    }
    Ok(())
}
