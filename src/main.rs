// ==========================================
// 畜产品合规引擎 - 主入口
// ==========================================
// 用法:
//   livestock-compliance [--db <path>] [daemon]            每日调度常驻
//   livestock-compliance [--db <path>] run-countdown       手动触发倒计时扫描
//   livestock-compliance [--db <path>] run-expiry          手动触发到期对账
//   livestock-compliance [--db <path>] status <animal_id> <farmer_id>
// ==========================================

use anyhow::{anyhow, bail, Context, Result};
use livestock_compliance::app::{get_default_db_path, AppState};
use livestock_compliance::logging;
use livestock_compliance::services::SweepOutcome;
use tokio::sync::watch;

enum Command {
    Daemon,
    RunCountdown,
    RunExpiry,
    Status { animal_id: String, farmer_id: String },
}

fn parse_args() -> Result<(Option<String>, Command)> {
    let mut args = std::env::args().skip(1).peekable();
    let mut db_path = None;

    if args.peek().map(|a| a == "--db").unwrap_or(false) {
        args.next();
        db_path = Some(args.next().ok_or_else(|| anyhow!("--db 缺少路径参数"))?);
    }

    let command = match args.next().as_deref() {
        None | Some("daemon") => Command::Daemon,
        Some("run-countdown") => Command::RunCountdown,
        Some("run-expiry") => Command::RunExpiry,
        Some("status") => {
            let animal_id = args.next().ok_or_else(|| anyhow!("status 缺少 animal_id"))?;
            let farmer_id = args.next().ok_or_else(|| anyhow!("status 缺少 farmer_id"))?;
            Command::Status {
                animal_id,
                farmer_id,
            }
        }
        Some(other) => bail!("未知命令: {}", other),
    };
    Ok((db_path, command))
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    let (db_path, command) = parse_args()?;
    let db_path = db_path.unwrap_or_else(get_default_db_path);

    tracing::info!("==================================================");
    tracing::info!("{} v{}", livestock_compliance::APP_NAME, livestock_compliance::VERSION);
    tracing::info!("使用数据库: {}", db_path);
    tracing::info!("==================================================");

    let state = AppState::new(db_path).map_err(|e| anyhow!(e))?;

    match command {
        Command::Daemon => {
            let (stop_tx, stop_rx) = watch::channel(false);
            let scheduler = state.daily_scheduler();
            let run = scheduler.run(stop_rx);
            tokio::pin!(run);

            tokio::select! {
                _ = &mut run => {}
                signal = tokio::signal::ctrl_c() => {
                    signal.context("监听退出信号失败")?;
                    tracing::info!("收到退出信号, 正在停止调度");
                    let _ = stop_tx.send(true);
                    run.await;
                }
            }
        }
        Command::RunCountdown => {
            match state.operations_api.run_withdrawal_countdown_sweep().await? {
                SweepOutcome::Completed(report) => println!("{}", serde_json::to_string_pretty(&report)?),
                SweepOutcome::Skipped => println!("skipped"),
            }
        }
        Command::RunExpiry => {
            match state.operations_api.run_withdrawal_expiry_reconciliation().await? {
                SweepOutcome::Completed(report) => println!("{}", serde_json::to_string_pretty(&report)?),
                SweepOutcome::Skipped => println!("skipped"),
            }
        }
        Command::Status {
            animal_id,
            farmer_id,
        } => {
            let report = state.compliance_api.get_compliance_status(&animal_id, &farmer_id)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    state.shutdown().await;
    Ok(())
}
