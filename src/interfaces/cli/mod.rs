/// CLI Interface Module
///
/// Runs the concurrent market as a standalone process speaking JSON lines:
/// commands are read from stdin, events are written to stdout, logs go to
/// stderr.
///
/// ## Responsibilities
/// - Parse command-line arguments
/// - Initialize logging and the concurrent market
/// - Decode commands and route them to the market
/// - Drain the workers and flush every event on EOF

use crate::application::{ConcurrentMarket, MarketConfig};
use crate::domain::events::MarketEvent;
use crate::domain::validation::ValidationConfig;
use crate::interfaces::command::{encode_event, Command};
use crate::interfaces::handlers::ChannelEventHandler;
use crate::shared::logging::init_logging;
use crate::shared::metrics::METRICS;
use clap::Parser;
use crossbeam::channel::{unbounded, Receiver};
use std::io::{self, BufRead, BufWriter, Write};
use std::thread;
use tracing::{info, warn};

/// 撮合引擎命令行配置
#[derive(Parser, Debug, Clone)]
#[command(name = "rapid-match")]
#[command(version = "0.1.0")]
#[command(about = "Price-time priority matching engine over JSON lines", long_about = None)]
pub struct CliConfig {
    /// 工作线程数量（0表示自动检测CPU核心数）
    #[arg(short = 'n', long, default_value_t = 0)]
    pub workers: usize,

    /// 每个工作线程的队列容量
    #[arg(short = 'q', long, default_value_t = 10_000)]
    pub queue_capacity: usize,

    /// 每次唤醒最多处理的请求数
    #[arg(long, default_value_t = 100)]
    pub batch_size: usize,

    /// 启用CPU亲和性绑定
    #[arg(long, default_value_t = false)]
    pub cpu_affinity: bool,

    /// 启动时创建的品种，格式 ID:NAME（可重复）
    #[arg(long = "symbol", value_parser = parse_symbol, default_values = ["1:BTC-USDT", "2:ETH-USDT"])]
    pub symbols: Vec<(u32, String)>,

    /// 日志级别
    #[arg(short = 'l', long, default_value = "info", value_parser = ["trace", "debug", "info", "warn", "error"])]
    pub log_level: String,

    /// JSON 格式日志
    #[arg(long, default_value_t = false)]
    pub log_json: bool,

    /// 仅显示配置不启动（用于调试）
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    /// 退出时将 Prometheus 指标输出到 stderr
    #[arg(long, default_value_t = false)]
    pub dump_metrics: bool,
}

impl CliConfig {
    pub fn market_config(&self) -> MarketConfig {
        MarketConfig {
            worker_count: self.workers,
            queue_capacity: self.queue_capacity,
            batch_size: self.batch_size,
            enable_cpu_affinity: self.cpu_affinity,
            validation: ValidationConfig::default(),
        }
    }
}

/// Parses `ID:NAME`
fn parse_symbol(value: &str) -> Result<(u32, String), String> {
    let (id, name) = value
        .split_once(':')
        .ok_or_else(|| format!("expected ID:NAME, got '{}'", value))?;
    let id = id
        .trim()
        .parse::<u32>()
        .map_err(|e| format!("invalid symbol id '{}': {}", id, e))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("symbol {} has an empty name", id));
    }
    Ok((id, name.to_string()))
}

/// Outcome of one run over an input stream
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Commands the market accepted
    pub processed: u64,
    /// Commands that failed to decode or were refused
    pub failed: u64,
}

/// Runs the CLI application
///
/// Parses command-line arguments, then serves stdin until EOF.
pub fn run() -> io::Result<()> {
    // 解析命令行参数
    let config = CliConfig::parse();

    // 初始化日志系统
    init_logging(&config.log_level, config.log_json);

    if config.dry_run {
        println!("{:#?}", config);
        println!("\nDry-run 模式 - 不启动撮合引擎");
        return Ok(());
    }

    let stdin = io::stdin();
    let (summary, _) = run_with(&config, stdin.lock(), io::stdout())?;
    info!(processed = summary.processed, failed = summary.failed, "input closed");

    if config.dump_metrics {
        eprint!("{}", METRICS.export());
    }
    Ok(())
}

/// Serves one input stream against a fresh concurrent market
///
/// Events are encoded by a dedicated writer thread; `output` is handed back
/// once every worker has drained and the last event is flushed.
pub fn run_with<R, W>(config: &CliConfig, input: R, output: W) -> io::Result<(RunSummary, W)>
where
    R: BufRead,
    W: Write + Send + 'static,
{
    let (event_tx, event_rx) = unbounded();
    let writer = thread::Builder::new()
        .name("event-writer".to_string())
        .spawn(move || write_events(event_rx, output))?;

    let market = ConcurrentMarket::new(config.market_config(), |_| {
        ChannelEventHandler::new(event_tx.clone())
    })?;
    drop(event_tx);

    info!(workers = market.worker_count(), "matching engine started");

    for (symbol_id, name) in &config.symbols {
        if let Err(e) = market.add_symbol(*symbol_id, name) {
            warn!(symbol_id, error = %e, "could not add configured symbol");
        }
    }

    let mut summary = RunSummary::default();
    for line in input.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let command = match Command::parse(line) {
            Ok(command) => command,
            Err(e) => {
                warn!(error = %e, payload = line, "dropping command");
                summary.failed += 1;
                continue;
            }
        };

        let operation = command.operation();
        let result = match command {
            Command::AddOrder(request) => request
                .into_order()
                .map_err(Into::into)
                .and_then(|order| market.add_order(order)),
            Command::CancelOrder(cancel) => market.delete_order(cancel.instrument_id, cancel.order_id),
            Command::AddSymbol(symbol) => market.add_symbol(symbol.instrument_id, &symbol.name),
            Command::DeleteSymbol(symbol) => market.delete_symbol(symbol.instrument_id),
        };

        match result {
            Ok(()) => summary.processed += 1,
            Err(e) => {
                warn!(operation, error = %e, "command failed");
                summary.failed += 1;
            }
        }
    }

    // 关闭工作线程后，事件通道随处理器一起关闭
    drop(market.shutdown());

    let output = match writer.join() {
        Ok(result) => result?,
        Err(_) => return Err(io::Error::new(io::ErrorKind::Other, "event writer panicked")),
    };
    Ok((summary, output))
}

/// Writes events as JSON lines until every sender is gone
fn write_events<W: Write>(events: Receiver<MarketEvent>, output: W) -> io::Result<W> {
    let mut out = BufWriter::new(output);
    for event in events.iter() {
        writeln!(out, "{}", encode_event(&event)?)?;
        if events.is_empty() {
            out.flush()?;
        }
    }
    out.flush()?;
    out.into_inner().map_err(|e| e.into_error())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_cli_config_default() {
        // 测试默认配置
        let config = CliConfig::parse_from(["rapid-match"]);
        assert_eq!(config.workers, 0);
        assert_eq!(config.queue_capacity, 10_000);
        assert_eq!(config.batch_size, 100);
        assert!(!config.cpu_affinity);
        assert_eq!(
            config.symbols,
            vec![(1, "BTC-USDT".to_string()), (2, "ETH-USDT".to_string())]
        );
        assert_eq!(config.log_level, "info");
        assert!(!config.log_json);
        assert!(!config.dry_run);
        assert!(!config.dump_metrics);
    }

    #[test]
    fn test_cli_config_custom() {
        // 测试自定义配置
        let config = CliConfig::parse_from([
            "rapid-match",
            "-n", "4",
            "-q", "512",
            "--batch-size", "16",
            "--symbol", "7:SOL-USDT",
            "--symbol", "8:XRP-USDT",
            "-l", "warn",
            "--log-json",
            "--dry-run",
        ]);

        assert_eq!(config.workers, 4);
        assert_eq!(config.queue_capacity, 512);
        assert_eq!(config.batch_size, 16);
        assert_eq!(config.symbols.len(), 2);
        assert_eq!(config.symbols[0], (7, "SOL-USDT".to_string()));
        assert_eq!(config.log_level, "warn");
        assert!(config.log_json);
        assert!(config.dry_run);

        let market_config = config.market_config();
        assert_eq!(market_config.worker_count, 4);
        assert_eq!(market_config.batch_size, 16);
    }

    #[test]
    fn test_parse_symbol() {
        assert_eq!(parse_symbol("3:DOT-USDT"), Ok((3, "DOT-USDT".to_string())));
        assert!(parse_symbol("DOT-USDT").is_err());
        assert!(parse_symbol("x:DOT-USDT").is_err());
        assert!(parse_symbol("3:").is_err());
    }

    #[test]
    fn test_run_with_processes_commands() {
        let config = CliConfig::parse_from(["rapid-match", "-n", "2"]);
        let input = [
            r#"{"operation":"ADD_ORDER","payload":{"order_id":101,"instrument_id":1,"side":"Bid","price":50000,"quantity":10,"time_in_force":"GTC"}}"#,
            "",
            "not json",
            r#"{"operation":"ADD_ORDER","payload":{"order_id":102,"instrument_id":1,"side":"Ask","price":50000,"quantity":10,"time_in_force":"GTC"}}"#,
            r#"{"operation":"CANCEL_ORDER","payload":{"order_id":101,"instrument_id":1}}"#,
        ]
        .join("\n");

        let (summary, output) = run_with(&config, Cursor::new(input), Vec::new()).unwrap();
        assert_eq!(summary, RunSummary { processed: 2, failed: 2 });

        let events: Vec<serde_json::Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .filter(|event: &serde_json::Value| event["data"]["symbol_id"] == 1)
            .collect();
        let kinds: Vec<&str> = events.iter().map(|e| e["event_type"].as_str().unwrap()).collect();

        assert_eq!(
            kinds,
            vec![
                "SymbolAdded",
                "OrderAdded",
                "ExecutedOrder",
                "ExecutedOrder",
                "OrderDeleted",
                "OrderDeleted"
            ]
        );
        assert_eq!(events[2]["data"]["last_executed_price"], 50000);
    }
}
