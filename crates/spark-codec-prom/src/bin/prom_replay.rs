//! 暴露格式回放工具：把文件或标准输入中的 Prometheus 文本送入流式解析器。
//!
//! # 使用方法
//! ```bash
//! cargo run --bin prom_replay -- scrape.txt --print
//! curl -s http://localhost:9100/metrics | cargo run --bin prom_replay -- -
//! cargo run --bin prom_replay -- scrape.txt.gz --gzip --config ingest.toml
//! ```
//! - 第一个参数为输入路径，`-` 表示标准输入；
//! - `--gzip`：输入为 gzip 压缩；
//! - `--config`：可选，TOML 格式的摄取配置（见 `StreamConfig::from_toml_str`）；
//! - `--print`：逐行打印解析结果。
//!
//! 结束时在标准错误输出批次数、行数与计数器；日志级别通过 `RUST_LOG` 调整。

use std::env;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::PathBuf;

use spark_codec_prom::{PromDecoder, Row};
use spark_ingest::{IngestError, StreamConfig, StreamParser, StreamSource};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error)]
enum ReplayError {
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error("cannot write output: {0}")]
    Output(#[from] io::Error),
}

struct Options {
    input: Option<PathBuf>,
    gzip: bool,
    config: Option<PathBuf>,
    print: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    if let Err(error) = run() {
        eprintln!("回放失败: {error}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let options = parse_args()?;

    let owned;
    let parser = match &options.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .map_err(|error| format!("读取配置 {} 失败: {error}", path.display()))?;
            let config = StreamConfig::from_toml_str(&text)
                .map_err(|error| format!("配置无效 [{}]: {error}", error.code()))?;
            owned = StreamParser::with_config(PromDecoder::new(), config)
                .map_err(|error| format!("配置无效 [{}]: {error}", error.code()))?;
            &owned
        }
        None => spark_codec_prom::parser(),
    };

    let source: Box<dyn StreamSource> = match &options.input {
        Some(path) => Box::new(
            File::open(path).map_err(|error| format!("打开 {} 失败: {error}", path.display()))?,
        ),
        None => Box::new(io::stdin().lock()),
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut batches = 0u64;
    let mut rows = 0u64;
    parser
        .parse_stream(source, options.gzip, |batch: &[Row]| {
            batches += 1;
            rows += batch.len() as u64;
            if options.print {
                for row in batch {
                    write_row(&mut out, row)?;
                }
            }
            Ok::<(), ReplayError>(())
        })
        .map_err(|error| match &error {
            ReplayError::Ingest(inner) => format!("[{}] {error}", inner.code()),
            ReplayError::Output(_) => error.to_string(),
        })?;
    out.flush().map_err(|error| format!("刷新输出失败: {error}"))?;

    eprintln!("batches={batches} rows={rows}");
    eprint!("{}", parser.metrics().render_prometheus());
    eprint!("{}", parser.decoder().render_prometheus());
    Ok(())
}

fn parse_args() -> Result<Options, String> {
    let mut args = env::args().skip(1);
    let input = match args.next() {
        Some(path) if path == "-" => None,
        Some(path) => Some(PathBuf::from(path)),
        None => return Err(usage("缺少输入路径")),
    };

    let mut options = Options {
        input,
        gzip: false,
        config: None,
        print: false,
    };
    while let Some(flag) = args.next() {
        match flag.as_str() {
            "--gzip" => options.gzip = true,
            "--print" => options.print = true,
            "--config" => {
                let value = args
                    .next()
                    .ok_or_else(|| usage("--config 之后必须提供文件路径"))?;
                options.config = Some(PathBuf::from(value));
            }
            unknown => return Err(usage(&format!("未知参数: {unknown}"))),
        }
    }
    Ok(options)
}

fn write_row(out: &mut impl Write, row: &Row) -> io::Result<()> {
    write!(out, "{}", row.metric)?;
    if !row.tags.is_empty() {
        write!(out, "{{")?;
        for (index, tag) in row.tags.iter().enumerate() {
            if index > 0 {
                write!(out, ",")?;
            }
            write!(out, "{}={:?}", tag.key, tag.value)?;
        }
        write!(out, "}}")?;
    }
    writeln!(out, " {} {}", row.value, row.timestamp)
}

fn usage(reason: &str) -> String {
    format!("{reason}\n用法: prom_replay <path|-> [--gzip] [--config <file.toml>] [--print]")
}
