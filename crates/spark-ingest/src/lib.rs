#![doc = r#"
# spark-ingest

## 设计动机（Why）
- **定位**：为行式指标文本（如 Prometheus 文本暴露格式）提供流式摄取核心：
  从连接或文件中按整行读取、解码成行、按批次交给调用方回调。
- **架构角色**：格式无关；具体格式实现 [`RowDecoder`]，由 [`StreamParser`] 驱动，
  例如 `spark-codec-prom`。
- **设计理念**：慢速对端不得挂住流水线。具备截止时间能力的源在
  `flush_timeout`（默认 3 秒）内没有送完一行时，已读数据照常冲刷给回调。

## 核心契约（What）
- **输入**：实现 [`StreamSource`] 的阻塞式源，或开启 `runtime-tokio` 后实现
  [`AsyncStreamSource`] 的异步源；阻塞式路径支持 gzip 压缩输入；
- **输出**：回调 `FnMut(&[Row]) -> Result<(), E>` 按读取顺序收到批次；
  缺失时间戳的行被补齐为同一批次内相同的当前毫秒时间；
- **错误**：干净的流结束返回 `Ok(())`；建立阶段与读取阶段的失败以
  [`IngestError`] 表达，回调错误原样透传。

## 实现策略（How）
- [`LineBlockReader`] 负责把任意切分的读取重新组织为“完整行 + 残行”；
- [`StreamContext`] 持有一条流的全部工作状态，由两级 [`ContextPool`] 复用；
- [`IngestMetrics`] 记录读取次数、读取错误与行数，可渲染为 Prometheus 文本。

## 风险与考量（Trade-offs）
- 每条流独占一个线程或任务直到结束；
- 上下文保留峰值批次的容量，池中空闲上下文的内存不会自动回收，
  可通过 [`ContextPool::shrink_to_fit`] 释放溢出层。
"#]

mod config;
mod context;
mod error;
pub mod gzip;
mod metrics;
mod parser;
mod pool;
mod refill;
mod rows;
mod source;

#[cfg(feature = "runtime-tokio")]
mod runtime;

pub use config::{DEFAULT_BLOCK_SIZE, DEFAULT_FLUSH_TIMEOUT, DEFAULT_MAX_LINE_LEN, StreamConfig};
pub use context::{ReadStatus, ReadStep, StreamContext};
pub use error::{ConfigError, IngestError, RefillError, codes};
pub use gzip::GzipSource;
pub use metrics::{IngestMetrics, MetricsSnapshot};
pub use parser::StreamParser;
pub use pool::{ContextPool, PoolStats, PooledContext};
pub use refill::LineBlockReader;
pub use rows::{RowBuffer, RowDecoder, Timestamped, unix_millis_now};
pub use source::{PlainSource, ReadDeadline, StreamSource};

#[cfg(feature = "runtime-tokio")]
pub use runtime::{AsyncStreamSource, Deadlined};
