//! `spark-codec-prom` 在 `spark-ingest` 之上提供 Prometheus 文本暴露格式的流式解析。
//!
//! # 教案背景（Why）
//! - 指标采集端需要从抓取连接、推送请求体或归档文件中持续读取暴露格式文本；
//! - 摄取核心负责读取节奏、超时冲刷与上下文复用，本 crate 只提供逐行语法与行结构。
//!
//! # 使用概览（How）
//! - 进程内多数调用方直接使用 [`parse_stream`]：它共享一个惰性构建的
//!   `StreamParser<PromDecoder>`，所有连接复用同一个上下文池与计数器；
//! - 需要独立配置（例如更短的冲刷超时）时，自行构建
//!   `StreamParser::with_config(PromDecoder::new(), config)`。
//!
//! # 合约说明（What）
//! - 回调收到的 [`Row`] 切片只在回调期间有效；需要保留时请克隆；
//! - 未携带时间戳的行被补齐为本批次读取时刻的毫秒时间，同一批次内取值相同；
//! - 畸形行被跳过并记录，不会中断流。
//!
//! # 风险提示（Trade-offs）
//! - 全局驱动器使用默认配置，无法在运行期替换；
//! - 标签以独立的 `String` 保存，标签很多的序列每批次都会产生分配。

use std::sync::OnceLock;

use spark_ingest::{IngestError, StreamParser, StreamSource};

mod decoder;
mod line;
mod row;

pub use crate::decoder::PromDecoder;
pub use crate::line::LineError;
pub use crate::row::{Row, Tag};

static PARSER: OnceLock<StreamParser<PromDecoder>> = OnceLock::new();

/// 进程级共享的驱动器。
pub fn parser() -> &'static StreamParser<PromDecoder> {
    PARSER.get_or_init(|| StreamParser::new(PromDecoder::new()))
}

/// 解析 `source` 中的暴露格式文本，按批次调用 `callback`。
///
/// `is_gzipped` 为真时按 gzip 解压；回调错误原样返回。
pub fn parse_stream<S, F, E>(source: S, is_gzipped: bool, callback: F) -> Result<(), E>
where
    S: StreamSource,
    F: FnMut(&[Row]) -> Result<(), E>,
    E: From<IngestError>,
{
    parser().parse_stream(source, is_gzipped, callback)
}

/// [`parse_stream`] 的 Tokio 版本，不支持压缩输入。
#[cfg(feature = "runtime-tokio")]
pub async fn parse_stream_async<S, F, E>(source: S, callback: F) -> Result<(), E>
where
    S: spark_ingest::AsyncStreamSource,
    F: FnMut(&[Row]) -> Result<(), E>,
    E: From<IngestError>,
{
    parser().parse_stream_async(source, callback).await
}
