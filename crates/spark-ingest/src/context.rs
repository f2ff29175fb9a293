use std::time::Duration;

use bytes::BytesMut;

use crate::config::StreamConfig;
use crate::error::{IngestError, RefillError};
use crate::metrics::IngestMetrics;
use crate::refill::LineBlockReader;
use crate::rows::{RowBuffer, RowDecoder, Timestamped, backfill_timestamps, unix_millis_now};
use crate::source::{DeadlineReader, StreamSource};

#[cfg(feature = "runtime-tokio")]
use crate::runtime::AsyncStreamSource;

/// 单次读取步骤的结果。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadStatus {
    /// 已解码出一个批次（可能为空），调用方应把行交给回调并继续读取。
    Batch,
    /// 流已结束或此前已失败，不得再读取。
    Stopped,
}

/// 上下文的终止状态，一经写入只能由 [`StreamContext::reset`] 清除。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Terminal {
    EndOfStream,
    Failed,
}

/// 读取步骤依赖的只读协作者集合，由 [`StreamParser`](crate::StreamParser) 组装。
pub struct ReadStep<'a, D> {
    decoder: &'a D,
    refill: LineBlockReader,
    flush_timeout: Duration,
    metrics: &'a IngestMetrics,
}

impl<'a, D: RowDecoder> ReadStep<'a, D> {
    pub fn new(decoder: &'a D, config: &StreamConfig, metrics: &'a IngestMetrics) -> Self {
        Self {
            decoder,
            refill: LineBlockReader::from_config(config),
            flush_timeout: config.flush_timeout(),
            metrics,
        }
    }
}

/// 单条流的可复用工作状态。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 高频调用下每个批次都重新分配行与缓冲会带来明显的分配压力；
///   上下文把行容器、读取缓冲与残行缓冲打包，由上下文池在流之间循环使用。
///
/// ## 契约（What）
/// - 同一时刻只被一条流独占访问；
/// - `rows` 每次读取都被覆写，回调拿到的切片在返回后即失效（借用检查保证不被保留）；
/// - 终止状态是粘性的：进入后 [`StreamContext::read_block`] 立即返回 [`ReadStatus::Stopped`]，
///   且不会触碰输入源；
/// - 池中取出的上下文总处于重置状态：空行、空缓冲、无终止状态。
///
/// ## 注意事项（Trade-offs）
/// - 重置只清空长度，缓冲容量与行对象都保留；峰值批次的内存会随上下文一直驻留。
#[derive(Debug)]
pub struct StreamContext<R> {
    rows: RowBuffer<R>,
    chunk: BytesMut,
    tail: BytesMut,
    terminal: Option<Terminal>,
}

impl<R> Default for StreamContext<R> {
    fn default() -> Self {
        Self {
            rows: RowBuffer::new(),
            chunk: BytesMut::new(),
            tail: BytesMut::new(),
            terminal: None,
        }
    }
}

impl<R> StreamContext<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// 最近一次读取解码出的行。
    pub fn rows(&self) -> &[R] {
        self.rows.as_slice()
    }

    /// 是否已进入终止状态（流结束或失败）。
    pub fn is_terminated(&self) -> bool {
        self.terminal.is_some()
    }

    /// 是否因干净的流结束而终止。
    pub fn reached_end_of_stream(&self) -> bool {
        self.terminal == Some(Terminal::EndOfStream)
    }

    /// 当前携带的残行字节数。
    pub fn pending_tail(&self) -> usize {
        self.tail.len()
    }

    /// 恢复到刚创建时的状态，保留已分配容量。
    pub fn reset(&mut self) {
        self.rows.reset();
        self.chunk.clear();
        self.tail.clear();
        self.terminal = None;
    }

    /// 上下文是否处于重置状态。
    pub fn is_pristine(&self) -> bool {
        self.rows.is_empty()
            && self.chunk.is_empty()
            && self.tail.is_empty()
            && self.terminal.is_none()
    }
}

impl<R: Timestamped + Default> StreamContext<R> {
    /// 执行一次读取步骤。
    ///
    /// # 教案式说明
    /// - **意图（Why）**：一次尝试只拉取一个以整行结束的块，慢速对端在 `flush_timeout`
    ///   内没有送完一行时，已读部分照常冲刷给回调，流水线不会被无限期挂住；
    /// - **逻辑（How）**：
    ///   1. 累加读取次数；已终止则直接返回 `Stopped`；
    ///   2. 源具备截止时间能力时设置 `now + flush_timeout`，设置失败属于致命错误；
    ///   3. 调用 refill；超时被吞掉并继续解码，EOF 记录为终止并返回 `Stopped`，
    ///      其他错误记录为失败并返回 [`IngestError::Read`]；
    ///   4. 解码覆写 `rows`，按同一个“当前毫秒”补齐缺失时间戳；
    /// - **契约（What）**：非致命路径总是返回 `Batch`，即使解码出零行。
    pub fn read_block<S, D>(
        &mut self,
        source: &mut S,
        step: &ReadStep<'_, D>,
    ) -> Result<ReadStatus, IngestError>
    where
        S: StreamSource + ?Sized,
        D: RowDecoder<Row = R>,
    {
        step.metrics.inc_read_calls();
        if self.terminal.is_some() {
            return Ok(ReadStatus::Stopped);
        }
        let mut reader = match DeadlineReader::arm(source, step.flush_timeout) {
            Ok(reader) => reader,
            Err(source) => {
                step.metrics.inc_read_errors();
                self.terminal = Some(Terminal::Failed);
                tracing::warn!(error = %source, "cannot set read deadline");
                return Err(IngestError::SetDeadline { source });
            }
        };
        let outcome = step
            .refill
            .refill(&mut reader, &mut self.chunk, &mut self.tail);
        self.complete_read(outcome, step)
    }

    /// 异步读取步骤：截止时间覆盖整次 refill，到期视为冲刷信号。
    #[cfg(feature = "runtime-tokio")]
    pub async fn read_block_async<S, D>(
        &mut self,
        source: &mut S,
        step: &ReadStep<'_, D>,
    ) -> Result<ReadStatus, IngestError>
    where
        S: AsyncStreamSource,
        D: RowDecoder<Row = R>,
    {
        step.metrics.inc_read_calls();
        if self.terminal.is_some() {
            return Ok(ReadStatus::Stopped);
        }
        let deadline = source
            .supports_read_deadline()
            .then(|| tokio::time::Instant::now() + step.flush_timeout);
        let outcome = step
            .refill
            .refill_async(source, &mut self.chunk, &mut self.tail, deadline)
            .await;
        self.complete_read(outcome, step)
    }

    fn complete_read<D>(
        &mut self,
        outcome: Result<(), RefillError>,
        step: &ReadStep<'_, D>,
    ) -> Result<ReadStatus, IngestError>
    where
        D: RowDecoder<Row = R>,
    {
        match outcome {
            Ok(()) => {}
            Err(err) if err.is_timeout() => {
                tracing::debug!(
                    buffered = self.chunk.len(),
                    "read deadline reached, flushing buffered data"
                );
            }
            Err(RefillError::Eof) => {
                self.terminal = Some(Terminal::EndOfStream);
                return Ok(ReadStatus::Stopped);
            }
            Err(source) => {
                step.metrics.inc_read_errors();
                self.terminal = Some(Terminal::Failed);
                tracing::warn!(error = %source, "stream read failed");
                return Err(IngestError::Read { source });
            }
        }

        self.rows.reset();
        step.decoder.decode(&self.chunk, &mut self.rows);
        step.metrics.add_rows_read(self.rows.len());
        backfill_timestamps(self.rows.as_mut_slice(), unix_millis_now());
        Ok(ReadStatus::Batch)
    }
}
