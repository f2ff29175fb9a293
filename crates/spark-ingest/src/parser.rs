use crate::config::StreamConfig;
use crate::context::{ReadStatus, ReadStep, StreamContext};
use crate::error::{ConfigError, IngestError};
use crate::gzip;
use crate::metrics::IngestMetrics;
use crate::pool::ContextPool;
use crate::rows::RowDecoder;
use crate::source::StreamSource;

#[cfg(feature = "runtime-tokio")]
use crate::runtime::AsyncStreamSource;

/// 行式文本流的驱动器。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 把“读取 → 解码 → 交付”的循环与具体格式解耦：格式只提供 [`RowDecoder`]，
///   驱动器负责超时冲刷、上下文复用与计数；
/// - 一个进程通常只持有每种格式的一个驱动器，所有连接共享同一个上下文池。
///
/// ## 契约（What）
/// - `parse_stream` 阻塞到流结束、读取失败或回调报错为止；
/// - 回调按读取顺序收到批次，批次可能为空；切片借用在回调返回后失效；
/// - 回调错误原样返回，不再读取源；核心错误经 `E: From<IngestError>` 转换；
/// - 无论以何种方式退出（含 panic 展开），上下文都会被重置并归还池中。
///
/// ## 注意事项（Trade-offs）
/// - 每次调用都独占一个线程（或异步任务）直到流结束，长连接较多时需要相应规模的线程池。
pub struct StreamParser<D: RowDecoder> {
    decoder: D,
    config: StreamConfig,
    pool: ContextPool<D::Row>,
    metrics: IngestMetrics,
}

impl<D: RowDecoder> StreamParser<D> {
    /// 使用默认配置创建驱动器。
    pub fn new(decoder: D) -> Self {
        Self::build(decoder, StreamConfig::default())
    }

    /// 使用自定义配置创建驱动器，配置不合法时返回 [`ConfigError`]。
    pub fn with_config(decoder: D, config: StreamConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(decoder, config))
    }

    fn build(decoder: D, config: StreamConfig) -> Self {
        Self {
            pool: ContextPool::new(config.pool_capacity()),
            metrics: IngestMetrics::new(D::NAME),
            decoder,
            config,
        }
    }

    pub fn decoder(&self) -> &D {
        &self.decoder
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn metrics(&self) -> &IngestMetrics {
        &self.metrics
    }

    pub fn pool(&self) -> &ContextPool<D::Row> {
        &self.pool
    }

    /// 消费 `source` 直到结束，把每个批次交给 `callback`。
    ///
    /// `is_compressed` 为真时先建立 gzip 解压，失败立即返回 [`IngestError::Decompress`]。
    pub fn parse_stream<S, F, E>(&self, source: S, is_compressed: bool, callback: F) -> Result<(), E>
    where
        S: StreamSource,
        F: FnMut(&[D::Row]) -> Result<(), E>,
        E: From<IngestError>,
    {
        if is_compressed {
            let mut source = gzip::wrap(source)?;
            self.drive(&mut source, callback)
        } else {
            let mut source = source;
            self.drive(&mut source, callback)
        }
    }

    fn drive<S, F, E>(&self, source: &mut S, mut callback: F) -> Result<(), E>
    where
        S: StreamSource + ?Sized,
        F: FnMut(&[D::Row]) -> Result<(), E>,
        E: From<IngestError>,
    {
        let step = ReadStep::new(&self.decoder, &self.config, &self.metrics);
        let mut ctx = self.pool.acquire();
        loop {
            match ctx.read_block(source, &step)? {
                ReadStatus::Batch => callback(ctx.rows())?,
                ReadStatus::Stopped => return Ok(()),
            }
        }
    }

    /// 异步版本；截止时间由 [`AsyncStreamSource::supports_read_deadline`] 决定是否生效。
    #[cfg(feature = "runtime-tokio")]
    pub async fn parse_stream_async<S, F, E>(&self, mut source: S, mut callback: F) -> Result<(), E>
    where
        S: AsyncStreamSource,
        F: FnMut(&[D::Row]) -> Result<(), E>,
        E: From<IngestError>,
    {
        let step = ReadStep::new(&self.decoder, &self.config, &self.metrics);
        let mut ctx = self.pool.acquire();
        loop {
            match ctx.read_block_async(&mut source, &step).await? {
                ReadStatus::Batch => callback(ctx.rows())?,
                ReadStatus::Stopped => return Ok(()),
            }
        }
    }

    /// 在驱动器之外手动执行读取步骤，用于需要自行调度读取节奏的调用方。
    pub fn read_block<S: StreamSource + ?Sized>(
        &self,
        ctx: &mut StreamContext<D::Row>,
        source: &mut S,
    ) -> Result<ReadStatus, IngestError> {
        let step = ReadStep::new(&self.decoder, &self.config, &self.metrics);
        ctx.read_block(source, &step)
    }
}
