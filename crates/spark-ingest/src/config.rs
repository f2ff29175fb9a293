use std::num::NonZeroUsize;
use std::thread;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// 读取截止时间的默认值：连接静默超过该时长时，已读数据会被冲刷给回调。
pub const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_secs(3);
/// 单次 refill 预留的最小缓冲容量。
pub const DEFAULT_BLOCK_SIZE: usize = 64 * 1024;
/// 单行长度上限。
pub const DEFAULT_MAX_LINE_LEN: usize = 256 * 1024;

/// 流式摄取的运行参数。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 把冲刷超时、块大小、行长上限与池容量集中到一处，
///   使测试可以把 3 秒的冲刷超时缩短到毫秒级，服务端也能通过 TOML 文件调整。
///
/// ## 契约（What）
/// - `flush_timeout`：仅对具备截止时间能力的源生效，必须大于零；
/// - `block_size`：每次 refill 至少预留的容量，必须大于零；
/// - `max_line_len`：未见换行时允许累积的最大字节数，必须不小于 `block_size`；
/// - `pool_capacity`：上下文池有界层的槽位数，`None` 表示取可用并行度。
///
/// ## 注意事项（Trade-offs）
/// - 配置在 [`StreamParser`](crate::StreamParser) 构造时固定，运行期不可热更新；
///   池容量变化需要重建解析器。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamConfig {
    flush_timeout: Duration,
    block_size: usize,
    max_line_len: usize,
    pool_capacity: Option<NonZeroUsize>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamConfig {
    /// 创建默认配置。
    pub const fn new() -> Self {
        Self {
            flush_timeout: DEFAULT_FLUSH_TIMEOUT,
            block_size: DEFAULT_BLOCK_SIZE,
            max_line_len: DEFAULT_MAX_LINE_LEN,
            pool_capacity: None,
        }
    }

    /// 设置冲刷超时。
    pub fn with_flush_timeout(mut self, flush_timeout: Duration) -> Self {
        self.flush_timeout = flush_timeout;
        self
    }

    /// 设置 refill 块大小。
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// 设置单行长度上限。
    pub fn with_max_line_len(mut self, max_line_len: usize) -> Self {
        self.max_line_len = max_line_len;
        self
    }

    /// 固定上下文池有界层的容量。
    pub fn with_pool_capacity(mut self, capacity: NonZeroUsize) -> Self {
        self.pool_capacity = Some(capacity);
        self
    }

    pub fn flush_timeout(&self) -> Duration {
        self.flush_timeout
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn max_line_len(&self) -> usize {
        self.max_line_len
    }

    /// 有界层容量；未显式配置时取 `available_parallelism`，探测失败退化为 1。
    pub fn pool_capacity(&self) -> NonZeroUsize {
        self.pool_capacity.unwrap_or_else(|| {
            thread::available_parallelism().unwrap_or(NonZeroUsize::MIN)
        })
    }

    /// 校验字段之间的约束。
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.flush_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                field: "flush_timeout",
                reason: "must be greater than zero",
            });
        }
        if self.block_size == 0 {
            return Err(ConfigError::Invalid {
                field: "block_size",
                reason: "must be greater than zero",
            });
        }
        if self.max_line_len < self.block_size {
            return Err(ConfigError::Invalid {
                field: "max_line_len",
                reason: "must not be smaller than block_size",
            });
        }
        Ok(())
    }

    /// 从 TOML 文本加载配置，缺省字段取默认值，结果已通过 [`StreamConfig::validate`]。
    ///
    /// ```toml
    /// flush_timeout_ms = 3000
    /// block_size = 65536
    /// max_line_len = 262144
    /// pool_capacity = 8
    /// ```
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let raw: RawStreamConfig = toml::from_str(text)?;
        let config = raw.into_config()?;
        config.validate()?;
        Ok(config)
    }
}

/// TOML 映射层，字段名与单位面向运维人员。
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawStreamConfig {
    flush_timeout_ms: u64,
    block_size: usize,
    max_line_len: usize,
    pool_capacity: Option<usize>,
}

impl Default for RawStreamConfig {
    fn default() -> Self {
        let defaults = StreamConfig::new();
        Self {
            flush_timeout_ms: defaults.flush_timeout.as_millis() as u64,
            block_size: defaults.block_size,
            max_line_len: defaults.max_line_len,
            pool_capacity: None,
        }
    }
}

impl RawStreamConfig {
    fn into_config(self) -> Result<StreamConfig, ConfigError> {
        let pool_capacity = match self.pool_capacity {
            Some(raw) => Some(NonZeroUsize::new(raw).ok_or(ConfigError::Invalid {
                field: "pool_capacity",
                reason: "must be greater than zero",
            })?),
            None => None,
        };
        Ok(StreamConfig {
            flush_timeout: Duration::from_millis(self.flush_timeout_ms),
            block_size: self.block_size,
            max_line_len: self.max_line_len,
            pool_capacity,
        })
    }
}
