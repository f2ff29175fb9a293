//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 集中定义摄取链路的失败语义：解压初始化、截止时间设置、读取失败与配置错误；
//! - 为每类错误提供稳定错误码，便于日志与计数器按类别聚合。
//!
//! ## 设计要求（What）
//! - 所有错误类型派生 `thiserror::Error`，并通过 `#[source]` 保留底层 `io::Error`；
//! - 回调返回的业务错误**不**进入本模块，驱动循环原样透传调用方的错误类型；
//! - “干净的流结束”不是失败，只在 [`RefillError::Eof`] 中作为内部信号出现。

use std::io;
use std::time::Duration;

use thiserror::Error;

/// 稳定错误码，与 `spark.transport.tcp.*` 保持相同的点分命名风格。
pub mod codes {
    /// 无法建立 gzip 解压包装。
    pub const DECOMPRESS_FAILED: &str = "spark.ingest.decompress_failed";
    /// 无法为连接设置读取截止时间。
    pub const SET_DEADLINE_FAILED: &str = "spark.ingest.set_deadline_failed";
    /// 读取数据块失败（非超时、非流结束）。
    pub const READ_FAILED: &str = "spark.ingest.read_failed";
    /// 配置非法或无法解析。
    pub const CONFIG_INVALID: &str = "spark.ingest.config_invalid";
}

/// 摄取核心向调用方暴露的终止性错误。
///
/// # 教案式说明
/// - **意图（Why）**：把“建立阶段失败”和“读取阶段失败”区分开，调用方据此决定是否重连；
/// - **契约（What）**：
///   - `Decompress`/`SetDeadline` 属于建立阶段，发生时不会有任何回调被调用；
///   - `Read` 只在非超时、非 EOF 的读取失败时出现，错误已记录在上下文中且不可恢复；
/// - **执行逻辑（How）**：驱动循环要求调用方错误类型实现 `From<IngestError>`，
///   以 `?` 直接上抛本类型。
#[derive(Debug, Error)]
pub enum IngestError {
    /// gzip 魔数缺失或读取失败。
    #[error("cannot read gzipped lines with exposition format: {source}")]
    Decompress {
        #[source]
        source: io::Error,
    },
    /// 连接拒绝设置读取截止时间。
    #[error("cannot set read deadline: {source}")]
    SetDeadline {
        #[source]
        source: io::Error,
    },
    /// 读取数据块失败。
    #[error("cannot read exposition format data: {source}")]
    Read {
        #[source]
        source: RefillError,
    },
}

impl IngestError {
    /// 返回稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            IngestError::Decompress { .. } => codes::DECOMPRESS_FAILED,
            IngestError::SetDeadline { .. } => codes::SET_DEADLINE_FAILED,
            IngestError::Read { .. } => codes::READ_FAILED,
        }
    }
}

/// 行块读取（refill）的结果错误。
///
/// # 契约说明（What）
/// - `Eof`：源已耗尽且没有剩余字节，驱动循环将其视为成功结束；
/// - `Io`：底层读取失败，`elapsed` 记录本次 refill 已等待的时长；
///   若 [`RefillError::is_timeout`] 为真，调用方应当冲刷已读数据而非终止；
/// - `LineTooLong`：在 `limit` 字节内没有找到换行符。
#[derive(Debug, Error)]
pub enum RefillError {
    /// 流已结束。
    #[error("end of stream")]
    Eof,
    /// 底层读取失败。
    #[error("cannot read a block of data in {elapsed:?}: {source}")]
    Io {
        #[source]
        source: io::Error,
        elapsed: Duration,
    },
    /// 单行超过长度上限。
    #[error("too long line: more than {limit} bytes")]
    LineTooLong { limit: usize },
}

impl RefillError {
    /// 判定是否为超时类错误。
    ///
    /// 同时接受 `TimedOut` 与 `WouldBlock`：Unix 上 `SO_RCVTIMEO` 到期报告为后者。
    /// 任何报告为超时的瞬时条件都会触发冲刷。
    pub fn is_timeout(&self) -> bool {
        match self {
            RefillError::Io { source, .. } => is_timeout_kind(source.kind()),
            _ => false,
        }
    }

    /// 判定是否为干净的流结束。
    pub fn is_eof(&self) -> bool {
        matches!(self, RefillError::Eof)
    }
}

pub(crate) fn is_timeout_kind(kind: io::ErrorKind) -> bool {
    matches!(kind, io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
}

/// 配置加载与校验失败。
#[derive(Debug, Error)]
pub enum ConfigError {
    /// TOML 文本无法反序列化。
    #[error("cannot parse ingest config: {0}")]
    Parse(#[from] toml::de::Error),
    /// 字段取值非法。
    #[error("invalid ingest config field `{field}`: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

impl ConfigError {
    /// 返回稳定错误码。
    pub fn code(&self) -> &'static str {
        codes::CONFIG_INVALID
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_predicate_is_broad() {
        // Why: 超时判定需要同时覆盖 Windows 的 TimedOut 与 Unix 的 WouldBlock。
        for kind in [io::ErrorKind::TimedOut, io::ErrorKind::WouldBlock] {
            let err = RefillError::Io {
                source: io::Error::from(kind),
                elapsed: Duration::from_millis(3),
            };
            assert!(err.is_timeout(), "{kind:?} 应被视为超时");
        }
        let reset = RefillError::Io {
            source: io::Error::from(io::ErrorKind::ConnectionReset),
            elapsed: Duration::ZERO,
        };
        assert!(!reset.is_timeout());
        assert!(!RefillError::Eof.is_timeout());
        assert!(RefillError::Eof.is_eof());
    }

    #[test]
    fn read_error_keeps_source_chain() {
        let err = IngestError::Read {
            source: RefillError::LineTooLong { limit: 16 },
        };
        assert_eq!(err.code(), codes::READ_FAILED);
        let source = std::error::Error::source(&err).expect("应保留底层错误");
        assert_eq!(source.to_string(), "too long line: more than 16 bytes");
    }
}
