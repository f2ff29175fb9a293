//! 行容器与解码器契约。
//!
//! # 模块定位（Why）
//! - 摄取核心不关心行的具体结构，只需要读写其中的毫秒时间戳；
//! - 解码器是外部协作者，把一段文本就地写入调用方持有的 [`RowBuffer`]。
//!
//! # 复用策略（How）
//! - [`RowBuffer`] 保留历史批次的行对象及其字符串容量，只通过 `len` 暴露当前批次，
//!   重置时不释放内存，后续批次直接覆写旧行。

use std::time::{SystemTime, UNIX_EPOCH};

/// 带毫秒时间戳的行。`0` 表示时间戳缺失。
pub trait Timestamped {
    /// 自 Unix 纪元起的毫秒数。
    fn timestamp(&self) -> i64;

    /// 覆写时间戳。
    fn set_timestamp(&mut self, millis: i64);
}

/// 文本块到行的解码器。
///
/// # 契约说明（What）
/// - `decode` 在调用前收到已 `reset` 的容器，需要通过 [`RowBuffer::push_slot`] 追加行；
///   某行解析失败时可调用 [`RowBuffer::pop_slot`] 丢弃刚取出的槽位；
/// - 畸形行由解码器自行处理（跳过、记录），不得 panic；
/// - `text` 可能以未终结的残行结束（超时冲刷场景），解码器按普通行对待。
pub trait RowDecoder: Send + Sync + 'static {
    /// 解码产物。
    type Row: Timestamped + Default + Send + 'static;

    /// 格式名，作为计数器的 `type` 标签。
    const NAME: &'static str;

    /// 把 `text` 中的全部行写入 `rows`。
    fn decode(&self, text: &[u8], rows: &mut RowBuffer<Self::Row>);
}

/// 可复用的行容器。
#[derive(Debug)]
pub struct RowBuffer<R> {
    slots: Vec<R>,
    len: usize,
}

impl<R> Default for RowBuffer<R> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            len: 0,
        }
    }
}

impl<R> RowBuffer<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// 清空当前批次，保留已分配的行对象。
    pub fn reset(&mut self) {
        self.len = 0;
    }

    /// 丢弃最后一个已取出的槽位，槽位对象留待复用。
    pub fn pop_slot(&mut self) {
        self.len = self.len.saturating_sub(1);
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 已分配（含历史批次遗留）的行对象数量。
    pub fn allocated(&self) -> usize {
        self.slots.len()
    }

    pub fn as_slice(&self) -> &[R] {
        &self.slots[..self.len]
    }

    pub fn as_mut_slice(&mut self) -> &mut [R] {
        &mut self.slots[..self.len]
    }
}

impl<R: Default> RowBuffer<R> {
    /// 取出下一个槽位：优先复用旧行，不足时追加 `R::default()`。
    ///
    /// 复用的旧行保留上一批次的内容，解码器必须覆写全部字段。
    pub fn push_slot(&mut self) -> &mut R {
        if self.len == self.slots.len() {
            self.slots.push(R::default());
        }
        let index = self.len;
        self.len += 1;
        &mut self.slots[index]
    }
}

/// 当前墙钟时间，单位毫秒。时钟早于纪元时返回 0。
pub fn unix_millis_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0)
}

/// 为缺失时间戳的行补齐 `now_ms`，已有时间戳的行保持不变。
pub(crate) fn backfill_timestamps<R: Timestamped>(rows: &mut [R], now_ms: i64) {
    for row in rows.iter_mut().filter(|row| row.timestamp() == 0) {
        row.set_timestamp(now_ms);
    }
}
