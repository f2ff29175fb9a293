use std::num::NonZeroUsize;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_queue::ArrayQueue;
use spin::Mutex;

use crate::context::StreamContext;

/// 两级的流上下文池。
///
/// # 模块角色（Why）
/// - 每条流都需要一份行容器与读写缓冲；高频短连接下反复分配代价明显。
/// - 常态并发约等于处理器数量，因此第一级用定长无锁队列承接这部分流量；
///   突发并发溢出到第二级的自由链表，数量不超过历史峰值的活跃流数。
///
/// # 核心机制（How）
/// - 有界层：`crossbeam_queue::ArrayQueue`，`push`/`pop` 均为无阻塞 CAS；
/// - 溢出层：`spin::Mutex<Vec<_>>` 自由链表，临界区只有一次 `push`/`pop`；
/// - `acquire`：有界层 → 溢出层 → 新分配；`release`：先重置，再有界层 → 溢出层。
///
/// # 契约说明（What）
/// - 取出的上下文一定处于重置状态；
/// - 归还从不阻塞调用方，也从不丢弃上下文；
/// - [`PooledContext`] 在 `Drop` 时自动归还，包括回调出错与 panic 展开的路径。
pub struct ContextPool<R> {
    bounded: ArrayQueue<Box<StreamContext<R>>>,
    overflow: Mutex<Vec<Box<StreamContext<R>>>>,
    allocations: AtomicU64,
    reuses: AtomicU64,
}

/// 池状态快照。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// 有界层容量。
    pub bounded_capacity: usize,
    /// 有界层当前空闲上下文数。
    pub bounded_idle: usize,
    /// 溢出层当前空闲上下文数。
    pub overflow_idle: usize,
    /// 累计新分配次数。
    pub allocations: u64,
    /// 累计复用次数。
    pub reuses: u64,
}

impl<R> ContextPool<R> {
    /// 创建有界层容量为 `capacity` 的空池。
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            bounded: ArrayQueue::new(capacity.get()),
            overflow: Mutex::new(Vec::new()),
            allocations: AtomicU64::new(0),
            reuses: AtomicU64::new(0),
        }
    }

    /// 租借一个上下文，守卫析构时自动归还。
    pub fn acquire(&self) -> PooledContext<'_, R> {
        PooledContext {
            pool: self,
            context: Some(self.take()),
        }
    }

    fn take(&self) -> Box<StreamContext<R>> {
        if let Some(context) = self.bounded.pop() {
            self.reuses.fetch_add(1, Ordering::Relaxed);
            return context;
        }
        if let Some(context) = self.overflow.lock().pop() {
            self.reuses.fetch_add(1, Ordering::Relaxed);
            return context;
        }
        self.allocations.fetch_add(1, Ordering::Relaxed);
        tracing::trace!("stream context pool miss, allocating");
        Box::default()
    }

    /// 重置并归还上下文。
    pub fn release(&self, mut context: Box<StreamContext<R>>) {
        context.reset();
        if let Err(context) = self.bounded.push(context) {
            self.overflow.lock().push(context);
        }
    }

    /// 丢弃溢出层中的全部上下文，返回释放数量。
    pub fn shrink_to_fit(&self) -> usize {
        let drained = std::mem::take(&mut *self.overflow.lock());
        drained.len()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            bounded_capacity: self.bounded.capacity(),
            bounded_idle: self.bounded.len(),
            overflow_idle: self.overflow.lock().len(),
            allocations: self.allocations.load(Ordering::Relaxed),
            reuses: self.reuses.load(Ordering::Relaxed),
        }
    }
}

/// 从 [`ContextPool`] 租借的上下文守卫。
pub struct PooledContext<'a, R> {
    pool: &'a ContextPool<R>,
    // 仅在 Drop 中取走。
    context: Option<Box<StreamContext<R>>>,
}

impl<R> Deref for PooledContext<'_, R> {
    type Target = StreamContext<R>;

    fn deref(&self) -> &Self::Target {
        self.context
            .as_deref()
            .expect("pooled context is present until dropped")
    }
}

impl<R> DerefMut for PooledContext<'_, R> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.context
            .as_deref_mut()
            .expect("pooled context is present until dropped")
    }
}

impl<R> Drop for PooledContext<'_, R> {
    fn drop(&mut self) {
        if let Some(context) = self.context.take() {
            self.pool.release(context);
        }
    }
}
