//! 输入源与读取截止时间能力。
//!
//! # 设计动机（Why）
//! - 只有网络连接类的源才能设置读取截止时间；内存缓冲、文件、解压流都没有这种能力。
//! - 以可选能力（`read_deadline() -> Option<..>`）而不是类型分派表达这一差异，
//!   新的源类型只需实现 [`StreamSource`] 并决定是否暴露 [`ReadDeadline`]。
//!
//! # 截止时间语义（What）
//! - 截止时间是绝对时刻：一次 refill 内部可能多次读取，每次读取前都按剩余时长重新设置；
//! - 截止时刻已过时直接返回 `TimedOut`，不再触碰底层套接字。

use std::fs::File;
use std::io::{self, Cursor, Read, Stdin, StdinLock};
use std::net::TcpStream;
use std::process::ChildStdout;
use std::time::{Duration, Instant};

#[cfg(unix)]
use std::os::unix::net::UnixStream;

/// 标准库拒绝零时长的套接字超时，剩余时间不足时按该值设置。
const MIN_SOCKET_TIMEOUT: Duration = Duration::from_millis(1);

/// 可设置读取截止时间的连接。
pub trait ReadDeadline {
    /// 之后的读取在 `deadline` 时刻仍无数据时应当以超时错误返回。
    fn set_read_deadline(&mut self, deadline: Instant) -> io::Result<()>;
}

/// 摄取循环可消费的字节源。
pub trait StreamSource: Read {
    /// 返回截止时间能力；默认不具备。
    fn read_deadline(&mut self) -> Option<&mut dyn ReadDeadline> {
        None
    }
}

fn remaining_timeout(deadline: Instant) -> Duration {
    deadline
        .saturating_duration_since(Instant::now())
        .max(MIN_SOCKET_TIMEOUT)
}

impl ReadDeadline for TcpStream {
    fn set_read_deadline(&mut self, deadline: Instant) -> io::Result<()> {
        self.set_read_timeout(Some(remaining_timeout(deadline)))
    }
}

impl StreamSource for TcpStream {
    fn read_deadline(&mut self) -> Option<&mut dyn ReadDeadline> {
        Some(self)
    }
}

#[cfg(unix)]
impl ReadDeadline for UnixStream {
    fn set_read_deadline(&mut self, deadline: Instant) -> io::Result<()> {
        self.set_read_timeout(Some(remaining_timeout(deadline)))
    }
}

#[cfg(unix)]
impl StreamSource for UnixStream {
    fn read_deadline(&mut self) -> Option<&mut dyn ReadDeadline> {
        Some(self)
    }
}

impl StreamSource for &[u8] {}

impl<T: AsRef<[u8]>> StreamSource for Cursor<T> {}

impl StreamSource for File {}

impl StreamSource for Stdin {}

impl StreamSource for StdinLock<'_> {}

impl StreamSource for ChildStdout {}

impl<S: StreamSource + ?Sized> StreamSource for Box<S> {
    fn read_deadline(&mut self) -> Option<&mut dyn ReadDeadline> {
        (**self).read_deadline()
    }
}

impl<S: StreamSource + ?Sized> StreamSource for &mut S {
    fn read_deadline(&mut self) -> Option<&mut dyn ReadDeadline> {
        (**self).read_deadline()
    }
}

/// 把任意 [`Read`] 包装为不具备截止时间能力的源。
///
/// 读取可能无限期阻塞，直到有数据或流结束。
#[derive(Debug)]
pub struct PlainSource<R>(pub R);

impl<R: Read> Read for PlainSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl<R: Read> StreamSource for PlainSource<R> {}

/// 一次读取步骤内的截止时间包装。
///
/// 构造时完成首次设置（失败即为致命错误），之后每次读取前按剩余时长重新设置。
pub(crate) struct DeadlineReader<'a, S: ?Sized> {
    inner: &'a mut S,
    deadline: Option<Instant>,
    fresh: bool,
}

impl<'a, S: StreamSource + ?Sized> DeadlineReader<'a, S> {
    /// 具备能力时设置 `now + timeout` 的截止时间；否则退化为直通读取。
    pub(crate) fn arm(inner: &'a mut S, timeout: Duration) -> io::Result<Self> {
        let deadline = match inner.read_deadline() {
            Some(capability) => {
                let deadline = Instant::now() + timeout;
                capability.set_read_deadline(deadline)?;
                Some(deadline)
            }
            None => None,
        };
        Ok(Self {
            inner,
            deadline,
            fresh: true,
        })
    }

    #[cfg(test)]
    pub(crate) fn has_deadline(&self) -> bool {
        self.deadline.is_some()
    }
}

impl<S: StreamSource + ?Sized> Read for DeadlineReader<'_, S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "read deadline exceeded",
                ));
            }
            if !self.fresh {
                if let Some(capability) = self.inner.read_deadline() {
                    capability.set_read_deadline(deadline)?;
                }
            }
            self.fresh = false;
        }
        self.inner.read(buf)
    }
}
