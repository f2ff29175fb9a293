//! Tokio 运行时下的输入源。
//!
//! # 设计动机（Why）
//! - 异步连接没有可设置的套接字超时，截止时间改由 `tokio::time::timeout_at` 包裹整次 refill；
//! - 因此源只需声明“是否参与截止时间”，不再需要设置接口。
//!
//! # 契约（What）
//! - 声明支持的源在 `flush_timeout` 内没有送完一行时，已读字节照常冲刷；
//! - 不支持的源（内存缓冲、管道）读取会一直等待到有数据或流结束。

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, DuplexStream, ReadBuf};
use tokio::net::TcpStream;

#[cfg(unix)]
use tokio::net::UnixStream;

/// 异步摄取循环可消费的字节源。
pub trait AsyncStreamSource: AsyncRead + Unpin {
    /// 是否对读取施加截止时间；默认不施加。
    fn supports_read_deadline(&self) -> bool {
        false
    }
}

impl AsyncStreamSource for TcpStream {
    fn supports_read_deadline(&self) -> bool {
        true
    }
}

#[cfg(unix)]
impl AsyncStreamSource for UnixStream {
    fn supports_read_deadline(&self) -> bool {
        true
    }
}

impl AsyncStreamSource for &[u8] {}

impl AsyncStreamSource for DuplexStream {}

impl<S: AsyncStreamSource + ?Sized> AsyncStreamSource for Box<S> {
    fn supports_read_deadline(&self) -> bool {
        (**self).supports_read_deadline()
    }
}

impl<S: AsyncStreamSource + ?Sized> AsyncStreamSource for &mut S {
    fn supports_read_deadline(&self) -> bool {
        (**self).supports_read_deadline()
    }
}

/// 为任意异步读取器开启截止时间。
///
/// 适用于自定义传输层（如已完成握手的加密连接）或测试中的 `DuplexStream`。
#[derive(Debug)]
pub struct Deadlined<R>(pub R);

impl<R> Deadlined<R> {
    pub fn into_inner(self) -> R {
        self.0
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for Deadlined<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_read(cx, buf)
    }
}

impl<R: AsyncRead + Unpin> AsyncStreamSource for Deadlined<R> {
    fn supports_read_deadline(&self) -> bool {
        true
    }
}
