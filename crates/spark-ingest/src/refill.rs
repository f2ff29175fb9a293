use std::io::{self, Read};
use std::time::Instant;

use bytes::BytesMut;

use crate::config::StreamConfig;
use crate::error::RefillError;

const NEWLINE: u8 = b'\n';

/// 按整行切分的块读取器。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 网络读取的边界与行边界无关，一次读取可能在行中间截断；
///   refill 负责把“上次残留的半行 + 新读入的字节”重新组织为“若干完整行 + 新残行”。
///
/// ## 契约（What）
/// - 输入：`chunk` 为可复用的目标缓冲（旧内容会被丢弃），`tail` 为上次留下的残行；
/// - 成功：`chunk` 以完整行结束（末尾换行符被剥离），`tail` 持有最后一个换行之后的字节；
///   源结束时若仍有未以换行结尾的字节，也作为成功返回，EOF 延迟到下一次调用报告；
/// - 失败：[`RefillError::Io`] 时 `chunk` 保留已读入的全部字节（含残行），`tail` 为空，
///   调用方在超时场景下可直接冲刷这些字节；
/// - 行长超过 `max_line_len` 仍未见换行时返回 [`RefillError::LineTooLong`]。
///
/// ## 实现逻辑（How）
/// 1. 把 `tail` 搬入 `chunk` 开头，至少预留 `block_size` 容量；
/// 2. 读入剩余容量；只在新读入的字节中反向查找最后一个换行符；
/// 3. 未找到则在容量不足两倍时扩容并继续读，找到则切分残行。
///
/// ## 注意事项（Trade-offs）
/// - 同步路径需要把空闲容量清零后再交给 `Read`，每次读取多一次 memset；
///   换来的是不需要任何 `unsafe`。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LineBlockReader {
    block_size: usize,
    max_line_len: usize,
}

enum Progress {
    Complete,
    NeedMore,
}

impl LineBlockReader {
    pub const fn new(block_size: usize, max_line_len: usize) -> Self {
        Self {
            block_size,
            max_line_len,
        }
    }

    pub fn from_config(config: &StreamConfig) -> Self {
        Self::new(config.block_size(), config.max_line_len())
    }

    /// 从阻塞式读取器拉取一个以整行结束的数据块。
    pub fn refill<R: Read + ?Sized>(
        &self,
        reader: &mut R,
        chunk: &mut BytesMut,
        tail: &mut BytesMut,
    ) -> Result<(), RefillError> {
        let started = Instant::now();
        self.begin(chunk, tail);
        loop {
            self.ensure_spare(chunk);
            let filled = chunk.len();
            chunk.resize(chunk.capacity(), 0);
            let result = reader.read(&mut chunk[filled..]);
            let read = match result {
                Ok(read) => read,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {
                    chunk.truncate(filled);
                    continue;
                }
                Err(source) => {
                    chunk.truncate(filled);
                    return Err(RefillError::Io {
                        source,
                        elapsed: started.elapsed(),
                    });
                }
            };
            chunk.truncate(filled + read);
            if read == 0 {
                return finish_at_eof(chunk);
            }
            if let Progress::Complete = self.commit(chunk, tail, read)? {
                return Ok(());
            }
        }
    }

    /// 异步版本：`deadline` 覆盖整次 refill，到期按超时错误返回，已读字节保留在 `chunk` 中。
    #[cfg(feature = "runtime-tokio")]
    pub async fn refill_async<R>(
        &self,
        reader: &mut R,
        chunk: &mut BytesMut,
        tail: &mut BytesMut,
        deadline: Option<tokio::time::Instant>,
    ) -> Result<(), RefillError>
    where
        R: tokio::io::AsyncRead + Unpin,
    {
        use tokio::io::AsyncReadExt;

        let started = Instant::now();
        self.begin(chunk, tail);
        loop {
            self.ensure_spare(chunk);
            // `read_buf` 在被取消时不会丢弃已读字节，可以安全地与超时组合。
            let pending = reader.read_buf(chunk);
            let result = match deadline {
                Some(at) => match tokio::time::timeout_at(at, pending).await {
                    Ok(result) => result,
                    Err(_) => Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "read deadline exceeded",
                    )),
                },
                None => pending.await,
            };
            match result {
                Ok(0) => return finish_at_eof(chunk),
                Ok(read) => {
                    if let Progress::Complete = self.commit(chunk, tail, read)? {
                        return Ok(());
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(source) => {
                    return Err(RefillError::Io {
                        source,
                        elapsed: started.elapsed(),
                    });
                }
            }
        }
    }

    fn begin(&self, chunk: &mut BytesMut, tail: &mut BytesMut) {
        chunk.clear();
        chunk.reserve(self.block_size.max(tail.len()));
        chunk.extend_from_slice(tail);
        tail.clear();
    }

    fn ensure_spare(&self, chunk: &mut BytesMut) {
        if chunk.len() == chunk.capacity() {
            chunk.reserve(self.block_size);
        }
    }

    /// 处理刚追加到 `chunk` 末尾的 `read` 个字节。
    fn commit(
        &self,
        chunk: &mut BytesMut,
        tail: &mut BytesMut,
        read: usize,
    ) -> Result<Progress, RefillError> {
        let start = chunk.len() - read;
        match chunk[start..].iter().rposition(|byte| *byte == NEWLINE) {
            Some(offset) => {
                let newline = start + offset;
                tail.extend_from_slice(&chunk[newline + 1..]);
                chunk.truncate(newline);
                Ok(Progress::Complete)
            }
            None => {
                if chunk.len() > self.max_line_len {
                    return Err(RefillError::LineTooLong {
                        limit: self.max_line_len,
                    });
                }
                if chunk.capacity() < 2 * chunk.len() {
                    chunk.reserve(chunk.len());
                }
                Ok(Progress::NeedMore)
            }
        }
    }
}

impl Default for LineBlockReader {
    fn default() -> Self {
        Self::from_config(&StreamConfig::default())
    }
}

/// 源已结束：仍有字节（缺少结尾换行）时作为最后一块返回，否则报告 EOF。
fn finish_at_eof(chunk: &BytesMut) -> Result<(), RefillError> {
    if chunk.is_empty() {
        Err(RefillError::Eof)
    } else {
        Ok(())
    }
}
