use std::io::{self, Chain, Cursor, Read};

use flate2::read::MultiGzDecoder;

use crate::error::IngestError;
use crate::source::StreamSource;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// gzip 解压后的字节源。
///
/// 解压流不再暴露底层连接的截止时间能力，读取可能阻塞直到有数据或流结束。
pub struct GzipSource<S> {
    decoder: MultiGzDecoder<Chain<Cursor<[u8; 2]>, S>>,
}

/// 为 `source` 建立 gzip 解压包装。
///
/// # 教案式说明
/// - **意图（Why）**：在处理任何数据之前就识别“声明压缩但不是 gzip”的输入，
///   让调用方得到建立阶段错误，而不是在回调收到若干批次后才失败；
/// - **逻辑（How）**：先读取两个魔数字节并校验，再把它们与剩余的源拼接后交给
///   `MultiGzDecoder`，连续拼接的多个 gzip 成员会被依次解压；
/// - **契约（What）**：魔数读取失败（包括空输入）或不匹配时返回 [`IngestError::Decompress`]。
pub fn wrap<S: StreamSource>(mut source: S) -> Result<GzipSource<S>, IngestError> {
    let mut magic = [0u8; 2];
    source
        .read_exact(&mut magic)
        .map_err(|source| IngestError::Decompress { source })?;
    if magic != GZIP_MAGIC {
        return Err(IngestError::Decompress {
            source: io::Error::new(io::ErrorKind::InvalidData, "invalid gzip header"),
        });
    }
    Ok(GzipSource {
        decoder: MultiGzDecoder::new(Cursor::new(magic).chain(source)),
    })
}

impl<S> GzipSource<S> {
    /// 取回底层源，未消费的压缩字节随之丢弃。
    pub fn into_inner(self) -> S {
        let (_, source) = self.decoder.into_inner().into_inner();
        source
    }
}

impl<S: Read> Read for GzipSource<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.decoder.read(buf)
    }
}

impl<S: Read> StreamSource for GzipSource<S> {}
