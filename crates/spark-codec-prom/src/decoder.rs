use std::sync::atomic::{AtomicU64, Ordering};

use spark_ingest::{RowBuffer, RowDecoder};

use crate::line::{LineError, parse_line};
use crate::row::Row;

/// Prometheus 文本暴露格式解码器。
///
/// # 教案式说明
/// - **意图（Why）**：抓取目标输出的文本中混有注释与偶发的畸形行，单行出错不应丢弃整批数据；
/// - **逻辑（How）**：按 `\n` 切行，去除首尾空白（含 `\r`），跳过空行与 `#` 开头的
///   `HELP`/`TYPE` 注释，其余逐行解析到复用的行槽位；
/// - **契约（What）**：解析失败的行被跳过、以 `warn` 级别记录并计入 [`PromDecoder::invalid_lines`]，
///   其余行按原顺序保留。
#[derive(Debug, Default)]
pub struct PromDecoder {
    invalid_lines: AtomicU64,
}

impl PromDecoder {
    pub const fn new() -> Self {
        Self {
            invalid_lines: AtomicU64::new(0),
        }
    }

    /// 累计被跳过的畸形行数。
    pub fn invalid_lines(&self) -> u64 {
        self.invalid_lines.load(Ordering::Relaxed)
    }

    /// 以 Prometheus 文本格式渲染解码器自身的计数器。
    pub fn render_prometheus(&self) -> String {
        format!(
            "spark_ingest_invalid_lines_total{{type=\"{}\"}} {}\n",
            Self::NAME,
            self.invalid_lines()
        )
    }

    fn reject(&self, line: &str, error: &LineError) {
        self.invalid_lines.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(%line, %error, "skipping invalid Prometheus exposition line");
    }
}

impl RowDecoder for PromDecoder {
    type Row = Row;
    const NAME: &'static str = "prometheus";

    fn decode(&self, text: &[u8], rows: &mut RowBuffer<Row>) {
        for raw in text.split(|byte| *byte == b'\n') {
            let line = match std::str::from_utf8(raw) {
                Ok(line) => line.trim(),
                Err(_) => {
                    self.reject(&String::from_utf8_lossy(raw), &LineError::InvalidUtf8);
                    continue;
                }
            };
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Err(error) = parse_line(line, rows.push_slot()) {
                rows.pop_slot();
                self.reject(line, &error);
            }
        }
    }
}
