use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};

/// 摄取链路的三个单调计数器。
///
/// # 教案式说明
/// - **意图（Why）**：读取次数、读取失败次数与解码行数是判断连接是否健康的最小集合；
/// - **契约（What）**：核心只做 `fetch_add`，从不读取计数器影响控制流；
///   `label` 写入渲染结果的 `type` 标签，用于区分不同解码格式；
/// - **执行逻辑（How）**：全部使用 `Ordering::Relaxed`，计数之间不建立先后关系。
#[derive(Debug)]
pub struct IngestMetrics {
    label: &'static str,
    read_calls: AtomicU64,
    read_errors: AtomicU64,
    rows_read: AtomicU64,
}

/// 计数器某一时刻的只读快照。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub read_calls: u64,
    pub read_errors: u64,
    pub rows_read: u64,
}

impl IngestMetrics {
    /// 创建全零计数器。
    pub const fn new(label: &'static str) -> Self {
        Self {
            label,
            read_calls: AtomicU64::new(0),
            read_errors: AtomicU64::new(0),
            rows_read: AtomicU64::new(0),
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub(crate) fn inc_read_calls(&self) {
        self.read_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_read_errors(&self) {
        self.read_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_rows_read(&self, rows: usize) {
        self.rows_read.fetch_add(rows as u64, Ordering::Relaxed);
    }

    /// 读取当前计数。
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            read_calls: self.read_calls.load(Ordering::Relaxed),
            read_errors: self.read_errors.load(Ordering::Relaxed),
            rows_read: self.rows_read.load(Ordering::Relaxed),
        }
    }

    /// 以 Prometheus 文本格式渲染计数器，每个计数器一行。
    pub fn render_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        let mut out = String::new();
        for (name, value) in [
            ("spark_ingest_read_calls_total", snapshot.read_calls),
            ("spark_ingest_read_errors_total", snapshot.read_errors),
            ("spark_ingest_rows_read_total", snapshot.rows_read),
        ] {
            // 写入 String 不会失败。
            let _ = writeln!(out, "{name}{{type=\"{}\"}} {value}", self.label);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_uses_label_and_current_values() {
        let metrics = IngestMetrics::new("prometheus");
        metrics.inc_read_calls();
        metrics.inc_read_calls();
        metrics.inc_read_errors();
        metrics.add_rows_read(5);
        assert_eq!(
            metrics.snapshot(),
            MetricsSnapshot {
                read_calls: 2,
                read_errors: 1,
                rows_read: 5,
            }
        );
        let text = metrics.render_prometheus();
        assert!(text.contains("spark_ingest_read_calls_total{type=\"prometheus\"} 2\n"));
        assert!(text.contains("spark_ingest_read_errors_total{type=\"prometheus\"} 1\n"));
        assert!(text.contains("spark_ingest_rows_read_total{type=\"prometheus\"} 5\n"));
    }
}
