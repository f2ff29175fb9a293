//! `exposition_stream` 集成测试：以使用者视角验证 Prometheus 文本流的端到端解析。
//!
//! # 测试目标（Why）
//! - 锁定最小场景：两行无时间戳样本在一次回调内交付，时间戳被补齐为同一个当前毫秒；
//! - 覆盖 gzip 输入、慢速连接的超时冲刷，以及任意读取切分下的结果稳定性。

use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

use flate2::Compression;
use flate2::write::GzEncoder;
use proptest::prelude::*;
use spark_codec_prom::{PromDecoder, Row, parse_stream};
use spark_ingest::{IngestError, StreamConfig, StreamParser, StreamSource, unix_millis_now};

fn gzip(payload: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(payload).expect("写入压缩数据");
    encoder.finish().expect("完成压缩")
}

fn collect_batches(
    parser: &StreamParser<PromDecoder>,
    source: impl StreamSource,
    gzipped: bool,
) -> Vec<Vec<Row>> {
    let mut batches = Vec::new();
    parser
        .parse_stream(source, gzipped, |rows: &[Row]| {
            batches.push(rows.to_vec());
            Ok::<(), IngestError>(())
        })
        .expect("解析应成功");
    batches
}

/// 两行无时间戳样本：恰好一次回调、两行、时间戳相同且落在调用时间窗口内。
#[test]
fn two_plain_samples_arrive_in_one_batch_with_shared_timestamp() {
    let before = unix_millis_now();
    let mut calls = Vec::new();
    parse_stream(&b"metric1 1\nmetric2 2\n"[..], false, |rows: &[Row]| {
        calls.push(rows.to_vec());
        Ok::<(), IngestError>(())
    })
    .expect("解析应成功");
    let after = unix_millis_now();

    assert_eq!(calls.len(), 1, "只应有一次回调");
    let rows = &calls[0];
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].metric, "metric1");
    assert_eq!(rows[0].value, 1.0);
    assert_eq!(rows[1].metric, "metric2");
    assert_eq!(rows[1].value, 2.0);
    assert_eq!(rows[0].timestamp, rows[1].timestamp);
    assert!(rows[0].timestamp >= before && rows[0].timestamp <= after);
}

/// 压缩输入（含多个 gzip 成员拼接）与明文输入得到相同的行。
#[test]
fn gzipped_input_matches_plain_input() {
    let text = b"# TYPE up gauge\nup{job=\"a\"} 1 1000\nup{job=\"b\"} 0 2000\n";
    let mut compressed = gzip(&text[..20]);
    compressed.extend(gzip(&text[20..]));

    let parser = StreamParser::new(PromDecoder::new());
    let plain = collect_batches(&parser, &text[..], false).concat();
    let unzipped = collect_batches(&parser, io::Cursor::new(compressed), true).concat();

    assert_eq!(plain.len(), 2);
    assert_eq!(plain, unzipped);
    assert_eq!(plain[1].tag("job"), Some("b"));
    assert_eq!(plain[1].timestamp, 2000);
}

/// 声明压缩但输入是明文：建立阶段失败，错误可由调用方自己的错误类型承载。
#[test]
fn gzip_flag_on_plain_text_fails_with_setup_error() {
    let err = parse_stream(&b"metric1 1\n"[..], true, |_rows: &[Row]| -> anyhow::Result<()> {
        panic!("建立失败时不应调用回调")
    })
    .expect_err("非 gzip 输入");
    let ingest = err.downcast_ref::<IngestError>().expect("应为摄取错误");
    assert_eq!(ingest.code(), spark_ingest::codes::DECOMPRESS_FAILED);
}

/// 慢速推送端：未以换行结束的最后一行在冲刷超时后交付。
#[test]
fn unterminated_line_from_slow_peer_is_flushed() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("绑定监听");
    let addr = listener.local_addr().expect("本地地址");
    let (release, hold) = std::sync::mpsc::channel::<()>();
    let writer = thread::spawn(move || {
        let mut peer = TcpStream::connect(addr).expect("建立连接");
        peer.write_all(b"metric1 1\nmetric2 2").expect("写入");
        // 收到信号（或测试结束）前保持连接打开。
        let _ = hold.recv_timeout(Duration::from_secs(5));
    });
    let (stream, _) = listener.accept().expect("接受连接");

    let config = StreamConfig::default().with_flush_timeout(Duration::from_millis(100));
    let parser = StreamParser::with_config(PromDecoder::new(), config).expect("配置合法");
    let mut metrics = Vec::new();
    let result = parser.parse_stream(stream, false, |rows: &[Row]| -> anyhow::Result<()> {
        metrics.extend(rows.iter().map(|row| row.metric.clone()));
        if metrics.len() == 2 {
            anyhow::bail!("enough");
        }
        Ok(())
    });
    let _ = release.send(());
    writer.join().expect("写入线程");

    assert_eq!(result.expect_err("回调主动停止").to_string(), "enough");
    assert_eq!(metrics, vec!["metric1", "metric2"]);
}

/// 每次最多返回 `step` 字节的读取器。
struct Trickle<'a> {
    data: &'a [u8],
    step: usize,
}

impl Read for Trickle<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.step.min(buf.len()).min(self.data.len());
        buf[..n].copy_from_slice(&self.data[..n]);
        self.data = &self.data[n..];
        Ok(n)
    }
}

impl StreamSource for Trickle<'_> {}

fn sample() -> impl Strategy<Value = (String, String, i64, Option<i64>)> {
    (
        "[a-z_][a-z0-9_]{0,12}",
        "[a-zA-Z0-9 ,=\"\\\\{}]{0,10}",
        -1_000_000i64..1_000_000,
        prop::option::of(1i64..4_000_000_000_000),
    )
}

fn render(samples: &[(String, String, i64, Option<i64>)]) -> String {
    let mut text = String::new();
    for (name, label, value, ts) in samples {
        let escaped = label.replace('\\', "\\\\").replace('"', "\\\"");
        text.push_str(&format!("{name}{{label=\"{escaped}\"}} {value}"));
        if let Some(ts) = ts {
            text.push_str(&format!(" {ts}"));
        }
        text.push('\n');
    }
    text
}

proptest! {
    /// 无论读取如何切分，解析结果都与样本一致。
    #[test]
    fn trickled_stream_yields_every_sample(
        samples in prop::collection::vec(sample(), 0..40),
        step in 1usize..64,
    ) {
        let text = render(&samples);
        let config = StreamConfig::default().with_block_size(32);
        let parser = StreamParser::with_config(PromDecoder::new(), config).expect("配置合法");
        let rows = collect_batches(&parser, Trickle { data: text.as_bytes(), step }, false).concat();

        prop_assert_eq!(rows.len(), samples.len());
        for (row, (name, label, value, ts)) in rows.iter().zip(&samples) {
            prop_assert_eq!(&row.metric, name);
            prop_assert_eq!(row.tag("label"), Some(label.as_str()));
            prop_assert_eq!(row.value, *value as f64);
            if let Some(ts) = ts {
                prop_assert_eq!(row.timestamp, *ts);
            } else {
                prop_assert!(row.timestamp > 0);
            }
        }
        prop_assert_eq!(parser.decoder().invalid_lines(), 0);
    }
}

#[cfg(feature = "runtime-tokio")]
#[tokio::test]
async fn async_stream_shares_the_global_parser() {
    use tokio::io::AsyncWriteExt;

    let (client, mut server) = tokio::io::duplex(128);
    tokio::spawn(async move {
        server
            .write_all(b"up 1\n# comment\ndown 0\n")
            .await
            .expect("写入对端");
    });

    let mut names = Vec::new();
    spark_codec_prom::parse_stream_async(client, |rows: &[Row]| {
        names.extend(rows.iter().map(|row| row.metric.clone()));
        Ok::<(), IngestError>(())
    })
    .await
    .expect("解析");
    assert_eq!(names, vec!["up", "down"]);
    assert_eq!(spark_codec_prom::parser().metrics().label(), "prometheus");
}
