use spark_ingest::Timestamped;

/// 一个标签键值对。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

/// 一行 Prometheus 文本暴露格式样本。
///
/// `timestamp` 为毫秒；源数据未携带时由摄取核心补齐为批次读取时刻。
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Row {
    pub metric: String,
    pub tags: Vec<Tag>,
    pub value: f64,
    pub timestamp: i64,
}

impl Row {
    /// 按键查找标签值。
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|tag| tag.key == key)
            .map(|tag| tag.value.as_str())
    }

    /// 清空内容，保留字符串与标签向量的容量。
    pub(crate) fn clear(&mut self) {
        self.metric.clear();
        self.tags.clear();
        self.value = 0.0;
        self.timestamp = 0;
    }
}

impl Timestamped for Row {
    fn timestamp(&self) -> i64 {
        self.timestamp
    }

    fn set_timestamp(&mut self, millis: i64) {
        self.timestamp = millis;
    }
}
