//! JSON 格式轉換：資料項目串流 ⇄ 位元組串流

use crate::core::blob_source::BlobReader;
use crate::domain::model::{BoxedDataItem, DataItemStream, Record};
use crate::domain::ports::StreamWriter;
use crate::utils::error::{ConnectorError, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::debug;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// 把資料項目序列化為 JSON 陣列寫入串流
pub struct JsonStreamWriter {
    items: DataItemStream,
    indented: bool,
}

impl JsonStreamWriter {
    pub fn new(items: DataItemStream, indented: bool) -> Self {
        Self { items, indented }
    }
}

#[async_trait]
impl StreamWriter for JsonStreamWriter {
    async fn write_to(mut self, stream: &mut (dyn AsyncWrite + Send + Unpin)) -> Result<()> {
        let mut out = BufWriter::new(stream);
        let mut count = 0usize;

        out.write_all(b"[").await?;
        while let Some(item) = self.items.next().await {
            let object = Value::Object(item?.to_json());

            if count > 0 {
                out.write_all(b",").await?;
            }
            if self.indented {
                out.write_all(b"\n").await?;
                let pretty = serde_json::to_string_pretty(&object)?;
                for (i, line) in pretty.lines().enumerate() {
                    if i > 0 {
                        out.write_all(b"\n").await?;
                    }
                    out.write_all(b"  ").await?;
                    out.write_all(line.as_bytes()).await?;
                }
            } else {
                out.write_all(&serde_json::to_vec(&object)?).await?;
            }
            count += 1;
        }
        if self.indented && count > 0 {
            out.write_all(b"\n").await?;
        }
        out.write_all(b"]").await?;
        out.flush().await?;

        debug!("Serialized {} records as JSON", count);
        Ok(())
    }
}

/// 每次從 blob 讀取的位元組數
const READ_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    Unknown,
    ArrayStart,
    ArrayNext,
    Values,
    Done,
}

/// 逐段讀取並逐一解析 JSON 值，記憶體只保留尚未解析完的部分
struct JsonValueReader {
    reader: BlobReader,
    buffer: Vec<u8>,
    pos: usize,
    eof: bool,
    layout: Layout,
    index: usize,
}

fn unexpected_end() -> ConnectorError {
    ConnectorError::conversion("unexpected end of JSON input")
}

impl JsonValueReader {
    fn new(reader: BlobReader) -> Self {
        Self {
            reader,
            buffer: Vec::new(),
            pos: 0,
            eof: false,
            layout: Layout::Unknown,
            index: 0,
        }
    }

    async fn fill(&mut self) -> Result<()> {
        self.buffer.drain(..self.pos);
        self.pos = 0;

        let start = self.buffer.len();
        self.buffer.resize(start + READ_CHUNK_SIZE, 0);
        let read = self
            .reader
            .read(&mut self.buffer[start..])
            .await
            .map_err(ConnectorError::from_io)?;
        self.buffer.truncate(start + read);
        if read == 0 {
            self.eof = true;
        }
        Ok(())
    }

    /// 跳過空白，回傳下一個位元組但不消耗
    async fn peek(&mut self) -> Result<Option<u8>> {
        loop {
            while let Some(&byte) = self.buffer.get(self.pos) {
                if !byte.is_ascii_whitespace() {
                    return Ok(Some(byte));
                }
                self.pos += 1;
            }
            if self.eof {
                return Ok(None);
            }
            self.fill().await?;
        }
    }

    /// 解析目前位置的一個完整值；資料不足時再讀一段重試
    async fn parse_value(&mut self) -> Result<Value> {
        loop {
            let mut values =
                serde_json::Deserializer::from_slice(&self.buffer[self.pos..]).into_iter::<Value>();
            match values.next() {
                Some(Ok(value)) => {
                    self.pos += values.byte_offset();
                    return Ok(value);
                }
                Some(Err(e)) if e.is_eof() && !self.eof => {}
                Some(Err(e)) => return Err(e.into()),
                None if !self.eof => {}
                None => return Err(unexpected_end()),
            }
            self.fill().await?;
        }
    }

    async fn skip_bom(&mut self) -> Result<()> {
        while self.buffer.len() - self.pos < UTF8_BOM.len() && !self.eof {
            self.fill().await?;
        }
        if self.buffer[self.pos..].starts_with(UTF8_BOM) {
            self.pos += UTF8_BOM.len();
        }
        Ok(())
    }

    async fn close_array(&mut self) -> Result<()> {
        self.pos += 1;
        self.layout = Layout::Done;
        match self.peek().await? {
            None => Ok(()),
            Some(byte) => Err(ConnectorError::conversion(format!(
                "unexpected '{}' after the closing bracket of the JSON array",
                byte as char
            ))),
        }
    }

    async fn next_value(&mut self) -> Result<Option<Value>> {
        loop {
            match self.layout {
                Layout::Done => return Ok(None),
                Layout::Unknown => {
                    self.skip_bom().await?;
                    self.layout = match self.peek().await? {
                        Some(b'[') => {
                            self.pos += 1;
                            Layout::ArrayStart
                        }
                        Some(_) => Layout::Values,
                        None => Layout::Done,
                    };
                }
                Layout::ArrayStart => match self.peek().await? {
                    Some(b']') => self.close_array().await?,
                    Some(_) => {
                        self.layout = Layout::ArrayNext;
                        return self.parse_value().await.map(Some);
                    }
                    None => return Err(unexpected_end()),
                },
                Layout::ArrayNext => match self.peek().await? {
                    Some(b',') => {
                        self.pos += 1;
                        return self.parse_value().await.map(Some);
                    }
                    Some(b']') => self.close_array().await?,
                    Some(other) => {
                        return Err(ConnectorError::conversion(format!(
                            "expected ',' or ']' in JSON array, found '{}'",
                            other as char
                        )))
                    }
                    None => return Err(unexpected_end()),
                },
                Layout::Values => match self.peek().await? {
                    Some(_) => return self.parse_value().await.map(Some),
                    None => self.layout = Layout::Done,
                },
            }
        }
    }
}

async fn next_record(mut state: JsonValueReader) -> Result<Option<(BoxedDataItem, JsonValueReader)>> {
    let Some(value) = state.next_value().await? else {
        debug!("Parsed {} JSON records", state.index);
        return Ok(None);
    };

    let index = state.index;
    state.index += 1;
    match value {
        Value::Object(object) => Ok(Some((Record::from_json(object).boxed(), state))),
        other => Err(ConnectorError::conversion(format!(
            "expected a JSON object at position {}, found {}",
            index, other
        ))),
    }
}

/// 串流解析位元組為資料項目
///
/// 接受 JSON 陣列、單一物件或以換行分隔的物件。
pub fn read_items(reader: BlobReader) -> DataItemStream {
    stream::try_unfold(JsonValueReader::new(reader), next_record).boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use serde_json::json;

    fn items(values: Vec<Value>) -> DataItemStream {
        let items: Vec<Result<BoxedDataItem>> = values
            .into_iter()
            .map(|v| match v {
                Value::Object(o) => Ok(Record::from_json(o).boxed()),
                _ => Err(ConnectorError::conversion("not an object")),
            })
            .collect();
        stream::iter(items).boxed()
    }

    async fn serialize(values: Vec<Value>, indented: bool) -> Result<String> {
        let mut out: Vec<u8> = Vec::new();
        JsonStreamWriter::new(items(values), indented)
            .write_to(&mut out)
            .await?;
        Ok(String::from_utf8(out).unwrap())
    }

    #[tokio::test]
    async fn test_writes_compact_array() {
        let text = serialize(vec![json!({ "id": 1 }), json!({ "id": 2, "name": "b" })], false)
            .await
            .unwrap();

        assert_eq!(text, r#"[{"id":1},{"id":2,"name":"b"}]"#);
    }

    #[tokio::test]
    async fn test_writes_indented_array() {
        let text = serialize(vec![json!({ "id": 1 })], true).await.unwrap();

        assert_eq!(text, "[\n  {\n    \"id\": 1\n  }\n]");
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, json!([{ "id": 1 }]));
    }

    #[tokio::test]
    async fn test_empty_stream_writes_empty_array() {
        assert_eq!(serialize(vec![], false).await.unwrap(), "[]");
        assert_eq!(serialize(vec![], true).await.unwrap(), "[]");
    }

    #[tokio::test]
    async fn test_item_error_is_propagated() {
        let err = serialize(vec![json!({ "id": 1 }), json!(5)], false)
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectorError::ConversionError { .. }));
    }

    /// 每段各自一次 read，模擬 blob 分段抵達
    async fn read_chunks(chunks: &[&[u8]]) -> Result<Vec<BoxedDataItem>> {
        let mut builder = tokio_test::io::Builder::new();
        for chunk in chunks {
            builder.read(chunk);
        }
        let reader: BlobReader = Box::pin(builder.build());
        read_items(reader).try_collect().await
    }

    async fn read_bytes(bytes: &[u8]) -> Result<Vec<BoxedDataItem>> {
        let reader: BlobReader = Box::pin(std::io::Cursor::new(bytes.to_vec()));
        read_items(reader).try_collect().await
    }

    #[tokio::test]
    async fn test_reads_array_object_and_ndjson() {
        let array = read_bytes(br#"[{"id":1},{"id":2}]"#).await.unwrap();
        assert_eq!(array.len(), 2);

        let single = read_bytes(br#"{"id":1}"#).await.unwrap();
        assert_eq!(single[0].get_value("id"), Some(json!(1)));

        let lines = read_bytes(b"{\"id\":1}\n{\"id\":2}\n{\"id\":3}\n").await.unwrap();
        assert_eq!(lines.len(), 3);

        let with_bom = read_bytes(b"\xEF\xBB\xBF[{\"id\":1}]").await.unwrap();
        assert_eq!(with_bom.len(), 1);

        assert!(read_bytes(b"  ").await.unwrap().is_empty());
        assert!(read_bytes(b" [ ] ").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reads_values_split_across_chunks() {
        let records = read_chunks(&[
            b"\xEF\xBB",
            b"\xBF [ {\"name\": \"al",
            b"ice\", \"n\": 1",
            b"} ,",
            b"{\"name\":\"bob\"}",
            b"\n]\n",
        ])
        .await
        .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get_value("name"), Some(json!("alice")));
        assert_eq!(records[0].get_value("n"), Some(json!(1)));
        assert_eq!(records[1].get_value("name"), Some(json!("bob")));
    }

    #[tokio::test]
    async fn test_reads_ndjson_split_across_chunks() {
        let records = read_chunks(&[b"{\"a\":1}\n{\"a\"", b":2}\n", b"{\"a\":3}"])
            .await
            .unwrap();

        let values: Vec<_> = records.iter().map(|r| r.get_value("a")).collect();
        assert_eq!(values, vec![Some(json!(1)), Some(json!(2)), Some(json!(3))]);
    }

    #[tokio::test]
    async fn test_rejects_non_objects() {
        let err = read_bytes(b"[1, 2]").await.err().unwrap();
        assert!(err.to_string().contains("position 0"));

        let err = read_bytes(b"{\"id\":1}\n\"text\"").await.err().unwrap();
        assert!(err.to_string().contains("position 1"));
    }

    #[tokio::test]
    async fn test_rejects_malformed_input() {
        assert!(matches!(
            read_bytes(b"[{\"id\": 1}").await.err().unwrap(),
            ConnectorError::ConversionError { .. }
        ));
        assert!(matches!(
            read_bytes(b"[{\"id\": }]").await.err().unwrap(),
            ConnectorError::SerializationError(_)
        ));
        assert!(read_bytes(b"[{\"id\":1} {\"id\":2}]").await.is_err());
        assert!(read_bytes(b"[{\"id\":1}] {\"id\":2}").await.is_err());
    }

    #[tokio::test]
    async fn test_records_before_an_error_are_still_yielded() {
        let reader: BlobReader = Box::pin(std::io::Cursor::new(br#"[{"a":1},{"a":2},3]"#.to_vec()));
        let results: Vec<Result<BoxedDataItem>> = read_items(reader).collect().await;

        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok() && results[1].is_ok());
        assert!(results[2].is_err());
    }

    #[tokio::test]
    async fn test_read_items_from_reader() {
        let reader: BlobReader = Box::pin(std::io::Cursor::new(br#"[{"a":1},{"a":2}]"#.to_vec()));

        let records: Vec<BoxedDataItem> = read_items(reader).try_collect().await.unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[1].to_json(), json!({ "a": 2 }).as_object().unwrap().clone());
    }
}
