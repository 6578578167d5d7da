use crate::utils::error::Result;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// 與連接器無關的單筆資料檢視
///
/// Sink 只需要列舉欄位並讀值；Source 以欄位建構新的資料項目。
pub trait DataItem: Send + Sync + fmt::Debug {
    fn field_names(&self) -> Vec<String>;

    fn get_value(&self, field_name: &str) -> Option<Value>;

    /// 轉為 JSON 物件，欄位順序依 `field_names`
    fn to_json(&self) -> Map<String, Value> {
        let mut object = Map::new();
        for name in self.field_names() {
            if let Some(value) = self.get_value(&name) {
                object.insert(name, value);
            }
        }
        object
    }
}

pub type BoxedDataItem = Box<dyn DataItem>;

/// 非同步、單向、不可重播的資料項目序列
pub type DataItemStream = BoxStream<'static, Result<BoxedDataItem>>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub data: Map<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(data: Map<String, Value>) -> Self {
        Self { data }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(name.into(), value.into());
        self
    }

    pub fn boxed(self) -> BoxedDataItem {
        Box::new(self)
    }
}

impl DataItem for Record {
    fn field_names(&self) -> Vec<String> {
        self.data.keys().cloned().collect()
    }

    fn get_value(&self, field_name: &str) -> Option<Value> {
        self.data.get(field_name).cloned()
    }

    fn to_json(&self) -> Map<String, Value> {
        self.data.clone()
    }
}

/// Table 服務的一列
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableEntity {
    pub partition_key: String,
    pub row_key: String,
    pub timestamp: Option<String>,
    pub properties: Map<String, Value>,
}

impl TableEntity {
    pub const PARTITION_KEY: &'static str = "PartitionKey";
    pub const ROW_KEY: &'static str = "RowKey";
    pub const TIMESTAMP: &'static str = "Timestamp";

    pub fn new(partition_key: impl Into<String>, row_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            row_key: row_key.into(),
            timestamp: None,
            properties: Map::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// 依名稱取值，系統欄位也可查詢
    pub fn get(&self, name: &str) -> Option<Value> {
        match name {
            Self::PARTITION_KEY => Some(Value::String(self.partition_key.clone())),
            Self::ROW_KEY => Some(Value::String(self.row_key.clone())),
            Self::TIMESTAMP => self.timestamp.clone().map(Value::String),
            _ => self.properties.get(name).cloned(),
        }
    }

    /// Table REST 的 JSON 表示（寫入用）
    ///
    /// 超出 32 位元範圍的整數需以字串搭配 `Edm.Int64` 註記，否則服務端會拒絕或降為 Double。
    pub fn to_wire_json(&self) -> Map<String, Value> {
        let mut body = Map::new();
        body.insert(
            Self::PARTITION_KEY.to_string(),
            Value::String(self.partition_key.clone()),
        );
        body.insert(Self::ROW_KEY.to_string(), Value::String(self.row_key.clone()));

        for (name, value) in &self.properties {
            match value {
                Value::Number(n) if n.as_i64().is_some_and(|i| i32::try_from(i).is_err()) => {
                    body.insert(name.clone(), Value::String(n.to_string()));
                    body.insert(
                        format!("{}@odata.type", name),
                        Value::String("Edm.Int64".to_string()),
                    );
                }
                _ => {
                    body.insert(name.clone(), value.clone());
                }
            }
        }

        body
    }

    /// 解析 Table REST 回傳的一列（minimalmetadata 或 nometadata）
    pub fn from_wire_json(mut object: Map<String, Value>) -> Result<Self> {
        let partition_key = take_key(&mut object, Self::PARTITION_KEY)?;
        let row_key = take_key(&mut object, Self::ROW_KEY)?;
        let timestamp = object
            .remove(Self::TIMESTAMP)
            .and_then(|v| v.as_str().map(str::to_string));

        let annotations: Vec<(String, String)> = object
            .iter()
            .filter_map(|(k, v)| {
                k.strip_suffix("@odata.type")
                    .zip(v.as_str())
                    .map(|(name, ty)| (name.to_string(), ty.to_string()))
            })
            .collect();

        let mut properties = Map::new();
        for (name, value) in object {
            if name.starts_with("odata.") || name.contains("@odata.") {
                continue;
            }

            let edm_type = annotations
                .iter()
                .find(|(prop, _)| *prop == name)
                .map(|(_, ty)| ty.as_str());

            let value = if edm_type == Some("Edm.Int64") {
                match value.as_str().and_then(|s| s.parse::<i64>().ok()) {
                    Some(i) => Value::from(i),
                    None => value,
                }
            } else {
                value
            };
            properties.insert(name, value);
        }

        Ok(Self {
            partition_key,
            row_key,
            timestamp,
            properties,
        })
    }
}

/// SDK 以 wire JSON 送出與讀回 entity
impl Serialize for TableEntity {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_wire_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TableEntity {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let object = Map::deserialize(deserializer)?;
        TableEntity::from_wire_json(object).map_err(serde::de::Error::custom)
    }
}

fn take_key(object: &mut Map<String, Value>, name: &str) -> Result<String> {
    match object.remove(name) {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Ok(other.to_string()),
        None => Err(crate::utils::error::ConnectorError::conversion(format!(
            "table row is missing the {} system property",
            name
        ))),
    }
}
