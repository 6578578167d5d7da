//! 一般資料項目與 Table entity 之間的轉換

use crate::domain::model::{DataItem, TableEntity};
use crate::utils::error::{ConnectorError, Result};
use serde_json::Value;

/// 服務端的鍵值上限為 1 KiB
const MAX_KEY_BYTES: usize = 1024;

/// 把資料項目轉為 entity
///
/// 鍵欄位取自設定的欄位名稱（未設定時使用 `PartitionKey`/`RowKey`），並從屬性中移除。
/// `null` 會被略過，巢狀物件與陣列存成 JSON 字串，系統欄位 `Timestamp` 與 `odata.*` 註記不寫入。
pub fn to_table_entity(
    item: &dyn DataItem,
    partition_key_field: Option<&str>,
    row_key_field: Option<&str>,
) -> Result<TableEntity> {
    let partition_key_field = partition_key_field.unwrap_or(TableEntity::PARTITION_KEY);
    let row_key_field = row_key_field.unwrap_or(TableEntity::ROW_KEY);

    let partition_key = key_value(item, partition_key_field, "partition key")?;
    let row_key = key_value(item, row_key_field, "row key")?;
    let mut entity = TableEntity::new(partition_key, row_key);

    for name in item.field_names() {
        if name == partition_key_field || name == row_key_field || is_reserved(&name) {
            continue;
        }

        match item.get_value(&name) {
            None | Some(Value::Null) => {}
            Some(nested @ (Value::Object(_) | Value::Array(_))) => {
                entity.properties.insert(name, Value::String(nested.to_string()));
            }
            Some(value) => {
                entity.properties.insert(name, value);
            }
        }
    }

    Ok(entity)
}

fn is_reserved(name: &str) -> bool {
    name == TableEntity::PARTITION_KEY
        || name == TableEntity::ROW_KEY
        || name == TableEntity::TIMESTAMP
        || name.starts_with("odata.")
        || name.contains("@odata.")
}

fn key_value(item: &dyn DataItem, field: &str, kind: &str) -> Result<String> {
    let key = match item.get_value(field) {
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        None | Some(Value::Null) => {
            return Err(ConnectorError::conversion(format!(
                "record has no value for {} field '{}'",
                kind, field
            )))
        }
        Some(other) => {
            return Err(ConnectorError::conversion(format!(
                "{} field '{}' must be a string, number or boolean, found {}",
                kind, field, other
            )))
        }
    };

    if let Some(bad) = key.chars().find(|c| matches!(c, '/' | '\\' | '#' | '?') || c.is_control()) {
        return Err(ConnectorError::conversion(format!(
            "{} '{}' contains the disallowed character {:?}",
            kind, key, bad
        )));
    }
    if key.len() > MAX_KEY_BYTES {
        return Err(ConnectorError::conversion(format!(
            "{} from field '{}' is longer than {} bytes",
            kind, field, MAX_KEY_BYTES
        )));
    }

    Ok(key)
}

/// Table source 產出的資料項目：鍵欄位以設定的名稱呈現
#[derive(Debug, Clone)]
pub struct TableEntityItem {
    entity: TableEntity,
    partition_key_field: String,
    row_key_field: String,
}

impl TableEntityItem {
    pub fn new(
        entity: TableEntity,
        partition_key_field: Option<&str>,
        row_key_field: Option<&str>,
    ) -> Self {
        Self {
            entity,
            partition_key_field: partition_key_field
                .unwrap_or(TableEntity::PARTITION_KEY)
                .to_string(),
            row_key_field: row_key_field.unwrap_or(TableEntity::ROW_KEY).to_string(),
        }
    }

    pub fn entity(&self) -> &TableEntity {
        &self.entity
    }
}

impl DataItem for TableEntityItem {
    fn field_names(&self) -> Vec<String> {
        let mut names = vec![self.partition_key_field.clone(), self.row_key_field.clone()];
        if self.entity.timestamp.is_some() {
            names.push(TableEntity::TIMESTAMP.to_string());
        }
        // 與鍵欄位同名的屬性被鍵值遮蔽
        names.extend(
            self.entity
                .properties
                .keys()
                .filter(|name| **name != self.partition_key_field && **name != self.row_key_field)
                .cloned(),
        );
        names
    }

    fn get_value(&self, field_name: &str) -> Option<Value> {
        if field_name == self.partition_key_field {
            Some(Value::String(self.entity.partition_key.clone()))
        } else if field_name == self.row_key_field {
            Some(Value::String(self.entity.row_key.clone()))
        } else if field_name == TableEntity::TIMESTAMP {
            self.entity.timestamp.clone().map(Value::String)
        } else {
            self.entity.properties.get(field_name).cloned()
        }
    }
}
