use azure_connectors::adapters::memory::{MemoryConnector, MemoryTableStore};
use azure_connectors::core::{AzureTableApiDataSink, AzureTableApiDataSource};
use azure_connectors::domain::model::BoxedDataItem;
use azure_connectors::{
    ConnectorConfig, ConnectorError, DataItem, DataSinkExtension, DataSourceExtension, Record,
    Result, TableEntity,
};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn table_config(extra: serde_json::Value) -> ConnectorConfig {
    let mut config = ConnectorConfig::from_value(json!({
        "ConnectionString": "UseDevelopmentStorage=true",
        "Table": "Orders",
        "PartitionKeyFieldName": "customer",
        "RowKeyFieldName": "orderId"
    }))
    .unwrap();
    if let serde_json::Value::Object(values) = extra {
        for (key, value) in values {
            config = config.with_value(key, value);
        }
    }
    config
}

fn orders(count: usize) -> Vec<Result<BoxedDataItem>> {
    (0..count)
        .map(|i| {
            Ok(Record::new()
                .with_field("customer", format!("c{}", i % 5))
                .with_field("orderId", format!("o{:04}", i))
                .with_field("total", i as f64 * 1.5)
                .with_field("lines", json!([{ "sku": "A" }]))
                .boxed())
        })
        .collect()
}

#[tokio::test]
async fn test_insert_then_query_returns_every_key() {
    let connector = Arc::new(MemoryConnector::new());
    let sink = AzureTableApiDataSink::new(connector.clone());
    let source = AzureTableApiDataSource::new(connector.clone());

    sink.write(
        stream::iter(orders(120)).boxed(),
        &table_config(json!({ "MaxConcurrentEntityWrites": 8 })),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    let items: Vec<BoxedDataItem> = source
        .read(&table_config(json!({})), CancellationToken::new())
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();

    let expected: BTreeSet<(String, String)> = (0..120)
        .map(|i| (format!("c{}", i % 5), format!("o{:04}", i)))
        .collect();
    let actual: BTreeSet<(String, String)> = items
        .iter()
        .map(|item| {
            (
                item.get_value("customer").unwrap().as_str().unwrap().to_string(),
                item.get_value("orderId").unwrap().as_str().unwrap().to_string(),
            )
        })
        .collect();

    assert_eq!(items.len(), 120);
    assert_eq!(actual, expected);
    assert_eq!(items[0].get_value("lines"), Some(json!("[{\"sku\":\"A\"}]")));
}

#[tokio::test]
async fn test_query_filter_is_applied() {
    let connector = Arc::new(MemoryConnector::new());
    AzureTableApiDataSink::new(connector.clone())
        .write(
            stream::iter(orders(20)).boxed(),
            &table_config(json!({})),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    let items: Vec<BoxedDataItem> = AzureTableApiDataSource::new(connector)
        .read(
            &table_config(json!({ "QueryFilter": "PartitionKey eq 'c3' and total gt 10.0" })),
            CancellationToken::new(),
        )
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();

    let ids: Vec<_> = items
        .iter()
        .map(|item| item.get_value("orderId").unwrap())
        .collect();
    assert_eq!(ids, vec![json!("o0008"), json!("o0013"), json!("o0018")]);
}

#[tokio::test]
async fn test_empty_input_inserts_nothing() {
    let connector = Arc::new(MemoryConnector::new());

    AzureTableApiDataSink::new(connector.clone())
        .write(stream::empty().boxed(), &table_config(json!({})), CancellationToken::new())
        .await
        .unwrap();

    let table = connector.table("Orders");
    assert!(table.exists().await);
    assert!(table.is_empty().await);
    assert_eq!(table.write_calls(), 0);
}

#[tokio::test]
async fn test_upsert_modes() {
    let table = MemoryTableStore::new("Orders").with_entity(
        TableEntity::new("c1", "o0001")
            .with_property("status", "open")
            .with_property("note", "keep me"),
    );
    let connector = Arc::new(MemoryConnector::new().with_table(table));
    let sink = AzureTableApiDataSink::new(connector.clone());
    let update = || -> Vec<Result<BoxedDataItem>> {
        vec![Ok(Record::new()
            .with_field("customer", "c1")
            .with_field("orderId", "o0001")
            .with_field("status", "shipped")
            .boxed())]
    };

    sink.write(
        stream::iter(update()).boxed(),
        &table_config(json!({ "WriteMode": "Merge" })),
        CancellationToken::new(),
    )
    .await
    .unwrap();
    let merged = connector.table("Orders").entity("c1", "o0001").await.unwrap();
    assert_eq!(merged.properties.get("status"), Some(&json!("shipped")));
    assert_eq!(merged.properties.get("note"), Some(&json!("keep me")));

    sink.write(
        stream::iter(update()).boxed(),
        &table_config(json!({ "WriteMode": "Replace" })),
        CancellationToken::new(),
    )
    .await
    .unwrap();
    let replaced = connector.table("Orders").entity("c1", "o0001").await.unwrap();
    assert_eq!(replaced.properties.get("note"), None);

    let err = sink
        .write(
            stream::iter(update()).boxed(),
            &table_config(json!({})),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.service_code(), Some("EntityAlreadyExists"));
}

#[tokio::test]
async fn test_cancel_mid_query_yields_no_more_rows() {
    let table = (0..30).fold(MemoryTableStore::new("Orders").with_page_size(4), |t, i| {
        t.with_entity(TableEntity::new("c", format!("o{:04}", i)))
    });
    let connector = Arc::new(MemoryConnector::new().with_table(table));
    let cancel = CancellationToken::new();

    let mut stream = AzureTableApiDataSource::new(connector)
        .read(&table_config(json!({})), cancel.clone())
        .await
        .unwrap();

    let mut read = 0;
    while let Some(item) = stream.next().await {
        match item {
            Ok(_) => {
                read += 1;
                if read == 6 {
                    cancel.cancel();
                }
            }
            Err(ConnectorError::Cancelled) => break,
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }

    assert_eq!(read, 6);
    assert!(stream.next().await.is_none());
}

#[test]
fn test_rbac_table_settings_need_endpoint() {
    let sink = AzureTableApiDataSink::new(Arc::new(MemoryConnector::new()));
    let config = ConnectorConfig::from_value(json!({ "UseRbacAuth": true, "Table": "Orders" })).unwrap();

    let err = sink.validate_settings(&config).unwrap_err();
    assert!(err.user_friendly_message().contains("AccountEndpoint"));
}
