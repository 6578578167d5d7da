use azure_connectors::adapters::azure::connection_string::{DEV_ACCOUNT_KEY, DEV_ACCOUNT_NAME};
use azure_connectors::core::{AzureBlobDataSink, AzureTableApiDataSink, AzureTableApiDataSource};
use azure_connectors::domain::model::BoxedDataItem;
use azure_connectors::{
    AzureConnector, ConnectorConfig, DataItem, DataSinkExtension, DataSourceExtension, Record,
    Result,
};
use futures::stream::{self, StreamExt, TryStreamExt};
use httpmock::prelude::*;
use httpmock::Then;
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// 明確端點指向 mock server，帳號金鑰沿用 Azurite 的公開金鑰
fn connection_string(server: &MockServer) -> String {
    let endpoint = server.base_url();
    format!(
        "AccountName={};AccountKey={};BlobEndpoint={};TableEndpoint={}",
        DEV_ACCOUNT_NAME, DEV_ACCOUNT_KEY, endpoint, endpoint
    )
}

/// SDK 解析回應時會讀取的共通標頭
fn storage_headers(then: Then) -> Then {
    then.header("x-ms-request-id", "00000000-0000-0000-0000-000000000000")
        .header("x-ms-version", "2022-11-02")
        .header("date", "Tue, 01 Oct 2024 00:00:00 GMT")
        .header("server", "Windows-Azure-Blob/1.0")
        .header("etag", "\"0x8DC0000000000\"")
        .header("last-modified", "Tue, 01 Oct 2024 00:00:00 GMT")
        .header("x-ms-request-server-encrypted", "true")
}

fn already_exists(then: Then, code: &str) -> Then {
    storage_headers(then.status(409))
        .header("x-ms-error-code", code)
        .header("content-type", "application/xml")
        .body(format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?><Error><Code>{}</Code><Message>exists</Message></Error>",
            code
        ))
}

#[tokio::test]
async fn test_blob_upload_stages_blocks_then_commits() {
    let server = MockServer::start_async().await;
    let create = server
        .mock_async(|when, then| {
            when.method(PUT)
                .path("/exports")
                .query_param("restype", "container")
                .header_exists("authorization");
            already_exists(then, "ContainerAlreadyExists");
        })
        .await;
    let blocks = server
        .mock_async(|when, then| {
            when.method(PUT)
                .path_contains("out.bin")
                .query_param("comp", "block")
                .query_param_exists("blockid")
                .header_exists("authorization");
            storage_headers(then.status(201));
        })
        .await;
    let commit = server
        .mock_async(|when, then| {
            when.method(PUT)
                .path_contains("out.bin")
                .query_param("comp", "blocklist")
                .body_contains("<Latest>");
            storage_headers(then.status(201));
        })
        .await;

    let sink = AzureBlobDataSink::new(Arc::new(AzureConnector));
    let config = ConnectorConfig::from_value(json!({
        "ConnectionString": connection_string(&server),
        "ContainerName": "exports",
        "BlobName": "daily/out.bin",
        "MaxBlockSizeinKB": 1
    }))
    .unwrap();

    sink.write_to_target(vec![42u8; 2500], &config, &CancellationToken::new())
        .await
        .unwrap();

    create.assert_async().await;
    assert_eq!(blocks.hits_async().await, 3);
    commit.assert_async().await;
}

#[tokio::test]
async fn test_blob_stage_failure_skips_commit() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(PUT).query_param("restype", "container");
            already_exists(then, "ContainerAlreadyExists");
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(PUT).query_param("comp", "block");
            storage_headers(then.status(403))
                .header("x-ms-error-code", "AuthorizationFailure")
                .header("content-type", "application/xml")
                .body("<?xml version=\"1.0\" encoding=\"utf-8\"?><Error><Code>AuthorizationFailure</Code><Message>This request is not authorized.</Message></Error>");
        })
        .await;
    let commit = server
        .mock_async(|when, then| {
            when.method(PUT).query_param("comp", "blocklist");
            storage_headers(then.status(201));
        })
        .await;

    let sink = AzureBlobDataSink::new(Arc::new(AzureConnector));
    let config = ConnectorConfig::from_value(json!({
        "ConnectionString": connection_string(&server),
        "ContainerName": "exports",
        "BlobName": "out.bin"
    }))
    .unwrap();

    let err = sink
        .write_to_target(vec![1u8; 10], &config, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.service_code(), Some("AuthorizationFailure"));
    assert_eq!(commit.hits_async().await, 0);
}

#[tokio::test]
async fn test_table_sink_ensures_table_and_inserts() {
    let server = MockServer::start_async().await;
    let create = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/Tables")
                .body_contains("People");
            already_exists(then, "TableAlreadyExists");
        })
        .await;
    let insert = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/People")
                .header_exists("authorization")
                .body_contains("\"PartitionKey\":\"staff\"");
            storage_headers(then.status(204))
                .header("preference-applied", "return-no-content")
                .header("location", format!("{}/People(PartitionKey='staff',RowKey='0')", server.base_url()));
        })
        .await;

    let items: Vec<Result<BoxedDataItem>> = (0..4)
        .map(|i| {
            Ok(Record::new()
                .with_field("team", "staff")
                .with_field("id", i)
                .with_field("name", format!("person {}", i))
                .boxed())
        })
        .collect();
    let config = ConnectorConfig::from_value(json!({
        "ConnectionString": connection_string(&server),
        "Table": "People",
        "PartitionKeyFieldName": "team",
        "RowKeyFieldName": "id",
        "MaxConcurrentEntityWrites": 2
    }))
    .unwrap();

    AzureTableApiDataSink::new(Arc::new(AzureConnector))
        .write(stream::iter(items).boxed(), &config, CancellationToken::new())
        .await
        .unwrap();

    create.assert_async().await;
    assert_eq!(insert.hits_async().await, 4);
}

#[tokio::test]
async fn test_table_insert_conflict_is_reported() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/Tables");
            already_exists(then, "TableAlreadyExists");
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/People");
            storage_headers(then.status(409))
                .header("x-ms-error-code", "EntityAlreadyExists")
                .header("content-type", "application/json;odata=minimalmetadata")
                .body(r#"{"odata.error":{"code":"EntityAlreadyExists","message":{"lang":"en-US","value":"The specified entity already exists."}}}"#);
        })
        .await;

    let items: Vec<Result<BoxedDataItem>> = vec![Ok(Record::new()
        .with_field("PartitionKey", "staff")
        .with_field("RowKey", "1")
        .boxed())];
    let config = ConnectorConfig::from_value(json!({
        "ConnectionString": connection_string(&server),
        "Table": "People"
    }))
    .unwrap();

    let err = AzureTableApiDataSink::new(Arc::new(AzureConnector))
        .write(stream::iter(items).boxed(), &config, CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.service_code(), Some("EntityAlreadyExists"));
}

#[tokio::test]
async fn test_table_source_queries_with_filter() {
    let server = MockServer::start_async().await;
    let query = server
        .mock_async(|when, then| {
            when.method(GET)
                .path_contains("People")
                .query_param("$filter", "team eq 'staff'")
                .header_exists("authorization");
            storage_headers(then.status(200))
                .header("content-type", "application/json;odata=minimalmetadata")
                .body(r#"{"odata.metadata":"x","value":[
                    {"PartitionKey":"staff","RowKey":"1","Timestamp":"2024-05-01T00:00:00Z","name":"Ada","salary":"5000000000","salary@odata.type":"Edm.Int64"},
                    {"PartitionKey":"staff","RowKey":"2","Timestamp":"2024-05-01T00:00:00Z","name":"Grace"}
                ]}"#);
        })
        .await;

    let config = ConnectorConfig::from_value(json!({
        "ConnectionString": connection_string(&server),
        "Table": "People",
        "PartitionKeyFieldName": "team",
        "QueryFilter": "team eq 'staff'"
    }))
    .unwrap();

    let items: Vec<BoxedDataItem> = AzureTableApiDataSource::new(Arc::new(AzureConnector))
        .read(&config, CancellationToken::new())
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();

    query.assert_async().await;
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].get_value("team"), Some(json!("staff")));
    assert_eq!(items[0].get_value("RowKey"), Some(json!("1")));
    assert_eq!(items[0].get_value("salary"), Some(json!(5_000_000_000i64)));
    assert_eq!(items[1].get_value("salary@odata.type"), None);
}
