use crate::app::extensions::ExtensionCatalog;
use crate::config::TransferSettings;
use crate::domain::ports::{DataSinkExtension, DataSourceExtension};
use crate::utils::error::Result;
use futures::StreamExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSummary {
    pub source: String,
    pub sink: String,
    pub items: usize,
    pub elapsed: Duration,
}

/// 把一個 source 的資料項目送進一個 sink
pub struct TransferEngine {
    catalog: ExtensionCatalog,
}

impl TransferEngine {
    pub fn new(catalog: ExtensionCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &ExtensionCatalog {
        &self.catalog
    }

    /// 解析名稱並驗證兩邊的設定，不做任何網路呼叫
    pub fn prepare(
        &self,
        settings: &TransferSettings,
    ) -> Result<(Arc<dyn DataSourceExtension>, Arc<dyn DataSinkExtension>)> {
        let source = self.catalog.source(&settings.source)?;
        let sink = self.catalog.sink(&settings.sink)?;

        source.validate_settings(&settings.source_settings)?;
        sink.validate_settings(&settings.sink_settings)?;
        debug!("Settings for {} -> {} are valid", source.display_name(), sink.display_name());

        Ok((source, sink))
    }

    pub async fn run(
        &self,
        settings: &TransferSettings,
        cancel: CancellationToken,
    ) -> Result<TransferSummary> {
        let started = Instant::now();
        let (source, sink) = self.prepare(settings)?;

        info!("🚀 Starting transfer: {} -> {}", source.display_name(), sink.display_name());

        // Read
        info!("📥 Reading from {}...", source.display_name());
        let items = source
            .read(&settings.source_settings, cancel.clone())
            .await?;

        let counter = Arc::new(AtomicUsize::new(0));
        let counted = {
            let counter = counter.clone();
            items
                .inspect(move |item| {
                    if item.is_ok() {
                        counter.fetch_add(1, Ordering::Relaxed);
                    }
                })
                .boxed()
        };

        // Write
        info!("📤 Writing to {}...", sink.display_name());
        sink.write(counted, &settings.sink_settings, cancel).await?;

        let summary = TransferSummary {
            source: source.display_name().to_string(),
            sink: sink.display_name().to_string(),
            items: counter.load(Ordering::Relaxed),
            elapsed: started.elapsed(),
        };
        info!(
            "✅ Transferred {} items from {} to {} in {:.1}s",
            summary.items,
            summary.source,
            summary.sink,
            summary.elapsed.as_secs_f64()
        );

        Ok(summary)
    }
}
