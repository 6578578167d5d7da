use azure_connectors::utils::error::{ConnectorError, ErrorSeverity};
use azure_connectors::utils::logger;
use azure_connectors::{AzureConnector, ExtensionCatalog, TransferEngine, TransferSettings};
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "azure-connectors")]
#[command(about = "Move records between Azure Table API and JSON files in Azure Blob Storage")]
struct Args {
    /// Transfer settings file (JSON or TOML)
    #[arg(short, long, default_value = "migrationsettings.json")]
    settings: String,

    /// Override the source named in the settings file
    #[arg(long)]
    source: Option<String>,

    /// Override the sink named in the settings file
    #[arg(long)]
    sink: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Validate settings only, without contacting Azure
    #[arg(long)]
    dry_run: bool,

    /// List the available sources and sinks
    #[arg(long)]
    list: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.json_logs {
        logger::init_json_logger(args.verbose);
    } else {
        logger::init_cli_logger(args.verbose);
    }

    let engine = TransferEngine::new(ExtensionCatalog::with_defaults(Arc::new(AzureConnector)));

    if args.list {
        println!("Sources: {}", engine.catalog().source_names().join(", "));
        println!("Sinks:   {}", engine.catalog().sink_names().join(", "));
        return Ok(());
    }

    tracing::info!("📁 Loading transfer settings from: {}", args.settings);
    let settings = match TransferSettings::from_file(&args.settings) {
        Ok(settings) => settings.with_overrides(args.source.clone(), args.sink.clone()),
        Err(e) => {
            eprintln!("❌ Failed to load settings file '{}': {}", args.settings, e);
            eprintln!("💡 Make sure the file exists and has Source, Sink, SourceSettings and SinkSettings");
            std::process::exit(1);
        }
    };

    if args.dry_run {
        tracing::info!("🔍 DRY RUN MODE - settings are validated, no data is transferred");
        match engine.prepare(&settings) {
            Ok((source, sink)) => {
                println!(
                    "✅ Settings are valid: {} -> {}",
                    source.display_name(),
                    sink.display_name()
                );
                return Ok(());
            }
            Err(e) => exit_with(&e),
        }
    }

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("⏹️ Ctrl-C received, cancelling transfer...");
            on_ctrl_c.cancel();
        }
    });

    match engine.run(&settings, cancel).await {
        Ok(summary) => {
            println!(
                "✅ Transferred {} items from {} to {}",
                summary.items, summary.source, summary.sink
            );
        }
        Err(e) => exit_with(&e),
    }

    Ok(())
}

fn exit_with(e: &ConnectorError) -> ! {
    // 記錄詳細錯誤信息
    tracing::error!(
        "❌ Transfer failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 {}", e.recovery_suggestion());

    // 根據錯誤嚴重程度決定退出碼
    let exit_code = match e {
        ConnectorError::Cancelled => 130,
        _ => match e.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        },
    };
    std::process::exit(exit_code)
}
