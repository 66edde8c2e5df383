// Transfer Snapshot: ERC20 holder balances from Transfer logs
//
// This job:
// 1. Fetches every Transfer log of each tracked contract over a block range,
//    bisecting ranges the RPC endpoint refuses
// 2. Replays each log into final holder balances
// 3. Writes one CSV holder table per contract plus a combined JSON snapshot
//
// Architecture:
//   RPC eth_getLogs → RangeFetcher → LedgerReplayer → CSV / JSON sinks

use eyre::WrapErr;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use transfer_snapshot::{
    write_reports, CsvSink, JsonSnapshotSink, ReportSink, RpcLogSource, SnapshotConfig,
    SnapshotJob,
};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = SnapshotConfig::from_env()?;
    info!(
        rpc_url = %config.rpc_url,
        start_block = config.start_block,
        end_block = ?config.end_block,
        contracts = config.contracts.len(),
        output_dir = %config.output_dir.display(),
        "snapshot config"
    );

    let source = RpcLogSource::connect(&config.rpc_url).await?;
    let job = SnapshotJob::new(source, &config);

    let range = job.resolve_range(config.start_block, config.end_block).await?;
    let snapshots = job.run(&config.contracts, range).await?;

    let mut csv = CsvSink::new(&config.output_dir);
    let mut json = JsonSnapshotSink::new(config.output_dir.join("snapshot.json"));
    let reports = write_reports(&snapshots, &mut [&mut csv as &mut dyn ReportSink, &mut json])
        .wrap_err("failed to write balance reports")?;

    for report in &reports {
        info!(
            label = %report.label,
            holders = report.holders.len(),
            total = %report.total,
            "snapshot complete"
        );
    }
    info!("Balance files created in {}", config.output_dir.display());

    Ok(())
}
