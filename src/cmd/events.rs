use std::time::Duration;

use anyhow::Result;

use matchcast::event::EventRecord;
use matchcast::{Snapshot, StreamHub};

use super::output::{print_events, print_snapshot_header};

pub async fn cmd_events(hub: &StreamHub, json: bool, live_only: bool) -> Result<()> {
    let mut snapshot = hub.refresh().await;

    if json {
        snapshot.records.retain(|e| !live_only || e.status.is_live());
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    print_filtered(&snapshot, live_only);
    Ok(())
}

pub async fn cmd_watch(hub: StreamHub, live_only: bool) -> Result<()> {
    let hub = std::sync::Arc::new(hub);
    let _refresh = hub.spawn_auto_refresh();
    eprintln!("👀 Watching for changes (Ctrl+C to stop)");

    let mut last_refresh = None;
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                eprintln!("\n⏹  Stopped");
                return Ok(());
            }
            _ = ticker.tick() => {
                let snapshot = hub.events().await;
                if last_refresh == Some(snapshot.refreshed_at) {
                    continue;
                }
                last_refresh = Some(snapshot.refreshed_at);
                println!();
                print_filtered(&snapshot, live_only);
            }
        }
    }
}

fn print_filtered(snapshot: &Snapshot, live_only: bool) {
    let shown: Vec<&EventRecord> = snapshot
        .records
        .iter()
        .filter(|e| !live_only || e.status.is_live())
        .collect();
    print_snapshot_header(snapshot, shown.len());
    print_events(&shown);
}
