use matchcast::event::EventRecord;
use matchcast::Snapshot;

/// One line about where the list came from.
pub fn print_snapshot_header(snapshot: &Snapshot, shown: usize) {
    let refreshed = snapshot.refreshed_at.format("%H:%M:%S UTC");
    if snapshot.degraded {
        println!(
            "⚠️  Showing fallback events ({}), {refreshed}",
            snapshot.reason.as_deref().unwrap_or("sources unavailable")
        );
    } else {
        println!("📡 {shown} events, refreshed {refreshed}");
    }
}

pub fn print_events(events: &[&EventRecord]) {
    if events.is_empty() {
        println!("   (no events)");
        return;
    }

    for event in events {
        let marker = if event.status.is_live() { "🔴" } else { "🕒" };
        println!("{marker} {:<8} {}  [{}]", event.status, event.title, event.id);
        println!(
            "   {} | {} | {}",
            event.competition_name,
            event.scheduled_at.format("%Y-%m-%d %H:%M UTC"),
            stream_summary(event)
        );
    }
}

fn stream_summary(event: &EventRecord) -> String {
    match &event.stream_refs {
        Some(refs) if !refs.is_empty() => {
            let variants: Vec<&str> = refs.keys().map(String::as_str).collect();
            format!("streams: {}", variants.join(", "))
        }
        _ => "stream not available yet".to_string(),
    }
}
