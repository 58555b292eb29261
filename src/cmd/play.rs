use anyhow::{Context, Result};

use matchcast::{PlaybackState, StreamHub};

pub async fn cmd_stream(hub: &StreamHub, event_id: &str, variant: Option<&str>) -> Result<()> {
    hub.refresh().await;
    let url = hub
        .stream_url(event_id, variant)
        .await
        .with_context(|| format!("cannot resolve a stream for {event_id}"))?;
    println!("{url}");
    Ok(())
}

pub async fn cmd_play(hub: &StreamHub, target: &str, variant: Option<&str>) -> Result<()> {
    let mut session = if target.starts_with("http://") || target.starts_with("https://") {
        hub.open_playback(target).await
    } else {
        hub.refresh().await;
        hub.play_event(target, variant)
            .await
            .with_context(|| format!("cannot play {target}"))?
    };

    eprintln!("🎬 Player: {}", hub.engine().runtime().name());
    let mut states = session.subscribe();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                let state = session.close().await;
                eprintln!("\n⏹  {state}");
                return Ok(());
            }
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = states.borrow_and_update().clone();
                eprintln!("▶ {state}");
                if state.is_terminal() {
                    break;
                }
            }
        }
    }

    if let PlaybackState::Fatal {
        message,
        external_url,
    } = session.state()
    {
        eprintln!("🔗 Try opening it elsewhere: {external_url}");
        anyhow::bail!("playback failed: {message}");
    }
    Ok(())
}
