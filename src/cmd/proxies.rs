use matchcast::StreamHub;

pub async fn cmd_proxies(hub: &StreamHub) {
    let resolver = hub.resolver();
    if resolver.backends().is_empty() {
        println!("No proxy backends configured; requests go direct.");
        return;
    }

    println!("🔀 Probing {} proxy backends...", resolver.backends().len());
    let results = resolver.probe_backends().await;
    let alive = results.iter().filter(|(_, ok)| *ok).count();

    for (i, (backend, ok)) in results.iter().enumerate() {
        let mark = if *ok { "✅" } else { "❌" };
        let cursor = if i == resolver.current_index() { " (next)" } else { "" };
        println!("   {mark} {:<12} {}{cursor}", backend.name, backend.base_endpoint);
    }
    println!("\n{alive}/{} reachable", results.len());
}
