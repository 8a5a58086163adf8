use trinity_agents::{ObserverSampler, SysinfoProbe};
use trinity_memory::MemoryStore;

use crate::settings::Settings;

pub async fn run_observe(settings: &Settings, once: bool) -> Result<(), String> {
    let store = MemoryStore::open(settings.memory.clone()).map_err(|error| error.to_string())?;
    let probe = SysinfoProbe::primed().await;
    let mut sampler = ObserverSampler::new(settings.observer.clone(), probe);

    if once {
        return match sampler.run_cycle(&store).await {
            Some(stored) => {
                println!("#{} {}: {}", stored.seq, stored.category, stored.text);
                Ok(())
            }
            None => Err("observer recorded nothing this cycle".to_string()),
        };
    }

    println!(
        "observing every {}s, writing to {} (ctrl-c to stop)",
        settings.observer.interval_secs,
        settings.memory.path.display()
    );
    let recorded = sampler.run(&store, shutdown_signal()).await;
    println!("observer stopped after {recorded} insights");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = wait_for_shutdown_signal().await {
        tracing::warn!(%error, "falling back to ctrl-c only");
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> Result<(), String> {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|error| format!("register SIGTERM handler failed: {error}"))?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> Result<(), String> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|error| format!("wait for ctrl+c failed: {error}"))?;
    Ok(())
}
