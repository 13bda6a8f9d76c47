use driftwatch_core::api;
use driftwatch_core::baseline::BaselineSet;
use driftwatch_core::chain::{ImmutableLog, SledStore};
use driftwatch_core::config::Config;
use driftwatch_core::observer::Observer;
use driftwatch_core::signer::ReceiptSigner;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();
    println!(
        "config loaded: host={}:{}, db={}, key={}, baselines={}",
        config.host, config.port, config.db_path, config.key_path, config.baselines_path
    );

    // Service identity: stable across restarts via the key file.
    let signer = ReceiptSigner::load_or_generate(&config.key_path)?;
    println!(
        "service identity (public key): {}",
        hex::encode(signer.public_key().to_bytes())
    );

    // Baselines come pre-validated from the external loader; only id
    // uniqueness is enforced here.
    let baselines = match std::fs::read(&config.baselines_path) {
        Ok(bytes) => BaselineSet::from_json_slice(&bytes)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            println!(
                "no baseline file at {}, starting with an empty set",
                config.baselines_path
            );
            BaselineSet::new()
        }
        Err(e) => return Err(e.into()),
    };
    println!("{} baseline(s) loaded", baselines.len());

    // Open the chained log, recovering the tip from disk.
    let store = SledStore::open(&config.db_path)?;
    let log = ImmutableLog::open(store)?;
    println!("chain opened: length={}, tip={}", log.len(), log.tip());

    let observer = Observer::new(baselines, config.match_threshold, log);
    let shared_state = Arc::new(api::AppState {
        signer: Arc::new(signer),
        observer: Arc::new(Mutex::new(observer)),
    });

    let app = api::app(shared_state);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;

    println!("driftwatch listening on http://{addr}");
    println!("  POST /observe     submit a raw tree snapshot");
    println!("  GET  /entry/:pos  read one chain entry");
    println!("  GET  /log         read a range of entries");
    println!("  GET  /verify      audit full chain integrity");

    axum::serve(listener, app).await?;

    Ok(())
}
