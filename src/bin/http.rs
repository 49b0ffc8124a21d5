use pricing_tool::{EngineState, load_state_from_json};
use std::net::SocketAddr;
use std::path::PathBuf;

fn state_path() -> PathBuf {
    std::env::var("PRICING_STATE_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("pricing_state.json"))
}

#[tokio::main]
async fn main() {
    let addr: SocketAddr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:8080".to_string())
        .parse()
        .expect("invalid listen address");

    let path = state_path();
    let engine = if path.exists() {
        match load_state_from_json(&path) {
            Ok(state) => state,
            Err(err) => {
                eprintln!("failed to load state from {}: {err}", path.display());
                std::process::exit(1);
            }
        }
    } else {
        EngineState::new()
    };

    println!("pricing-tool http api listening on {addr}");
    if let Err(err) = pricing_tool::http_api::serve(addr, engine).await {
        eprintln!("server error: {err}");
        std::process::exit(1);
    }
}
