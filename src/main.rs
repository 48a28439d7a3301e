// src/main.rs

use syncds::{cli, run};

#[tokio::main]
async fn main() {
    if let Err(err) = run(cli::parse()).await {
        eprintln!("[syncds ERROR]: {err:?}");
        std::process::exit(1);
    }
}
