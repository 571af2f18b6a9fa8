#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = orish_rust::run().await {
        eprintln!("orish-rust fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
