#[tokio::main]
async fn main() -> anyhow::Result<()> {
    healthsync_lib::run().await
}
