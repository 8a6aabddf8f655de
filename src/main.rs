#[tokio::main]
async fn main() -> anyhow::Result<()> {
    timeclock_lib::run().await
}
