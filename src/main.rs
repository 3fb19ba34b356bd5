#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = tutor_grading::run().await {
        eprintln!("tutor-grading fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
