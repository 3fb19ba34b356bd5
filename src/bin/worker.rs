#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = tutor_grading::run_worker().await {
        eprintln!("tutor-grading-worker fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
