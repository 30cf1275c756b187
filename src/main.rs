use proctor_engine::{
    replay::{replay, ReplayOptions},
    utils::init_logging,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let options = ReplayOptions::from_args(std::env::args().skip(1))?;
    log::info!(
        "proctor-replay starting for {}",
        options.signals_path.display()
    );

    let output = replay(options).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
