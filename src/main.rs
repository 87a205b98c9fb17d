use clap::Parser;
use ledger_feed::env::{Env, setup_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv_override().ok();

    let env = Env::try_parse()?;
    let _telemetry_guard = setup_tracing(&env);

    ledger_feed::launch(env).await
}
