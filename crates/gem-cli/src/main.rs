//! gem - a command-line client for the Gemini-family browser engine.

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    gem_cli::run().await
}
