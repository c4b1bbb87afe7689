//! Interactive terminal chat with an OpenAI-compatible model.
//!
//! # Usage
//!
//! ```bash
//! export OPENAI_API_KEY=...
//!
//! # Defaults: OPENAI_BASE_URL and OPENAI_MODEL, streamed output
//! mindterm
//!
//! # Override the model and wait for whole responses
//! mindterm --model qwen-max --no-stream
//!
//! # Plain output, with request logging on stderr
//! RUST_LOG=mindterm=debug mindterm --no-color
//! ```
//!
//! # Commands
//!
//! - `\help` - Show available commands
//! - `\bye` - Exit the application

use arrrg::CommandLine;
use tracing_subscriber::EnvFilter;

use mindterm::{Config, MindTermArgs};

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let (args, _) = MindTermArgs::from_command_line_relaxed("mindterm [OPTIONS]");
    let config = Config::from_env().with_args(args);
    mindterm::run(config).await;
}
