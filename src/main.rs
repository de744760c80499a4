use std::env;
use std::io::{self, Read};

use tablequery::client::cli::{self, Command};
use tablequery::models::connections::ConnectionConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    env_logger::init();

    let args: Vec<String> = env::args().skip(1).collect();
    let command = Command::parse(&args)?;

    let mut input = String::new();
    if command.reads_input() {
        io::stdin().read_to_string(&mut input)?;
    }

    let config = ConnectionConfig::from_env()?;
    let explorer = tablequery::connect(&config).await?;
    let output = cli::run(&explorer, command, &input).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
