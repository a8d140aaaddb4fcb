use std::io::Write as _;
use std::process::ExitCode;

use clap::Parser;
use eyre::{Result, WrapErr};
use shellfs::{ConnectionPool, Content, OperationResult, PoolConfig, RemoteFs, SshConnector};
use tokio::io::AsyncReadExt;

use crate::app::{Args, Command};

mod app;

async fn run(fs: &RemoteFs, args: &Args) -> Result<OperationResult> {
    let config = args.operation_config()?;

    let result = match &args.command {
        Command::Read { .. } => fs.read(&config).await,
        Command::Write { content, .. } if content == "-" => {
            let mut stdin = String::new();
            tokio::io::stdin()
                .read_to_string(&mut stdin)
                .await
                .wrap_err("failed to read content from stdin")?;
            fs.write(&config, &stdin).await
        }
        Command::Write { content, .. } => fs.write(&config, content).await,
        Command::Upload { local, .. } => fs.upload_from(&config, local).await,
        Command::Download { local, .. } => fs.download_to(&config, local).await,
    };

    Ok(result)
}

fn print_result(result: &OperationResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }

    if let Some(error) = &result.error {
        eprintln!("error: {error}");
    }
    if let Some(Content::Text(text)) = &result.content {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(text.as_bytes())?;
        stdout.flush()?;
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    shellfs::init_tracing();
    let args = Args::parse();

    let pool = ConnectionPool::start(SshConnector::default(), PoolConfig::default());
    let fs = RemoteFs::new(pool.clone());

    let result = run(&fs, &args).await;
    pool.shutdown().await;

    let result = result?;
    print_result(&result, args.json)?;

    tracing::debug!("operation finished, success: {}", result.success);
    Ok(if result.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
