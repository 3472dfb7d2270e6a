use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    let args = bookpipe::cli::with_default_subcommand(std::env::args_os());
    let cli = bookpipe::cli::Cli::parse_from(args);
    bookpipe::logging::init(cli.verbose).context("init logging")?;
    tracing::debug!(?cli, "parsed cli");

    let workspace = bookpipe::workspace::Workspace::new(&cli.root, cli.output_dir.clone());
    match cli.command {
        bookpipe::cli::Command::Build(args) => {
            bookpipe::commands::build(&workspace, args)
                .await
                .context("build")?;
        }
        bookpipe::cli::Command::Lint(args) => {
            bookpipe::commands::lint(&workspace, args).context("lint")?;
        }
        bookpipe::cli::Command::Validate(args) => {
            bookpipe::commands::validate(&workspace, args).context("validate")?;
        }
    }

    Ok(())
}
