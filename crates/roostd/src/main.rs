use anyhow::{Context, Result};
use roost_config::{ensure_workspace_config, normalize_config, validate_config};
use roostd::cli::{Cli, parse_cli};
use roostd::commands::run_command;
use roostd::logging::init_logging;

fn main() -> Result<()> {
    let cli = parse_cli();
    run(cli)
}

fn run(cli: Cli) -> Result<()> {
    let workspace = cli.workspace.canonicalize().with_context(|| {
        format!(
            "failed to resolve workspace path {}",
            cli.workspace.display()
        )
    })?;

    let config = ensure_workspace_config(&workspace).with_context(|| {
        format!(
            "failed to load or create workspace config at {}",
            workspace.join(".roost/config.toml").display()
        )
    })?;
    init_logging(&config.logging.level, cli.log_format)?;

    for warning in validate_config(&config) {
        tracing::warn!(code = warning.code, "config warning: {}", warning.message);
    }
    let config = normalize_config(config);

    let mut out = std::io::stdout().lock();
    run_command(&workspace, &config, cli.command, &mut out)
}
