//! Config command - show or initialize configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::{Config, ConfigManager, QueueConfig};
use crate::error::RefresherResult;
use crate::ui::{self, Mark, UiContext};

const MASK: &str = "***";

/// Execute the config command
pub async fn execute(args: ConfigArgs, manager: &ConfigManager) -> RefresherResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => show_config(manager).await,
        Some(ConfigAction::Path) => {
            println!("{}", manager.path().display());
            Ok(())
        }
        Some(ConfigAction::Init { force }) => init_config(manager, force).await,
    }
}

async fn show_config(manager: &ConfigManager) -> RefresherResult<()> {
    let config = manager.load().await?;
    println!("{}", toml::to_string_pretty(&redacted(config))?);
    Ok(())
}

async fn init_config(manager: &ConfigManager, force: bool) -> RefresherResult<()> {
    let ctx = UiContext::detect();
    let path = manager.path();

    if path.exists() && !force {
        ui::check(
            &ctx,
            Mark::Warn,
            &format!("Config already exists at {}", path.display()),
            Some("Use --force to overwrite"),
        );
        return Ok(());
    }

    manager.save(&Config::default()).await?;
    ui::check(
        &ctx,
        Mark::Ok,
        "Configuration initialized",
        Some(&path.display().to_string()),
    );
    ui::check(
        &ctx,
        Mark::Warn,
        "Fill in queue, repository.url and storage.root before running listen",
        None,
    );

    Ok(())
}

/// Copy of `config` with credentials masked
fn redacted(mut config: Config) -> Config {
    if let QueueConfig::ServiceBus(sb) = &mut config.queue {
        if !sb.connection_string.is_empty() {
            sb.connection_string = MASK.to_string();
        }
    }
    if config.storage.sas_token.is_some() {
        config.storage.sas_token = Some(MASK.to_string());
    }
    config
}
