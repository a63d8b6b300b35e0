//! `pollcast config` subcommand handlers.

use pollcast_config::{load_config, resolve_config_path};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;

pub fn handle(args: &ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let path = resolve_config_path(global.config.as_deref());

    match args.command {
        ConfigCommand::Path => {
            println!("{}", path.display());
        }
        ConfigCommand::Show => {
            let config = load_config(&path).map_err(|e| CliError::from_config(e, &path))?;
            let rendered = config
                .redacted()
                .to_toml()
                .map_err(|e| CliError::from_config(e, &path))?;
            print!("{rendered}");
        }
        ConfigCommand::Check => {
            load_config(&path)
                .and_then(|c| c.validate())
                .map_err(|e| CliError::from_config(e, &path))?;
            println!("configuration OK");
        }
    }
    Ok(())
}
