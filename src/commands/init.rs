use std::fs;

use anyhow::Context;
use clap::Args;

use super::Town;
use crate::config::{self, CONFIG_TOML, Config};
use crate::error::ExitError;

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Town name (defaults to the town directory name)
    #[arg(long)]
    pub name: Option<String>,
    /// Rigs to scan for plugins (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub rigs: Vec<String>,
    /// Dog pool (comma-separated, defaults to alpha,bravo,charlie)
    #[arg(long, value_delimiter = ',')]
    pub dogs: Vec<String>,
    /// Overwrite an existing config
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    pub fn execute(&self, town: &Town) -> anyhow::Result<()> {
        let root = &town.root;
        if let Some(existing) = config::find_config(root)
            && !self.force
        {
            return Err(ExitError::Config(format!(
                "{} already exists (use --force to overwrite)",
                existing.display()
            ))
            .into());
        }

        let mut config = Config::default();
        config.town.name = self
            .name
            .clone()
            .or_else(|| root.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or(config.town.name);
        config.town.rigs.clone_from(&self.rigs);
        if !self.dogs.is_empty() {
            config.dogs.pool.clone_from(&self.dogs);
        }

        fs::create_dir_all(root).with_context(|| format!("creating {}", root.display()))?;
        let path = root.join(CONFIG_TOML);
        fs::write(&path, config.to_toml()?).with_context(|| format!("writing {}", path.display()))?;

        let town = Town {
            root: root.clone(),
            config,
        };
        let created = town.dogs().provision(&town.config.dogs.pool)?;

        println!("Initialized town {} at {}", town.config.town.name, root.display());
        println!("  config: {}", path.display());
        if created.is_empty() {
            println!("  dogs:   (all present)");
        } else {
            println!("  dogs:   {}", created.join(", "));
        }
        Ok(())
    }
}
