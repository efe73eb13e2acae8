use clap::Subcommand;
use taskpulse_core::NotifyConfig;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the active configuration as TOML
    Show {
        /// Print JSON instead
        #[arg(long)]
        json: bool,
    },
    /// Write the default configuration, replacing the current one
    Init,
    /// Print the config file location
    Path,
}

pub fn run(action: ConfigAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ConfigAction::Show { json } => {
            let config = NotifyConfig::load()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                print!("{}", toml::to_string_pretty(&config)?);
            }
        }
        ConfigAction::Init => {
            let config = NotifyConfig::default();
            config.save()?;
            println!("config reset to defaults");
        }
        ConfigAction::Path => {
            println!("{}", NotifyConfig::path()?.display());
        }
    }
    Ok(())
}
