//! Configuration file management command

use anyhow::{Context, Result};
use console::style;
use etchline_core::Settings;
use std::path::PathBuf;

/// Arguments for the config command
pub struct ConfigArgs {
    /// Initialize a new configuration file with defaults
    pub init: bool,
    /// Show the path to the configuration file
    pub path: bool,
    /// Show configuration in JSON format
    pub json: bool,
    /// Suppress output
    pub quiet: bool,
    /// Custom configuration file path (overrides default)
    pub config_file: Option<PathBuf>,
}

/// Execute the config command
pub fn execute(args: ConfigArgs) -> Result<()> {
    let config_path = args.config_file.clone().or_else(Settings::config_path);

    if args.path {
        match &config_path {
            Some(path) => println_if!(args.quiet, "{}", path.display()),
            None => eprintln!("{}", style("Could not determine config path").yellow()),
        }
        return Ok(());
    }

    if args.init {
        return init_config(config_path, args.quiet);
    }

    show_config(config_path, args.json, args.quiet)
}

/// Initialize a new configuration file with default values
fn init_config(config_path: Option<PathBuf>, quiet: bool) -> Result<()> {
    let path = config_path.context("Could not determine configuration directory")?;

    if path.exists() {
        if !quiet {
            eprintln!(
                "{} Configuration file already exists at: {}",
                style("Warning:").yellow(),
                path.display()
            );
            eprintln!("Use a text editor to modify it, or delete it to re-initialize.");
        }
        return Ok(());
    }

    let saved_path = Settings::default()
        .save_to_path(Some(path))
        .context("Failed to save configuration file")?;

    println_if!(
        quiet,
        "{} Created configuration file at: {}",
        style("Success:").green(),
        saved_path.display()
    );
    println_if!(quiet);
    println_if!(quiet, "Step weights decide how much of the progress bar each step takes:");
    println_if!(quiet);
    println_if!(quiet, "  [weights]");
    println_if!(quiet, "  write = 8.0     # Writing the image");
    println_if!(quiet, "  verify = 4.0    # Reading it back");

    Ok(())
}

/// Show the current configuration
fn show_config(config_path: Option<PathBuf>, json: bool, quiet: bool) -> Result<()> {
    if quiet {
        return Ok(());
    }

    let config_exists = config_path.as_ref().is_some_and(|p| p.exists());
    let settings = Settings::load_from_path(config_path.clone());

    if json {
        let json_output = serde_json::to_string_pretty(&settings)
            .context("Failed to serialize settings to JSON")?;
        println!("{}", json_output);
        return Ok(());
    }

    println!("{}", style("Etchline Configuration").bold());
    println!();

    if let Some(path) = &config_path {
        if config_exists {
            println!("  {} {}", style("Config file:").dim(), path.display());
        } else {
            println!(
                "  {} {} {}",
                style("Config file:").dim(),
                path.display(),
                style("(not found, using defaults)").yellow()
            );
        }
    }
    println!();

    println!("{}", style("[write]").cyan());
    println!("  chunk_size = \"{}\"", settings.write.chunk_size);
    println!("  block_size = {}", settings.write.block_size);
    println!("  verify = {}", settings.write.verify);
    println!();

    println!("{}", style("[weights]").cyan());
    println!("  checksum = {}", settings.weights.checksum);
    println!("  write = {}", settings.weights.write);
    println!("  verify = {}", settings.weights.verify);
    println!();

    println!("{}", style("[behavior]").cyan());
    println!(
        "  skip_confirmation = {}",
        settings.behavior.skip_confirmation
    );
    println!("  quiet = {}", settings.behavior.quiet);

    if !config_exists {
        println!();
        println!(
            "{}",
            style("Run 'etchline config --init' to create a configuration file.").dim()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_show_config_quiet() {
        assert!(show_config(None, false, true).is_ok());
        assert!(show_config(None, true, true).is_ok());
    }

    #[test]
    fn test_init_creates_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("etchline_config.toml");

        init_config(Some(path.clone()), true).unwrap();
        assert!(path.exists());
        assert_eq!(Settings::load_from_path(Some(path)), Settings::default());
    }

    #[test]
    fn test_init_keeps_existing_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("etchline_config.toml");
        std::fs::write(&path, "[write]\nverify = false\n").unwrap();

        init_config(Some(path.clone()), true).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("verify = false"));
    }

    #[test]
    fn test_init_without_path_fails() {
        assert!(init_config(None, true).is_err());
    }

    #[test]
    fn test_execute_path_flag() {
        let args = ConfigArgs {
            init: false,
            path: true,
            json: false,
            quiet: true,
            config_file: Some(PathBuf::from("/tmp/etchline_config.toml")),
        };
        assert!(execute(args).is_ok());
    }
}
