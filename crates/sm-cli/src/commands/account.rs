//! Account file commands

use anyhow::{bail, Context, Result};
use std::path::PathBuf;

use sm_core::config::{self, AccountConfig, InstanceProfile};

use crate::output::{format_instances, print_info, print_success};

/// Placeholder instance written into new account files
fn sample_instance() -> InstanceProfile {
    InstanceProfile {
        name: "default".to_string(),
        instance_id: "i-01234567890abcdef".to_string(),
        region: None,
        connection_type: "rdp".to_string(),
        domain: None,
        username: Some(whoami::username()),
        local_port: None,
    }
}

/// Create a new account file with one placeholder instance
pub fn init_command(
    account: &str,
    profile: Option<&str>,
    region: Option<&str>,
    force: bool,
) -> Result<PathBuf> {
    let path = config::account_path(account);
    if path.exists() && !force {
        bail!(
            "Account file already exists: {} (use --force to overwrite)",
            path.display()
        );
    }

    let mut config = AccountConfig {
        instances: vec![sample_instance()],
        ..Default::default()
    };
    if let Some(profile) = profile {
        config.profile = profile.to_string();
    }
    if let Some(region) = region {
        config.region = region.to_string();
    }
    config.validate()?;

    config::save_config(&path, &config)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    print_success(&format!("Created account file: {}", path.display()));
    print_info("Edit the [[instances]] entries to point at your own instances");
    Ok(path)
}

fn load(account: &str) -> Result<(PathBuf, AccountConfig)> {
    let path = config::account_path(account);
    let config: AccountConfig = config::load_config(&path)
        .with_context(|| format!("Failed to load account from {}", path.display()))?;
    Ok((path, config))
}

/// Print the instances of an account
pub fn list_command(account: &str) -> Result<()> {
    let (path, config) = load(account)?;
    config.validate()?;

    print_info(&format!(
        "Account {} (profile '{}', region {})",
        path.display(),
        config.profile,
        config.region
    ));
    println!("{}", format_instances(&config));
    Ok(())
}

/// Print an account file as it is on disk
pub fn config_show(account: &str) -> Result<()> {
    let path = config::account_path(account);
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    print_info(&format!("Account file: {}", path.display()));
    println!();
    println!("{}", content);
    Ok(())
}

/// Print the directory account names are resolved in
pub fn config_path() {
    println!("{}", config::default_config_dir().display());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_writes_loadable_account() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("work.toml");
        let name = path.display().to_string();

        let written = init_command(&name, Some("work"), Some("eu-west-2"), false).unwrap();
        assert_eq!(written, path);

        let (_, loaded) = load(&name).unwrap();
        assert_eq!(loaded.profile, "work");
        assert_eq!(loaded.region, "eu-west-2");
        assert_eq!(loaded.instances, vec![sample_instance()]);
        loaded.validate().unwrap();
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let name = dir.path().join("work.toml").display().to_string();

        init_command(&name, None, None, false).unwrap();
        assert!(init_command(&name, None, None, false).is_err());
        init_command(&name, None, None, true).unwrap();
    }

    #[test]
    fn test_init_rejects_bad_region() {
        let dir = tempfile::tempdir().unwrap();
        let name = dir.path().join("work.toml").display().to_string();
        assert!(init_command(&name, None, Some("mars"), false).is_err());
    }
}
