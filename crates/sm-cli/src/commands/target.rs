//! Resolving a connection target from flags and account files

use anyhow::{bail, Context, Result};
use clap::Args;
use dialoguer::{theme::ColorfulTheme, Select};

use sm_core::config::{self, AccountConfig, InstanceProfile};
use sm_core::Target;

/// Flags selecting an instance, shared by `connect` and `manage`
#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
    /// Account file to load (a name in the config directory, or a path)
    #[arg(short, long)]
    pub account: Option<String>,

    /// Instance name within the account file
    #[arg(short, long)]
    pub instance: Option<String>,

    /// Instance id, bypassing the account's instance list
    #[arg(long)]
    pub instance_id: Option<String>,

    /// Local credential profile
    #[arg(short, long, env = "AWS_PROFILE")]
    pub profile: Option<String>,

    /// Role to assume on top of the profile
    #[arg(long)]
    pub role_arn: Option<String>,

    /// Region of the instance
    #[arg(short, long)]
    pub region: Option<String>,

    /// Connection type (rdp, ssh, vnc, or one defined in the account)
    #[arg(short = 't', long)]
    pub connection_type: Option<String>,

    /// Fixed local port (random between 50000 and 59999 when unset)
    #[arg(long)]
    pub local_port: Option<u16>,

    /// Logon domain
    #[arg(long)]
    pub domain: Option<String>,

    /// Logon username
    #[arg(short, long)]
    pub username: Option<String>,
}

/// A validated account plus the target selected from it
#[derive(Debug, Clone)]
pub struct Resolved {
    pub account: AccountConfig,
    pub target: Target,
}

impl TargetArgs {
    /// Load the account (if any), apply overrides, validate, and build the
    /// target.
    pub fn resolve(&self) -> Result<Resolved> {
        let mut account = self.load_account()?;
        if let Some(profile) = &self.profile {
            account.profile = profile.clone();
        }
        if let Some(role_arn) = &self.role_arn {
            account.role_arn = Some(role_arn.clone());
        }
        if let Some(region) = &self.region {
            account.region = region.clone();
        }
        account.validate()?;

        let profile = match (&self.instance_id, &self.account) {
            (Some(instance_id), _) => InstanceProfile {
                name: self.instance.clone().unwrap_or_else(|| instance_id.clone()),
                instance_id: instance_id.clone(),
                connection_type: "rdp".to_string(),
                ..Default::default()
            },
            (None, Some(_)) => pick_instance(&account, self.instance.as_deref())?.clone(),
            (None, None) => bail!("Pass --instance-id, or --account to pick a configured instance"),
        };
        let profile = self.apply_overrides(profile);

        let types = account.connection_types();
        profile.validate(&types)?;
        let target = profile.to_target(&account.region, &types)?;

        Ok(Resolved { account, target })
    }

    fn load_account(&self) -> Result<AccountConfig> {
        match &self.account {
            Some(name) => {
                let path = config::account_path(name);
                config::load_config(&path)
                    .with_context(|| format!("Failed to load account from {}", path.display()))
            }
            None => Ok(AccountConfig::default()),
        }
    }

    fn apply_overrides(&self, mut profile: InstanceProfile) -> InstanceProfile {
        if let Some(connection_type) = &self.connection_type {
            profile.connection_type = connection_type.to_lowercase();
        }
        if self.local_port.is_some() {
            profile.local_port = self.local_port;
        }
        if self.domain.is_some() {
            profile.domain = self.domain.clone();
        }
        if self.username.is_some() {
            profile.username = self.username.clone();
        }
        profile
    }
}

/// Find the named instance, or let the operator choose one
fn pick_instance<'a>(account: &'a AccountConfig, name: Option<&str>) -> Result<&'a InstanceProfile> {
    if let Some(name) = name {
        return account
            .instance(name)
            .with_context(|| format!("No instance named '{}' in the account", name));
    }

    match account.instances.as_slice() {
        [] => bail!("The account has no instances configured"),
        [only] => Ok(only),
        instances => {
            let names: Vec<&str> = instances.iter().map(|i| i.name.as_str()).collect();
            let choice = Select::with_theme(&ColorfulTheme::default())
                .with_prompt("Select an instance")
                .items(&names)
                .default(0)
                .interact_opt()
                .context("Several instances configured; pass --instance to pick one")?;
            match choice {
                Some(index) => Ok(&instances[index]),
                None => bail!("No instance selected"),
            }
        }
    }
}
