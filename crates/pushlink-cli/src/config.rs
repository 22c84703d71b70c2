//! Configuration loading for the pushlink CLI
//!
//! Sources, lowest priority first:
//! 1. Built-in defaults
//! 2. `pushlink.toml` in the working directory
//! 3. `config.toml` in the user's pushlink configuration directory
//! 4. `PUSHLINK_` environment variables, sections separated by `__`
//!    (`PUSHLINK_NETWORK__NOTIFICATION_PORT=4000`)
//! 5. Command line flags
//!
//! An explicit `--config` file replaces sources 2 and 3.

use std::net::IpAddr;
use std::path::PathBuf;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use pushlink_core::identity::store::APP_DIR_NAME;
use pushlink_core::PushlinkConfig;

use crate::error::{CliError, Result};

/// File looked up in the working directory
pub const LOCAL_CONFIG_FILE: &str = "pushlink.toml";

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "PUSHLINK_";

/// Flags that take precedence over every file and variable
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub base_dir: Option<PathBuf>,
    pub bind_address: Option<IpAddr>,
    pub notification_port: Option<u16>,
    pub pairing_port: Option<u16>,
}

/// `config.toml` under the platform configuration directory
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join("config.toml"))
}

// ----------------------------------------------------------------------------
// Configuration Loading Logic
// ----------------------------------------------------------------------------

/// Layers configuration sources into a validated [`PushlinkConfig`]
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    explicit_file: Option<PathBuf>,
    user_file: Option<PathBuf>,
    overrides: ConfigOverrides,
}

impl ConfigLoader {
    pub fn new(overrides: ConfigOverrides) -> Self {
        Self {
            explicit_file: None,
            user_file: user_config_path(),
            overrides,
        }
    }

    /// Read only this file instead of the default search
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.explicit_file = Some(path.into());
        self
    }

    /// Replace the per-user file location
    pub fn with_user_file(mut self, path: Option<PathBuf>) -> Self {
        self.user_file = path;
        self
    }

    /// All sources merged, before extraction
    pub fn figment(&self) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(PushlinkConfig::default()));

        match &self.explicit_file {
            Some(path) => figment = figment.merge(Toml::file(path)),
            None => {
                figment = figment.merge(Toml::file(LOCAL_CONFIG_FILE));
                if let Some(path) = &self.user_file {
                    figment = figment.merge(Toml::file(path));
                }
            }
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        // Apply command line overrides
        let overrides = &self.overrides;
        if let Some(dir) = &overrides.base_dir {
            figment = figment.merge(("storage.base_dir", dir));
        }
        if let Some(address) = overrides.bind_address {
            figment = figment.merge(("network.bind_address", address.to_string()));
        }
        if let Some(port) = overrides.notification_port {
            figment = figment.merge(("network.notification_port", port));
        }
        if let Some(port) = overrides.pairing_port {
            figment = figment.merge(("network.pairing_port", port));
        }
        figment
    }

    /// Extract and validate the merged configuration
    pub fn load(&self) -> Result<PushlinkConfig> {
        if let Some(path) = &self.explicit_file {
            if !path.is_file() {
                return Err(CliError::Config(format!(
                    "configuration file {} does not exist",
                    path.display()
                )));
            }
        }

        let config: PushlinkConfig = self.figment().extract()?;
        config.validate()?;
        Ok(config)
    }
}

/// Render a configuration the way it would be written to a file
pub fn render(config: &PushlinkConfig) -> Result<String> {
    Ok(toml::to_string_pretty(config)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use pushlink_core::config::DEFAULT_NOTIFICATION_PORT;

    fn loader() -> ConfigLoader {
        ConfigLoader::new(ConfigOverrides::default()).with_user_file(None)
    }

    #[test]
    fn test_defaults_without_any_source() {
        Jail::expect_with(|_jail| {
            let config = loader().load().unwrap();
            assert_eq!(config, PushlinkConfig::default());
            assert_eq!(config.network.notification_port, DEFAULT_NOTIFICATION_PORT);
            Ok(())
        });
    }

    #[test]
    fn test_sources_apply_in_priority_order() {
        Jail::expect_with(|jail| {
            jail.create_file(
                LOCAL_CONFIG_FILE,
                r#"
                [network]
                notification_port = 4000
                pairing_port = 4001
                handshake_timeout_ms = 750

                [dispatch]
                title_format = "[{title}]"
                "#,
            )?;
            jail.create_file("user.toml", "[network]\npairing_port = 5001\n")?;
            jail.set_env("PUSHLINK_NETWORK__NOTIFICATION_PORT", "6000");

            let config = ConfigLoader::new(ConfigOverrides {
                bind_address: Some("127.0.0.1".parse().unwrap()),
                ..Default::default()
            })
            .with_user_file(Some(jail.directory().join("user.toml")))
            .load()
            .unwrap();

            assert_eq!(config.network.notification_port, 6000);
            assert_eq!(config.network.pairing_port, Some(5001));
            assert_eq!(config.network.handshake_timeout_ms, 750);
            assert_eq!(config.network.bind_address.to_string(), "127.0.0.1");
            assert_eq!(config.dispatch.title_format, "[{title}]");
            Ok(())
        });
    }

    #[test]
    fn test_flags_beat_environment() {
        Jail::expect_with(|jail| {
            jail.set_env("PUSHLINK_NETWORK__NOTIFICATION_PORT", "6000");
            let config = ConfigLoader::new(ConfigOverrides {
                notification_port: Some(7000),
                base_dir: Some(PathBuf::from("/srv/pushlink")),
                ..Default::default()
            })
            .with_user_file(None)
            .load()
            .unwrap();

            assert_eq!(config.network.notification_port, 7000);
            assert_eq!(config.storage.base_dir, Some(PathBuf::from("/srv/pushlink")));
            Ok(())
        });
    }

    #[test]
    fn test_explicit_file_skips_local_file() {
        Jail::expect_with(|jail| {
            jail.create_file(LOCAL_CONFIG_FILE, "[network]\nnotification_port = 4000\n")?;
            jail.create_file("custom.toml", "[dispatch]\nmax_in_flight = 4\n")?;

            let config = loader().with_file("custom.toml").load().unwrap();
            assert_eq!(config.network.notification_port, DEFAULT_NOTIFICATION_PORT);
            assert_eq!(config.dispatch.max_in_flight, 4);
            Ok(())
        });
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        Jail::expect_with(|_jail| {
            let result = loader().with_file("absent.toml").load();
            assert!(matches!(result, Err(CliError::Config(_))));
            Ok(())
        });
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file(
                LOCAL_CONFIG_FILE,
                "[network]\nnotification_port = 4000\npairing_port = 4000\n",
            )?;
            assert!(matches!(loader().load(), Err(CliError::Pushlink(_))));

            jail.create_file(LOCAL_CONFIG_FILE, "[network]\nnotification_port = \"high\"\n")?;
            assert!(matches!(loader().load(), Err(CliError::Figment(_))));
            Ok(())
        });
    }

    #[test]
    fn test_rendered_config_loads_back() {
        Jail::expect_with(|jail| {
            let mut config = PushlinkConfig::default();
            config.network.pairing_port = Some(4100);
            config.dispatch.command = Some(vec!["notify-send".into(), "{title}".into()]);
            jail.create_file("saved.toml", &render(&config).unwrap())?;

            let loaded = loader().with_file("saved.toml").load().unwrap();
            assert_eq!(loaded, config);
            Ok(())
        });
    }
}
