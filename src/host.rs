//! Host resolution: merges the curated catalog with the native ssh client
//! config into an immutable connection target.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use ssh2_config::{ParseRule, SshConfig};
use tracing::warn;
use whoami::username;

use crate::store::{config_path, Db};

pub const CATALOG_FILE: &str = "catalog";

/// How credential entry is handled for a host, as recorded in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LoginMode {
    #[default]
    Default,
    Askpass,
    Manual,
}

/// Curated catalog record for one alias. All connection fields are optional;
/// gaps are filled from ssh config and ambient defaults at resolve time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub hostname: Option<String>,
    pub user: Option<String>,
    pub port: Option<u16>,
    pub jump_host: Option<String>,
    #[serde(default)]
    pub login_mode: LoginMode,
    #[serde(default)]
    pub tags: Vec<String>,
    pub group: Option<String>,
}

/// Fully resolved connection target. Immutable once produced.
#[derive(Debug, Clone)]
pub struct EffectiveHost {
    pub name: String,
    pub hostname: String,
    pub user: String,
    pub port: Option<u16>,
    pub jump_host: Option<String>,
    pub login_mode: LoginMode,
    pub tags: Vec<String>,
    pub group: Option<String>,
}

impl EffectiveHost {
    /// Key used for override lookup and secret retrieval. The resolved
    /// network name is preferred over the typed alias so a credential stored
    /// for a host is found under every alias pointing at it.
    pub fn host_key(&self) -> &str {
        &self.hostname
    }

    pub fn target(&self) -> String {
        format!("{}@{}", self.user, self.hostname)
    }
}

pub struct Resolver {
    catalog: HashMap<String, CatalogEntry>,
    ssh_config: Option<SshConfig>,
}

impl Resolver {
    /// Load the catalog store and `~/.ssh/config`. Either being missing or
    /// unparsable degrades to absence.
    pub fn load() -> anyhow::Result<Self> {
        let catalog: Db<String, CatalogEntry> = Db::open(config_path(CATALOG_FILE)?);
        let ssh_config = match SshConfig::parse_default_file(ParseRule::STRICT) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!(error = %e, "ssh config unavailable, resolving from catalog only");
                None
            }
        };
        Ok(Self::with_parts(catalog.clone_map(), ssh_config))
    }

    pub fn with_parts(
        catalog: HashMap<String, CatalogEntry>,
        ssh_config: Option<SshConfig>,
    ) -> Self {
        Self { catalog, ssh_config }
    }

    /// ssh-config parameters for an exact alias, if any.
    fn ssh_host(&self, alias: &str) -> Option<(Option<String>, Option<String>, Option<u16>)> {
        let config = self.ssh_config.as_ref()?;
        for host in config.get_hosts() {
            if host.pattern.iter().any(|clause| clause.pattern == alias) {
                return Some((
                    host.params.host_name.clone(),
                    host.params.user.clone(),
                    host.params.port,
                ));
            }
        }
        None
    }

    /// Merge catalog and ssh-config data for an alias. Catalog fields win;
    /// the user falls back to the invoking user and the hostname to the
    /// alias itself, so any name resolves to a usable target.
    pub fn resolve(&self, alias: &str) -> EffectiveHost {
        let entry = self.catalog.get(alias).cloned().unwrap_or_default();
        let (sc_hostname, sc_user, sc_port) =
            self.ssh_host(alias).unwrap_or((None, None, None));

        EffectiveHost {
            name: alias.to_string(),
            hostname: entry
                .hostname
                .or(sc_hostname)
                .unwrap_or_else(|| alias.to_string()),
            user: entry.user.or(sc_user).unwrap_or_else(username),
            port: entry.port.or(sc_port),
            jump_host: entry.jump_host,
            login_mode: entry.login_mode,
            tags: entry.tags,
            group: entry.group,
        }
    }

    /// All known aliases: the catalog plus concrete (non-wildcard) ssh-config
    /// hosts, resolved, sorted by name.
    pub fn list(&self) -> Vec<EffectiveHost> {
        let mut names: Vec<String> = self.catalog.keys().cloned().collect();

        if let Some(config) = &self.ssh_config {
            for host in config.get_hosts() {
                // Aliases without a concrete hostname are not connectable.
                if host.params.host_name.is_none() {
                    continue;
                }
                for clause in host.pattern.iter() {
                    let pattern = &clause.pattern;
                    if pattern.contains('*') || pattern.contains('?') {
                        continue;
                    }
                    if !names.iter().any(|n| n == pattern) {
                        names.push(pattern.clone());
                    }
                }
            }
        }

        names.sort();
        names.iter().map(|name| self.resolve(name)).collect()
    }
}
