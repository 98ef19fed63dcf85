use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::Deserialize;
use anyhow::{bail, Context, Result};
use shared::protocol::{CANCEL_TEMPLATE, INSTALL_TEMPLATE, PXE_TEMPLATE};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub templates: TemplateConfig,
    #[serde(default)]
    pub pxe: PxeConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    /// Write an empty store at startup if none exists
    #[serde(default = "default_true")]
    pub create_if_missing: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TemplateConfig {
    #[serde(default = "default_template_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_install_template")]
    pub install: String,
    #[serde(default = "default_cancel_template")]
    pub cancel: String,
    #[serde(default = "default_pxe_template")]
    pub pxe: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PxeConfig {
    /// Boot loader configuration directory (pxelinux.cfg)
    #[serde(default = "default_pxe_cfg_dir")]
    pub cfg_dir: PathBuf,
    /// Substituted for `___PXE_DEFAULT___` when a host has no label of its own
    #[serde(default = "default_pxe_label")]
    pub default_label: String,
    /// Boot-menu labels a host may be assigned
    #[serde(default = "default_pxe_labels")]
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolverConfig {
    #[serde(default = "default_resolver_program")]
    pub program: String,
    /// Arguments placed before the address being resolved
    #[serde(default = "default_resolver_args")]
    pub args: Vec<String>,
    #[serde(default = "default_resolver_timeout")]
    pub timeout_ms: u64,
}

fn default_listen() -> String {
    "[::]:8000".to_string()
}

fn default_store_path() -> PathBuf {
    PathBuf::from("/srv/bty/bty.json")
}

fn default_true() -> bool {
    true
}

fn default_template_dir() -> PathBuf {
    PathBuf::from("/srv/bty/templates")
}

fn default_install_template() -> String {
    INSTALL_TEMPLATE.to_string()
}

fn default_cancel_template() -> String {
    CANCEL_TEMPLATE.to_string()
}

fn default_pxe_template() -> String {
    PXE_TEMPLATE.to_string()
}

fn default_pxe_cfg_dir() -> PathBuf {
    PathBuf::from("/srv/tftpboot/pxelinux.cfg")
}

fn default_pxe_label() -> String {
    "boot_hd0".to_string()
}

fn default_pxe_labels() -> Vec<String> {
    ["boot_hda", "boot_hda_bzi", "boot_hd0", "install"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_resolver_program() -> String {
    "arp".to_string()
}

fn default_resolver_args() -> Vec<String> {
    vec!["-a".to_string()]
}

fn default_resolver_timeout() -> u64 {
    2000
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            create_if_missing: default_true(),
        }
    }
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            dir: default_template_dir(),
            install: default_install_template(),
            cancel: default_cancel_template(),
            pxe: default_pxe_template(),
        }
    }
}

impl Default for PxeConfig {
    fn default() -> Self {
        Self {
            cfg_dir: default_pxe_cfg_dir(),
            default_label: default_pxe_label(),
            labels: default_pxe_labels(),
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            program: default_resolver_program(),
            args: default_resolver_args(),
            timeout_ms: default_resolver_timeout(),
        }
    }
}

impl ResolverConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.pxe.labels.contains(&self.pxe.default_label) {
            bail!(
                "pxe.default_label {:?} is not one of pxe.labels {:?}",
                self.pxe.default_label,
                self.pxe.labels
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.api.listen, "[::]:8000");
        assert_eq!(config.pxe.cfg_dir, PathBuf::from("/srv/tftpboot/pxelinux.cfg"));
        assert_eq!(config.pxe.default_label, "boot_hd0");
        assert_eq!(config.resolver.program, "arp");
        assert_eq!(config.resolver.timeout(), Duration::from_secs(2));
        assert!(config.store.create_if_missing);
    }

    #[test]
    fn test_partial_sections() {
        let config: Config = toml::from_str(
            r#"
            [store]
            path = "/tmp/hosts.json"

            [templates]
            dir = "/tmp/templates"
            install = "install.tmpl"

            [resolver]
            program = "ip"
            args = ["neigh", "show"]
            "#,
        )
        .unwrap();

        assert_eq!(config.store.path, PathBuf::from("/tmp/hosts.json"));
        assert_eq!(config.templates.install, "install.tmpl");
        assert_eq!(config.templates.cancel, "bootstrap_cancel.sh");
        assert_eq!(config.resolver.args, vec!["neigh", "show"]);
        assert_eq!(config.resolver.timeout_ms, 2000);
    }

    #[test]
    fn test_default_label_must_be_known() {
        let config: Config = toml::from_str(
            r#"
            [pxe]
            default_label = "boot_hd1"
            "#,
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("boot_hd1"));

        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_load_rejects_unknown_default_label() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("btyd.toml");
        std::fs::write(
            &path,
            "[pxe]\ndefault_label = \"install\"\nlabels = [\"boot_hd0\"]\n",
        )
        .unwrap();
        assert!(Config::load(&path).is_err());

        std::fs::write(&path, "[pxe]\nlabels = [\"boot_hd0\", \"install\"]\n").unwrap();
        assert_eq!(Config::load(&path).unwrap().pxe.default_label, "boot_hd0");
    }
}
