//! Placeholder substitution over bootstrap and PXE templates
//!
//! Templates are plain text with `___FIELD___` tokens, one per `HostRecord`
//! field. Tokens whose field is unset are left in the output untouched.

use std::path::PathBuf;
use shared::types::{HostRecord, Placeholder};
use crate::config::TemplateConfig;
use crate::error::{BtyError, Result};

/// Replace every placeholder whose field is set on `record`.
pub fn render(template: &str, record: &HostRecord) -> String {
    let mut out = template.to_string();
    for placeholder in Placeholder::ALL {
        if let Some(value) = record.field_value(placeholder) {
            out = out.replace(&placeholder.token(), &value);
        }
    }
    out
}

/// Placeholders still present in `text`
pub fn unresolved(text: &str) -> Vec<Placeholder> {
    Placeholder::ALL
        .into_iter()
        .filter(|p| text.contains(&p.token()))
        .collect()
}

/// Checks that `record` may have a PXE config generated for it.
pub fn check_pxe_eligible(record: &HostRecord) -> Result<()> {
    let reason = if !record.managed {
        "host is not managed"
    } else if record.hostname.is_none() {
        "hostname is not set"
    } else if record.image.is_none() {
        "image is not set"
    } else {
        return Ok(());
    };

    Err(BtyError::InvalidHostState {
        hwa: record.hwa,
        reason,
    })
}

/// Render the PXE loader config for `record`.
///
/// Refused with `InvalidHostState` unless the host is managed and has both a
/// hostname and an image. A host without its own boot-menu label gets
/// `default_label`.
pub fn render_pxe(template: &str, record: &HostRecord, default_label: &str) -> Result<String> {
    check_pxe_eligible(record)?;

    let mut record = record.clone();
    if record.pxe_default.is_none() {
        record.pxe_default = Some(default_label.to_string());
    }

    Ok(render(template, &record))
}

/// The three templates read from the template directory on each request
#[derive(Debug, Clone)]
pub struct Templates {
    dir: PathBuf,
    install: String,
    cancel: String,
    pxe: String,
}

impl Templates {
    pub fn new(config: &TemplateConfig) -> Self {
        Self {
            dir: config.dir.clone(),
            install: config.install.clone(),
            cancel: config.cancel.clone(),
            pxe: config.pxe.clone(),
        }
    }

    async fn read(&self, name: &str) -> Result<String> {
        tokio::fs::read_to_string(self.dir.join(name))
            .await
            .map_err(|source| BtyError::TemplateMissing {
                name: name.to_string(),
                source,
            })
    }

    /// The install script for managed hosts, the cancel/reboot script otherwise
    pub async fn bootstrap(&self, record: &HostRecord) -> Result<String> {
        let name = if record.managed { &self.install } else { &self.cancel };
        let script = render(&self.read(name).await?, record);

        let missing = unresolved(&script);
        if !missing.is_empty() {
            tracing::debug!("{} for {} left unexpanded: {:?}", name, record.hwa, missing);
        }
        Ok(script)
    }

    /// PXE loader config for `record`. The template is only read for eligible hosts.
    pub async fn pxe_config(&self, record: &HostRecord, default_label: &str) -> Result<String> {
        check_pxe_eligible(record)?;
        let template = self.read(&self.pxe).await?;
        render_pxe(&template, record, default_label)
    }
}
