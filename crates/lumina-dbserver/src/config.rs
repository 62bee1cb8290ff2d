//! Reconciliation of the effective server configuration file.

use crate::layout::ServerLayout;
use crate::{ServerError, ServerResult};

use std::panic::Location;
use std::path::Path;
use std::time::SystemTime;

use error_location::ErrorLocation;
use tracing::{debug, info};

/// Permission bits the effective config may carry: owner read/write,
/// group and other read. The server daemon refuses to load config
/// files that are writable by anyone else.
#[cfg(unix)]
const ALLOWED_CONFIG_MODE: u32 = 0o644;

/// Materializes the effective configuration from the bundled default
/// template and the optional site-local override.
///
/// The effective file is only rewritten when one of its sources is
/// newer than the previously materialized copy; a missing effective
/// file compares as the epoch and is therefore always (re)generated.
pub struct ConfigReconciler<'a> {
    layout: &'a ServerLayout,
}

impl<'a> ConfigReconciler<'a> {
    pub fn new(layout: &'a ServerLayout) -> Self {
        Self { layout }
    }

    /// Regenerate the effective config if its sources changed.
    ///
    /// Returns whether the file was rewritten.
    pub fn reconcile(&self) -> ServerResult<bool> {
        let template = &self.layout.default_config;
        let target = &self.layout.actual_config;

        if !template.exists() {
            return Err(ServerError::ConfigTemplateMissing {
                path: template.clone(),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        let target_mtime = modified_or_epoch(target);
        let template_newer = modified_or_epoch(template) > target_mtime;
        let local_newer = self
            .layout
            .local_config
            .as_deref()
            .is_some_and(|local| modified_or_epoch(local) > target_mtime);

        if !template_newer && !local_newer {
            debug!(
                "Server configuration already up to date: {}",
                target.display()
            );
            return Ok(false);
        }

        info!(
            "Server configuration is outdated, {} will be regenerated",
            target.display()
        );

        self.materialize()?;
        self.fix_permissions()?;

        Ok(true)
    }

    /// Concatenate default-then-local into the effective config.
    fn materialize(&self) -> ServerResult<()> {
        let template = &self.layout.default_config;
        let target = &self.layout.actual_config;

        let write_error = |source: std::io::Error| ServerError::ConfigWrite {
            template: template.clone(),
            target: target.clone(),
            source,
            location: ErrorLocation::from(Location::caller()),
        };

        let mut content = std::fs::read(template).map_err(write_error)?;
        debug!("Merged server configuration from {}", template.display());

        if let Some(local) = self.layout.local_config.as_deref()
            && local.exists()
        {
            content.extend(std::fs::read(local).map_err(write_error)?);
            debug!("Merged server configuration from {}", local.display());
        }

        std::fs::write(target, content).map_err(write_error)?;

        Ok(())
    }

    /// Strip write permission for anyone but the owner.
    #[cfg(unix)]
    fn fix_permissions(&self) -> ServerResult<()> {
        use std::os::unix::fs::PermissionsExt;

        let target = &self.layout.actual_config;
        let metadata = std::fs::metadata(target)?;
        let mode = metadata.permissions().mode() & 0o7777;
        let allowed = mode & ALLOWED_CONFIG_MODE;

        if allowed != mode {
            std::fs::set_permissions(target, std::fs::Permissions::from_mode(allowed))?;
            debug!("Fixed permissions of the server configuration file");
        }

        Ok(())
    }

    #[cfg(not(unix))]
    fn fix_permissions(&self) -> ServerResult<()> {
        Ok(())
    }
}

fn modified_or_epoch(path: &Path) -> SystemTime {
    std::fs::metadata(path)
        .and_then(|meta| meta.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH)
}
