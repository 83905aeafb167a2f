//! Installation pipeline for one downloaded disk image
//!
//! ```text
//! Downloaded → Mounted → SourceLocated → Copied → Verified
//!            → LicenseApproved → ComponentsInstalled → [Symlinked] → [CleanedUp]
//! ```
//!
//! Every failure after mounting releases what the pipeline acquired: the
//! volume is detached before returning, and a copy that fails signature
//! assessment is deleted.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::install::command::{CommandOutput, CommandSpec, SystemCommand};
use crate::install::error::InstallError;
use crate::install::lock::InstallLock;
use crate::install::registry::InstalledVersionEntity;

const PLIST_BUDDY: &str = "/usr/libexec/PlistBuddy";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStage {
    Downloaded,
    Mounted,
    SourceLocated,
    Copied,
    Verified,
    LicenseApproved,
    ComponentsInstalled,
    Symlinked,
    CleanedUp,
}

impl fmt::Display for InstallStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InstallStage::Downloaded => "downloaded",
            InstallStage::Mounted => "mounted",
            InstallStage::SourceLocated => "source located",
            InstallStage::Copied => "copied",
            InstallStage::Verified => "verified",
            InstallStage::LicenseApproved => "license approved",
            InstallStage::ComponentsInstalled => "components installed",
            InstallStage::Symlinked => "symlinked",
            InstallStage::CleanedUp => "cleaned up",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstallOptions {
    /// Point the active symlink and `xcode-select` at the new bundle
    pub switch: bool,
    /// Delete the disk image afterwards
    pub clean: bool,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            switch: true,
            clean: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub installed: InstalledVersionEntity,
    pub stages: Vec<InstallStage>,
}

/// Host-wide locations the pipeline works with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelinePaths {
    pub mount_point: PathBuf,
    pub symlink_path: PathBuf,
    pub license_plist_path: PathBuf,
    pub lock_path: PathBuf,
}

impl From<&Config> for PipelinePaths {
    fn from(config: &Config) -> Self {
        Self {
            mount_point: config.mount_point.clone(),
            symlink_path: config.symlink_path.clone(),
            license_plist_path: config.license_plist_path.clone(),
            lock_path: config.lock_path(),
        }
    }
}

pub struct InstallationPipeline {
    system: Arc<dyn SystemCommand>,
    paths: PipelinePaths,
}

impl InstallationPipeline {
    pub fn new(system: Arc<dyn SystemCommand>, paths: PipelinePaths) -> Self {
        Self { system, paths }
    }

    pub fn paths(&self) -> &PipelinePaths {
        &self.paths
    }

    /// Installs the bundle contained in `dmg` at `target`.
    pub async fn install(
        &self,
        dmg: &Path,
        target: &Path,
        options: InstallOptions,
    ) -> Result<InstallReport, InstallError> {
        let _lock = InstallLock::acquire(&self.paths.lock_path)?;
        let mut stages = vec![InstallStage::Downloaded];

        self.mount(dmg).await?;
        advance(&mut stages, InstallStage::Mounted);

        let Some(source) = self.locate_source() else {
            self.unmount().await;
            return Err(InstallError::SourceNotFound {
                dmg: dmg.to_path_buf(),
            });
        };
        advance(&mut stages, InstallStage::SourceLocated);

        info!("Please authenticate for Xcode installation...");
        let copy = self
            .run(CommandSpec::new("ditto").args([source.as_path(), target]).privileged())
            .await;
        self.unmount().await;
        let copy = copy?;
        if !copy.success() {
            self.remove_bundle(target).await;
            return Err(InstallError::Copy {
                source_path: source,
                target: target.to_path_buf(),
                stderr: copy.stderr,
            });
        }
        advance(&mut stages, InstallStage::Copied);

        if !self.verify_integrity(target).await? {
            self.remove_bundle(target).await;
            return Err(InstallError::Integrity {
                path: target.to_path_buf(),
            });
        }
        advance(&mut stages, InstallStage::Verified);

        self.enable_developer_mode().await;
        let installed = InstalledVersionEntity::query(target, self.system.as_ref()).await;

        self.approve_license(&installed).await?;
        advance(&mut stages, InstallStage::LicenseApproved);

        self.install_components(&installed).await?;
        advance(&mut stages, InstallStage::ComponentsInstalled);

        if options.switch {
            self.link_active(target).await?;
            self.select_toolchain(target).await?;
            advance(&mut stages, InstallStage::Symlinked);
        }

        if options.clean {
            remove_artifact(dmg)?;
            advance(&mut stages, InstallStage::CleanedUp);
        }

        Ok(InstallReport { installed, stages })
    }

    /// Points the active symlink at `bundle`.
    ///
    /// An existing symlink is replaced; a real bundle occupying the path is left
    /// alone. Callers outside [`InstallationPipeline::install`] must hold the
    /// install lock.
    pub async fn link_active(&self, bundle: &Path) -> Result<(), InstallError> {
        let symlink = &self.paths.symlink_path;

        if is_symlink(symlink) {
            self.step(CommandSpec::new("rm").arg("-f").arg(symlink).privileged())
                .await?;
        }

        if std::fs::symlink_metadata(symlink).is_ok() {
            warn!(
                "{:?} exists and is not a symlink, leaving it in place",
                symlink
            );
            return Ok(());
        }

        self.step(
            CommandSpec::new("ln")
                .arg("-sf")
                .args([bundle, symlink.as_path()])
                .privileged(),
        )
        .await?;
        info!("Linked {:?} -> {:?}", symlink, bundle);
        Ok(())
    }

    async fn select_toolchain(&self, bundle: &Path) -> Result<(), InstallError> {
        self.step(
            CommandSpec::new("xcode-select")
                .arg("--switch")
                .arg(bundle)
                .privileged(),
        )
        .await?;

        if let Ok(output) = self
            .run(CommandSpec::new("xcodebuild").arg("-version"))
            .await
        {
            info!("{}", output.stdout.trim());
        }
        Ok(())
    }

    async fn mount(&self, dmg: &Path) -> Result<(), InstallError> {
        let output = self
            .run(
                CommandSpec::new("hdiutil")
                    .args(["attach", "-readonly", "-nobrowse", "-noverify", "-noautoopen"])
                    .arg("-mountpoint")
                    .arg(&self.paths.mount_point)
                    .arg(dmg),
            )
            .await?;

        if !output.success() {
            return Err(InstallError::Mount {
                dmg: dmg.to_path_buf(),
                stderr: output.stderr,
            });
        }
        debug!("Mounted {:?} at {:?}", dmg, self.paths.mount_point);
        Ok(())
    }

    async fn unmount(&self) {
        let result = self
            .run(CommandSpec::new("hdiutil").arg("detach").arg(&self.paths.mount_point))
            .await;

        match result {
            Ok(output) if output.success() => {
                debug!("Detached {:?}", self.paths.mount_point)
            }
            Ok(output) => warn!(
                "Failed to detach {:?}: {}",
                self.paths.mount_point,
                output.stderr.trim()
            ),
            Err(e) => warn!("Failed to detach {:?}: {}", self.paths.mount_point, e),
        }
    }

    /// First `Xcode*.app` on the mounted volume.
    fn locate_source(&self) -> Option<PathBuf> {
        let entries = std::fs::read_dir(&self.paths.mount_point)
            .inspect_err(|e| warn!("Failed to read {:?}: {}", self.paths.mount_point, e))
            .ok()?;

        let mut bundles: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .filter(|entry| {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                name.starts_with("Xcode") && name.ends_with(".app")
            })
            .map(|entry| entry.path())
            .collect();

        bundles.sort();
        bundles.into_iter().next()
    }

    async fn verify_integrity(&self, bundle: &Path) -> Result<bool, InstallError> {
        let output = self
            .run(
                CommandSpec::new("/usr/sbin/spctl")
                    .args(["--assess", "--verbose=4", "--type", "execute"])
                    .arg(bundle),
            )
            .await?;

        info!("{}", output.stderr.trim());
        Ok(output.success())
    }

    async fn remove_bundle(&self, bundle: &Path) {
        let result = self
            .step(CommandSpec::new("rm").arg("-rf").arg(bundle).privileged())
            .await;
        if let Err(e) = result {
            warn!("Failed to remove {:?}: {}", bundle, e);
        }
    }

    async fn enable_developer_mode(&self) {
        let commands = [
            CommandSpec::new("/usr/sbin/DevToolsSecurity")
                .arg("-enable")
                .privileged(),
            CommandSpec::new("/usr/sbin/dseditgroup")
                .args(["-o", "edit", "-t", "group", "-a", "staff", "_developer"])
                .privileged(),
        ];

        for command in commands {
            if let Err(e) = self.step(command).await {
                warn!("Failed to enable developer mode: {}", e);
            }
        }
    }

    /// Records the bundle's license as accepted in the system preferences.
    async fn approve_license(
        &self,
        installed: &InstalledVersionEntity,
    ) -> Result<(), InstallError> {
        let license_path = installed.license_path();
        let license = std::fs::read(&license_path)?;
        let license = String::from_utf8_lossy(&license);
        let license_id = extract_license_id(&license).ok_or_else(|| InstallError::LicenseNotFound {
            path: license_path.clone(),
        })?;

        let plist = &self.paths.license_plist_path;
        self.step(CommandSpec::new("rm").arg("-rf").arg(plist).privileged())
            .await?;
        self.step(plist_add(plist, "IDELastGMLicenseAgreedTo", license_id))
            .await?;
        self.step(plist_add(
            plist,
            "IDEXcodeVersionForAgreedToGMLicense",
            &installed.version,
        ))
        .await?;

        info!("Accepted license {} for Xcode {}", license_id, installed.version);
        Ok(())
    }

    /// Installs bundled device support and marks the first-launch check as done.
    async fn install_components(
        &self,
        installed: &InstalledVersionEntity,
    ) -> Result<(), InstallError> {
        self.step(
            CommandSpec::new("installer")
                .arg("-pkg")
                .arg(installed.mobile_device_package_path())
                .args(["-target", "/"])
                .privileged(),
        )
        .await?;

        let os_build = self
            .step(CommandSpec::new("sw_vers").arg("-buildVersion"))
            .await?;
        let tools_build = self
            .step(
                CommandSpec::new(PLIST_BUDDY)
                    .args(["-c", "Print :ProductBuildVersion"])
                    .arg(installed.version_plist_path()),
            )
            .await?;
        let cache_dir = self
            .step(CommandSpec::new("getconf").arg("DARWIN_USER_CACHE_DIR"))
            .await?;

        let marker = PathBuf::from(format!(
            "{}com.apple.dt.Xcode.InstallCheckCache_{}_{}",
            cache_dir.stdout.trim(),
            os_build.stdout.trim(),
            tools_build.stdout.trim()
        ));
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&marker)?;
        debug!("Touched {:?}", marker);

        Ok(())
    }

    async fn run(&self, command: CommandSpec) -> Result<CommandOutput, InstallError> {
        Ok(self.system.run(&command).await?)
    }

    /// Runs `command`, treating a non-zero exit as a failed step.
    async fn step(&self, command: CommandSpec) -> Result<CommandOutput, InstallError> {
        let output = self.system.run(&command).await?;
        if !output.success() {
            return Err(InstallError::StepFailed {
                command: command.to_string(),
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }
}

fn advance(stages: &mut Vec<InstallStage>, stage: InstallStage) {
    debug!("Install stage: {}", stage);
    stages.push(stage);
}

fn plist_add(plist: &Path, key: &str, value: &str) -> CommandSpec {
    CommandSpec::new(PLIST_BUDDY)
        .arg("-c")
        .arg(format!("add :{key} string {value}"))
        .arg(plist)
        .privileged()
}

fn is_symlink(path: &Path) -> bool {
    std::fs::symlink_metadata(path)
        .map(|metadata| metadata.file_type().is_symlink())
        .unwrap_or(false)
}

fn remove_artifact(dmg: &Path) -> Result<(), InstallError> {
    match std::fs::remove_file(dmg) {
        Ok(()) => {
            debug!("Removed {:?}", dmg);
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// License agreement code, two capitals and four digits at the start of a line (e.g. "EA1647").
pub fn extract_license_id(license: &str) -> Option<&str> {
    let pattern = Regex::new(r"(?m)^[A-Z]{2}\d{4}").ok()?;
    pattern.find(license).map(|m| m.as_str())
}
