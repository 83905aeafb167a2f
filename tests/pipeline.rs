//! Installation pipeline tests against scripted host utilities

mod helper;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rstest::rstest;
use tempfile::TempDir;

use helper::{ScriptedSystem, create_bundle, test_config};
use xcode_install::config::Config;
use xcode_install::install::error::InstallError;
use xcode_install::install::pipeline::{
    InstallOptions, InstallStage, InstallationPipeline, PipelinePaths,
};

struct Fixture {
    _temp_dir: TempDir,
    config: Config,
    dmg: PathBuf,
    user_cache_dir: PathBuf,
}

impl Fixture {
    /// Disk image on disk; the mounted volume holds `Xcode.app` when `with_bundle`.
    fn new(with_bundle: bool) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(temp_dir.path());

        std::fs::create_dir_all(&config.mount_point).unwrap();
        if with_bundle {
            create_bundle(&config.mount_point, "Xcode.app");
        }

        std::fs::create_dir_all(&config.cache_dir).unwrap();
        let dmg = config.cache_dir.join("Xcode_11.3.dmg");
        std::fs::write(&dmg, "image").unwrap();

        let user_cache_dir = temp_dir.path().join("user-cache");
        std::fs::create_dir_all(&user_cache_dir).unwrap();

        Self {
            _temp_dir: temp_dir,
            config,
            dmg,
            user_cache_dir,
        }
    }

    fn system(&self) -> ScriptedSystem {
        ScriptedSystem::new("11.3", &self.user_cache_dir)
    }

    fn target(&self) -> PathBuf {
        self.config.install_path("11.3")
    }

    fn pipeline(&self, system: &Arc<ScriptedSystem>) -> InstallationPipeline {
        InstallationPipeline::new(system.clone(), PipelinePaths::from(&self.config))
    }
}

fn is_symlink(path: &Path) -> bool {
    std::fs::symlink_metadata(path)
        .map(|metadata| metadata.file_type().is_symlink())
        .unwrap_or(false)
}

#[tokio::test]
async fn install_runs_every_stage_and_leaves_an_active_bundle() {
    let fixture = Fixture::new(true);
    let system = Arc::new(fixture.system());
    let target = fixture.target();

    let report = fixture
        .pipeline(&system)
        .install(&fixture.dmg, &target, InstallOptions::default())
        .await
        .unwrap();

    assert_eq!(
        report.stages,
        vec![
            InstallStage::Downloaded,
            InstallStage::Mounted,
            InstallStage::SourceLocated,
            InstallStage::Copied,
            InstallStage::Verified,
            InstallStage::LicenseApproved,
            InstallStage::ComponentsInstalled,
            InstallStage::Symlinked,
            InstallStage::CleanedUp,
        ]
    );
    assert_eq!(report.installed.version, "11.3");
    assert_eq!(report.installed.path, target);

    assert!(target.join("Contents/Resources/English.lproj/License.rtf").exists());
    assert_eq!(
        std::fs::read_link(&fixture.config.symlink_path).unwrap(),
        target
    );
    assert!(!fixture.dmg.exists());
    assert!(
        fixture
            .user_cache_dir
            .join("com.apple.dt.Xcode.InstallCheckCache_19C57_11C29")
            .exists()
    );

    let plist = fixture.config.license_plist_path.display().to_string();
    let lines = system.command_lines();
    assert!(lines.contains(&format!(
        "sudo /usr/libexec/PlistBuddy -c add :IDELastGMLicenseAgreedTo string EA1647 {plist}"
    )));
    assert!(lines.contains(&format!(
        "sudo /usr/libexec/PlistBuddy -c add :IDEXcodeVersionForAgreedToGMLicense string 11.3 {plist}"
    )));
    assert!(lines.contains(&format!("sudo xcode-select --switch {}", target.display())));
    assert!(system.ran_with("hdiutil", "detach"));
}

#[tokio::test]
async fn install_copies_before_detaching_and_verifies_after() {
    let fixture = Fixture::new(true);
    let system = Arc::new(fixture.system());

    fixture
        .pipeline(&system)
        .install(&fixture.dmg, &fixture.target(), InstallOptions::default())
        .await
        .unwrap();

    let programs: Vec<String> = system
        .commands()
        .into_iter()
        .map(|command| match command.args.first() {
            Some(first) if command.program == "hdiutil" => format!("hdiutil {first}"),
            _ => command.program,
        })
        .collect();
    let position = |program: &str| programs.iter().position(|p| p == program).unwrap();

    assert!(position("hdiutil attach") < position("ditto"));
    assert!(position("ditto") < position("hdiutil detach"));
    assert!(position("hdiutil detach") < position("/usr/sbin/spctl"));
    assert!(position("/usr/sbin/spctl") < position("/usr/libexec/PlistBuddy"));
}

#[tokio::test]
async fn install_without_bundle_on_volume_detaches_and_stops() {
    let fixture = Fixture::new(false);
    let system = Arc::new(fixture.system());

    let result = fixture
        .pipeline(&system)
        .install(&fixture.dmg, &fixture.target(), InstallOptions::default())
        .await;

    assert!(matches!(result, Err(InstallError::SourceNotFound { .. })));
    assert!(system.ran_with("hdiutil", "detach"));
    assert!(!system.ran("ditto"));
    assert!(!system.ran("/usr/libexec/PlistBuddy"));
    assert!(!system.ran("ln"));
    assert!(fixture.dmg.exists());
    assert!(!fixture.target().exists());
}

#[tokio::test]
async fn install_failing_signature_assessment_removes_the_copy() {
    let fixture = Fixture::new(true);
    let active = create_bundle(&fixture.config.applications_dir, "Xcode-10.3.app");
    std::os::unix::fs::symlink(&active, &fixture.config.symlink_path).unwrap();
    let system = Arc::new(fixture.system().failing("/usr/sbin/spctl"));
    let target = fixture.target();

    let result = fixture
        .pipeline(&system)
        .install(&fixture.dmg, &target, InstallOptions::default())
        .await;

    assert!(matches!(result, Err(InstallError::Integrity { ref path }) if *path == target));
    assert!(!target.exists());
    assert!(
        system
            .command_lines()
            .contains(&format!("sudo rm -rf {}", target.display()))
    );
    assert!(!system.ran("/usr/libexec/PlistBuddy"));
    assert!(!system.ran("xcode-select"));
    assert!(!system.ran("ln"));
    assert_eq!(std::fs::read_link(&fixture.config.symlink_path).unwrap(), active);
}

#[tokio::test]
async fn install_reports_mount_failure_without_copying() {
    let fixture = Fixture::new(true);
    let system = Arc::new(fixture.system().failing("hdiutil"));

    let result = fixture
        .pipeline(&system)
        .install(&fixture.dmg, &fixture.target(), InstallOptions::default())
        .await;

    assert!(matches!(result, Err(InstallError::Mount { .. })));
    assert!(!system.ran("ditto"));
}

#[tokio::test]
async fn install_reports_copy_failure_after_detaching() {
    let fixture = Fixture::new(true);
    let system = Arc::new(fixture.system().failing("ditto"));

    let result = fixture
        .pipeline(&system)
        .install(&fixture.dmg, &fixture.target(), InstallOptions::default())
        .await;

    assert!(matches!(result, Err(InstallError::Copy { .. })));
    assert!(system.ran_with("hdiutil", "detach"));
    assert!(!system.ran("/usr/sbin/spctl"));
}

#[tokio::test]
async fn install_removes_a_partially_copied_bundle() {
    let fixture = Fixture::new(true);
    let system = Arc::new(fixture.system().with_partial_copy());
    let target = fixture.target();

    let result = fixture
        .pipeline(&system)
        .install(&fixture.dmg, &target, InstallOptions::default())
        .await;

    assert!(matches!(result, Err(InstallError::Copy { .. })));
    assert!(!target.exists());
    assert!(
        system
            .command_lines()
            .contains(&format!("sudo rm -rf {}", target.display()))
    );
    assert!(system.ran_with("hdiutil", "detach"));
    assert!(!system.ran("/usr/sbin/spctl"));
}

#[tokio::test]
async fn install_without_license_identifier_fails() {
    let fixture = Fixture::new(true);
    std::fs::write(
        fixture
            .config
            .mount_point
            .join("Xcode.app/Contents/Resources/English.lproj/License.rtf"),
        "{\\rtf1 no agreement code here}",
    )
    .unwrap();
    let system = Arc::new(fixture.system());

    let result = fixture
        .pipeline(&system)
        .install(&fixture.dmg, &fixture.target(), InstallOptions::default())
        .await;

    assert!(matches!(result, Err(InstallError::LicenseNotFound { .. })));
    assert!(!system.ran("installer"));
}

#[tokio::test]
async fn install_leaves_a_real_bundle_at_the_symlink_path_alone() {
    let fixture = Fixture::new(true);
    std::fs::create_dir_all(fixture.config.symlink_path.join("Contents")).unwrap();
    let system = Arc::new(fixture.system());

    let report = fixture
        .pipeline(&system)
        .install(&fixture.dmg, &fixture.target(), InstallOptions::default())
        .await
        .unwrap();

    assert!(report.stages.contains(&InstallStage::Symlinked));
    assert!(fixture.config.symlink_path.join("Contents").is_dir());
    assert!(!is_symlink(&fixture.config.symlink_path));
    assert!(!system.ran("ln"));
    assert!(system.ran("xcode-select"));
}

#[rstest]
#[case::keep_everything(false, false)]
#[case::switch_only(true, false)]
#[case::clean_only(false, true)]
#[tokio::test]
async fn install_honors_switch_and_clean_options(#[case] switch: bool, #[case] clean: bool) {
    let fixture = Fixture::new(true);
    let system = Arc::new(fixture.system());

    let report = fixture
        .pipeline(&system)
        .install(&fixture.dmg, &fixture.target(), InstallOptions { switch, clean })
        .await
        .unwrap();

    assert_eq!(report.stages.contains(&InstallStage::Symlinked), switch);
    assert_eq!(report.stages.contains(&InstallStage::CleanedUp), clean);
    assert_eq!(is_symlink(&fixture.config.symlink_path), switch);
    assert_eq!(system.ran("xcode-select"), switch);
    assert_eq!(fixture.dmg.exists(), !clean);
}

#[tokio::test]
async fn link_active_replaces_an_existing_symlink() {
    let fixture = Fixture::new(false);
    let old = create_bundle(&fixture.config.applications_dir, "Xcode-10.3.app");
    let new = create_bundle(&fixture.config.applications_dir, "Xcode-11.3.app");
    std::os::unix::fs::symlink(&old, &fixture.config.symlink_path).unwrap();
    let system = Arc::new(fixture.system());

    fixture.pipeline(&system).link_active(&new).await.unwrap();

    assert_eq!(std::fs::read_link(&fixture.config.symlink_path).unwrap(), new);
    assert!(old.exists());
    assert!(
        system
            .command_lines()
            .contains(&format!("sudo rm -f {}", fixture.config.symlink_path.display()))
    );
}
