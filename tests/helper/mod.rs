#![allow(dead_code, unused_imports)]

mod session;
mod system;

use std::path::{Path, PathBuf};

use xcode_install::config::Config;

pub use session::{FakeSession, listing, prerelease_page};
pub use system::ScriptedSystem;

pub const URL_PREFIX: &str = "https://portal.test/download?path=";

/// Configuration rooted entirely under `root`
pub fn test_config(root: &Path) -> Config {
    let applications_dir = root.join("Applications");
    std::fs::create_dir_all(&applications_dir).unwrap();

    Config {
        cache_dir: root.join("cache"),
        artifact_cache_dir: None,
        symlink_path: applications_dir.join("Xcode.app"),
        applications_dir,
        mount_point: root.join("Volumes").join("Xcode"),
        license_plist_path: root.join("Preferences").join("com.apple.dt.Xcode.plist"),
        portal_url: "https://portal.test".to_string(),
        auth_url: "https://auth.test".to_string(),
        download_url_prefix: URL_PREFIX.to_string(),
    }
}

/// Lays out a minimal Xcode bundle under `dir` and returns its path.
pub fn create_bundle(dir: &Path, name: &str) -> PathBuf {
    let bundle = dir.join(name);
    let resources = bundle.join("Contents/Resources");
    std::fs::create_dir_all(resources.join("English.lproj")).unwrap();
    std::fs::create_dir_all(resources.join("Packages")).unwrap();
    std::fs::create_dir_all(bundle.join("Contents/Developer/usr/bin")).unwrap();

    std::fs::write(
        resources.join("English.lproj/License.rtf"),
        "{\\rtf1\\ansi\nXcode and Apple SDKs Agreement\nEA1647\n}\n",
    )
    .unwrap();
    std::fs::write(resources.join("Packages/MobileDevice.pkg"), "pkg").unwrap();
    std::fs::write(bundle.join("Contents/version.plist"), "<plist/>").unwrap();

    bundle
}
