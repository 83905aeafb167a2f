use semver::Version;

/// Lowest release this tool keeps in the catalog.
pub fn minimum_version() -> Version {
    Version::new(4, 3, 0)
}

/// Parse a version string into a semver::Version, normalizing partial versions.
///
/// Handles partial versions like "11" or "11.3" by padding with zeros.
///
/// Examples:
/// - "11" -> Version(11, 0, 0)
/// - "11.3" -> Version(11, 3, 0)
/// - "11.3.1" -> Version(11, 3, 1)
pub fn parse_version(version: &str) -> Option<Version> {
    let parts: Vec<&str> = version.split('.').collect();
    let normalized = match parts.len() {
        1 => format!("{}.0.0", parts[0]),
        2 => format!("{}.{}.0", parts[0], parts[1]),
        _ => version.to_string(),
    };
    Version::parse(&normalized).ok()
}

/// Parse the leading version token of a release label ("12.0 beta 2" -> 12.0.0).
pub fn parse_release_label(name: &str) -> Option<Version> {
    name.split_whitespace().next().and_then(parse_version)
}

/// Numeric major of a release label ("10.1" -> 10, "11 beta" -> 11).
pub fn major_of(name: &str) -> Option<u64> {
    let digits: String = name
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

pub fn is_beta(name: &str) -> bool {
    name.to_ascii_lowercase().contains("beta")
}

/// Highest major among stable (non-beta) release labels.
pub fn latest_stable_major(names: &[String]) -> Option<u64> {
    names
        .iter()
        .filter(|name| !is_beta(name))
        .filter_map(|name| major_of(name))
        .max()
}

/// Select the "current" releases: stable labels whose major is at least the
/// latest stable major, ordered by version.
pub fn select_current(names: &[String]) -> Vec<String> {
    let Some(latest_major) = latest_stable_major(names) else {
        return Vec::new();
    };

    let mut current: Vec<&String> = names
        .iter()
        .filter(|name| !is_beta(name))
        .filter(|name| major_of(name).is_some_and(|major| major >= latest_major))
        .collect();

    current.sort_by(|a, b| {
        parse_release_label(a)
            .cmp(&parse_release_label(b))
            .then_with(|| a.cmp(b))
    });
    current.dedup();
    current.into_iter().cloned().collect()
}
