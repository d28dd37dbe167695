//! Proxy settings from `*_proxy` environment variables.

use std::collections::BTreeMap;

const SUFFIX: &str = "_proxy";

/// Collect proxy settings keyed by scheme (`http`, `https`, `no`, ...).
///
/// Names match case-insensitively; when both spellings are set the
/// lowercase variable wins. Empty values are ignored.
pub fn proxy_settings_from<I>(vars: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut upper = BTreeMap::new();
    let mut lower = BTreeMap::new();

    for (name, value) in vars {
        if value.is_empty() {
            continue;
        }
        let folded = name.to_ascii_lowercase();
        let Some(scheme) = folded.strip_suffix(SUFFIX) else {
            continue;
        };
        if scheme.is_empty() {
            continue;
        }
        let target = if name == folded { &mut lower } else { &mut upper };
        target.insert(scheme.to_string(), value);
    }

    upper.extend(lower);
    upper
}

/// Proxy settings of the current process environment.
pub fn proxy_settings() -> BTreeMap<String, String> {
    proxy_settings_from(std::env::vars())
}
