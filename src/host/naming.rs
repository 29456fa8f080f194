//! Controller name resolution.
//!
//! A controller loaded without an explicit name is named after its module
//! path: the part after the last `controllers/` directory, without a
//! `.so`, `.py` or `.rs` suffix. So `/usr/lib/controllers/tests/monitor.so`
//! becomes `tests/monitor`. A derived name already in use gets a `-2`,
//! `-3`, ... suffix; an explicit name already in use is an error.

use crate::error::{Error, Result};

const CONTROLLERS_DIR: &str = "controllers";
const MODULE_SUFFIXES: [&str; 3] = [".so", ".py", ".rs"];

/// Highest suffix tried when deduplicating a derived name.
pub const MAX_NAME_SUFFIX: u32 = 10001;

/// Derive a controller name from a module path.
pub fn derive_name(path: &str) -> String {
    let path = MODULE_SUFFIXES
        .iter()
        .find_map(|suffix| path.strip_suffix(suffix))
        .filter(|stem| !stem.is_empty() && !stem.ends_with('/'))
        .unwrap_or(path);

    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
    let start = parts
        .iter()
        .rposition(|p| *p == CONTROLLERS_DIR)
        .filter(|i| i + 1 < parts.len())
        .map_or(0, |i| i + 1);
    parts[start..].join("/")
}

/// Pick the name a new controller will be registered under.
///
/// `taken` reports whether a name is already in use.
pub fn resolve_name<F>(path: &str, load_name: Option<&str>, max_len: usize, taken: F) -> Result<String>
where
    F: Fn(&str) -> bool,
{
    if let Some(name) = load_name.filter(|n| !n.is_empty()) {
        if taken(name) {
            return Err(Error::ControllerExists(name.to_string()));
        }
        check_len(name, max_len)?;
        return Ok(name.to_string());
    }

    let base = derive_name(path);
    check_len(&base, max_len)?;
    if !taken(&base) {
        return Ok(base);
    }
    let name = (2..=MAX_NAME_SUFFIX)
        .map(|i| format!("{base}-{i}"))
        .find(|candidate| !taken(candidate))
        .ok_or(Error::NameExhausted(base))?;
    check_len(&name, max_len)?;
    Ok(name)
}

fn check_len(name: &str, max: usize) -> Result<()> {
    if name.len() > max {
        return Err(Error::NameTooLong {
            name: name.to_string(),
            max,
        });
    }
    Ok(())
}
