//! Symbol name mangling
//!
//! Object-file symbols admit a narrower alphabet than type-system display
//! names, and sanitizing is lossy: `List<int>` and `List_int_` collide. The
//! mangler therefore deduplicates per compilation, appending a numeric tag
//! to later claimants, and caches the result so an entity always gets the
//! same symbol within a run.

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};

/// Replace every character outside `[A-Za-z0-9_]` with `_`. Lossy; callers
/// needing uniqueness go through [`NameMangler`].
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

#[derive(Default)]
struct MangleState {
    cache: FxHashMap<String, String>,
    used: FxHashSet<String>,
}

/// Per-compilation unique symbol names.
#[derive(Default)]
pub struct NameMangler {
    state: Mutex<MangleState>,
}

impl NameMangler {
    /// Fresh mangler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stable unique symbol for a display name. The first claimant of a
    /// sanitized form keeps it bare; collisions get `_1`, `_2`, ...
    pub fn mangle(&self, display_name: &str) -> String {
        let mut state = self.state.lock();
        if let Some(existing) = state.cache.get(display_name) {
            return existing.clone();
        }
        let base = sanitize(display_name);
        let mut candidate = base.clone();
        let mut counter = 0usize;
        while state.used.contains(&candidate) {
            counter += 1;
            candidate = format!("{base}_{counter}");
        }
        state.used.insert(candidate.clone());
        state.cache.insert(display_name.to_string(), candidate.clone());
        candidate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_keeps_identifier_characters() {
        assert_eq!(sanitize("List<int>"), "List_int_");
        assert_eq!(sanitize("Ns.Ty::M"), "Ns_Ty__M");
        assert_eq!(sanitize("plain_name0"), "plain_name0");
    }

    #[test]
    fn collisions_get_numeric_tags_and_stay_stable() {
        let mangler = NameMangler::new();
        let a = mangler.mangle("List<int>");
        let b = mangler.mangle("List[int]");
        assert_eq!(a, "List_int_");
        assert_eq!(b, "List_int__1");
        // Repeated queries return the cached symbol, not a new tag.
        assert_eq!(mangler.mangle("List<int>"), a);
        assert_eq!(mangler.mangle("List[int]"), b);
    }
}
