//! Stack trace metadata
//!
//! Release binaries strip reflection metadata, but stack traces still want
//! human-readable frames. This emitter writes a compact side blob mapping
//! each compiled method to its owning type name, method name and an ordinal,
//! filtered by a whitelist/blacklist policy so framework internals can be
//! kept out of user-facing traces.

use std::io::{BufWriter, Write};
use std::path::Path;

use rustc_hash::FxHashMap;

use kiln_types::{MethodId, Universe};

use crate::error::CompilationError;

const MAGIC: &[u8; 4] = b"KSTM";

/// Which methods get stack trace metadata. Type rules win over namespace
/// rules, whitelists win over blacklists at the same granularity.
#[derive(Debug, Default)]
pub struct StackTraceEmissionPolicy {
    /// Fully-qualified type names always included
    pub type_whitelist: Vec<String>,
    /// Fully-qualified type names always excluded
    pub type_blacklist: Vec<String>,
    /// Namespaces always included
    pub namespace_whitelist: Vec<String>,
    /// Namespaces always excluded
    pub namespace_blacklist: Vec<String>,
    /// Verdict when no rule matches
    pub include_by_default: bool,
}

impl StackTraceEmissionPolicy {
    /// Policy including everything.
    pub fn include_all() -> Self {
        Self {
            include_by_default: true,
            ..Self::default()
        }
    }

    /// Whether a method of the given type should appear in traces.
    pub fn includes(&self, type_name: &str, namespace: &str) -> bool {
        if self.type_whitelist.iter().any(|t| t == type_name) {
            return true;
        }
        if self.type_blacklist.iter().any(|t| t == type_name) {
            return false;
        }
        if self.namespace_whitelist.iter().any(|n| n == namespace) {
            return true;
        }
        if self.namespace_blacklist.iter().any(|n| n == namespace) {
            return false;
        }
        self.include_by_default
    }
}

/// One decoded record, for consumers and tests.
#[derive(Debug, PartialEq, Eq)]
pub struct StackTraceRecord {
    /// Display name of the owning type
    pub type_name: String,
    /// Simple method name
    pub method_name: String,
    /// Ordinal of the method in emission order
    pub ordinal: u32,
}

/// Write the blob for the given methods, in the given (deterministic) order.
pub fn write_stack_trace_metadata(
    universe: &Universe,
    methods: &[MethodId],
    policy: &StackTraceEmissionPolicy,
    path: &Path,
) -> Result<(), CompilationError> {
    let mut strings: Vec<String> = Vec::new();
    let mut string_index: FxHashMap<String, u32> = FxHashMap::default();
    let mut intern = |s: String, strings: &mut Vec<String>| -> u32 {
        if let Some(idx) = string_index.get(&s) {
            return *idx;
        }
        let idx = strings.len() as u32;
        string_index.insert(s.clone(), idx);
        strings.push(s);
        idx
    };

    let mut records: Vec<(u32, u32, u32)> = Vec::new();
    let mut ordinal = 0u32;
    for method in methods {
        let owner = universe.method_owner(*method);
        let type_name = universe.type_display(owner);
        let namespace = universe
            .type_def(universe.definition(owner))
            .map(|d| d.namespace.clone())
            .unwrap_or_default();
        if !policy.includes(&type_name, &namespace) {
            continue;
        }
        let type_idx = intern(type_name, &mut strings);
        let method_idx = intern(universe.method_name(*method), &mut strings);
        records.push((type_idx, method_idx, ordinal));
        ordinal += 1;
    }

    let mut out = BufWriter::new(std::fs::File::create(path)?);
    out.write_all(MAGIC)?;
    out.write_all(&(strings.len() as u32).to_le_bytes())?;
    for s in &strings {
        out.write_all(&(s.len() as u32).to_le_bytes())?;
        out.write_all(s.as_bytes())?;
    }
    out.write_all(&(records.len() as u32).to_le_bytes())?;
    for (type_idx, method_idx, ordinal) in &records {
        out.write_all(&type_idx.to_le_bytes())?;
        out.write_all(&method_idx.to_le_bytes())?;
        out.write_all(&ordinal.to_le_bytes())?;
    }
    out.flush()?;
    Ok(())
}

/// Decode a blob written by [`write_stack_trace_metadata`].
pub fn decode_stack_trace_metadata(bytes: &[u8]) -> Option<Vec<StackTraceRecord>> {
    fn take<'a>(bytes: &'a [u8], cursor: &mut usize, n: usize) -> Option<&'a [u8]> {
        let slice = bytes.get(*cursor..cursor.checked_add(n)?)?;
        *cursor += n;
        Some(slice)
    }
    fn read_u32(bytes: &[u8], cursor: &mut usize) -> Option<u32> {
        take(bytes, cursor, 4).map(|b| u32::from_le_bytes(b.try_into().unwrap()))
    }

    let mut cursor = 0usize;
    if take(bytes, &mut cursor, 4)? != MAGIC {
        return None;
    }
    let string_count = read_u32(bytes, &mut cursor)? as usize;
    let mut strings = Vec::with_capacity(string_count);
    for _ in 0..string_count {
        let len = read_u32(bytes, &mut cursor)? as usize;
        let raw = take(bytes, &mut cursor, len)?;
        strings.push(String::from_utf8(raw.to_vec()).ok()?);
    }
    let record_count = read_u32(bytes, &mut cursor)? as usize;
    let mut records = Vec::with_capacity(record_count);
    for _ in 0..record_count {
        let type_idx = read_u32(bytes, &mut cursor)? as usize;
        let method_idx = read_u32(bytes, &mut cursor)? as usize;
        let ordinal = read_u32(bytes, &mut cursor)?;
        records.push(StackTraceRecord {
            type_name: strings.get(type_idx)?.clone(),
            method_name: strings.get(method_idx)?.clone(),
            ordinal,
        });
    }
    Some(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_types::{MethodBody, MethodFlags, MethodSignature, UniverseBuilder};

    #[test]
    fn policy_precedence_is_type_then_namespace_then_default() {
        let policy = StackTraceEmissionPolicy {
            type_whitelist: vec!["[Sys]Internal.Keep".into()],
            type_blacklist: vec!["[Sys]App.Hidden".into()],
            namespace_whitelist: vec!["App".into()],
            namespace_blacklist: vec!["Internal".into()],
            include_by_default: false,
        };
        // Type whitelist beats its blacklisted namespace.
        assert!(policy.includes("[Sys]Internal.Keep", "Internal"));
        // Type blacklist beats its whitelisted namespace.
        assert!(!policy.includes("[Sys]App.Hidden", "App"));
        assert!(policy.includes("[Sys]App.Visible", "App"));
        assert!(!policy.includes("[Sys]Internal.Other", "Internal"));
        assert!(!policy.includes("[Sys]Misc.Thing", "Misc"));
    }

    #[test]
    fn blob_round_trips_filtered_records() {
        let mut b = UniverseBuilder::new();
        let sys = b.define_system_module("System.Private.CoreLib");
        let object = b.universe().object().unwrap();
        let void = b
            .universe()
            .well_known(kiln_types::WellKnownType::Primitive(
                kiln_types::PrimitiveKind::Void,
            ))
            .unwrap();
        let app = b.define_class(sys, "App", "Program", object);
        let hidden = b.define_class(sys, "Internal", "Detail", object);
        let sig = || MethodSignature::new(vec![], void);
        let main = b.define_method(
            app,
            "Main",
            MethodFlags::default(),
            sig(),
            Some(MethodBody::empty()),
        );
        let helper = b.define_method(
            hidden,
            "Helper",
            MethodFlags::default(),
            sig(),
            Some(MethodBody::empty()),
        );
        let u = b.finish();

        let policy = StackTraceEmissionPolicy {
            namespace_blacklist: vec!["Internal".into()],
            include_by_default: true,
            ..StackTraceEmissionPolicy::default()
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stacktrace.bin");
        write_stack_trace_metadata(&u, &[main, helper], &policy, &path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let records = decode_stack_trace_metadata(&bytes).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].method_name, "Main");
        assert_eq!(records[0].ordinal, 0);
        assert!(records[0].type_name.contains("App.Program"));
    }
}
