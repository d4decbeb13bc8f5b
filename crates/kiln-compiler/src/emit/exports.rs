//! Linker exports file
//!
//! Methods marked as runtime exports need their symbols visible to the
//! platform linker. Windows linkers take a module-definition file; Unix
//! linkers take a plain symbol list (with the Mach-O style leading
//! underscore applied by the caller's toolchain convention).

use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::CompilationError;

/// Target flavor the exports file is written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetOs {
    /// Module-definition (.def) syntax
    Windows,
    /// Newline-separated symbol list with `_` prefixes
    Unix,
}

/// Writes the exported-symbol list.
#[derive(Debug)]
pub struct ExportsFileWriter {
    target: TargetOs,
    library_name: String,
    symbols: Vec<String>,
}

impl ExportsFileWriter {
    /// Writer for the given target and library.
    pub fn new(target: TargetOs, library_name: impl Into<String>) -> Self {
        Self {
            target,
            library_name: library_name.into(),
            symbols: Vec::new(),
        }
    }

    /// Add one exported symbol.
    pub fn add_export(&mut self, symbol: impl Into<String>) {
        self.symbols.push(symbol.into());
    }

    /// Write the file. Symbols appear in insertion order.
    pub fn write(&self, path: &Path) -> Result<(), CompilationError> {
        let mut out = BufWriter::new(std::fs::File::create(path)?);
        match self.target {
            TargetOs::Windows => {
                writeln!(out, "LIBRARY {}", self.library_name.to_uppercase())?;
                writeln!(out, "EXPORTS")?;
                for symbol in &self.symbols {
                    writeln!(out, "    {symbol}")?;
                }
            }
            TargetOs::Unix => {
                writeln!(out, "# exported symbols for {}", self.library_name)?;
                for symbol in &self.symbols {
                    writeln!(out, "_{symbol}")?;
                }
            }
        }
        out.flush()?;
        Ok(())
    }
}

/// Read the symbol names back out of an exports file, either flavor.
pub fn parse_exports_file(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| {
            !line.is_empty()
                && !line.starts_with('#')
                && !line.starts_with("LIBRARY")
                && *line != "EXPORTS"
        })
        .map(|line| line.strip_prefix('_').unwrap_or(line).to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_flavor_emits_a_module_definition() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lib.def");
        let mut writer = ExportsFileWriter::new(TargetOs::Windows, "kiln_app");
        writer.add_export("managed_main");
        writer.add_export("app_callback");
        writer.write(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("LIBRARY KILN_APP\nEXPORTS\n"));
        assert!(text.contains("    managed_main\n"));
        assert_eq!(
            parse_exports_file(&text),
            vec!["managed_main".to_string(), "app_callback".to_string()]
        );
    }

    #[test]
    fn unix_flavor_round_trips_underscored_symbols() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exports.txt");
        let mut writer = ExportsFileWriter::new(TargetOs::Unix, "kiln_app");
        writer.add_export("managed_main");
        writer.write(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("_managed_main\n"));
        assert_eq!(parse_exports_file(&text), vec!["managed_main".to_string()]);
    }
}
