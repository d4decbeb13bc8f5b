//! Diagnostic object dump
//!
//! XML listing of every code-carrying node in the final graph with its size
//! and side-table presence. Size regressions show up as diffs of this file
//! between builds, which is the whole reason it exists.

use std::io::{BufWriter, Write};
use std::path::Path;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::backend::CompiledMethodBody;
use crate::error::CompilationError;

/// One dumped entry.
#[derive(Debug)]
pub struct ObjectDumpEntry<'a> {
    /// Symbol or display name of the node
    pub name: &'a str,
    /// The compiled body
    pub body: &'a CompiledMethodBody,
}

/// Write the dump for the given entries.
pub fn write_object_dump(
    path: &Path,
    entries: &[ObjectDumpEntry<'_>],
) -> Result<(), CompilationError> {
    let file = BufWriter::new(std::fs::File::create(path)?);
    let mut writer = Writer::new_with_indent(file, b' ', 2);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
    writer.write_event(Event::Start(BytesStart::new("ObjectNodes")))?;

    for entry in entries {
        let mut node = BytesStart::new("ObjectNode");
        node.push_attribute(("Name", entry.name));
        node.push_attribute(("Length", entry.body.len().to_string().as_str()));
        let has_children = !entry.body.gc_info.is_empty() || !entry.body.eh_info.is_empty();
        if has_children {
            writer.write_event(Event::Start(node))?;
            if !entry.body.gc_info.is_empty() {
                write_side_table(&mut writer, "GCInfo", entry.body.gc_info.len())?;
            }
            if !entry.body.eh_info.is_empty() {
                write_side_table(&mut writer, "EHInfo", entry.body.eh_info.len())?;
            }
            writer.write_event(Event::End(BytesEnd::new("ObjectNode")))?;
        } else {
            writer.write_event(Event::Empty(node))?;
        }
    }

    writer.write_event(Event::End(BytesEnd::new("ObjectNodes")))?;
    writer.into_inner().flush()?;
    Ok(())
}

fn write_side_table<W: Write>(
    writer: &mut Writer<W>,
    tag: &str,
    length: usize,
) -> Result<(), CompilationError> {
    writer.write_event(Event::Start(BytesStart::new(tag)))?;
    writer.write_event(Event::Text(BytesText::new(&length.to_string())))?;
    writer.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MethodBodyContent;

    #[test]
    fn dump_lists_names_lengths_and_side_tables() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.xml");
        let plain = CompiledMethodBody {
            content: MethodBodyContent::Native { code: vec![0x90; 16] },
            gc_info: Vec::new(),
            eh_info: Vec::new(),
            throws: None,
        };
        let with_tables = CompiledMethodBody {
            content: MethodBodyContent::Native { code: vec![0x90; 8] },
            gc_info: vec![1, 2, 3],
            eh_info: vec![4],
            throws: None,
        };
        write_object_dump(
            &path,
            &[
                ObjectDumpEntry { name: "App_Main", body: &plain },
                ObjectDumpEntry { name: "App_Helper", body: &with_tables },
            ],
        )
        .unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("<ObjectNode Name=\"App_Main\" Length=\"16\"/>"));
        assert!(text.contains("Name=\"App_Helper\""));
        assert!(text.contains("<GCInfo>3</GCInfo>"));
        assert!(text.contains("<EHInfo>1</EHInfo>"));
    }
}
