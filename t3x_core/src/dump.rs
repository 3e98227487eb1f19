//! Human-readable manifest dump.
//!
//! ```text
//! extKey = demo
//! FILES  = 
//!   f1 = 
//!     name    = a/b.txt
//!     content = String[2048]
//!
//!
//! ```
//!
//! Keys are padded to the longest sibling key so the `=` signs line up.
//! Strings that are too long or contain non-printable bytes are summarized
//! as `String[<byte length>]`.

use crate::value::{Key, Mapping, ValueNode};
use std::io::{self, Write};

/// Default longest string printed literally.
pub const DEFAULT_STRING_LIMIT: usize = 60;

/// Indentation added per nesting level.
const INDENT_STEP: &str = "  ";

/// Prints value trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Printer {
    string_limit: usize,
}

impl Default for Printer {
    fn default() -> Self {
        Self::new(DEFAULT_STRING_LIMIT)
    }
}

impl Printer {
    /// `string_limit` of 0 prints every printable string in full.
    pub fn new(string_limit: usize) -> Self {
        Self { string_limit }
    }

    /// Print a whole manifest, aligning its top-level keys.
    pub fn print<W: Write>(&self, out: &mut W, root: &Mapping) -> io::Result<()> {
        self.print_mapping(out, root, "", root.key_width())
    }

    /// Print the entries of `mapping` at `indent`, padding keys to `width`.
    pub fn print_mapping<W: Write>(
        &self,
        out: &mut W,
        mapping: &Mapping,
        indent: &str,
        width: usize,
    ) -> io::Result<()> {
        for (key, value) in mapping.iter() {
            let pad = width.saturating_sub(key.display_len());
            out.write_all(indent.as_bytes())?;
            match key {
                Key::Index(index) => write!(out, "{}", index)?,
                Key::Name(name) => out.write_all(name)?,
            }
            write!(out, "{:pad$} = ", "", pad = pad)?;

            match value {
                ValueNode::Mapping(children) => {
                    writeln!(out)?;
                    let child_indent = format!("{}{}", indent, INDENT_STEP);
                    self.print_mapping(out, children, &child_indent, children.key_width())?;
                }
                ValueNode::Scalar(bytes) => write!(out, "{}", self.scalar(bytes))?,
                ValueNode::Integer(i) => write!(out, "{}", i)?,
                ValueNode::Boolean(b) => write!(out, "{}", b)?,
                ValueNode::Float(f) => write!(out, "{}", f)?,
                ValueNode::Null => out.write_all(b"NULL")?,
            }
            writeln!(out)?;
        }
        Ok(())
    }

    /// Render a whole manifest into a string.
    pub fn render(&self, root: &Mapping) -> String {
        let mut out = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.print(&mut out, root);
        String::from_utf8_lossy(&out).into_owned()
    }

    fn scalar(&self, bytes: &[u8]) -> String {
        let too_long = self.string_limit > 0 && bytes.len() > self.string_limit;
        match std::str::from_utf8(bytes) {
            Ok(text) if !too_long && bytes.iter().copied().all(is_printable) => text.to_string(),
            _ => format!("String[{}]", bytes.len()),
        }
    }
}

/// Bytes that print as themselves on a terminal line.
fn is_printable(byte: u8) -> bool {
    byte.is_ascii_graphic() || byte == b' ' || byte == b'\t'
}
