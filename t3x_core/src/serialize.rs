//! The nested-structure serialization carried inside containers.
//!
//! Archives store their manifest in PHP's `serialize()` format:
//!
//! ```text
//! N;                          null
//! b:1;                        boolean
//! i:42;                       integer
//! d:0.5;                      float
//! s:5:"hello";                byte string, length in bytes
//! a:2:{i:0;s:1:"x";s:1:"k";N;}  mapping of (key, value) pairs
//! ```
//!
//! Keys are integers or strings. String lengths count bytes, so content may
//! contain quotes, delimiters or arbitrary binary data.

use crate::error::{Error, Result};
use crate::value::{Key, Mapping, ValueNode};

/// Maximum nesting depth accepted by the parser.
pub const MAX_DEPTH: usize = 64;

/// Parse a complete serialized value.
///
/// The whole input must be consumed; trailing bytes are an error.
pub fn from_bytes(input: &[u8]) -> Result<ValueNode> {
    let mut parser = Parser::new(input);
    let value = parser.value(0)?;
    if parser.pos != input.len() {
        return Err(parser.error(format!(
            "{} trailing bytes after value",
            input.len() - parser.pos
        )));
    }
    Ok(value)
}

/// Serialize a value tree.
pub fn to_bytes(value: &ValueNode) -> Vec<u8> {
    let mut out = Vec::new();
    write_value(&mut out, value);
    out
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    fn error(&self, reason: impl AsRef<str>) -> Error {
        Error::malformed_manifest(format!("{} at byte {}", reason.as_ref(), self.pos))
    }

    fn next(&mut self) -> Result<u8> {
        let byte = *self
            .input
            .get(self.pos)
            .ok_or_else(|| self.error("unexpected end of input"))?;
        self.pos += 1;
        Ok(byte)
    }

    fn expect(&mut self, wanted: u8) -> Result<()> {
        let start = self.pos;
        let byte = self.next()?;
        if byte != wanted {
            self.pos = start;
            return Err(self.error(format!(
                "expected '{}', found '{}'",
                wanted as char,
                byte.escape_ascii()
            )));
        }
        Ok(())
    }

    /// Read up to (not including) `terminator`, consuming the terminator.
    fn until(&mut self, terminator: u8) -> Result<&'a str> {
        let input = self.input;
        let rest = &input[self.pos..];
        let len = rest
            .iter()
            .position(|&b| b == terminator)
            .ok_or_else(|| self.error(format!("missing '{}'", terminator as char)))?;
        let text = std::str::from_utf8(&rest[..len])
            .map_err(|_| self.error("non-ASCII bytes in numeric field"))?;
        self.pos += len + 1;
        Ok(text)
    }

    fn integer(&mut self, terminator: u8) -> Result<i64> {
        let start = self.pos;
        let text = self.until(terminator)?;
        text.parse::<i64>().map_err(|_| {
            self.pos = start;
            self.error(format!("invalid integer '{}'", text))
        })
    }

    fn length(&mut self, terminator: u8) -> Result<usize> {
        let start = self.pos;
        let text = self.until(terminator)?;
        text.parse::<usize>().map_err(|_| {
            self.pos = start;
            self.error(format!("invalid length '{}'", text))
        })
    }

    fn value(&mut self, depth: usize) -> Result<ValueNode> {
        match self.next()? {
            b'N' => {
                self.expect(b';')?;
                Ok(ValueNode::Null)
            }
            b'b' => {
                self.expect(b':')?;
                match self.integer(b';')? {
                    0 => Ok(ValueNode::Boolean(false)),
                    1 => Ok(ValueNode::Boolean(true)),
                    other => Err(self.error(format!("invalid boolean {}", other))),
                }
            }
            b'i' => {
                self.expect(b':')?;
                Ok(ValueNode::Integer(self.integer(b';')?))
            }
            b'd' => {
                self.expect(b':')?;
                let start = self.pos;
                let text = self.until(b';')?;
                let float = parse_float(text).ok_or_else(|| {
                    self.pos = start;
                    self.error(format!("invalid float '{}'", text))
                })?;
                Ok(ValueNode::Float(float))
            }
            b's' => {
                self.expect(b':')?;
                let bytes = self.string_body()?;
                self.expect(b';')?;
                Ok(ValueNode::Scalar(bytes.to_vec()))
            }
            b'a' => {
                if depth >= MAX_DEPTH {
                    return Err(self.error(format!("nesting deeper than {}", MAX_DEPTH)));
                }
                self.expect(b':')?;
                let count = self.length(b':')?;
                self.expect(b'{')?;
                // Each entry needs at least four bytes; cap the reservation
                // so a bogus count cannot trigger a huge allocation.
                let remaining = self.input.len() - self.pos;
                let mut mapping = Mapping::with_capacity(count.min(remaining / 4));
                for _ in 0..count {
                    let key = self.key()?;
                    let value = self.value(depth + 1)?;
                    if let Err((key, _)) = mapping.insert(key, value) {
                        return Err(self.error(format!("duplicate key '{}'", key)));
                    }
                }
                self.expect(b'}')?;
                Ok(ValueNode::Mapping(mapping))
            }
            other => {
                self.pos -= 1;
                Err(self.error(format!("unknown type tag '{}'", other.escape_ascii())))
            }
        }
    }

    /// `<len>:"<bytes>"`, shared by string values and string keys.
    fn string_body(&mut self) -> Result<&'a [u8]> {
        let len = self.length(b':')?;
        self.expect(b'"')?;
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.input.len())
            .ok_or_else(|| self.error(format!("string of {} bytes runs past end", len)))?;
        let input = self.input;
        let bytes = &input[self.pos..end];
        self.pos = end;
        self.expect(b'"')?;
        Ok(bytes)
    }

    fn key(&mut self) -> Result<Key> {
        match self.next()? {
            b'i' => {
                self.expect(b':')?;
                Ok(Key::Index(self.integer(b';')?))
            }
            b's' => {
                self.expect(b':')?;
                let name = self.string_body()?;
                self.expect(b';')?;
                Ok(Key::Name(name.to_vec()))
            }
            other => {
                self.pos -= 1;
                Err(self.error(format!(
                    "mapping keys must be integers or strings, found '{}'",
                    other.escape_ascii()
                )))
            }
        }
    }
}

fn parse_float(text: &str) -> Option<f64> {
    match text {
        "INF" => Some(f64::INFINITY),
        "-INF" => Some(f64::NEG_INFINITY),
        "NAN" => Some(f64::NAN),
        _ => text.parse::<f64>().ok().filter(|f| f.is_finite()),
    }
}

fn write_value(out: &mut Vec<u8>, value: &ValueNode) {
    match value {
        ValueNode::Null => out.extend_from_slice(b"N;"),
        ValueNode::Boolean(b) => out.extend_from_slice(if *b { b"b:1;" } else { b"b:0;" }),
        ValueNode::Integer(i) => out.extend_from_slice(format!("i:{};", i).as_bytes()),
        ValueNode::Float(f) => {
            let text = if f.is_nan() {
                "NAN".to_string()
            } else if *f == f64::INFINITY {
                "INF".to_string()
            } else if *f == f64::NEG_INFINITY {
                "-INF".to_string()
            } else {
                f.to_string()
            };
            out.extend_from_slice(format!("d:{};", text).as_bytes());
        }
        ValueNode::Scalar(bytes) => write_string(out, bytes),
        ValueNode::Mapping(mapping) => {
            out.extend_from_slice(format!("a:{}:{{", mapping.len()).as_bytes());
            for (key, child) in mapping.iter() {
                match key {
                    Key::Index(i) => out.extend_from_slice(format!("i:{};", i).as_bytes()),
                    Key::Name(name) => write_string(out, name),
                }
                write_value(out, child);
            }
            out.push(b'}');
        }
    }
}

fn write_string(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(format!("s:{}:\"", bytes.len()).as_bytes());
    out.extend_from_slice(bytes);
    out.extend_from_slice(b"\";");
}
