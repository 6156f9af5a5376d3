//! Tag-spec reader: per-line declarations binding program symbols to
//! policy tags.
//!
//! Two line forms, blank lines skipped:
//!
//! ```text
//! atom <symbol> : "<tag>"
//! ptr  <symbol> size = <n> : "<tag>"
//! ```
//!
//! The colon may sit flush against the preceding word. Tags are
//! whitespace-stripped before lookup. A tag the policy does not know is a
//! non-fatal diagnostic (the entry is dropped); a malformed line aborts the
//! whole load.

use policy::topology::canonical;
use policy::Policy;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Whether an entry tags the symbol itself or also the memory it points to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    Atom,
    Ptr,
}

/// One accepted tag-file line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagEntry {
    pub kind: TagKind,
    pub symbol: String,
    /// Canonical (whitespace-free) tag name.
    pub tag: String,
    /// Pointee size in bytes; 0 for [`TagKind::Atom`].
    pub ptr_size: u64,
}

/// Non-fatal diagnostic: a line naming a tag absent from the policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTag {
    pub line: usize,
    pub tag: String,
}

/// Reader result: accepted entries in file order plus the dropped lines.
#[derive(Debug, Default)]
pub struct TagSpec {
    pub entries: Vec<TagEntry>,
    pub unknown_tags: Vec<UnknownTag>,
}

#[derive(Debug, Error)]
pub enum TagSpecError {
    #[error("failed to read tag file: {0}")]
    Io(#[from] std::io::Error),
    #[error("line {line}: wrong syntax: {reason}")]
    Syntax { line: usize, reason: String },
}

/// Reads and parses a tag file against `policy`.
pub fn load(path: &Path, policy: &Policy) -> Result<TagSpec, TagSpecError> {
    let text = fs::read_to_string(path)?;
    parse(&text, policy)
}

/// Parses tag-file text against `policy`.
///
/// # Errors
/// [`TagSpecError::Syntax`] on the first malformed line; unknown tags are
/// collected, not raised.
pub fn parse(text: &str, policy: &Policy) -> Result<TagSpec, TagSpecError> {
    let mut spec = TagSpec::default();
    for (index, line) in text.lines().enumerate() {
        let line_number = index + 1;
        if line.is_empty() {
            continue;
        }
        let entry = parse_line(line).map_err(|reason| TagSpecError::Syntax {
            line: line_number,
            reason,
        })?;
        if policy.contains_tag(&entry.tag) {
            spec.entries.push(entry);
        } else {
            spec.unknown_tags.push(UnknownTag {
                line: line_number,
                tag: entry.tag,
            });
        }
    }
    Ok(spec)
}

fn parse_line(line: &str) -> Result<TagEntry, String> {
    let mut cursor = Cursor::new(line);

    let keyword = cursor.word_until_space();
    let kind = match keyword.as_str() {
        "atom" => TagKind::Atom,
        "ptr" => TagKind::Ptr,
        other => return Err(format!("expected 'atom' or 'ptr', got '{other}'")),
    };

    let (symbol, mut colon_seen) = cursor.symbol()?;
    let ptr_size = if kind == TagKind::Ptr {
        cursor.ptr_size(&mut colon_seen)?
    } else {
        0
    };
    let tag = cursor.tag(colon_seen)?;

    Ok(TagEntry {
        kind,
        symbol,
        tag,
        ptr_size,
    })
}

/// Character cursor over one line.
struct Cursor {
    chars: Vec<char>,
    pos: usize,
}

impl Cursor {
    fn new(line: &str) -> Self {
        Self {
            chars: line.chars().collect(),
            pos: 0,
        }
    }

    fn next(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    /// Collects characters up to the next space (consumed) or line end.
    fn word_until_space(&mut self) -> String {
        let mut word = String::new();
        while let Some(c) = self.next() {
            if c == ' ' {
                break;
            }
            word.push(c);
        }
        word
    }

    /// The symbol name, terminated by a space or a flush colon. A line that
    /// ends right after the symbol is missing its tag.
    fn symbol(&mut self) -> Result<(String, bool), String> {
        let mut symbol = String::new();
        let mut colon = false;
        while let Some(c) = self.next() {
            if c == ':' {
                colon = true;
                break;
            }
            if c == ' ' {
                break;
            }
            symbol.push(c);
        }
        if self.at_end() {
            return Err("missing rest of the tag declaration".to_string());
        }
        Ok((symbol, colon))
    }

    /// Parses `size = <n>` for a pointer entry. The number may carry the
    /// separating colon flush against it.
    fn ptr_size(&mut self, colon_seen: &mut bool) -> Result<u64, String> {
        if *colon_seen {
            return Err("pointer declaration needs a size argument".to_string());
        }
        let keyword: String = (0..4).filter_map(|_| self.next()).collect();
        if keyword != "size" {
            return Err("expected 'size' keyword".to_string());
        }
        loop {
            match self.next() {
                Some('=') => break,
                Some(_) => {}
                None => return Err("missing '=' in the size argument".to_string()),
            }
        }
        let mut digits = String::new();
        let mut c = self.next();
        while c == Some(' ') {
            c = self.next();
        }
        while let Some(ch) = c {
            if ch == ' ' {
                break;
            }
            if ch == ':' {
                *colon_seen = true;
                break;
            }
            digits.push(ch);
            c = self.next();
        }
        digits
            .parse::<u64>()
            .map_err(|_| format!("'{digits}' is not a valid size"))
    }

    /// Skips to the colon (unless already consumed), then reads the quoted
    /// tag. The stored value is whitespace-stripped and must be non-empty;
    /// anything after the closing quote is ignored.
    fn tag(&mut self, colon_seen: bool) -> Result<String, String> {
        if !colon_seen {
            loop {
                match self.next() {
                    Some(':') => break,
                    Some(_) => {}
                    None => return Err("missing ':' in the declaration".to_string()),
                }
            }
        }
        loop {
            match self.next() {
                Some('"') => break,
                Some(_) => {}
                None => return Err("missing opening '\"' of the tag".to_string()),
            }
        }
        let mut raw = String::new();
        let mut closed = false;
        while let Some(c) = self.next() {
            if c == '"' {
                closed = true;
                break;
            }
            raw.push(c);
        }
        if !closed {
            return Err("missing closing '\"' of the tag".to_string());
        }
        let tag = canonical(&raw);
        if tag.is_empty() {
            return Err("missing tag in the declaration".to_string());
        }
        Ok(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_policy() -> Policy {
        Policy::compile("topology PP: linear \"private\",\"public\"").unwrap()
    }

    #[test]
    fn test_atom_entry() {
        let spec = parse("atom buf : \"PP.private\"\n", &test_policy()).unwrap();
        assert_eq!(spec.entries.len(), 1);
        assert_eq!(
            spec.entries[0],
            TagEntry {
                kind: TagKind::Atom,
                symbol: "buf".to_string(),
                tag: "PP.private".to_string(),
                ptr_size: 0,
            }
        );
    }

    #[test]
    fn test_atom_with_flush_colon() {
        let spec = parse("atom buf: \"PP.private\"\n", &test_policy()).unwrap();
        assert_eq!(spec.entries[0].symbol, "buf");
        assert_eq!(spec.entries[0].tag, "PP.private");
    }

    #[test]
    fn test_ptr_entry() {
        let spec = parse("ptr p size = 16 : \"PP.public\"\n", &test_policy()).unwrap();
        assert_eq!(spec.entries[0].kind, TagKind::Ptr);
        assert_eq!(spec.entries[0].symbol, "p");
        assert_eq!(spec.entries[0].ptr_size, 16);
    }

    #[test]
    fn test_ptr_size_with_flush_colon() {
        let spec = parse("ptr p size = 16: \"PP.public\"\n", &test_policy()).unwrap();
        assert_eq!(spec.entries[0].ptr_size, 16);
        assert_eq!(spec.entries[0].tag, "PP.public");
    }

    #[test]
    fn test_blank_lines_are_skipped() {
        let spec = parse(
            "\natom a : \"PP.private\"\n\natom b : \"PP.public\"\n\n",
            &test_policy(),
        )
        .unwrap();
        assert_eq!(spec.entries.len(), 2);
    }

    #[test]
    fn test_tag_whitespace_is_stripped() {
        let spec = parse("atom buf : \"PP . private\"\n", &test_policy()).unwrap();
        assert_eq!(spec.entries[0].tag, "PP.private");
    }

    #[test]
    fn test_unknown_tag_is_dropped_not_fatal() {
        let spec = parse(
            "atom a : \"PP.private\"\natom b : \"QQ.secret\"\n",
            &test_policy(),
        )
        .unwrap();
        assert_eq!(spec.entries.len(), 1);
        assert_eq!(
            spec.unknown_tags,
            vec![UnknownTag {
                line: 2,
                tag: "QQ.secret".to_string(),
            }]
        );
    }

    #[test]
    fn test_bad_keyword_is_fatal() {
        let err = parse("blob a : \"PP.private\"\n", &test_policy()).unwrap_err();
        let TagSpecError::Syntax { line, reason } = err else {
            panic!("expected syntax error");
        };
        assert_eq!(line, 1);
        assert!(reason.contains("atom"));
    }

    #[test]
    fn test_error_carries_line_number() {
        let err = parse(
            "atom a : \"PP.private\"\nptr p size = x : \"PP.public\"\n",
            &test_policy(),
        )
        .unwrap_err();
        assert!(matches!(err, TagSpecError::Syntax { line: 2, .. }));
    }

    #[test]
    fn test_ptr_without_size_is_fatal() {
        let err = parse("ptr p: \"PP.public\"\n", &test_policy()).unwrap_err();
        let TagSpecError::Syntax { reason, .. } = err else {
            panic!("expected syntax error");
        };
        assert!(reason.contains("size"));
    }

    #[test]
    fn test_symbol_alone_is_fatal() {
        let err = parse("atom buf", &test_policy()).unwrap_err();
        assert!(matches!(err, TagSpecError::Syntax { line: 1, .. }));
    }

    #[test]
    fn test_missing_closing_quote_is_fatal() {
        let err = parse("atom buf : \"PP.private\n", &test_policy()).unwrap_err();
        let TagSpecError::Syntax { reason, .. } = err else {
            panic!("expected syntax error");
        };
        assert!(reason.contains("closing"));
    }

    #[test]
    fn test_empty_tag_is_fatal() {
        let err = parse("atom buf : \" \"\n", &test_policy()).unwrap_err();
        let TagSpecError::Syntax { reason, .. } = err else {
            panic!("expected syntax error");
        };
        assert!(reason.contains("missing tag"));
    }

    #[test]
    fn test_trailing_garbage_is_ignored() {
        let spec = parse("atom buf : \"PP.private\" trailing words\n", &test_policy()).unwrap();
        assert_eq!(spec.entries.len(), 1);
    }

    #[test]
    fn test_unknown_is_a_valid_tag() {
        let spec = parse("atom buf : \"unknown\"\n", &test_policy()).unwrap();
        assert_eq!(spec.entries[0].tag, "unknown");
    }
}
