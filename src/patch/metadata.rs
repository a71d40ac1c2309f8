//! Locating and rewriting the metadata block of a package file
//!
//! This is purely textual. The block starts at the first line carrying the
//! start marker and ends where its braces balance again, on a line that must
//! carry the end marker.

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

static BROKEN_DECLARATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bbroken\s*=([^=]|$)").expect("valid regex"));

/// Textual markers bounding the block and flagging unsafe declarations
#[derive(Debug, Clone, Copy)]
pub struct Markers<'a> {
    pub start: &'a str,
    pub end: &'a str,
    pub complex: &'a [String],
}

/// Why a file cannot be rewritten automatically
///
/// Line numbers are 1-based.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    #[error("no metadata block")]
    NoBlock,

    #[error("metadata block opened on line {0} is never closed")]
    Unclosed(usize),

    #[error("metadata block on line {0} opens and closes on the same line")]
    SingleLine(usize),

    #[error("{0} broken declarations, unclear which one to replace")]
    Multiple(usize),

    #[error("broken declaration on line {0} is outside the metadata block")]
    OutsideBlock(usize),

    #[error("broken declaration on line {0} spans multiple lines")]
    Multiline(usize),

    #[error("broken declaration on line {line} mentions `{marker}`, not only platforms")]
    Complex { line: usize, marker: String },

    #[error("broken declaration on line {0} has an explanatory comment, move it by hand")]
    Documented(usize),
}

impl LayoutError {
    /// The file has nothing recognizable to edit
    pub fn is_missing_block(&self) -> bool {
        matches!(self, Self::NoBlock | Self::Unclosed(_))
    }
}

/// Where the block and its existing declaration live (0-based line indexes)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaLayout {
    pub open: usize,
    pub close: usize,
    pub existing: Option<usize>,
    pub indent: String,
}

pub fn is_broken_declaration(line: &str) -> bool {
    !line.trim_start().starts_with('#') && BROKEN_DECLARATION.is_match(line)
}

/// Find the metadata block and check the existing declaration is safe to replace
pub fn scan(text: &str, markers: &Markers<'_>) -> Result<MetaLayout, LayoutError> {
    let lines: Vec<&str> = text.lines().collect();
    let (open, close) = find_block(&lines, markers)?;

    let declarations: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| is_broken_declaration(line))
        .map(|(i, _)| i)
        .collect();

    let existing = match declarations.as_slice() {
        [] => None,
        [line] => {
            check_declaration(&lines, *line, open, close, markers)?;
            Some(*line)
        }
        many => return Err(LayoutError::Multiple(many.len())),
    };

    let indent = lines[open + 1..close]
        .iter()
        .enumerate()
        .filter(|(i, line)| Some(open + 1 + i) != existing && !line.trim().is_empty())
        .map(|(_, line)| leading_whitespace(line).to_string())
        .next()
        .unwrap_or_else(|| format!("{}  ", leading_whitespace(lines[close])));

    Ok(MetaLayout {
        open,
        close,
        existing,
        indent,
    })
}

/// Produce the staged file: the old declaration dropped, the new one placed
/// just before the closing line.
pub fn rewrite(text: &str, layout: &MetaLayout, expression: &str, comment: Option<&str>) -> String {
    let mut out: Vec<String> = Vec::new();
    for (i, line) in text.lines().enumerate() {
        if Some(i) == layout.existing {
            continue;
        }
        if i == layout.close {
            if let Some(comment) = comment {
                out.push(format!("{}# {}", layout.indent, comment));
            }
            out.push(format!("{}broken = {};", layout.indent, expression));
        }
        out.push(line.to_string());
    }

    let newline = if text.contains("\r\n") { "\r\n" } else { "\n" };
    let mut staged = out.join(newline);
    if text.ends_with('\n') {
        staged.push_str(newline);
    }
    staged
}

fn find_block(lines: &[&str], markers: &Markers<'_>) -> Result<(usize, usize), LayoutError> {
    let (open, column) = lines
        .iter()
        .enumerate()
        .find_map(|(i, line)| line.find(markers.start).map(|col| (i, col)))
        .ok_or(LayoutError::NoBlock)?;

    let mut braces = BraceCounter::default();
    for (i, line) in lines.iter().enumerate().skip(open) {
        let counted = if i == open { &line[column..] } else { *line };
        braces.feed(counted);
        if braces.opened && braces.depth <= 0 {
            if i == open {
                return Err(LayoutError::SingleLine(open + 1));
            }
            if !line.contains(markers.end) {
                return Err(LayoutError::Unclosed(open + 1));
            }
            return Ok((open, i));
        }
    }
    Err(LayoutError::Unclosed(open + 1))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Literal {
    Quoted,
    Indented,
}

/// Brace depth over Nix source, skipping `#` comments and string literals
///
/// Strings can span lines, so the literal state carries over between calls
/// to `feed`.
#[derive(Debug, Default)]
struct BraceCounter {
    depth: i64,
    opened: bool,
    literal: Option<Literal>,
}

impl BraceCounter {
    fn feed(&mut self, line: &str) {
        let mut chars = line.chars().peekable();
        while let Some(c) = chars.next() {
            match self.literal {
                Some(Literal::Quoted) => match c {
                    '\\' => {
                        chars.next();
                    }
                    '"' => self.literal = None,
                    _ => {}
                },
                Some(Literal::Indented) => {
                    if c == '\'' && chars.peek() == Some(&'\'') {
                        chars.next();
                        // ''' ''$ and ''\ are escapes inside the string
                        match chars.peek() {
                            Some('\'' | '$' | '\\') => {
                                chars.next();
                            }
                            _ => self.literal = None,
                        }
                    }
                }
                None => match c {
                    '#' => return,
                    '"' => self.literal = Some(Literal::Quoted),
                    '\'' if chars.peek() == Some(&'\'') => {
                        chars.next();
                        self.literal = Some(Literal::Indented);
                    }
                    '{' => {
                        self.depth += 1;
                        self.opened = true;
                    }
                    '}' => self.depth -= 1,
                    _ => {}
                },
            }
        }
    }
}

fn check_declaration(
    lines: &[&str],
    idx: usize,
    open: usize,
    close: usize,
    markers: &Markers<'_>,
) -> Result<(), LayoutError> {
    let line = lines[idx];
    let number = idx + 1;

    if idx <= open || idx >= close {
        return Err(LayoutError::OutsideBlock(number));
    }
    if !line.contains(';') {
        return Err(LayoutError::Multiline(number));
    }
    if let Some(marker) = markers.complex.iter().find(|m| line.contains(m.as_str())) {
        return Err(LayoutError::Complex {
            line: number,
            marker: marker.clone(),
        });
    }

    let documented = idx > 0 && lines[idx - 1].trim_start().starts_with('#');
    if documented && idx + 1 != close {
        return Err(LayoutError::Documented(number));
    }
    Ok(())
}

fn leading_whitespace(line: &str) -> &str {
    let trimmed = line.trim_start();
    &line[..line.len() - trimmed.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complex() -> Vec<String> {
        ["Static", "targetPlatform", "version", "with"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn stage(text: &str, expression: &str, comment: Option<&str>) -> Result<String, LayoutError> {
        let complex = complex();
        let markers = Markers {
            start: "meta =",
            end: "};",
            complex: &complex,
        };
        let layout = scan(text, &markers)?;
        Ok(rewrite(text, &layout, expression, comment))
    }

    const SIMPLE: &str = r#"{ lib, stdenv, fetchurl }:

stdenv.mkDerivation {
  pname = "hello";
  version = "2.12";

  meta = {
    description = "A program that produces a familiar, friendly greeting";
    license = lib.licenses.gpl3Plus;
    maintainers = [
      lib.maintainers.eelco
    ];
  };
}
"#;

    #[test]
    fn inserts_before_closing_line() {
        let staged = stage(SIMPLE, "stdenv.hostPlatform.isDarwin", None).unwrap();
        assert!(staged.contains(
            "    ];\n    broken = stdenv.hostPlatform.isDarwin;\n  };\n}\n"
        ));
        assert_eq!(staged.lines().count(), SIMPLE.lines().count() + 1);
    }

    #[test]
    fn comment_goes_above_declaration() {
        let staged = stage(SIMPLE, "true", Some("fails to link since 2024")).unwrap();
        assert!(staged.contains("    # fails to link since 2024\n    broken = true;\n  };"));
    }

    #[test]
    fn replaces_existing_simple_declaration() {
        let text = "  meta = {\n    broken = stdenv.hostPlatform.isDarwin;\n    description = \"x\";\n  };\n";
        let staged = stage(text, "true", None).unwrap();
        assert_eq!(staged, "  meta = {\n    description = \"x\";\n    broken = true;\n  };\n");
    }

    #[test]
    fn nested_sets_do_not_end_block() {
        let text = "meta = {\n  platforms = { a = 1; };\n  foo = {\n    b = 2;\n  };\n};\n";
        let complex = complex();
        let layout = scan(
            text,
            &Markers {
                start: "meta =",
                end: "};",
                complex: &complex,
            },
        )
        .unwrap();
        assert_eq!((layout.open, layout.close), (0, 5));
        assert_eq!(layout.indent, "  ");
    }

    #[test]
    fn braces_in_comments_and_strings_are_ignored() {
        let text = r#"  meta = {
    description = "Prints } and {";
    longDescription = ''
      Templates look like ''${name} }.
    '';
    homepage = "https://example.org"; # see } below
  };
}
"#;
        let staged = stage(text, "true", None).unwrap();
        assert!(staged.ends_with("# see } below\n    broken = true;\n  };\n}\n"));
    }

    #[test]
    fn crlf_files_keep_their_line_endings() {
        let text = "  meta = {\r\n    license = 1;\r\n  };\r\n";
        let staged = stage(text, "true", None).unwrap();
        assert_eq!(
            staged,
            "  meta = {\r\n    license = 1;\r\n    broken = true;\r\n  };\r\n"
        );
    }

    #[test]
    fn empty_block_indents_from_closing_line() {
        let staged = stage("  meta = {\n  };", "true", None).unwrap();
        assert_eq!(staged, "  meta = {\n    broken = true;\n  };");
    }

    #[test]
    fn missing_block_is_reported() {
        assert_eq!(stage("{ }:\n{ pname = \"x\"; }\n", "true", None), Err(LayoutError::NoBlock));
        assert!(matches!(
            stage("meta = {\n  a = 1;\n", "true", None),
            Err(LayoutError::Unclosed(1))
        ));
        assert!(matches!(
            stage("meta = { description = \"x\"; };\n", "true", None),
            Err(LayoutError::SingleLine(1))
        ));
    }

    #[test]
    fn multiple_declarations_are_rejected() {
        let text = "meta = {\n  broken = true;\n  broken = false;\n};\n";
        assert_eq!(stage(text, "true", None), Err(LayoutError::Multiple(2)));
    }

    #[test]
    fn multiline_declaration_is_rejected() {
        let text = "meta = {\n  broken = stdenv.hostPlatform.isDarwin\n    || stdenv.hostPlatform.isAarch64;\n};\n";
        assert_eq!(stage(text, "true", None), Err(LayoutError::Multiline(2)));
    }

    #[test]
    fn complex_declaration_is_rejected() {
        let text = "meta = {\n  broken = stdenv.hostPlatform.isStatic;\n};\n";
        assert!(matches!(
            stage(text, "true", None),
            Err(LayoutError::Complex { line: 2, ref marker }) if marker == "Static"
        ));
    }

    #[test]
    fn documented_declaration_must_be_adjacent_to_close() {
        let text = "meta = {\n  # needs newer SDK\n  broken = stdenv.hostPlatform.isDarwin;\n  license = 1;\n};\n";
        assert_eq!(stage(text, "true", None), Err(LayoutError::Documented(3)));

        let adjacent = "meta = {\n  license = 1;\n  # needs newer SDK\n  broken = stdenv.hostPlatform.isDarwin;\n};\n";
        let staged = stage(adjacent, "true", None).unwrap();
        assert_eq!(
            staged,
            "meta = {\n  license = 1;\n  # needs newer SDK\n  broken = true;\n};\n"
        );
    }

    #[test]
    fn declaration_outside_block_is_rejected() {
        let text = "let broken = true; in\nmeta = {\n  a = 1;\n};\n";
        assert_eq!(stage(text, "true", None), Err(LayoutError::OutsideBlock(1)));
    }

    #[test]
    fn comparisons_and_comments_are_not_declarations() {
        assert!(!is_broken_declaration("  assert broken == false;"));
        assert!(!is_broken_declaration("  # broken = true;"));
        assert!(!is_broken_declaration("  isBroken = true;"));
        assert!(is_broken_declaration("  broken= true;"));
        assert!(is_broken_declaration("  meta.broken = true;"));
    }
}
