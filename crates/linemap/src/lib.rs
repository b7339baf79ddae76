//! Byte offset to line/column translation for diagnostics.

/// The type of a byte offset in a string
pub type Offset = u32;

/// Position for human readable output.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
pub struct CodePointPos {
    /// zero-based line index
    pub line: u32,
    /// zero-based column offset relative to the start of the line, unicode code points
    pub character: u32,
}

impl std::fmt::Display for CodePointPos {
    /// One-based `line:column`, the way editors and compilers print it.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line + 1, self.character + 1)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct LineInfo {
    /// index of the line within the file
    pub line: u32,
    /// byte offset of the start of the line
    pub line_start: Offset,
    /// Does the line contain non-ascii characters?
    pub is_unicode: bool,
}

pub struct LineMap {
    lines: Vec<(Offset, bool)>,
}

impl LineMap {
    pub fn new(src: &str) -> Self {
        assert!(src.len() <= Offset::MAX as usize);
        let mut lines = Vec::new();

        let mut prev_end = 0;
        let mut saw_unicode = false;
        let mut bytes = src.bytes().enumerate();

        // bytes of multi-byte characters are all >= 128, so ascii line breaks can be searched
        // for bytewise
        while let Some((mut i, b)) = bytes.next() {
            // \r\n  \n  \r
            match b {
                b'\n' | b'\r' => {
                    if b == b'\r' {
                        if let Some((new_i, b'\n')) = bytes.clone().next() {
                            bytes.next();
                            i = new_i;
                        }
                    }
                    lines.push((prev_end, saw_unicode));
                    saw_unicode = false;
                    prev_end = i as Offset + 1;
                }
                _ => {
                    if b >= 128 {
                        saw_unicode = true;
                    }
                }
            }
        }

        lines.push((prev_end, saw_unicode));

        Self { lines }
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Returns zero-based line and column in unicode codepoints. Offset is clamped to the end of
    /// `src` and rounded down to a character boundary.
    pub fn offset_to_codepoint(&self, src: &str, offset: Offset) -> CodePointPos {
        let mut offset = Offset::min(offset, src.len() as Offset);
        while !src.is_char_boundary(offset as usize) {
            offset -= 1;
        }

        let LineInfo {
            line,
            line_start,
            is_unicode,
        } = self.offset_to_line(offset);

        let len = self.line_length(src, line);
        let offset = offset.min(line_start + len);
        let character = match is_unicode {
            true => src[line_start as usize..offset as usize].chars().count() as u32,
            false => offset - line_start,
        };

        CodePointPos { line, character }
    }

    /// Find the line which contains the offset.
    pub fn offset_to_line(&self, byte_offset: Offset) -> LineInfo {
        let line = match self.lines.binary_search_by_key(&byte_offset, |a| a.0) {
            Ok(a) => a,
            Err(a) => a - 1,
        };
        let (line_start, is_unicode) = self.lines[line];
        debug_assert!(line_start <= byte_offset);

        LineInfo {
            line: line as u32,
            line_start,
            is_unicode,
        }
    }

    /// Length of the line without its line break.
    pub fn line_length(&self, src: &str, line: u32) -> Offset {
        self.line_str(src, line).len() as Offset
    }
    pub fn line_start(&self, line: u32) -> Offset {
        self.lines[line as usize].0
    }
    /// Offset one past the line break ending the line, or the end of `src`.
    pub fn line_end(&self, src: &str, line: u32) -> Offset {
        self.lines
            .get((line + 1) as usize)
            .map(|line| line.0)
            .unwrap_or(src.len() as Offset)
    }
    /// Text of the line, line break excluded.
    pub fn line_str<'a>(&self, src: &'a str, line: u32) -> &'a str {
        let start = self.line_start(line);
        let end = self.line_end(src, line);
        src[start as usize..end as usize].trim_end_matches(['\n', '\r'])
    }

    /// Two lines pointing at `start..end`: the source line and a caret underline. Spans reaching
    /// past the line are cut at its end, empty spans get a single caret.
    pub fn excerpt(&self, src: &str, start: Offset, end: Offset) -> String {
        let from = self.offset_to_codepoint(src, start);
        let text = self.line_str(src, from.line);

        let line_end = self.line_start(from.line) + text.len() as Offset;
        let to = self.offset_to_codepoint(src, end.clamp(start, line_end));
        let width = to.character.saturating_sub(from.character).max(1);

        let mut out = String::with_capacity(text.len() * 2 + 2);
        out.push_str(text);
        out.push('\n');
        // tabs are kept so that the caret lines up in a terminal
        for c in text.chars().take(from.character as usize) {
            out.push(if c == '\t' { '\t' } else { ' ' });
        }
        out.extend(std::iter::repeat('^').take(width as usize));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_lookup() {
        let str = "abcd\nαβ\n\nγδ";
        let mapping = LineMap::new(str);

        let test = |offset: Offset, (l, c): (u32, u32)| {
            let res = mapping.offset_to_codepoint(str, offset);
            let expected = CodePointPos {
                line: l,
                character: c,
            };
            assert_eq!(expected, res, "{offset}");
        };

        test(0, (0, 0));
        test(4, (0, 4));
        test(5, (1, 0));
        test(7, (1, 1));
        test(9, (1, 2));
        test(10, (2, 0));
        test(11, (3, 0));
        test(13, (3, 1));
        test(100, (3, 2));
        assert_eq!(mapping.line_count(), 4);
    }

    #[test]
    fn inside_multibyte_character() {
        let str = "αβ";
        let mapping = LineMap::new(str);
        assert_eq!(mapping.offset_to_codepoint(str, 1).character, 0);
        assert_eq!(mapping.offset_to_codepoint(str, 3).character, 1);
    }

    #[test]
    fn line_breaks() {
        let str = "a\r\nb\rc\n";
        let mapping = LineMap::new(str);
        assert_eq!(mapping.line_count(), 4);
        assert_eq!(mapping.line_str(str, 0), "a");
        assert_eq!(mapping.line_str(str, 1), "b");
        assert_eq!(mapping.line_str(str, 2), "c");
        assert_eq!(mapping.line_str(str, 3), "");
        assert_eq!(mapping.line_end(str, 0), 3);
        assert_eq!(
            mapping.offset_to_codepoint(str, 3),
            CodePointPos {
                line: 1,
                character: 0
            }
        );
    }

    #[test]
    fn one_based_display() {
        let str = "x\nαβγ";
        let mapping = LineMap::new(str);
        let pos = mapping.offset_to_codepoint(str, 6);
        assert_eq!(
            pos,
            CodePointPos {
                line: 1,
                character: 2,
            }
        );
        assert_eq!(pos.to_string(), "2:3");
    }

    #[test]
    fn caret_excerpt() {
        let str = "start = missing;\n";
        let mapping = LineMap::new(str);
        assert_eq!(
            mapping.excerpt(str, 8, 15),
            "start = missing;\n        ^^^^^^^"
        );
        assert_eq!(mapping.excerpt(str, 16, 16), "start = missing;\n                ^");

        let str = "\tαβ = x";
        let mapping = LineMap::new(str);
        assert_eq!(mapping.excerpt(str, 3, 100), "\tαβ = x\n\t ^^^^");
    }
}
