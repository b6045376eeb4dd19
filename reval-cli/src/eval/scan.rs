//! Lightweight lexical scan of Rust source.
//!
//! Only tracks what the REPL needs without a full lexer: delimiter depth,
//! whether the text ends inside a literal or block comment, and which lines
//! continue a multi-line string literal.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Code,
    Str,
    RawStr(usize),
    LineComment,
    BlockComment(usize),
}

/// Result of scanning a piece of source text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scan {
    /// Open minus closed delimiters outside literals and comments.
    pub depth: i32,
    /// The text ends inside a string literal or a block comment.
    pub unterminated: bool,
    /// Zero-based indices of lines that start inside a string literal.
    pub literal_lines: Vec<usize>,
}

impl Scan {
    /// Whether more input is needed to close what was opened.
    #[must_use]
    pub fn is_incomplete(&self) -> bool {
        self.depth > 0 || self.unterminated
    }
}

/// Scan `src` and summarize its delimiter and literal structure.
#[must_use]
pub fn scan(src: &str) -> Scan {
    let chars: Vec<char> = src.chars().collect();
    let mut mode = Mode::Code;
    let mut depth = 0i32;
    let mut line = 0usize;
    let mut literal_lines = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        if c == '\n' {
            line += 1;
            match mode {
                Mode::LineComment => mode = Mode::Code,
                Mode::Str | Mode::RawStr(_) => literal_lines.push(line),
                Mode::Code | Mode::BlockComment(_) => {}
            }
            i += 1;
            continue;
        }

        match mode {
            Mode::Code => match c {
                '/' if next == Some('/') => {
                    mode = Mode::LineComment;
                    i += 2;
                    continue;
                }
                '/' if next == Some('*') => {
                    mode = Mode::BlockComment(1);
                    i += 2;
                    continue;
                }
                '"' => mode = Mode::Str,
                'r' | 'b' => {
                    if let Some((hashes, len)) = raw_string_start(&chars, i) {
                        mode = Mode::RawStr(hashes);
                        i += len;
                        continue;
                    }
                }
                '\'' => {
                    i = skip_quote(&chars, i);
                    continue;
                }
                '{' | '(' | '[' => depth += 1,
                '}' | ')' | ']' => depth -= 1,
                _ => {}
            },
            Mode::Str => match c {
                '\\' => {
                    // An escaped newline still starts a new line.
                    i += 1;
                    if next != Some('\n') {
                        i += 1;
                    }
                    continue;
                }
                '"' => mode = Mode::Code,
                _ => {}
            },
            Mode::RawStr(hashes) => {
                if c == '"' && (1..=hashes).all(|k| chars.get(i + k) == Some(&'#')) {
                    mode = Mode::Code;
                    i += 1 + hashes;
                    continue;
                }
            }
            Mode::LineComment => {}
            Mode::BlockComment(nesting) => {
                if c == '*' && next == Some('/') {
                    mode = if nesting == 1 {
                        Mode::Code
                    } else {
                        Mode::BlockComment(nesting - 1)
                    };
                    i += 2;
                    continue;
                }
                if c == '/' && next == Some('*') {
                    mode = Mode::BlockComment(nesting + 1);
                    i += 2;
                    continue;
                }
            }
        }
        i += 1;
    }

    Scan {
        depth,
        unterminated: matches!(mode, Mode::Str | Mode::RawStr(_) | Mode::BlockComment(_)),
        literal_lines,
    }
}

/// Check whether input has unclosed delimiters, literals or comments.
#[must_use]
pub fn has_unclosed_delimiters(input: &str) -> bool {
    scan(input).is_incomplete()
}

/// Recognize `r"`, `r#"`, `br##"` and friends at `i`. Returns the number of
/// hashes and the length of the opening sequence.
fn raw_string_start(chars: &[char], i: usize) -> Option<(usize, usize)> {
    if i > 0 && (chars[i - 1].is_alphanumeric() || chars[i - 1] == '_') {
        return None;
    }
    let mut j = i;
    if chars[j] == 'b' {
        j += 1;
    }
    if chars.get(j) != Some(&'r') {
        return None;
    }
    j += 1;
    let mut hashes = 0;
    while chars.get(j) == Some(&'#') {
        hashes += 1;
        j += 1;
    }
    (chars.get(j) == Some(&'"')).then_some((hashes, j + 1 - i))
}

/// Skip a char literal, or just the quote of a lifetime or label.
fn skip_quote(chars: &[char], i: usize) -> usize {
    match chars.get(i + 1) {
        Some('\\') => {
            let mut j = i + 3;
            while j < chars.len() && j < i + 12 {
                if chars[j] == '\'' {
                    return j + 1;
                }
                j += 1;
            }
            i + 1
        }
        Some(_) if chars.get(i + 2) == Some(&'\'') => i + 3,
        _ => i + 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unclosed_delimiters() {
        assert!(has_unclosed_delimiters("fn foo() {"));
        assert!(has_unclosed_delimiters("let x = (1 +"));
        assert!(has_unclosed_delimiters("if true {"));
        assert!(!has_unclosed_delimiters("fn foo() {}"));
        assert!(!has_unclosed_delimiters("let x = (1 + 2);"));
        assert!(!has_unclosed_delimiters(r#"let s = "hello {world";"#));
    }

    #[test]
    fn unterminated_literals_and_comments() {
        assert!(has_unclosed_delimiters(r#"let s = "abc"#));
        assert!(has_unclosed_delimiters("let s = r#\"abc\"; "));
        assert!(has_unclosed_delimiters("/* open /* nested */"));
        assert!(!has_unclosed_delimiters("/* open /* nested */ */ 1"));
        assert!(!has_unclosed_delimiters("let s = r#\"a \" b\"#;"));
    }

    #[test]
    fn chars_and_lifetimes() {
        assert!(!has_unclosed_delimiters("let c = '{';"));
        assert!(!has_unclosed_delimiters(r"let c = '\'';"));
        assert!(!has_unclosed_delimiters("fn f<'a>(x: &'a str) -> &'a str { x }"));
        assert!(has_unclosed_delimiters("'outer: loop {"));
    }

    #[test]
    fn comments_hide_delimiters() {
        assert!(!has_unclosed_delimiters("1 + 1 // {"));
        assert!(has_unclosed_delimiters("// }\nfn f() {"));
    }

    #[test]
    fn literal_continuation_lines() {
        let src = "fn main() {\n    let s = \"a\n    b\n\";\n    let t = 1;\n}\n";
        assert_eq!(scan(src).literal_lines, vec![2, 3]);
    }

    #[test]
    fn escaped_newline_in_string() {
        let src = "let s = \"a\\\n    b\";\nlet t = 2;";
        let result = scan(src);
        assert_eq!(result.literal_lines, vec![1]);
        assert!(!result.is_incomplete());
    }
}
