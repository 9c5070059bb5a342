//! Tolerant token scanner over guest source.
//!
//! Knows just enough Go lexical structure to tell code apart from comments
//! and string, rune or raw-string literals. It never fails: malformed input
//! still yields the tokens that can be recognised, and an unterminated
//! literal runs to the end of its line (or of the input, for raw strings).

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TokenKind {
    Ident,
    /// String literal with escapes resolved.
    Str(String),
    LParen,
    RParen,
    Dot,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
}

impl Token {
    pub fn text<'a>(&self, src: &'a str) -> &'a str {
        &src[self.start..self.end]
    }
}

pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}

pub(crate) fn scan(src: &str) -> Vec<Token> {
    let bytes = src.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let start = i;
        let kind = match bytes[i] {
            b if b.is_ascii_whitespace() => {
                i += 1;
                continue;
            }
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                i = line_end(bytes, i);
                continue;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = match src[i + 2..].find("*/") {
                    Some(off) => i + 2 + off + 2,
                    None => bytes.len(),
                };
                continue;
            }
            b'"' => {
                let (value, end) = interpreted(src, i + 1);
                i = end;
                TokenKind::Str(value)
            }
            b'`' => {
                let body = i + 1;
                let close = src[body..].find('`').map_or(bytes.len(), |off| body + off);
                i = (close + 1).min(bytes.len());
                TokenKind::Str(src[body..close].replace('\r', ""))
            }
            b'\'' => {
                i = skip_rune(bytes, i + 1);
                TokenKind::Other
            }
            b'(' => {
                i += 1;
                TokenKind::LParen
            }
            b')' => {
                i += 1;
                TokenKind::RParen
            }
            b'.' if !bytes.get(i + 1).is_some_and(u8::is_ascii_digit) => {
                i += 1;
                TokenKind::Dot
            }
            _ => {
                let ch = src[i..].chars().next().unwrap_or('\0');
                if ch.is_alphabetic() || ch == '_' {
                    i = ident_end(src, i);
                    TokenKind::Ident
                } else if ch.is_ascii_digit() || ch == '.' {
                    i = number_end(src, i + 1);
                    TokenKind::Other
                } else {
                    i += ch.len_utf8().max(1);
                    TokenKind::Other
                }
            }
        };
        tokens.push(Token {
            kind,
            start,
            end: i,
        });
    }
    tokens
}

fn line_end(bytes: &[u8], from: usize) -> usize {
    bytes[from..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(bytes.len(), |off| from + off)
}

fn ident_end(src: &str, from: usize) -> usize {
    span_end(src, from, |c| c.is_alphanumeric() || c == '_')
}

fn number_end(src: &str, from: usize) -> usize {
    span_end(src, from, |c| c.is_alphanumeric() || c == '_' || c == '.')
}

fn span_end(src: &str, from: usize, keep: impl Fn(char) -> bool) -> usize {
    src[from..]
        .char_indices()
        .find(|(_, c)| !keep(*c))
        .map_or(src.len(), |(off, _)| from + off)
}

fn skip_rune(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\'' => return i + 1,
            b'\n' => return i,
            _ => i += 1,
        }
    }
    bytes.len()
}

/// Value of the interpreted string starting just after its opening quote,
/// and the offset just past it.
fn interpreted(src: &str, from: usize) -> (String, usize) {
    let bytes = src.as_bytes();
    let mut out = Vec::new();
    let mut i = from;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => return (String::from_utf8_lossy(&out).into_owned(), i + 1),
            b'\n' => break,
            b'\\' => i = escape(bytes, i + 1, &mut out),
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    (String::from_utf8_lossy(&out).into_owned(), i)
}

fn escape(bytes: &[u8], i: usize, out: &mut Vec<u8>) -> usize {
    let Some(&c) = bytes.get(i) else {
        return i;
    };
    let simple = match c {
        b'a' => Some(0x07),
        b'b' => Some(0x08),
        b'f' => Some(0x0c),
        b'n' => Some(b'\n'),
        b'r' => Some(b'\r'),
        b't' => Some(b'\t'),
        b'v' => Some(0x0b),
        b'\\' | b'\'' | b'"' => Some(c),
        _ => None,
    };
    if let Some(b) = simple {
        out.push(b);
        return i + 1;
    }
    let (radix, width) = match c {
        b'0'..=b'7' => (8, 3),
        b'x' => (16, 2),
        b'u' => (16, 4),
        b'U' => (16, 8),
        _ => {
            out.push(c);
            return i + 1;
        }
    };
    let digits_start = if radix == 8 { i } else { i + 1 };
    let end = (digits_start + width).min(bytes.len());
    let digits = std::str::from_utf8(&bytes[digits_start..end]).unwrap_or("");
    let value = u32::from_str_radix(digits, radix).unwrap_or(0);
    if matches!(c, b'u' | b'U') {
        let ch = char::from_u32(value).unwrap_or(char::REPLACEMENT_CHARACTER);
        let mut buf = [0u8; 4];
        out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
    } else {
        out.push(value as u8);
    }
    end
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        scan(src).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            kinds("a // ) \"x\"\n/* ( */ b"),
            vec![TokenKind::Ident, TokenKind::Ident]
        );
    }

    #[test]
    fn string_forms_are_decoded() {
        assert_eq!(
            kinds(r#""os\x2fexec" `raw/path` "é""#),
            vec![
                TokenKind::Str("os/exec".into()),
                TokenKind::Str("raw/path".into()),
                TokenKind::Str("é".into()),
            ]
        );
        assert_eq!(kinds(r#""\157s/exec""#), vec![TokenKind::Str("os/exec".into())]);
    }

    #[test]
    fn literals_hide_their_contents() {
        let src = "f(\"g(\") + ')'";
        assert_eq!(
            kinds(src),
            vec![
                TokenKind::Ident,
                TokenKind::LParen,
                TokenKind::Str("g(".into()),
                TokenKind::RParen,
                TokenKind::Other,
                TokenKind::Other,
            ]
        );
    }

    #[test]
    fn unicode_identifiers_and_selectors() {
        let src = "пакет.Run 1.5";
        let tokens = scan(src);
        assert_eq!(tokens[0].text(src), "пакет");
        assert_eq!(tokens[1].kind, TokenKind::Dot);
        assert_eq!(tokens[2].text(src), "Run");
        assert_eq!(tokens[3].text(src), "1.5");
        assert!(is_identifier("пакет"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("a b"));
    }

    #[test]
    fn unterminated_literals_do_not_panic() {
        for src in ["\"abc", "`abc", "'a", "/* abc", "\"\\", "\"\\u12"] {
            let _ = scan(src);
        }
    }
}
