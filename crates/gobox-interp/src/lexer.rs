//! Tokenizer with Go's automatic semicolon insertion.

use crate::error::{ParseError, Pos};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    Char(i64),

    // keywords
    Break,
    Case,
    Chan,
    Const,
    Continue,
    Default,
    Defer,
    Else,
    Fallthrough,
    For,
    Func,
    Go,
    Goto,
    If,
    Import,
    Interface,
    Map,
    Package,
    Range,
    Return,
    Select,
    Struct,
    Switch,
    Type,
    Var,

    // operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Amp,
    Pipe,
    Caret,
    Shl,
    Shr,
    AndNot,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,
    AmpAssign,
    PipeAssign,
    CaretAssign,
    ShlAssign,
    ShrAssign,
    AndAnd,
    OrOr,
    Arrow,
    Inc,
    Dec,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Not,
    Assign,
    Define,
    Ellipsis,
    LParen,
    RParen,
    LBrack,
    RBrack,
    LBrace,
    RBrace,
    Comma,
    Dot,
    Semi,
    Colon,

    Eof,
}

impl TokenKind {
    fn keyword(word: &str) -> Option<TokenKind> {
        Some(match word {
            "break" => TokenKind::Break,
            "case" => TokenKind::Case,
            "chan" => TokenKind::Chan,
            "const" => TokenKind::Const,
            "continue" => TokenKind::Continue,
            "default" => TokenKind::Default,
            "defer" => TokenKind::Defer,
            "else" => TokenKind::Else,
            "fallthrough" => TokenKind::Fallthrough,
            "for" => TokenKind::For,
            "func" => TokenKind::Func,
            "go" => TokenKind::Go,
            "goto" => TokenKind::Goto,
            "if" => TokenKind::If,
            "import" => TokenKind::Import,
            "interface" => TokenKind::Interface,
            "map" => TokenKind::Map,
            "package" => TokenKind::Package,
            "range" => TokenKind::Range,
            "return" => TokenKind::Return,
            "select" => TokenKind::Select,
            "struct" => TokenKind::Struct,
            "switch" => TokenKind::Switch,
            "type" => TokenKind::Type,
            "var" => TokenKind::Var,
            _ => return None,
        })
    }

    /// Whether a newline after this token terminates the statement.
    fn ends_statement(&self) -> bool {
        matches!(
            self,
            TokenKind::Ident(_)
                | TokenKind::Int(_)
                | TokenKind::Float(_)
                | TokenKind::Str(_)
                | TokenKind::Char(_)
                | TokenKind::Break
                | TokenKind::Continue
                | TokenKind::Fallthrough
                | TokenKind::Return
                | TokenKind::Inc
                | TokenKind::Dec
                | TokenKind::RParen
                | TokenKind::RBrack
                | TokenKind::RBrace
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: Pos,
}

pub struct Lexer<'a> {
    src: &'a [u8],
    offset: usize,
    line: u32,
    col: u32,
    tokens: Vec<Token>,
}

/// Tokenize `src`, applying Go's automatic semicolon insertion.
pub fn tokenize(src: &str) -> Result<Vec<Token>, ParseError> {
    let mut lexer = Lexer {
        src: src.as_bytes(),
        offset: 0,
        line: 1,
        col: 1,
        tokens: Vec::new(),
    };
    lexer.run()?;
    Ok(lexer.tokens)
}

impl<'a> Lexer<'a> {
    fn pos(&self) -> Pos {
        Pos {
            line: self.line,
            col: self.col,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.offset).copied()
    }

    fn peek_at(&self, n: usize) -> Option<u8> {
        self.src.get(self.offset + n).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.offset += 1;
        if b == b'\n' {
            self.line += 1;
            self.col = 1;
        } else if b & 0xC0 != 0x80 {
            self.col += 1;
        }
        Some(b)
    }

    fn push(&mut self, kind: TokenKind, pos: Pos) {
        self.tokens.push(Token { kind, pos });
    }

    fn newline(&mut self, pos: Pos) {
        let needs_semi = self
            .tokens
            .last()
            .map(|t| t.kind.ends_statement())
            .unwrap_or(false);
        if needs_semi {
            self.push(TokenKind::Semi, pos);
        }
    }

    fn run(&mut self) -> Result<(), ParseError> {
        while let Some(b) = self.peek() {
            let pos = self.pos();
            match b {
                b'\n' => {
                    self.bump();
                    self.newline(pos);
                }
                b' ' | b'\t' | b'\r' => {
                    self.bump();
                }
                b'/' if self.peek_at(1) == Some(b'/') => {
                    while let Some(c) = self.peek() {
                        if c == b'\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                b'/' if self.peek_at(1) == Some(b'*') => {
                    self.bump();
                    self.bump();
                    let mut saw_newline = false;
                    loop {
                        match self.bump() {
                            None => return Err(ParseError::new(pos, "comment not terminated")),
                            Some(b'*') if self.peek() == Some(b'/') => {
                                self.bump();
                                break;
                            }
                            Some(b'\n') => saw_newline = true,
                            Some(_) => {}
                        }
                    }
                    if saw_newline {
                        self.newline(pos);
                    }
                }
                b'0'..=b'9' => self.number(pos)?,
                b'.' if matches!(self.peek_at(1), Some(b'0'..=b'9')) => self.number(pos)?,
                b'"' => self.string(pos)?,
                b'`' => self.raw_string(pos)?,
                b'\'' => self.char_lit(pos)?,
                c if c == b'_' || c.is_ascii_alphabetic() || c >= 0x80 => self.ident(pos),
                _ => self.operator(pos)?,
            }
        }
        let pos = self.pos();
        self.newline(pos);
        self.push(TokenKind::Eof, pos);
        Ok(())
    }

    fn ident(&mut self, pos: Pos) {
        let start = self.offset;
        while let Some(c) = self.peek() {
            if c == b'_' || c.is_ascii_alphanumeric() || c >= 0x80 {
                self.bump();
            } else {
                break;
            }
        }
        let word = String::from_utf8_lossy(&self.src[start..self.offset]).into_owned();
        let kind = TokenKind::keyword(&word).unwrap_or(TokenKind::Ident(word));
        self.push(kind, pos);
    }

    fn number(&mut self, pos: Pos) -> Result<(), ParseError> {
        let start = self.offset;
        if self.peek() == Some(b'0') && matches!(self.peek_at(1), Some(b'x' | b'X')) {
            self.bump();
            self.bump();
            while let Some(c) = self.peek() {
                if c.is_ascii_hexdigit() || c == b'_' {
                    self.bump();
                } else {
                    break;
                }
            }
            let text: String = String::from_utf8_lossy(&self.src[start + 2..self.offset])
                .chars()
                .filter(|c| *c != '_')
                .collect();
            let value = i64::from_str_radix(&text, 16)
                .map_err(|_| ParseError::new(pos, format!("invalid hex literal 0x{text}")))?;
            self.push(TokenKind::Int(value), pos);
            return Ok(());
        }

        let mut is_float = false;
        while let Some(c) = self.peek() {
            match c {
                b'0'..=b'9' | b'_' => {
                    self.bump();
                }
                b'.' if !is_float && self.peek_at(1) != Some(b'.') => {
                    is_float = true;
                    self.bump();
                }
                b'e' | b'E' => {
                    is_float = true;
                    self.bump();
                    if matches!(self.peek(), Some(b'+' | b'-')) {
                        self.bump();
                    }
                }
                _ => break,
            }
        }
        let text: String = String::from_utf8_lossy(&self.src[start..self.offset])
            .chars()
            .filter(|c| *c != '_')
            .collect();
        if is_float {
            let value: f64 = text
                .parse()
                .map_err(|_| ParseError::new(pos, format!("invalid float literal {text}")))?;
            self.push(TokenKind::Float(value), pos);
        } else {
            let value: i64 = text
                .parse()
                .map_err(|_| ParseError::new(pos, format!("integer literal {text} overflows")))?;
            self.push(TokenKind::Int(value), pos);
        }
        Ok(())
    }

    fn escape(&mut self, pos: Pos, out: &mut Vec<u8>) -> Result<(), ParseError> {
        let c = self
            .bump()
            .ok_or_else(|| ParseError::new(pos, "escape sequence not terminated"))?;
        match c {
            b'n' => out.push(b'\n'),
            b't' => out.push(b'\t'),
            b'r' => out.push(b'\r'),
            b'a' => out.push(0x07),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0C),
            b'v' => out.push(0x0B),
            b'\\' => out.push(b'\\'),
            b'"' => out.push(b'"'),
            b'\'' => out.push(b'\''),
            b'0'..=b'7' => {
                let mut value = u32::from(c - b'0');
                for _ in 0..2 {
                    match self.bump() {
                        Some(d @ b'0'..=b'7') => value = value * 8 + u32::from(d - b'0'),
                        _ => return Err(ParseError::new(pos, "invalid octal escape")),
                    }
                }
                out.push(value as u8);
            }
            b'x' => {
                let value = self.hex_digits(pos, 2)?;
                out.push(value as u8);
            }
            b'u' | b'U' => {
                let digits = if c == b'u' { 4 } else { 8 };
                let value = self.hex_digits(pos, digits)?;
                let ch = char::from_u32(value)
                    .ok_or_else(|| ParseError::new(pos, "invalid unicode escape"))?;
                let mut buf = [0u8; 4];
                out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            }
            other => {
                return Err(ParseError::new(
                    pos,
                    format!("unknown escape sequence \\{}", other as char),
                ))
            }
        }
        Ok(())
    }

    fn hex_digits(&mut self, pos: Pos, count: usize) -> Result<u32, ParseError> {
        let mut value = 0u32;
        for _ in 0..count {
            let d = self
                .bump()
                .and_then(|b| (b as char).to_digit(16))
                .ok_or_else(|| ParseError::new(pos, "invalid hex escape"))?;
            value = value * 16 + d;
        }
        Ok(value)
    }

    fn string(&mut self, pos: Pos) -> Result<(), ParseError> {
        self.bump();
        let mut out = Vec::new();
        loop {
            match self.bump() {
                None | Some(b'\n') => {
                    return Err(ParseError::new(pos, "string literal not terminated"))
                }
                Some(b'"') => break,
                Some(b'\\') => self.escape(pos, &mut out)?,
                Some(c) => out.push(c),
            }
        }
        let text = String::from_utf8_lossy(&out).into_owned();
        self.push(TokenKind::Str(text), pos);
        Ok(())
    }

    fn raw_string(&mut self, pos: Pos) -> Result<(), ParseError> {
        self.bump();
        let start = self.offset;
        loop {
            match self.bump() {
                None => return Err(ParseError::new(pos, "raw string literal not terminated")),
                Some(b'`') => break,
                Some(_) => {}
            }
        }
        let text = String::from_utf8_lossy(&self.src[start..self.offset - 1]).replace('\r', "");
        self.push(TokenKind::Str(text), pos);
        Ok(())
    }

    fn char_lit(&mut self, pos: Pos) -> Result<(), ParseError> {
        self.bump();
        let mut out = Vec::new();
        loop {
            match self.bump() {
                None | Some(b'\n') => return Err(ParseError::new(pos, "rune literal not terminated")),
                Some(b'\'') => break,
                Some(b'\\') => self.escape(pos, &mut out)?,
                Some(c) => out.push(c),
            }
        }
        let text = String::from_utf8_lossy(&out);
        let mut chars = text.chars();
        let ch = match (chars.next(), chars.next()) {
            (Some(c), None) => c,
            _ if out.len() == 1 => out[0] as char,
            _ => return Err(ParseError::new(pos, "rune literal must hold one character")),
        };
        self.push(TokenKind::Char(ch as i64), pos);
        Ok(())
    }

    fn operator(&mut self, pos: Pos) -> Result<(), ParseError> {
        const TABLE: &[(&str, TokenKind)] = &[
            ("&^", TokenKind::AndNot),
            ("<<=", TokenKind::ShlAssign),
            (">>=", TokenKind::ShrAssign),
            ("...", TokenKind::Ellipsis),
            ("<<", TokenKind::Shl),
            (">>", TokenKind::Shr),
            ("+=", TokenKind::PlusAssign),
            ("-=", TokenKind::MinusAssign),
            ("*=", TokenKind::StarAssign),
            ("/=", TokenKind::SlashAssign),
            ("%=", TokenKind::PercentAssign),
            ("&=", TokenKind::AmpAssign),
            ("|=", TokenKind::PipeAssign),
            ("^=", TokenKind::CaretAssign),
            ("&&", TokenKind::AndAnd),
            ("||", TokenKind::OrOr),
            ("<-", TokenKind::Arrow),
            ("++", TokenKind::Inc),
            ("--", TokenKind::Dec),
            ("==", TokenKind::EqEq),
            ("!=", TokenKind::NotEq),
            ("<=", TokenKind::Le),
            (">=", TokenKind::Ge),
            (":=", TokenKind::Define),
            ("+", TokenKind::Plus),
            ("-", TokenKind::Minus),
            ("*", TokenKind::Star),
            ("/", TokenKind::Slash),
            ("%", TokenKind::Percent),
            ("&", TokenKind::Amp),
            ("|", TokenKind::Pipe),
            ("^", TokenKind::Caret),
            ("<", TokenKind::Lt),
            (">", TokenKind::Gt),
            ("!", TokenKind::Not),
            ("=", TokenKind::Assign),
            ("(", TokenKind::LParen),
            (")", TokenKind::RParen),
            ("[", TokenKind::LBrack),
            ("]", TokenKind::RBrack),
            ("{", TokenKind::LBrace),
            ("}", TokenKind::RBrace),
            (",", TokenKind::Comma),
            (".", TokenKind::Dot),
            (";", TokenKind::Semi),
            (":", TokenKind::Colon),
        ];
        let rest = &self.src[self.offset..];
        // "&^=" is not supported; the two-character form wins.
        for (text, kind) in TABLE {
            if rest.starts_with(text.as_bytes()) {
                for _ in 0..text.len() {
                    self.bump();
                }
                self.push(kind.clone(), pos);
                return Ok(());
            }
        }
        let ch = String::from_utf8_lossy(&rest[..1]).into_owned();
        Err(ParseError::new(pos, format!("unexpected character {ch:?}")))
    }
}
