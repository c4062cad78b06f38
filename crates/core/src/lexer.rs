use crate::error::SyntaxError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Identifiers and structural keywords, distinguished in the parser.
    /// Keyword names are natural language, so any Unicode letter is allowed.
    Word(String),
    /// Quoted string literal (content without quotes, escapes resolved)
    Str(String),
    Int(i64),
    Float(f64),
    /// `YYYY-MM-DD` with an optional ` HH:MM:SS` suffix
    Date(String),
    /// A bare `${...}` reference, kept verbatim including the delimiters
    Placeholder(String),
    /// Metadata sigil such as `@name` or `@teardown` (name without the `@`)
    Meta(String),
    // Punctuation
    LBracket,
    RBracket,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Colon,
    Comma,
    Assign,
    Pipe,
    // Arithmetic operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    // Comparison operators
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    Eof,
}

#[derive(Debug, Clone)]
pub struct Spanned {
    pub token: Token,
    pub line: u32,
}

/// Tokenize `src`. Never fails: lexical errors are collected and the
/// offending character is skipped. The token stream always ends in `Eof`.
pub fn lex(src: &str) -> (Vec<Spanned>, Vec<SyntaxError>) {
    let mut lx = Lexer {
        chars: src.chars().collect(),
        pos: 0,
        line: 1,
        tokens: Vec::new(),
        errors: Vec::new(),
    };
    lx.run();
    (lx.tokens, lx.errors)
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    tokens: Vec<Spanned>,
    errors: Vec<SyntaxError>,
}

impl Lexer {
    fn at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn push(&mut self, token: Token, line: u32) {
        self.tokens.push(Spanned { token, line });
    }

    fn run(&mut self) {
        while let Some(c) = self.at(0) {
            if c == '#' {
                while self.at(0).is_some_and(|c| c != '\n') {
                    self.pos += 1;
                }
                continue;
            }
            if c.is_whitespace() {
                if c == '\n' {
                    self.line += 1;
                }
                self.pos += 1;
                continue;
            }

            let line = self.line;

            if c == '"' && self.at(1) == Some('"') && self.at(2) == Some('"') {
                self.lex_triple_string(line);
                continue;
            }
            if c == '"' || c == '\'' {
                self.lex_string(c, line);
                continue;
            }
            if c == '$' && self.at(1) == Some('{') {
                self.lex_placeholder(line);
                continue;
            }
            if c == '@' {
                self.pos += 1;
                let name = self.take_ident();
                if name.is_empty() {
                    self.errors
                        .push(SyntaxError::lex(line, "expected a name after '@'"));
                } else {
                    self.push(Token::Meta(name), line);
                }
                continue;
            }
            if c.is_ascii_digit() {
                self.lex_number(line);
                continue;
            }
            if is_ident_start(c) {
                let w = self.take_ident();
                self.push(Token::Word(w), line);
                continue;
            }

            let two = self.at(1);
            let (tok, width) = match (c, two) {
                ('=', Some('=')) => (Token::Eq, 2),
                ('!', Some('=')) => (Token::Neq, 2),
                ('<', Some('=')) => (Token::Lte, 2),
                ('>', Some('=')) => (Token::Gte, 2),
                ('<', _) => (Token::Lt, 1),
                ('>', _) => (Token::Gt, 1),
                ('=', _) => (Token::Assign, 1),
                ('[', _) => (Token::LBracket, 1),
                (']', _) => (Token::RBracket, 1),
                ('(', _) => (Token::LParen, 1),
                (')', _) => (Token::RParen, 1),
                ('{', _) => (Token::LBrace, 1),
                ('}', _) => (Token::RBrace, 1),
                (':', _) | ('：', _) => (Token::Colon, 1),
                (',', _) | ('，', _) => (Token::Comma, 1),
                ('|', _) => (Token::Pipe, 1),
                ('+', _) => (Token::Plus, 1),
                ('-', _) => (Token::Minus, 1),
                ('*', _) => (Token::Star, 1),
                ('/', _) => (Token::Slash, 1),
                ('%', _) => (Token::Percent, 1),
                _ => {
                    self.errors.push(SyntaxError::lex(
                        line,
                        format!("unexpected character '{}'", c),
                    ));
                    self.pos += 1;
                    continue;
                }
            };
            self.pos += width;
            self.push(tok, line);
        }
        let line = self.line;
        self.push(Token::Eof, line);
    }

    fn take_ident(&mut self) -> String {
        let mut s = String::new();
        if let Some(c) = self.at(0) {
            if !is_ident_start(c) {
                return s;
            }
        }
        while let Some(c) = self.at(0) {
            if !is_ident_continue(c) {
                break;
            }
            s.push(c);
            self.pos += 1;
        }
        s
    }

    fn lex_string(&mut self, quote: char, line: u32) {
        self.pos += 1;
        let mut s = String::new();
        loop {
            let Some(c) = self.at(0) else {
                self.errors
                    .push(SyntaxError::lex(line, "unterminated string literal"));
                return;
            };
            if c == '\n' {
                // leave the newline for the main loop so line numbers stay right
                self.errors
                    .push(SyntaxError::lex(line, "unterminated string literal"));
                return;
            }
            self.pos += 1;
            if c == quote {
                break;
            }
            if c == '\\' {
                match self.at(0) {
                    Some(e) => {
                        push_escape(&mut s, e);
                        self.pos += 1;
                    }
                    None => s.push('\\'),
                }
                continue;
            }
            s.push(c);
        }
        self.push(Token::Str(s), line);
    }

    fn lex_triple_string(&mut self, line: u32) {
        self.pos += 3;
        let mut s = String::new();
        loop {
            if self.at(0).is_none() {
                self.errors
                    .push(SyntaxError::lex(line, "unterminated triple-quoted string"));
                return;
            }
            if self.at(0) == Some('"') && self.at(1) == Some('"') && self.at(2) == Some('"') {
                self.pos += 3;
                break;
            }
            let c = self.chars[self.pos];
            if c == '\n' {
                self.line += 1;
            }
            s.push(c);
            self.pos += 1;
        }
        self.push(Token::Str(s), line);
    }

    fn lex_placeholder(&mut self, line: u32) {
        let start = self.pos;
        self.pos += 2;
        while let Some(c) = self.at(0) {
            if c == '}' {
                self.pos += 1;
                let text: String = self.chars[start..self.pos].iter().collect();
                self.push(Token::Placeholder(text), line);
                return;
            }
            if c == '\n' {
                break;
            }
            self.pos += 1;
        }
        self.errors
            .push(SyntaxError::lex(line, "unterminated '${' reference"));
    }

    fn lex_number(&mut self, line: u32) {
        if let Some(date) = self.try_date() {
            self.push(Token::Date(date), line);
            return;
        }
        let start = self.pos;
        while self.at(0).is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        let mut is_float = false;
        if self.at(0) == Some('.') && self.at(1).is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            self.pos += 1;
            while self.at(0).is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        let token = if is_float {
            text.parse::<f64>().ok().map(Token::Float)
        } else {
            text.parse::<i64>().ok().map(Token::Int)
        };
        match token {
            Some(t) => self.push(t, line),
            None => self
                .errors
                .push(SyntaxError::lex(line, format!("invalid number '{}'", text))),
        }
    }

    /// Recognize `YYYY-MM-DD` and `YYYY-MM-DD HH:MM:SS` at the cursor.
    fn try_date(&mut self) -> Option<String> {
        const DATE: &str = "dddd-dd-dd";
        const TIME: &str = " dd:dd:dd";
        if !self.matches_shape(0, DATE) {
            return None;
        }
        let mut len = DATE.len();
        if self.matches_shape(len, TIME) {
            len += TIME.len();
        }
        let text: String = self.chars[self.pos..self.pos + len].iter().collect();
        self.pos += len;
        Some(text)
    }

    fn matches_shape(&self, offset: usize, shape: &str) -> bool {
        shape.chars().enumerate().all(|(i, s)| match self.at(offset + i) {
            Some(c) if s == 'd' => c.is_ascii_digit(),
            Some(c) => c == s,
            None => false,
        })
    }
}

fn push_escape(s: &mut String, e: char) {
    match e {
        'n' => s.push('\n'),
        't' => s.push('\t'),
        'r' => s.push('\r'),
        '"' => s.push('"'),
        '\'' => s.push('\''),
        '\\' => s.push('\\'),
        other => {
            s.push('\\');
            s.push(other);
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(src: &str) -> Vec<Token> {
        let (toks, errors) = lex(src);
        assert!(errors.is_empty(), "unexpected lex errors: {:?}", errors);
        toks.into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn lexes_keyword_call_with_unicode_names() {
        let toks = tokens("[打印], 内容: \"你好\"");
        assert_eq!(
            toks,
            vec![
                Token::LBracket,
                Token::Word("打印".into()),
                Token::RBracket,
                Token::Comma,
                Token::Word("内容".into()),
                Token::Colon,
                Token::Str("你好".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn minus_is_always_an_operator() {
        let toks = tokens("x = -1 + 2.5");
        assert_eq!(
            toks,
            vec![
                Token::Word("x".into()),
                Token::Assign,
                Token::Minus,
                Token::Int(1),
                Token::Plus,
                Token::Float(2.5),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn dates_metadata_and_placeholders() {
        let toks = tokens("@date: 2024-01-31 10:20:30\n@name: ${title}");
        assert_eq!(toks[0], Token::Meta("date".into()));
        assert_eq!(toks[2], Token::Date("2024-01-31 10:20:30".into()));
        assert_eq!(toks[3], Token::Meta("name".into()));
        assert_eq!(toks[5], Token::Placeholder("${title}".into()));
    }

    #[test]
    fn comments_and_line_numbers() {
        let (toks, _) = lex("# header\na = 1\n\nb = 2 # trailing\n");
        let b = toks
            .iter()
            .find(|s| s.token == Token::Word("b".into()))
            .map(|s| s.line);
        assert_eq!(b, Some(4));
    }

    #[test]
    fn triple_quoted_strings_span_lines() {
        let (toks, errors) = lex("s = \"\"\"one\ntwo\"\"\"\nt = 1");
        assert!(errors.is_empty());
        assert_eq!(toks[2].token, Token::Str("one\ntwo".into()));
        assert_eq!(toks[3].line, 3);
    }

    #[test]
    fn unexpected_characters_are_collected_not_fatal() {
        let (toks, errors) = lex("a = 1 ^\nb = 2 ~");
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].line, 1);
        assert_eq!(errors[1].line, 2);
        assert!(toks.iter().any(|s| s.token == Token::Word("b".into())));
    }

    #[test]
    fn unterminated_string_is_reported_with_its_line() {
        let (_, errors) = lex("a = 1\nb = \"open\nc = 3");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].line, 2);
        assert!(errors[0].message.contains("unterminated"));
    }
}
