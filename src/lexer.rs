//! Lexical analysis: turns source text into a flat token stream.
//!
//! Token classes are matched with one anchored regex; keywords are split
//! out of identifiers afterwards. The lexer is a cheap `Clone`, so a caller
//! can restart it from any point.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{CompileError, CompileResult, Pos};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // keywords
    Func,
    If,
    Else,
    While,
    Break,
    Continue,

    Ident,
    Int,

    // operators
    Arrow,
    EqEq,
    NotEq,
    Plus,

    // punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Semi,
    Colon,

    Eof,
}

impl TokenKind {
    fn keyword(text: &str) -> Option<Self> {
        Some(match text {
            "func" => TokenKind::Func,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "while" => TokenKind::While,
            "break" => TokenKind::Break,
            "continue" => TokenKind::Continue,
            _ => return None,
        })
    }

    fn operator(text: &str) -> Option<Self> {
        Some(match text {
            "<-" => TokenKind::Arrow,
            "==" => TokenKind::EqEq,
            "!=" => TokenKind::NotEq,
            "+" => TokenKind::Plus,
            "(" => TokenKind::LParen,
            ")" => TokenKind::RParen,
            "{" => TokenKind::LBrace,
            "}" => TokenKind::RBrace,
            "," => TokenKind::Comma,
            ";" => TokenKind::Semi,
            ":" => TokenKind::Colon,
            _ => return None,
        })
    }

    /// How the parser names this kind in "expected ..." diagnostics.
    pub fn describe(self) -> &'static str {
        match self {
            TokenKind::Func => "`func`",
            TokenKind::If => "`if`",
            TokenKind::Else => "`else`",
            TokenKind::While => "`while`",
            TokenKind::Break => "`break`",
            TokenKind::Continue => "`continue`",
            TokenKind::Ident => "identifier",
            TokenKind::Int => "integer literal",
            TokenKind::Arrow => "`<-`",
            TokenKind::EqEq => "`==`",
            TokenKind::NotEq => "`!=`",
            TokenKind::Plus => "`+`",
            TokenKind::LParen => "`(`",
            TokenKind::RParen => "`)`",
            TokenKind::LBrace => "`{`",
            TokenKind::RBrace => "`}`",
            TokenKind::Comma => "`,`",
            TokenKind::Semi => "`;`",
            TokenKind::Colon => "`:`",
            TokenKind::Eof => "end of input",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub pos: Pos,
}

impl Token {
    /// Value of an integer literal token.
    pub fn int_value(&self) -> Option<i64> {
        match self.kind {
            TokenKind::Int => self.text.parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Eof => f.write_str("end of input"),
            _ => write!(f, "`{}`", self.text),
        }
    }
}

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^(?:(?P<skip>\s+|//[^\n]*)|(?P<int>[0-9]+)|(?P<ident>[A-Za-z_][A-Za-z0-9_]*)|(?P<op><-|==|!=|[+(){},;:]))",
        )
        .expect("token pattern is valid")
    })
}

/// Lazy token stream over a source string. The last item is always an
/// `Eof` token, unless lexing fails first.
#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    src: &'a str,
    offset: usize,
    pos: Pos,
    done: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            src,
            offset: 0,
            pos: Pos::new(1, 1),
            done: false,
        }
    }

    fn bump(&mut self, text: &str) {
        self.offset += text.len();
        self.pos = self.pos.advance(text);
    }

    fn fail(&mut self, message: String) -> CompileError {
        self.done = true;
        CompileError::lex(self.pos, message)
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = CompileResult<Token>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let src = self.src;
        loop {
            let rest = &src[self.offset..];
            if rest.is_empty() {
                self.done = true;
                return Some(Ok(Token {
                    kind: TokenKind::Eof,
                    text: String::new(),
                    pos: self.pos,
                }));
            }

            let Some(caps) = token_pattern().captures(rest) else {
                let ch = rest.chars().next().unwrap_or('\0');
                return Some(Err(self.fail(format!("unrecognized character {ch:?}"))));
            };

            if let Some(skip) = caps.name("skip") {
                self.bump(skip.as_str());
                continue;
            }

            let pos = self.pos;
            let (kind, text) = if let Some(m) = caps.name("int") {
                if m.as_str().parse::<i64>().is_err() {
                    let literal = m.as_str().to_string();
                    return Some(Err(
                        self.fail(format!("integer literal {literal} does not fit in 64 bits"))
                    ));
                }
                (TokenKind::Int, m.as_str())
            } else if let Some(m) = caps.name("ident") {
                let kind = TokenKind::keyword(m.as_str()).unwrap_or(TokenKind::Ident);
                (kind, m.as_str())
            } else if let Some(m) = caps.name("op") {
                match TokenKind::operator(m.as_str()) {
                    Some(kind) => (kind, m.as_str()),
                    None => {
                        let op = m.as_str().to_string();
                        return Some(Err(self.fail(format!("unrecognized operator {op:?}"))));
                    }
                }
            } else {
                return Some(Err(self.fail("unrecognized input".to_string())));
            };

            let token = Token {
                kind,
                text: text.to_string(),
                pos,
            };
            self.bump(text);
            return Some(Ok(token));
        }
    }
}

/// Lex the whole input into a vector terminated by an `Eof` token.
pub fn tokenize(src: &str) -> CompileResult<Vec<Token>> {
    Lexer::new(src).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src)
            .expect("source should lex")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn recognises_keywords_operators_and_punctuation() {
        assert_eq!(
            kinds("func main() { i <- 0; while i != 5 { break; continue; } }"),
            vec![
                TokenKind::Func,
                TokenKind::Ident,
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::LBrace,
                TokenKind::Ident,
                TokenKind::Arrow,
                TokenKind::Int,
                TokenKind::Semi,
                TokenKind::While,
                TokenKind::Ident,
                TokenKind::NotEq,
                TokenKind::Int,
                TokenKind::LBrace,
                TokenKind::Break,
                TokenKind::Semi,
                TokenKind::Continue,
                TokenKind::Semi,
                TokenKind::RBrace,
                TokenKind::RBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn keyword_prefixes_stay_identifiers() {
        let tokens = tokenize("iffy whiles func_1 if").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Ident);
        assert_eq!(tokens[1].kind, TokenKind::Ident);
        assert_eq!(tokens[2].kind, TokenKind::Ident);
        assert_eq!(tokens[2].text, "func_1");
        assert_eq!(tokens[3].kind, TokenKind::If);
    }

    #[test]
    fn label_and_comparison_tokens() {
        assert_eq!(
            kinds("outer: while 1==2 + 3"),
            vec![
                TokenKind::Ident,
                TokenKind::Colon,
                TokenKind::While,
                TokenKind::Int,
                TokenKind::EqEq,
                TokenKind::Int,
                TokenKind::Plus,
                TokenKind::Int,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn positions_track_lines_and_columns() {
        let tokens = tokenize("func f();\n  x <- 12;").unwrap();
        let x = &tokens[5];
        assert_eq!(x.text, "x");
        assert_eq!(x.pos, Pos::new(2, 3));
        let twelve = &tokens[7];
        assert_eq!(twelve.int_value(), Some(12));
        assert_eq!(twelve.pos, Pos::new(2, 8));
    }

    #[test]
    fn comments_and_whitespace_are_skipped() {
        assert_eq!(
            kinds("// leading\n\t x // trailing\n"),
            vec![TokenKind::Ident, TokenKind::Eof]
        );
    }

    #[test]
    fn empty_input_is_just_eof() {
        assert_eq!(kinds(""), vec![TokenKind::Eof]);
        assert_eq!(kinds("   \n "), vec![TokenKind::Eof]);
    }

    #[test]
    fn eof_is_yielded_exactly_once() {
        let mut lexer = Lexer::new("x");
        assert_eq!(lexer.next().unwrap().unwrap().kind, TokenKind::Ident);
        assert_eq!(lexer.next().unwrap().unwrap().kind, TokenKind::Eof);
        assert!(lexer.next().is_none());
        assert!(lexer.next().is_none());
    }

    #[test]
    fn clone_restarts_from_the_same_point() {
        let mut lexer = Lexer::new("a + b");
        lexer.next();
        let replay = lexer.clone();
        let first: Vec<_> = lexer.map(|t| t.unwrap().kind).collect();
        let second: Vec<_> = replay.map(|t| t.unwrap().kind).collect();
        assert_eq!(first, second);
        assert_eq!(first, vec![TokenKind::Plus, TokenKind::Ident, TokenKind::Eof]);
    }

    #[test]
    fn unrecognized_character_is_a_lex_error() {
        let err = tokenize("x <- 1;\n  y <- 2 * 3;").unwrap_err();
        match err {
            CompileError::Lex { pos, message } => {
                assert_eq!(pos, Pos::new(2, 10));
                assert!(message.contains('*'), "{message}");
            }
            other => panic!("expected lex error, got {other:?}"),
        }
    }

    #[test]
    fn lone_bang_and_less_than_are_rejected() {
        assert!(matches!(tokenize("!x"), Err(CompileError::Lex { .. })));
        assert!(matches!(tokenize("a < b"), Err(CompileError::Lex { .. })));
    }

    #[test]
    fn oversized_literal_is_a_lex_error() {
        let err = tokenize("99999999999999999999").unwrap_err();
        assert!(matches!(err, CompileError::Lex { .. }));
        assert!(tokenize("9223372036854775807").is_ok());
    }

    #[test]
    fn lexing_stops_after_an_error() {
        let mut lexer = Lexer::new("$ x");
        assert!(lexer.next().unwrap().is_err());
        assert!(lexer.next().is_none());
    }
}
