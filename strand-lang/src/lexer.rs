use crate::error::{LangError, Result};
use logos::Logos;
use strand_types::Span;

fn unescape(lex: &mut logos::Lexer<'_, Token>) -> Option<String> {
    let slice = lex.slice();
    let body = &slice[1..slice.len() - 1];
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            other @ ('\\' | '\'' | '"') => out.push(other),
            _ => return None,
        }
    }
    Some(out)
}

/// Tokens of the strand surface language
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"//[^\n]*")]
pub enum Token {
    // Keywords
    #[token("actor")]
    Actor,
    #[token("import")]
    Import,
    #[token("handle")]
    Handle,
    #[token("ask")]
    Ask,
    #[token("tell")]
    Tell,
    #[token("var")]
    Var,
    #[token("func")]
    Func,
    #[token("proc")]
    Proc,
    #[token("if")]
    If,
    #[token("then")]
    Then,
    #[token("elseif")]
    ElseIf,
    #[token("else")]
    Else,
    #[token("case")]
    Case,
    #[token("of")]
    Of,
    #[token("in")]
    In,
    #[token("end")]
    End,
    #[token("emit")]
    Emit,
    #[token("skip")]
    Skip,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("null")]
    Null,

    // Identifiers and literals
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Identifier(String),

    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Int(i64),

    #[regex(r"[0-9]+L", |lex| lex.slice()[..lex.slice().len() - 1].parse::<i64>().ok())]
    Long(i64),

    #[regex(r#"'([^'\\]|\\.)*'"#, unescape)]
    #[regex(r#""([^"\\]|\\.)*""#, unescape)]
    Str(String),

    // Operators
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<")]
    Lt,
    #[token("<=")]
    Le,
    #[token(">")]
    Gt,
    #[token(">=")]
    Ge,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("!")]
    Bang,

    // Delimiters
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,

    // Punctuation
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token(";")]
    Semi,
    #[token("=")]
    Eq,
    #[token(".")]
    Dot,
    #[token("#")]
    Hash,

    // End of file
    Eof,
}

impl Token {
    /// Short description used in parser errors
    pub fn describe(&self) -> String {
        match self {
            Token::Identifier(name) => format!("identifier `{}`", name),
            Token::Int(i) => format!("integer {}", i),
            Token::Long(i) => format!("integer {}L", i),
            Token::Str(s) => format!("string '{}'", s),
            Token::Eof => "end of input".to_string(),
            other => format!("{:?}", other),
        }
    }
}

/// A token with its source span
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Span,
}

/// Tokenize a whole source text, ending with `Token::Eof`
pub fn tokenize(source: &str) -> Result<Vec<SpannedToken>> {
    let mut lex = Token::lexer(source);
    let mut tokens = Vec::new();

    while let Some(result) = lex.next() {
        let span = Span::new(lex.span().start, lex.span().end);
        match result {
            Ok(token) => tokens.push(SpannedToken { token, span }),
            Err(_) => {
                return Err(LangError::Lexer {
                    span,
                    message: format!("Invalid token: {}", &source[span.start..span.end]),
                })
            }
        }
    }

    tokens.push(SpannedToken {
        token: Token::Eof,
        span: Span::new(source.len(), source.len()),
    });
    Ok(tokens)
}
