#![allow(clippy::module_name_repetitions)]

//! Lexer and parser for the diagnostic console.
//!
//! `regal` produces a bounded token stream for each line; the parser walks
//! those tokens with `winnow` streams so it runs unchanged on the firmware
//! and the host emulator.

use core::fmt;
use core::ops::Range;

use heapless::Vec as HeaplessVec;
use regal::IncrementalError;
use regal::TokenCache;
use regal_macros::RegalLexer;
use winnow::error::ErrMode;
use winnow::stream::Stream;

/// Maximum number of tokens accepted per console line.
pub const MAX_TOKENS: usize = 8;
const MAX_CACHE_RECORDS: usize = MAX_TOKENS * 2;

/// Lexical token kinds recognized by the console.
#[derive(RegalLexer, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TokenKind {
    /// Unsigned decimal literal.
    #[regex(r"[0-9]+")]
    Integer,
    /// Keyword or help topic (matched case-insensitively).
    #[regex(r"[A-Za-z][A-Za-z0-9-]*")]
    Ident,
    #[regex(r"[ \t]+", skip)]
    Whitespace,
    /// End-of-line token (`\r`, `\n`, or `\r\n`).
    #[token("\r\n")]
    #[token("\n")]
    #[token("\r")]
    Eol,
    /// Anything the console does not understand.
    #[default]
    #[regex(r".", priority = 1024)]
    Error,
}

/// Token with a byte span back into the source line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub lexeme: &'a str,
    pub span: Range<usize>,
}

/// Bounded token buffer.
pub type TokenBuffer<'a> = HeaplessVec<Token<'a>, MAX_TOKENS>;

/// Lexer errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LexError {
    /// Input produced more tokens than the buffer allows.
    TooManyTokens { processed: usize },
    /// Underlying lexer reported an unrecoverable error.
    Engine,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexError::TooManyTokens { processed } => {
                write!(f, "line too long ({processed} tokens)")
            }
            LexError::Engine => f.write_str("lexer engine error"),
        }
    }
}

/// Grammar errors emitted by the parser.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GrammarError<'a> {
    UnknownCommand { lexeme: &'a str },
    UnexpectedToken {
        expected: &'static str,
        lexeme: &'a str,
        span: Range<usize>,
    },
    UnexpectedEnd { expected: &'static str },
    InvalidInteger { lexeme: &'a str },
    InvalidToken { lexeme: &'a str, span: Range<usize> },
}

impl<'a> GrammarError<'a> {
    fn unexpected(expected: &'static str, token: Option<&Token<'a>>) -> Self {
        match token {
            Some(token) => GrammarError::UnexpectedToken {
                expected,
                lexeme: token.lexeme,
                span: token.span.clone(),
            },
            None => GrammarError::UnexpectedEnd { expected },
        }
    }
}

impl fmt::Display for GrammarError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrammarError::UnknownCommand { lexeme } => {
                write!(f, "unknown command `{lexeme}` (try `help`)")
            }
            GrammarError::UnexpectedToken {
                expected, lexeme, ..
            } => write!(f, "expected {expected}, found `{lexeme}`"),
            GrammarError::UnexpectedEnd { expected } => write!(f, "expected {expected}"),
            GrammarError::InvalidInteger { lexeme } => write!(f, "`{lexeme}` is out of range"),
            GrammarError::InvalidToken { lexeme, span } => {
                write!(f, "unsupported character `{lexeme}` at column {}", span.start + 1)
            }
        }
    }
}

/// Combined lex/parse error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParseError<'a> {
    Lex(LexError),
    Grammar(GrammarError<'a>),
}

impl fmt::Display for ParseError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Lex(err) => err.fmt(f),
            ParseError::Grammar(err) => err.fmt(f),
        }
    }
}

/// Structured console commands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command<'a> {
    /// Run `count` wake cycles.
    Tick { count: u16 },
    Probe(ProbeCommand),
    Baseline(BaselineCommand),
    Status,
    /// Print the most recent telemetry records (all retained when `None`).
    Log { count: Option<u16> },
    Help { topic: Option<&'a str> },
}

/// Oscillator source selection for subsequent cycles.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProbeCommand {
    /// Pin the next samples to a fixed raw count.
    Fixed(u32),
    /// Return to the simulated soil profile.
    Auto,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BaselineCommand {
    Reset,
}

type Input<'src, 'slice> = &'slice [Token<'src>];
type ParseResult<'src, T> = Result<T, ErrMode<GrammarError<'src>>>;

/// Tokenize the provided line.
pub fn lex(line: &str) -> Result<TokenBuffer<'_>, LexError> {
    let compiled = TokenKind::lexer();
    let mut cache: TokenCache<TokenKind, MAX_CACHE_RECORDS> = TokenCache::new();
    let partial = cache
        .rebuild(compiled, line)
        .map_err(|error| match error {
            IncrementalError::TokenOverflow => LexError::TooManyTokens {
                processed: MAX_TOKENS,
            },
            _ => LexError::Engine,
        })?;

    let mut buffer = TokenBuffer::new();
    let trailing = partial
        .filter(|partial| !partial.fragment.is_empty())
        .map(|partial| (TokenKind::Error, partial.start, partial.fragment));
    let records = cache
        .tokens()
        .filter(|record| !record.skipped)
        .map(|record| (record.token, record.start, &line[record.start..record.end]));

    for (kind, start, lexeme) in records.chain(trailing) {
        let token = Token {
            kind,
            lexeme,
            span: start..start + lexeme.len(),
        };
        if buffer.push(token).is_err() {
            return Err(LexError::TooManyTokens {
                processed: buffer.len() + 1,
            });
        }
    }

    Ok(buffer)
}

/// Parse one console line.
pub fn parse(line: &str) -> Result<Command<'_>, ParseError<'_>> {
    let tokens = lex(line).map_err(ParseError::Lex)?;

    if let Some(token) = tokens.iter().find(|token| token.kind == TokenKind::Error) {
        return Err(ParseError::Grammar(GrammarError::InvalidToken {
            lexeme: token.lexeme,
            span: token.span.clone(),
        }));
    }

    let mut input: Input<'_, '_> = tokens.as_slice();
    let command = command(&mut input).map_err(|err| ParseError::Grammar(into_grammar(err)))?;
    end_of_line(&mut input).map_err(|err| ParseError::Grammar(into_grammar(err)))?;
    Ok(command)
}

fn into_grammar(err: ErrMode<GrammarError<'_>>) -> GrammarError<'_> {
    match err {
        ErrMode::Backtrack(err) | ErrMode::Cut(err) => err,
        ErrMode::Incomplete(_) => GrammarError::UnexpectedEnd { expected: "token" },
    }
}

fn command<'src>(input: &mut Input<'src, '_>) -> ParseResult<'src, Command<'src>> {
    let keyword = expect_kind(input, TokenKind::Ident, "command")?;

    match keyword.lexeme {
        word if word.eq_ignore_ascii_case("tick") => {
            let count = optional_integer(input, "cycle count")?
                .map(|token| narrow::<u16>(&token))
                .transpose()?
                .unwrap_or(1);
            Ok(Command::Tick { count })
        }
        word if word.eq_ignore_ascii_case("probe") => probe(input).map(Command::Probe),
        word if word.eq_ignore_ascii_case("baseline") => {
            let action = expect_kind(input, TokenKind::Ident, "reset")?;
            if action.lexeme.eq_ignore_ascii_case("reset") {
                Ok(Command::Baseline(BaselineCommand::Reset))
            } else {
                Err(ErrMode::Cut(GrammarError::unexpected("reset", Some(&action))))
            }
        }
        word if word.eq_ignore_ascii_case("status") => Ok(Command::Status),
        word if word.eq_ignore_ascii_case("log") => {
            let count = optional_integer(input, "record count")?
                .map(|token| narrow::<u16>(&token))
                .transpose()?;
            Ok(Command::Log { count })
        }
        word if word.eq_ignore_ascii_case("help") => {
            let topic = match peek_kind(input) {
                Some(TokenKind::Ident) => input.next_token(),
                _ => None,
            };
            Ok(Command::Help {
                topic: topic.map(|token| token.lexeme),
            })
        }
        lexeme => Err(ErrMode::Cut(GrammarError::UnknownCommand { lexeme })),
    }
}

fn probe<'src>(input: &mut Input<'src, '_>) -> ParseResult<'src, ProbeCommand> {
    match input.next_token() {
        Some(token) if token.kind == TokenKind::Integer => {
            narrow::<u32>(&token).map(ProbeCommand::Fixed)
        }
        Some(token) if token.kind == TokenKind::Ident && token.lexeme.eq_ignore_ascii_case("auto") => {
            Ok(ProbeCommand::Auto)
        }
        other => Err(ErrMode::Cut(GrammarError::unexpected(
            "raw count or `auto`",
            other.as_ref().filter(|token| token.kind != TokenKind::Eol),
        ))),
    }
}

fn optional_integer<'src>(
    input: &mut Input<'src, '_>,
    label: &'static str,
) -> ParseResult<'src, Option<Token<'src>>> {
    match peek_kind(input) {
        Some(TokenKind::Integer) => Ok(input.next_token()),
        Some(TokenKind::Eol) | None => Ok(None),
        Some(_) => Err(ErrMode::Cut(GrammarError::unexpected(label, input.first()))),
    }
}

fn peek_kind(input: &Input<'_, '_>) -> Option<TokenKind> {
    input.first().map(|token| token.kind)
}

fn end_of_line<'src>(input: &mut Input<'src, '_>) -> ParseResult<'src, ()> {
    while let Some(token) = input.next_token() {
        if token.kind != TokenKind::Eol {
            return Err(ErrMode::Cut(GrammarError::unexpected(
                "end of command",
                Some(&token),
            )));
        }
    }
    Ok(())
}

fn expect_kind<'src>(
    input: &mut Input<'src, '_>,
    kind: TokenKind,
    label: &'static str,
) -> ParseResult<'src, Token<'src>> {
    let snapshot = *input;
    match input.next_token() {
        Some(token) if token.kind == kind => Ok(token),
        other => {
            *input = snapshot;
            Err(ErrMode::Backtrack(GrammarError::unexpected(
                label,
                other.as_ref().filter(|token| token.kind != TokenKind::Eol),
            )))
        }
    }
}

fn narrow<'src, T: core::str::FromStr>(token: &Token<'src>) -> ParseResult<'src, T> {
    token.lexeme.parse::<T>().map_err(|_| {
        ErrMode::Cut(GrammarError::InvalidInteger {
            lexeme: token.lexeme,
        })
    })
}
