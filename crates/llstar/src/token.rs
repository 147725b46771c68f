//! # Tokens
//!
//! The concrete [`Token`] type produced by lexers and consumed by parsers,
//! the [`TokenFactory`] trait used to create them (including conjured
//! tokens during error recovery), and the symbol/channel constants shared
//! by every component of the runtime.

use compact_str::CompactString;
use std::fmt;
use std::sync::Arc;

/// End of input. Also the end-of-file symbol on character streams.
pub const EOF: i32 = -1;

/// The invisible symbol labelling transitions that consume no input.
pub const EPSILON: i32 = -2;

/// Token type reserved for tokens that never matched a rule.
pub const INVALID_TYPE: i32 = 0;

/// Smallest token type a grammar rule may be assigned.
pub const MIN_USER_TOKEN_TYPE: i32 = 1;

/// Channel that parsers read from by default.
pub const DEFAULT_CHANNEL: usize = 0;

/// Channel conventionally used for whitespace and comments.
pub const HIDDEN_CHANNEL: usize = 1;

/// Smallest channel number available to user grammars.
pub const MIN_USER_CHANNEL_VALUE: usize = 2;

/// Smallest code point on a character stream.
pub const MIN_CHAR: i32 = 0x0000;

/// Largest code point on a character stream.
pub const MAX_CHAR: i32 = 0x0010_FFFF;

/// Sentinel token index for tokens not (yet) held by a token stream.
pub const NO_TOKEN_INDEX: usize = usize::MAX;

/// A single token.
///
/// `start`/`stop` are inclusive character indices into the source stream;
/// a conjured token (inserted during error recovery) has `start > stop`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub ty: i32,
    pub text: CompactString,
    pub channel: usize,
    pub start: usize,
    pub stop: usize,
    /// 1-based line of the first character.
    pub line: u32,
    /// 0-based character position of the first character within its line.
    pub column: u32,
    /// Position in the token stream; [`NO_TOKEN_INDEX`] until buffered.
    pub index: usize,
}

impl Token {
    /// Create an EOF token at the given stream position.
    #[must_use]
    pub fn eof(index: usize, line: u32, column: u32) -> Self {
        Self {
            ty: EOF,
            text: CompactString::const_new("<EOF>"),
            channel: DEFAULT_CHANNEL,
            start: index,
            stop: index.saturating_sub(1),
            line,
            column,
            index: NO_TOKEN_INDEX,
        }
    }

    /// Whether this token was conjured by error recovery rather than
    /// matched from the input.
    #[must_use]
    pub const fn is_missing(&self) -> bool {
        self.start > self.stop && self.ty != EOF
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[@{},{}:{}='{}',<{}>,{}:{}]",
            if self.index == NO_TOKEN_INDEX { -1 } else { self.index as i64 },
            self.start,
            self.stop,
            self.text.escape_debug(),
            self.ty,
            self.line,
            self.column
        )
    }
}

/// Creates [`Token`]s for the lexer driver and for error strategies that
/// conjure missing tokens.
pub trait TokenFactory: Send + Sync {
    /// Create a token.
    ///
    /// `text` is the matched text when the caller already extracted it
    /// (conjured tokens, overridden text); `None` means the factory should
    /// use `source_text`, the slice the lexer matched.
    #[allow(clippy::too_many_arguments)]
    fn create(
        &self,
        ty: i32,
        text: Option<&str>,
        source_text: &str,
        channel: usize,
        start: usize,
        stop: usize,
        line: u32,
        column: u32,
    ) -> Token;
}

/// The default factory: copies the matched text into the token.
#[derive(Debug, Default, Clone, Copy)]
pub struct CommonTokenFactory;

impl TokenFactory for CommonTokenFactory {
    fn create(
        &self,
        ty: i32,
        text: Option<&str>,
        source_text: &str,
        channel: usize,
        start: usize,
        stop: usize,
        line: u32,
        column: u32,
    ) -> Token {
        Token {
            ty,
            text: CompactString::from(text.unwrap_or(source_text)),
            channel,
            start,
            stop,
            line,
            column,
            index: NO_TOKEN_INDEX,
        }
    }
}

/// Shared handle to a token factory.
pub type TokenFactoryRef = Arc<dyn TokenFactory>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eof_token() {
        let t = Token::eof(5, 2, 0);
        assert_eq!(t.ty, EOF);
        assert_eq!(t.start, 5);
        assert!(!t.is_missing());
    }

    #[test]
    fn test_factory_prefers_explicit_text() {
        let f = CommonTokenFactory;
        let t = f.create(3, Some("<missing ';'>"), "x", DEFAULT_CHANNEL, 4, 3, 1, 4);
        assert_eq!(t.text, "<missing ';'>");
        assert!(t.is_missing());
    }

    #[test]
    fn test_factory_falls_back_to_source_text() {
        let f = CommonTokenFactory;
        let t = f.create(1, None, "while", DEFAULT_CHANNEL, 0, 4, 1, 0);
        assert_eq!(t.text, "while");
        assert_eq!(t.stop, 4);
    }

    #[test]
    fn test_display_escapes_text() {
        let f = CommonTokenFactory;
        let t = f.create(1, None, "\n", DEFAULT_CHANNEL, 0, 0, 1, 0);
        assert!(format!("{t}").contains("\\n"));
    }
}
