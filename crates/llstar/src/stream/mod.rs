//! # Input streams
//!
//! The stream abstractions the recognizers drive: symbol streams with
//! mark/seek ([`IntStream`]), character streams with text extraction
//! ([`CharStream`]), token streams with lookahead ([`TokenStream`]), and
//! the [`TokenSource`] trait connecting a lexer to a token stream.
//!
//! Prediction relies on the mark/seek contract: the engine marks on
//! entry and seeks back before returning, so a prediction has no
//! observable effect on stream position. Marks nest and are released in
//! reverse order.

pub mod char_stream;
pub mod token_stream;

use compact_str::CompactString;

use crate::error::RecognitionError;
use crate::token::Token;

pub use char_stream::StringCharStream;
pub use token_stream::{BufferedTokenStream, ListTokenSource};

/// A stream of integer symbols with lookahead and repositioning.
pub trait IntStream {
    /// Advance past the current symbol.
    fn consume(&mut self);

    /// Look ahead (`i >= 1`, where 1 is the current symbol) or behind
    /// (`i < 0`). Returns [`crate::token::EOF`] past either end.
    /// `la(0)` is unspecified and returns [`crate::token::INVALID_TYPE`].
    fn la(&mut self, i: isize) -> i32;

    /// Open a nested mark; the stream guarantees symbols stay addressable
    /// until the matching [`release`](IntStream::release).
    fn mark(&mut self) -> isize;

    fn release(&mut self, marker: isize);

    /// Index of the current symbol.
    fn index(&self) -> usize;

    fn seek(&mut self, index: usize);

    /// Number of symbols fetched so far (the full size once EOF has been
    /// reached).
    fn size(&self) -> usize;

    fn source_name(&self) -> &str;
}

/// An [`IntStream`] of code points with text extraction.
pub trait CharStream: IntStream {
    /// The text in the inclusive index interval `[start, stop]`.
    fn text(&self, start: usize, stop: usize) -> CompactString;
}

/// An [`IntStream`] of tokens.
pub trait TokenStream: IntStream {
    /// Look ahead `k >= 1` tokens (1 = current) or behind (`k < 0`).
    /// For `k >= 1` the EOF token is returned past the end; `None` only
    /// happens looking behind past the start.
    fn lt(&mut self, k: isize) -> Option<&Token>;

    /// The token at absolute index `i` (must already be fetched).
    fn get(&self, i: usize) -> &Token;
}

/// Produces the tokens a token stream buffers; implemented by the lexer.
pub trait TokenSource {
    /// The next token, EOF-terminated. Errors surface lexer protocol
    /// failures; ordinary recognition errors are recovered internally and
    /// never reach the stream.
    fn next_token(&mut self) -> Result<Token, RecognitionError>;

    fn source_name(&self) -> &str;
}
