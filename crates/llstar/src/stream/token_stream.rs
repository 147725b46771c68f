//! Buffered token streams.

use crate::error::RecognitionError;
use crate::stream::{IntStream, TokenSource, TokenStream};
use crate::token::{Token, DEFAULT_CHANNEL, EOF, INVALID_TYPE};

const UNINITIALIZED: usize = usize::MAX;

/// A [`TokenStream`] that buffers every token from a [`TokenSource`],
/// fetching lazily.
///
/// With a channel filter (see [`common`](BufferedTokenStream::common)),
/// lookahead and consume see only that channel while [`get`] and absolute
/// indices still address the full buffer — this is what parsers use so
/// hidden-channel tokens stay available to tooling.
///
/// [`get`]: TokenStream::get
pub struct BufferedTokenStream<S: TokenSource> {
    source: S,
    tokens: Vec<Token>,
    /// Index into `tokens` of the current token; lazily initialized.
    pos: usize,
    fetched_eof: bool,
    channel: Option<usize>,
    source_error: Option<RecognitionError>,
}

impl<S: TokenSource> BufferedTokenStream<S> {
    /// Stream over every channel.
    #[must_use]
    pub fn new(source: S) -> Self {
        Self {
            source,
            tokens: Vec::new(),
            pos: UNINITIALIZED,
            fetched_eof: false,
            channel: None,
            source_error: None,
        }
    }

    /// Stream filtered to the default channel (what parsers consume).
    #[must_use]
    pub fn common(source: S) -> Self {
        Self::on_channel(source, DEFAULT_CHANNEL)
    }

    /// Stream filtered to `channel`.
    #[must_use]
    pub fn on_channel(source: S, channel: usize) -> Self {
        Self { channel: Some(channel), ..Self::new(source) }
    }

    /// First protocol error raised by the token source, if any. The
    /// stream treats such an error as end of input.
    #[must_use]
    pub const fn source_error(&self) -> Option<&RecognitionError> {
        self.source_error.as_ref()
    }

    /// The full token buffer fetched so far.
    #[must_use]
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Fetch every remaining token from the source.
    pub fn fill(&mut self) {
        self.lazy_init();
        while !self.fetched_eof {
            let n = self.tokens.len();
            self.sync(n);
        }
    }

    fn lazy_init(&mut self) {
        if self.pos == UNINITIALIZED {
            self.sync(0);
            self.pos = self.adjust(0);
        }
    }

    /// Make sure `tokens[i]` exists, fetching as needed. Returns false at
    /// EOF.
    fn sync(&mut self, i: usize) -> bool {
        while self.tokens.len() <= i {
            if self.fetched_eof {
                return false;
            }
            let mut token = match self.source.next_token() {
                Ok(t) => t,
                Err(e) => {
                    // A broken source ends the stream.
                    if self.source_error.is_none() {
                        self.source_error = Some(e);
                    }
                    Token::eof(self.tokens.len(), 1, 0)
                }
            };
            token.index = self.tokens.len();
            if token.ty == EOF {
                self.fetched_eof = true;
            }
            self.tokens.push(token);
        }
        true
    }

    /// Move `i` forward to the first token visible on the configured
    /// channel.
    fn adjust(&mut self, i: usize) -> usize {
        match self.channel {
            Some(channel) => self.next_on_channel(i, channel),
            None => i,
        }
    }

    fn next_on_channel(&mut self, mut i: usize, channel: usize) -> usize {
        loop {
            if !self.sync(i) {
                return self.tokens.len() - 1;
            }
            let t = &self.tokens[i];
            if t.ty == EOF || t.channel == channel {
                return i;
            }
            i += 1;
        }
    }

    fn prev_on_channel(&self, mut i: usize, channel: usize) -> Option<usize> {
        loop {
            let t = self.tokens.get(i)?;
            if t.ty == EOF || t.channel == channel {
                return Some(i);
            }
            i = i.checked_sub(1)?;
        }
    }

    fn lt_index(&mut self, k: isize) -> Option<usize> {
        self.lazy_init();
        match k {
            0 => None,
            k if k > 0 => {
                let mut i = self.pos;
                for _ in 1..k {
                    self.sync(i + 1);
                    i = match self.channel {
                        Some(ch) => self.next_on_channel(i + 1, ch),
                        None => (i + 1).min(self.tokens.len() - 1),
                    };
                }
                self.sync(i);
                Some(i.min(self.tokens.len() - 1))
            }
            k => {
                // Look backwards over the visible channel.
                let mut i = self.pos;
                for _ in k..0 {
                    i = match self.channel {
                        Some(ch) => self.prev_on_channel(i.checked_sub(1)?, ch)?,
                        None => i.checked_sub(1)?,
                    };
                }
                Some(i)
            }
        }
    }
}

impl<S: TokenSource> IntStream for BufferedTokenStream<S> {
    fn consume(&mut self) {
        self.lazy_init();
        if self.la(1) != EOF {
            self.sync(self.pos + 1);
            self.pos = self.adjust(self.pos + 1);
        }
    }

    fn la(&mut self, i: isize) -> i32 {
        if i == 0 {
            return INVALID_TYPE;
        }
        self.lt(i).map_or(EOF, |t| t.ty)
    }

    fn mark(&mut self) -> isize {
        0
    }

    fn release(&mut self, _marker: isize) {}

    fn index(&self) -> usize {
        if self.pos == UNINITIALIZED {
            0
        } else {
            self.pos
        }
    }

    fn seek(&mut self, index: usize) {
        self.lazy_init();
        self.sync(index);
        self.pos = self.adjust(index.min(self.tokens.len().saturating_sub(1)));
    }

    fn size(&self) -> usize {
        self.tokens.len()
    }

    fn source_name(&self) -> &str {
        self.source.source_name()
    }
}

impl<S: TokenSource> TokenStream for BufferedTokenStream<S> {
    fn lt(&mut self, k: isize) -> Option<&Token> {
        let i = self.lt_index(k)?;
        Some(&self.tokens[i])
    }

    fn get(&self, i: usize) -> &Token {
        &self.tokens[i]
    }
}

/// A [`TokenSource`] over a pre-built token list; appends EOF if the list
/// lacks one. Useful for tests and for replaying token buffers.
pub struct ListTokenSource {
    tokens: std::vec::IntoIter<Token>,
    last_seen: Option<Token>,
    name: String,
}

impl ListTokenSource {
    #[must_use]
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens: tokens.into_iter(),
            last_seen: None,
            name: "<list>".to_owned(),
        }
    }
}

impl TokenSource for ListTokenSource {
    fn next_token(&mut self) -> Result<Token, RecognitionError> {
        if let Some(t) = self.tokens.next() {
            self.last_seen = Some(t.clone());
            return Ok(t);
        }
        let (index, line, column) = self.last_seen.as_ref().map_or((0, 1, 0), |t| {
            (t.stop + 1, t.line, t.column + t.text.chars().count() as u32)
        });
        Ok(Token::eof(index, line, column))
    }

    fn source_name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::HIDDEN_CHANNEL;

    fn tok(ty: i32, text: &str, channel: usize, start: usize) -> Token {
        Token {
            ty,
            text: text.into(),
            channel,
            start,
            stop: start + text.len().saturating_sub(1),
            line: 1,
            column: start as u32,
            index: crate::token::NO_TOKEN_INDEX,
        }
    }

    fn stream(tokens: Vec<Token>) -> BufferedTokenStream<ListTokenSource> {
        BufferedTokenStream::new(ListTokenSource::new(tokens))
    }

    #[test]
    fn test_lookahead_and_eof_padding() {
        let mut s = stream(vec![tok(1, "a", 0, 0), tok(2, "b", 0, 1)]);
        assert_eq!(s.la(1), 1);
        assert_eq!(s.la(2), 2);
        assert_eq!(s.la(3), EOF);
        assert_eq!(s.la(9), EOF);
        s.consume();
        s.consume();
        assert_eq!(s.la(1), EOF);
        s.consume(); // no-op at EOF
        assert_eq!(s.la(1), EOF);
    }

    #[test]
    fn test_indices_assigned_on_fetch() {
        let mut s = stream(vec![tok(1, "a", 0, 0), tok(2, "b", 0, 1)]);
        s.fill();
        assert_eq!(s.get(0).index, 0);
        assert_eq!(s.get(1).index, 1);
        assert_eq!(s.get(2).ty, EOF);
    }

    #[test]
    fn test_seek_restores_position() {
        let mut s = stream(vec![tok(1, "a", 0, 0), tok(2, "b", 0, 1), tok(3, "c", 0, 2)]);
        let mark = s.mark();
        let start = {
            s.lazy_init();
            s.index()
        };
        s.consume();
        s.consume();
        assert_eq!(s.la(1), 3);
        s.seek(start);
        s.release(mark);
        assert_eq!(s.la(1), 1);
    }

    #[test]
    fn test_channel_filtering() {
        let mut s = BufferedTokenStream::common(ListTokenSource::new(vec![
            tok(1, "a", 0, 0),
            tok(9, " ", HIDDEN_CHANNEL, 1),
            tok(2, "b", 0, 2),
        ]));
        assert_eq!(s.la(1), 1);
        assert_eq!(s.la(2), 2);
        s.consume();
        // current position skipped the hidden token
        assert_eq!(s.la(1), 2);
        assert_eq!(s.lt(-1).map(|t| t.ty), Some(1));
        // absolute access still sees all tokens
        assert_eq!(s.get(1).ty, 9);
    }

    #[test]
    fn test_lt_negative_at_start() {
        let mut s = stream(vec![tok(1, "a", 0, 0)]);
        assert!(s.lt(-1).is_none());
    }

    #[test]
    fn test_list_source_synthesizes_eof() {
        let mut src = ListTokenSource::new(vec![tok(1, "ab", 0, 0)]);
        assert_eq!(src.next_token().unwrap().ty, 1);
        let eof = src.next_token().unwrap();
        assert_eq!(eof.ty, EOF);
        assert_eq!(eof.start, 2);
    }
}
