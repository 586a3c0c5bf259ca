//! PDF Lexer
//!
//! Tokenizes PDF syntax according to ISO 32000-1 Section 7.2.
//!
//! The lexer holds no state besides the borrowed input: every call takes a cursor
//! and returns the token found there together with the cursor just past it, so any
//! position can be re-lexed at any time.

use super::{ParseError, ParseResult};

/// Keywords recognized by the object and cross-reference parsers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Obj,
    EndObj,
    Stream,
    EndStream,
    XRef,
    Trailer,
    StartXRef,
    /// The `R` of an indirect reference
    R,
}

impl Keyword {
    fn from_bytes(word: &[u8]) -> Option<Self> {
        match word {
            b"obj" => Some(Keyword::Obj),
            b"endobj" => Some(Keyword::EndObj),
            b"stream" => Some(Keyword::Stream),
            b"endstream" => Some(Keyword::EndStream),
            b"xref" => Some(Keyword::XRef),
            b"trailer" => Some(Keyword::Trailer),
            b"startxref" => Some(Keyword::StartXRef),
            b"R" => Some(Keyword::R),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Keyword::Obj => "obj",
            Keyword::EndObj => "endobj",
            Keyword::Stream => "stream",
            Keyword::EndStream => "endstream",
            Keyword::XRef => "xref",
            Keyword::Trailer => "trailer",
            Keyword::StartXRef => "startxref",
            Keyword::R => "R",
        }
    }
}

/// PDF Token types
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Boolean: true or false
    Boolean(bool),

    /// Integer number
    Integer(i64),

    /// Real number
    Real(f64),

    /// String (literal or hexadecimal), already unescaped
    String(Vec<u8>),

    /// Name object without the leading slash, `#xx` escapes resolved
    Name(String),

    /// Left square bracket [
    ArrayStart,

    /// Right square bracket ]
    ArrayEnd,

    /// Dictionary start <<
    DictStart,

    /// Dictionary end >>
    DictEnd,

    Keyword(Keyword),

    /// Null object
    Null,

    /// Comment body without the `%`
    Comment(Vec<u8>),

    /// End of input
    Eof,
}

/// PDF whitespace: NUL, TAB, LF, FF, CR and SPACE
pub fn is_whitespace(byte: u8) -> bool {
    matches!(byte, b'\0' | b'\t' | b'\n' | b'\x0C' | b'\r' | b' ')
}

pub fn is_delimiter(byte: u8) -> bool {
    matches!(
        byte,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

pub fn is_regular(byte: u8) -> bool {
    !is_whitespace(byte) && !is_delimiter(byte)
}

/// Stateless PDF tokenizer over a byte slice
#[derive(Debug, Clone, Copy)]
pub struct Lexer<'a> {
    data: &'a [u8],
}

impl<'a> Lexer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// The underlying input
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Next significant token at or after `pos`; comments are skipped.
    pub fn next_token(&self, pos: usize) -> ParseResult<(Token, usize)> {
        let mut cursor = pos;
        loop {
            match self.next_token_with_comments(cursor)? {
                (Token::Comment(_), next) => cursor = next,
                other => return Ok(other),
            }
        }
    }

    /// Position of the next significant byte at or after `pos`, with comments skipped.
    pub fn token_start(&self, pos: usize) -> usize {
        let mut cursor = self.skip_whitespace(pos);
        while self.data.get(cursor) == Some(&b'%') {
            cursor = self.skip_whitespace(self.comment_end(cursor));
        }
        cursor
    }

    /// Next token at or after `pos`, comments included.
    pub fn next_token_with_comments(&self, pos: usize) -> ParseResult<(Token, usize)> {
        let start = self.skip_whitespace(pos);
        let Some(&ch) = self.data.get(start) else {
            return Ok((Token::Eof, self.data.len()));
        };

        match ch {
            b'%' => {
                let end = self.comment_end(start);
                Ok((Token::Comment(self.data[start + 1..end].to_vec()), end))
            }
            b'/' => self.read_name(start),
            b'(' => self.read_literal_string(start),
            b'<' => {
                if self.data.get(start + 1) == Some(&b'<') {
                    Ok((Token::DictStart, start + 2))
                } else {
                    self.read_hex_string(start)
                }
            }
            b'>' => {
                if self.data.get(start + 1) == Some(&b'>') {
                    Ok((Token::DictEnd, start + 2))
                } else {
                    Err(ParseError::syntax(start, "Expected '>' after '>'"))
                }
            }
            b'[' => Ok((Token::ArrayStart, start + 1)),
            b']' => Ok((Token::ArrayEnd, start + 1)),
            b')' => Err(ParseError::syntax(start, "Unbalanced ')'")),
            b'{' | b'}' => Err(ParseError::syntax(
                start,
                "PostScript calculator braces are not PDF objects",
            )),
            _ => self.read_word(start),
        }
    }

    /// Lazily iterate tokens from `pos`; the sequence can be restarted anywhere.
    pub fn tokens(&self, pos: usize) -> Tokens<'a> {
        Tokens {
            lexer: *self,
            cursor: pos,
            finished: false,
        }
    }

    pub fn skip_whitespace(&self, pos: usize) -> usize {
        let mut cursor = pos;
        while cursor < self.data.len() && is_whitespace(self.data[cursor]) {
            cursor += 1;
        }
        cursor
    }

    /// Skip a single end-of-line marker (CRLF, CR or LF) if one starts at `pos`.
    pub fn skip_eol(&self, pos: usize) -> usize {
        match self.data.get(pos) {
            Some(b'\r') if self.data.get(pos + 1) == Some(&b'\n') => pos + 2,
            Some(b'\r') | Some(b'\n') => pos + 1,
            _ => pos,
        }
    }

    fn comment_end(&self, start: usize) -> usize {
        let mut cursor = start;
        while cursor < self.data.len() && !matches!(self.data[cursor], b'\r' | b'\n') {
            cursor += 1;
        }
        cursor
    }

    fn read_name(&self, start: usize) -> ParseResult<(Token, usize)> {
        let mut cursor = start + 1;
        let mut bytes = Vec::new();

        while cursor < self.data.len() && is_regular(self.data[cursor]) {
            let ch = self.data[cursor];
            if ch == b'#' {
                let hi = self.data.get(cursor + 1).and_then(|&b| hex_value(b));
                let lo = self.data.get(cursor + 2).and_then(|&b| hex_value(b));
                if let (Some(hi), Some(lo)) = (hi, lo) {
                    bytes.push((hi << 4) | lo);
                    cursor += 3;
                    continue;
                }
            }
            bytes.push(ch);
            cursor += 1;
        }

        let name = match String::from_utf8(bytes) {
            Ok(name) => name,
            // Latin-1 fallback keeps every byte distinct
            Err(e) => e.into_bytes().iter().map(|&b| b as char).collect(),
        };
        Ok((Token::Name(name), cursor))
    }

    fn read_literal_string(&self, start: usize) -> ParseResult<(Token, usize)> {
        let mut cursor = start + 1;
        let mut string = Vec::new();
        let mut paren_depth = 1usize;

        loop {
            let Some(&ch) = self.data.get(cursor) else {
                return Err(ParseError::syntax(start, "Unterminated string"));
            };
            cursor += 1;

            match ch {
                b'\\' => {
                    let Some(&esc) = self.data.get(cursor) else {
                        return Err(ParseError::syntax(start, "Unterminated string"));
                    };
                    cursor += 1;
                    match esc {
                        b'n' => string.push(b'\n'),
                        b'r' => string.push(b'\r'),
                        b't' => string.push(b'\t'),
                        b'b' => string.push(b'\x08'),
                        b'f' => string.push(b'\x0C'),
                        b'0'..=b'7' => {
                            let mut value = u32::from(esc - b'0');
                            for _ in 0..2 {
                                match self.data.get(cursor) {
                                    Some(&d @ b'0'..=b'7') => {
                                        value = value * 8 + u32::from(d - b'0');
                                        cursor += 1;
                                    }
                                    _ => break,
                                }
                            }
                            // High-order overflow is ignored
                            string.push((value & 0xFF) as u8);
                        }
                        // Line continuation
                        b'\r' => {
                            if self.data.get(cursor) == Some(&b'\n') {
                                cursor += 1;
                            }
                        }
                        b'\n' => {}
                        // Unknown escapes drop the backslash
                        other => string.push(other),
                    }
                }
                b'(' => {
                    paren_depth += 1;
                    string.push(ch);
                }
                b')' => {
                    paren_depth -= 1;
                    if paren_depth == 0 {
                        break;
                    }
                    string.push(ch);
                }
                // Any unescaped end-of-line reads as a single LF
                b'\r' => {
                    if self.data.get(cursor) == Some(&b'\n') {
                        cursor += 1;
                    }
                    string.push(b'\n');
                }
                _ => string.push(ch),
            }
        }

        Ok((Token::String(string), cursor))
    }

    fn read_hex_string(&self, start: usize) -> ParseResult<(Token, usize)> {
        let mut cursor = start + 1;
        let mut bytes = Vec::new();
        let mut pending: Option<u8> = None;

        loop {
            let Some(&ch) = self.data.get(cursor) else {
                return Err(ParseError::syntax(start, "Unterminated hex string"));
            };
            cursor += 1;

            if ch == b'>' {
                break;
            }
            if is_whitespace(ch) {
                continue;
            }
            let value = hex_value(ch).ok_or_else(|| {
                ParseError::syntax(cursor - 1, "Invalid character in hex string")
            })?;
            match pending.take() {
                Some(hi) => bytes.push((hi << 4) | value),
                None => pending = Some(value),
            }
        }

        // Odd digit count: the final digit is followed by an implied 0
        if let Some(hi) = pending {
            bytes.push(hi << 4);
        }

        Ok((Token::String(bytes), cursor))
    }

    fn read_word(&self, start: usize) -> ParseResult<(Token, usize)> {
        let mut end = start;
        while end < self.data.len() && is_regular(self.data[end]) {
            end += 1;
        }
        let word = &self.data[start..end];

        let token = match word {
            b"true" => Token::Boolean(true),
            b"false" => Token::Boolean(false),
            b"null" => Token::Null,
            _ if matches!(word[0], b'0'..=b'9' | b'+' | b'-' | b'.') => {
                parse_number(word, start)?
            }
            _ => match Keyword::from_bytes(word) {
                Some(keyword) => Token::Keyword(keyword),
                None => {
                    return Err(ParseError::syntax(
                        start,
                        format!("Unknown keyword '{}'", String::from_utf8_lossy(word)),
                    ))
                }
            },
        };

        Ok((token, end))
    }
}

/// Iterator over the tokens following a cursor.
///
/// Yields each token with its end position and stops after `Eof` or the first error.
#[derive(Debug, Clone)]
pub struct Tokens<'a> {
    lexer: Lexer<'a>,
    cursor: usize,
    finished: bool,
}

impl<'a> Tokens<'a> {
    pub fn position(&self) -> usize {
        self.cursor
    }
}

impl<'a> Iterator for Tokens<'a> {
    type Item = ParseResult<(Token, usize)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.lexer.next_token(self.cursor) {
            Ok((Token::Eof, _)) => {
                self.finished = true;
                None
            }
            Ok((token, next)) => {
                self.cursor = next;
                Some(Ok((token, next)))
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

/// Optional sign, digits with at most one decimal point, no exponent.
fn parse_number(word: &[u8], position: usize) -> ParseResult<Token> {
    let malformed = || {
        ParseError::syntax(
            position,
            format!("Malformed number '{}'", String::from_utf8_lossy(word)),
        )
    };

    let (negative, body) = match word[0] {
        b'-' => (true, &word[1..]),
        b'+' => (false, &word[1..]),
        _ => (false, word),
    };

    let mut digits = 0usize;
    let mut dots = 0usize;
    for &b in body {
        match b {
            b'0'..=b'9' => digits += 1,
            b'.' => dots += 1,
            _ => return Err(malformed()),
        }
    }
    if digits == 0 || dots > 1 {
        return Err(malformed());
    }

    // Validated as ASCII above
    let text = std::str::from_utf8(body).map_err(|_| malformed())?;

    if dots == 0 {
        if let Ok(value) = text.parse::<i64>() {
            return Ok(Token::Integer(if negative { -value } else { value }));
        }
    }

    let value: f64 = if text.starts_with('.') {
        format!("0{text}").parse().map_err(|_| malformed())?
    } else {
        text.trim_end_matches('.')
            .parse()
            .map_err(|_| malformed())?
    };
    Ok(Token::Real(if negative { -value } else { value }))
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lex_all(input: &[u8]) -> Vec<Token> {
        Lexer::new(input)
            .tokens(0)
            .map(|r| r.unwrap().0)
            .collect()
    }

    #[test]
    fn test_lexer_basic_tokens() {
        let tokens = lex_all(b"123 -456 3.14 true false null /Name");
        assert_eq!(
            tokens,
            vec![
                Token::Integer(123),
                Token::Integer(-456),
                Token::Real(3.14),
                Token::Boolean(true),
                Token::Boolean(false),
                Token::Null,
                Token::Name("Name".to_string()),
            ]
        );
    }

    #[test]
    fn test_next_token_returns_cursor() {
        let lexer = Lexer::new(b"  42 /Type");
        let (token, next) = lexer.next_token(0).unwrap();
        assert_eq!(token, Token::Integer(42));
        assert_eq!(next, 4);

        // Re-lexing from the same cursor yields the same result
        assert_eq!(lexer.next_token(0).unwrap(), (Token::Integer(42), 4));
        assert_eq!(
            lexer.next_token(next).unwrap(),
            (Token::Name("Type".to_string()), 10)
        );
        assert_eq!(lexer.next_token(10).unwrap().0, Token::Eof);
    }

    #[test]
    fn test_lexer_numbers() {
        assert_eq!(
            lex_all(b"+17 -.002 .5 4. 0.0 -0 007"),
            vec![
                Token::Integer(17),
                Token::Real(-0.002),
                Token::Real(0.5),
                Token::Real(4.0),
                Token::Real(0.0),
                Token::Integer(0),
                Token::Integer(7),
            ]
        );
    }

    #[test]
    fn test_lexer_malformed_numbers() {
        for input in [&b"1.2.3"[..], b"--5", b"-", b"1e5", b"12abc"] {
            let result = Lexer::new(input).next_token(0);
            assert!(
                matches!(result, Err(ParseError::SyntaxError { position: 0, .. })),
                "{:?} should fail",
                String::from_utf8_lossy(input)
            );
        }
    }

    #[test]
    fn test_lexer_large_integer_becomes_real() {
        let tokens = lex_all(b"99999999999999999999");
        assert!(matches!(tokens[0], Token::Real(v) if v > 9.9e19));
    }

    #[test]
    fn test_lexer_string_literal_escapes() {
        assert_eq!(
            lex_all(br"(a\nb\rc\td\be\ff\(g\)h\\i)"),
            vec![Token::String(b"a\nb\rc\td\x08e\x0Cf(g)h\\i".to_vec())]
        );
        assert_eq!(lex_all(br"(\101\1011\7)"), vec![Token::String(b"AA1\x07".to_vec())]);
        assert_eq!(lex_all(br"(\q)"), vec![Token::String(b"q".to_vec())]);
    }

    #[test]
    fn test_lexer_string_nested_parens_and_eol() {
        assert_eq!(
            lex_all(b"(outer (inner) text)"),
            vec![Token::String(b"outer (inner) text".to_vec())]
        );
        assert_eq!(
            lex_all(b"(line\r\nbreak\\\ncontinued)"),
            vec![Token::String(b"line\nbreakcontinued".to_vec())]
        );
    }

    #[test]
    fn test_lexer_unterminated_string() {
        let err = Lexer::new(b"  (never ends").next_token(0).unwrap_err();
        assert!(matches!(err, ParseError::SyntaxError { position: 2, .. }));
    }

    #[test]
    fn test_lexer_hex_strings() {
        assert_eq!(
            lex_all(b"<48656C6C6F> <48 65 6c\n6c 6f> <901FA> <>"),
            vec![
                Token::String(b"Hello".to_vec()),
                Token::String(b"Hello".to_vec()),
                Token::String(vec![0x90, 0x1F, 0xA0]),
                Token::String(vec![]),
            ]
        );
        assert!(Lexer::new(b"<48G5>").next_token(0).is_err());
        assert!(Lexer::new(b"<4865").next_token(0).is_err());
    }

    #[test]
    fn test_lexer_names() {
        assert_eq!(
            lex_all(b"/Name1 /A;Name_With-Various***Characters? /lime#20Green /paired#28#29 / /Ar#E9"),
            vec![
                Token::Name("Name1".to_string()),
                Token::Name("A;Name_With-Various***Characters?".to_string()),
                Token::Name("lime Green".to_string()),
                Token::Name("paired()".to_string()),
                Token::Name(String::new()),
                Token::Name("Ar\u{e9}".to_string()),
            ]
        );
    }

    #[test]
    fn test_lexer_delimiters() {
        assert_eq!(
            lex_all(b"<</Kids[1 0 R]>>"),
            vec![
                Token::DictStart,
                Token::Name("Kids".to_string()),
                Token::ArrayStart,
                Token::Integer(1),
                Token::Integer(0),
                Token::Keyword(Keyword::R),
                Token::ArrayEnd,
                Token::DictEnd,
            ]
        );
        assert!(Lexer::new(b"> x").next_token(0).is_err());
        assert!(Lexer::new(b")").next_token(0).is_err());
    }

    #[test]
    fn test_lexer_keywords() {
        assert_eq!(
            lex_all(b"obj endobj stream endstream xref trailer startxref R"),
            vec![
                Token::Keyword(Keyword::Obj),
                Token::Keyword(Keyword::EndObj),
                Token::Keyword(Keyword::Stream),
                Token::Keyword(Keyword::EndStream),
                Token::Keyword(Keyword::XRef),
                Token::Keyword(Keyword::Trailer),
                Token::Keyword(Keyword::StartXRef),
                Token::Keyword(Keyword::R),
            ]
        );
        assert!(Lexer::new(b"bogus").next_token(0).is_err());
    }

    #[test]
    fn test_lexer_comments() {
        let lexer = Lexer::new(b"%PDF-1.7\n123 % trailing\r\n456");
        assert_eq!(
            lexer.next_token_with_comments(0).unwrap(),
            (Token::Comment(b"PDF-1.7".to_vec()), 8)
        );
        assert_eq!(lexer.next_token(0).unwrap(), (Token::Integer(123), 12));
        assert_eq!(lexer.next_token(12).unwrap().0, Token::Integer(456));
        assert_eq!(lexer.token_start(12), 25);
    }

    #[test]
    fn test_lexer_whitespace_kinds() {
        let tokens = lex_all(b"\0\t\n\x0C\r 1\0\x0C2");
        assert_eq!(tokens, vec![Token::Integer(1), Token::Integer(2)]);
        assert!(lex_all(b" \r\n\t ").is_empty());
    }

    #[test]
    fn test_tokens_stop_after_error() {
        let mut tokens = Lexer::new(b"1 ) 2").tokens(0);
        assert_eq!(tokens.next().unwrap().unwrap().0, Token::Integer(1));
        assert!(tokens.next().unwrap().is_err());
        assert!(tokens.next().is_none());
    }

    #[test]
    fn test_skip_eol() {
        let lexer = Lexer::new(b"a\r\nb\rc\nd");
        assert_eq!(lexer.skip_eol(1), 3);
        assert_eq!(lexer.skip_eol(4), 5);
        assert_eq!(lexer.skip_eol(6), 7);
        assert_eq!(lexer.skip_eol(0), 0);
    }
}
