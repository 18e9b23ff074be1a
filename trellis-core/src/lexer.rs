//! `.properties` 文本的词法分析

use std::iter::Peekable;
use std::str::Chars;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token {
    Comment(String),
    Key(String),
    Value(String),
    Error(String),
    Eof,
}

enum State {
    BeforeKey,
    Comment,
    Key,
    BeforeValue,
    Value,
    Done,
}

const WHITESPACE: &[char] = &[' ', '\x0c', '\t'];

struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    buf: String,
    tokens: Vec<Token>,
}

/// 把输入切分为注释、键、值
pub(crate) fn lex(input: &str) -> Vec<Token> {
    let mut lexer = Lexer {
        chars: input.chars().peekable(),
        buf: String::new(),
        tokens: Vec::new(),
    };
    let mut state = State::BeforeKey;
    loop {
        state = match state {
            State::BeforeKey => lexer.before_key(),
            State::Comment => lexer.comment(),
            State::Key => lexer.key(),
            State::BeforeValue => lexer.before_value(),
            State::Value => lexer.value(),
            State::Done => break,
        };
    }
    lexer.tokens
}

impl Lexer<'_> {
    fn emit(&mut self, make: fn(String) -> Token) {
        let text = std::mem::take(&mut self.buf);
        self.tokens.push(make(text));
    }

    fn fail(&mut self, message: String) -> State {
        self.tokens.push(Token::Error(message));
        State::Done
    }

    fn skip_whitespace(&mut self) {
        while self.chars.next_if(|c| WHITESPACE.contains(c)).is_some() {}
    }

    fn before_key(&mut self) -> State {
        match self.chars.peek().copied() {
            None => {
                self.tokens.push(Token::Eof);
                State::Done
            }
            Some(c) if is_eol(c) || WHITESPACE.contains(&c) => {
                self.chars.next();
                State::BeforeKey
            }
            Some('#') | Some('!') => {
                self.chars.next();
                State::Comment
            }
            Some(_) => State::Key,
        }
    }

    fn comment(&mut self) -> State {
        self.skip_whitespace();
        loop {
            match self.chars.next() {
                None => {
                    // 文件末尾未换行的注释没有对应的键，丢弃
                    self.buf.clear();
                    self.tokens.push(Token::Eof);
                    return State::Done;
                }
                Some(c) if is_eol(c) => {
                    self.emit(Token::Comment);
                    return State::BeforeKey;
                }
                Some(c) => self.buf.push(c),
            }
        }
    }

    fn key(&mut self) -> State {
        loop {
            match self.chars.peek().copied() {
                None => {
                    if !self.buf.is_empty() {
                        self.emit(Token::Key);
                    }
                    self.tokens.push(Token::Eof);
                    return State::Done;
                }
                Some('\\') => {
                    self.chars.next();
                    if let Err(message) = self.escape() {
                        return self.fail(message);
                    }
                }
                Some(c) if is_end_of_key(c) => break,
                Some(c) => {
                    self.chars.next();
                    self.buf.push(c);
                }
            }
        }
        if !self.buf.is_empty() {
            self.emit(Token::Key);
        }
        State::BeforeValue
    }

    fn before_value(&mut self) -> State {
        self.skip_whitespace();
        let _ = self.chars.next_if(|c| *c == ':' || *c == '=');
        self.skip_whitespace();
        State::Value
    }

    fn value(&mut self) -> State {
        loop {
            match self.chars.next() {
                None => {
                    self.emit(Token::Value);
                    self.tokens.push(Token::Eof);
                    return State::Done;
                }
                Some('\\') => match self.chars.peek().copied() {
                    Some(c) if is_eol(c) => {
                        self.chars.next();
                        if c == '\r' {
                            let _ = self.chars.next_if_eq(&'\n');
                        }
                        self.skip_whitespace();
                    }
                    _ => {
                        if let Err(message) = self.escape() {
                            return self.fail(message);
                        }
                    }
                },
                Some(c) if is_eol(c) => {
                    self.emit(Token::Value);
                    return State::BeforeKey;
                }
                Some(c) => self.buf.push(c),
            }
        }
    }

    fn escape(&mut self) -> Result<(), String> {
        match self.chars.next() {
            None => Err("premature EOF".to_string()),
            Some('u') => {
                let mut digits = String::with_capacity(4);
                for _ in 0..4 {
                    match self.chars.next() {
                        Some(c) if c.is_ascii_hexdigit() => digits.push(c),
                        _ => return Err("invalid unicode literal".to_string()),
                    }
                }
                let code = u32::from_str_radix(&digits, 16)
                    .map_err(|_| "invalid unicode literal".to_string())?;
                let c = char::from_u32(code).ok_or_else(|| "invalid unicode literal".to_string())?;
                self.buf.push(c);
                Ok(())
            }
            Some(c) => {
                self.buf.push(match c {
                    'f' => '\x0c',
                    'n' => '\n',
                    'r' => '\r',
                    't' => '\t',
                    other => other,
                });
                Ok(())
            }
        }
    }
}

fn is_eol(c: char) -> bool {
    c == '\n' || c == '\r'
}

fn is_end_of_key(c: char) -> bool {
    matches!(c, ' ' | '\x0c' | '\t' | '\r' | '\n' | ':' | '=')
}

/// 写出时的转义；`special` 中的字符额外加反斜杠
pub(crate) fn escape(s: &str, special: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\x0c' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\\' => out.push_str("\\\\"),
            c if special.contains(c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> Token {
        Token::Key(s.to_string())
    }

    fn value(s: &str) -> Token {
        Token::Value(s.to_string())
    }

    #[test]
    fn test_basic_pairs() {
        let tokens = lex("a = 1\nb:2\nc 3\n");
        assert_eq!(
            tokens,
            vec![key("a"), value("1"), key("b"), value("2"), key("c"), value("3"), Token::Eof]
        );
    }

    #[test]
    fn test_comments_and_continuation() {
        let tokens = lex("# first\n! second\nlong = a \\\n    b\n");
        assert_eq!(
            tokens,
            vec![
                Token::Comment("first".into()),
                Token::Comment("second".into()),
                key("long"),
                value("a b"),
                Token::Eof
            ]
        );
    }

    #[test]
    fn test_escapes() {
        let tokens = lex("my\\ key = tab\\there \\u0041\n");
        assert_eq!(tokens, vec![key("my key"), value("tab\there A"), Token::Eof]);

        let tokens = lex("bad = \\u00zz");
        assert!(matches!(tokens.last(), Some(Token::Error(m)) if m.contains("unicode")));
    }

    #[test]
    fn test_key_at_eof() {
        assert_eq!(lex("lonely"), vec![key("lonely"), Token::Eof]);
    }

    #[test]
    fn test_escape_output() {
        assert_eq!(escape("a b:c", " :"), "a\\ b\\:c");
        assert_eq!(escape("x\ny", ""), "x\\ny");
    }
}
