// line tokenizer for qscript source.
//
// each source line is scanned by an explicit five-state machine:
//   0 - between tokens
//   1 - inside an identifier
//   2 - inside an expression run (numbers, operators, punctuation)
//   3 - just after a lone '='
//   4 - inside a string literal
//
// identifiers flush as ID tokens, expression runs (including the '='/'=='
// forms) flush as EXPRESSION tokens, and ',' / ';' emit SEPARATOR tokens.
// string literals keep their surrounding quotes; an unterminated string is
// flushed as-is and reported by the parser, never here. the lexer does not
// fail.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Id,
    Expression,
    Separator,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub body: String,
}

impl Token {
    fn new(kind: TokenKind, body: String) -> Self {
        Token { kind, body }
    }

    /// true for string-literal expression tokens (quotes included in body).
    pub fn is_string(&self) -> bool {
        self.kind == TokenKind::Expression && self.body.starts_with('"')
    }

    /// true for a string token whose closing quote is missing.
    pub fn is_unterminated_string(&self) -> bool {
        self.is_string() && (self.body.len() < 2 || !self.body.ends_with('"'))
    }
}

/// true when an ID token merely continues a numeric literal the scanner
/// split, e.g. the `x1F` of `0x1F` or the `e5` of `1e5`. the rewriter and
/// the argument splitter both keep such tokens glued to the digits before
/// them.
pub fn continues_numeric_literal(prev: Option<char>, body: &str) -> bool {
    let Some(last) = prev else {
        return false;
    };
    if !last.is_ascii_digit() {
        return false;
    }
    let mut chars = body.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    match first {
        'x' | 'X' | 'b' | 'B' | 'o' | 'O' => chars.all(|c| c.is_ascii_hexdigit()),
        'e' | 'E' => chars.all(|c| c.is_ascii_digit()),
        'a'..='f' | 'A'..='F' => chars.all(|c| c.is_ascii_hexdigit()),
        _ => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Class {
    Whitespace,
    Digit, // digits and '.', so numeric runs stay in one expression token
    Ident, // letters and '_'
    Equals,
    Separator,
    Quote,
    Other,
}

fn classify(c: char) -> Class {
    if c.is_whitespace() {
        Class::Whitespace
    } else if c.is_ascii_digit() || c == '.' {
        Class::Digit
    } else if c.is_alphabetic() || c == '_' {
        Class::Ident
    } else if c == '=' {
        Class::Equals
    } else if c == ',' || c == ';' {
        Class::Separator
    } else if c == '"' {
        Class::Quote
    } else {
        Class::Other
    }
}

/// tokenizes one source line. a '//' suffix is stripped before scanning.
pub fn tokenize_line(line: &str) -> Vec<Token> {
    let line = match line.find("//") {
        Some(pos) => &line[..pos],
        None => line,
    };

    let mut tokens = Vec::new();
    let mut buf = String::new();
    let mut state = 0u8;

    let flush = |state: u8, buf: &mut String, tokens: &mut Vec<Token>| {
        if buf.is_empty() {
            return;
        }
        let kind = match state {
            1 => TokenKind::Id,
            2 | 3 | 4 => TokenKind::Expression,
            _ => return,
        };
        tokens.push(Token::new(kind, std::mem::take(buf)));
    };

    for c in line.chars() {
        let class = classify(c);
        if state == 4 {
            // inside a string literal: everything but the closing quote
            // accumulates verbatim
            buf.push(c);
            if class == Class::Quote {
                flush(4, &mut buf, &mut tokens);
                state = 0;
            }
            continue;
        }
        match class {
            Class::Whitespace => {
                flush(state, &mut buf, &mut tokens);
                state = 0;
            }
            Class::Digit => match state {
                1 => buf.push(c), // identifiers may contain digits
                _ => {
                    // a digit after a lone '=' extends that expression run
                    state = 2;
                    buf.push(c);
                }
            },
            Class::Ident => match state {
                1 => buf.push(c),
                2 | 3 => {
                    flush(state, &mut buf, &mut tokens);
                    state = 1;
                    buf.push(c);
                }
                _ => {
                    state = 1;
                    buf.push(c);
                }
            },
            Class::Equals => match state {
                0 => {
                    state = 3;
                    buf.push(c);
                }
                1 => {
                    flush(1, &mut buf, &mut tokens);
                    state = 3;
                    buf.push(c);
                }
                3 => {
                    // '==' stays a single expression token
                    buf.push(c);
                    state = 2;
                }
                _ => buf.push(c), // '<=', '>=', '!=' and friends
            },
            Class::Separator => {
                flush(state, &mut buf, &mut tokens);
                tokens.push(Token::new(TokenKind::Separator, c.to_string()));
                state = 0;
            }
            Class::Quote => {
                flush(state, &mut buf, &mut tokens);
                state = 4;
                buf.push(c);
            }
            Class::Other => match state {
                1 => {
                    flush(1, &mut buf, &mut tokens);
                    state = 2;
                    buf.push(c);
                }
                3 => {
                    buf.push(c);
                    state = 2;
                }
                _ => {
                    state = 2;
                    buf.push(c);
                }
            },
        }
    }
    flush(state, &mut buf, &mut tokens);
    tokens
}
