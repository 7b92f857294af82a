//! Calculator lexer — tokenizes source text into a stream of tokens.
//!
//! The lexer is stateful and mutable: the parser can splice text back into
//! the already-tokenized stream (`insert`) and synthesize zero-width
//! closing parentheses (`fake_right_parenthesis`) so unbalanced input can
//! be parsed optimistically in a single pass. Positions of synthesized
//! parentheses are tracked so the parser can tell real closures from
//! synthetic ones.

use crate::error::{syntax_error, CalcResult};

/// Token types produced by the lexer. Operator tokens are classed by the
/// precedence level they bind at; the lexeme carries the concrete operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Unknown,

    Number,
    Str,
    Symbol,
    Keyword,

    Separator,
    Comma,
    LeftParen,
    RightParen,

    Level2,  // postfix functions: ² ³ ⁻¹ ! ° ʳ ᵍ %
    Level3,  // power, power root: ^ ˣ√
    Level4,  // fraction: ⌟
    Level5,  // number base prefixes: d h b o
    Level6,  // statistical estimated values: ẋ ÿ
    Level7,  // permutation, combination, polar: choose permute ∠
    Level8,  // dot product: ⋅
    Level9,  // multiplication, division, modulus: * / mod
    Level10, // addition, subtraction: + -
    Level11, // relational: = ≠ > < ≥ ≤
    Level12, // logical AND
    Level13, // logical OR, XNOR, XOR

    Exponential, // ᴇ
    Sexagesimal, // ″
    Assignment,  // →
    Frequency,   // ;
    DataInput,   // DT
}

/// Program keywords. Unlike symbols, these are reserved words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    If,
    Then,
    Else,
    IfEnd,
    Goto,
    Lbl,
    For,
    To,
    Step,
    Next,
    While,
    WhileEnd,
    Break,
    ClrMemory,
    ClrStat,
    Deg,
    Rad,
    Gra,
    Dec,
    Hex,
    Bin,
    Oct,
}

impl Keyword {
    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "If" => Self::If,
            "Then" => Self::Then,
            "Else" => Self::Else,
            "IfEnd" => Self::IfEnd,
            "Goto" => Self::Goto,
            "Lbl" => Self::Lbl,
            "For" => Self::For,
            "To" => Self::To,
            "Step" => Self::Step,
            "Next" => Self::Next,
            "While" => Self::While,
            "WhileEnd" => Self::WhileEnd,
            "Break" => Self::Break,
            "ClrMemory" => Self::ClrMemory,
            "ClrStat" => Self::ClrStat,
            "Deg" => Self::Deg,
            "Rad" => Self::Rad,
            "Gra" => Self::Gra,
            "Dec" => Self::Dec,
            "Hex" => Self::Hex,
            "Bin" => Self::Bin,
            "Oct" => Self::Oct,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub start: usize,
    pub end: usize,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: impl Into<String>, start: usize, end: usize) -> Self {
        Self {
            kind,
            lexeme: lexeme.into(),
            start,
            end,
        }
    }

    pub fn is(&self, lexeme: &str) -> bool {
        self.lexeme == lexeme
    }

    pub fn keyword(&self) -> Option<Keyword> {
        if self.kind == TokenKind::Keyword {
            Keyword::from_str(&self.lexeme)
        } else {
            None
        }
    }
}

/// Statement separators: `:` is silent, `◢` emits output, `⇒` skips the
/// next statement when the result is zero.
pub const OUTPUT_SEPARATOR: &str = "◢";
pub const CONDITIONAL_JUMP_SEPARATOR: &str = "⇒";

pub const FRACTION_OPERATOR: &str = "⌟";
pub const SEXAGESIMAL_OPERATOR: &str = "″";
pub const INPUT_PROMPT: &str = "?";

/// Operator tables in match order. Earlier entries shadow later prefixes,
/// which is why `DT` and the word-like operators (`mod`, `choose`, ...) are
/// matched before identifier scanning runs.
const OPERATORS: &[(TokenKind, &[&str])] = &[
    (TokenKind::Separator, &[":", "◢", "⇒"]),
    (TokenKind::Comma, &[","]),
    (TokenKind::LeftParen, &["("]),
    (TokenKind::RightParen, &[")"]),
    (TokenKind::Level13, &["or", "xnor", "xor"]),
    (TokenKind::Level12, &["and"]),
    (TokenKind::Level11, &["=", "≠", ">", "<", "≥", "≤"]),
    (TokenKind::Level10, &["+", "-"]),
    (TokenKind::Level9, &["*", "/", "mod"]),
    (TokenKind::Level8, &["⋅"]),
    (TokenKind::Level7, &["choose", "permute", "∠"]),
    (TokenKind::Level6, &["ẋ", "ÿ"]),
    (TokenKind::Level5, &["d", "h", "b", "o"]),
    (TokenKind::Level4, &["⌟"]),
    (TokenKind::Level3, &["^", "ˣ√"]),
    (TokenKind::Level2, &["²", "³", "⁻¹", "!", "°", "ʳ", "ᵍ", "%"]),
    (TokenKind::Exponential, &["ᴇ"]),
    (TokenKind::Sexagesimal, &["″"]),
    (TokenKind::Assignment, &["→"]),
    (TokenKind::Frequency, &[";"]),
    (TokenKind::DataInput, &["DT"]),
];

fn is_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r')
}

/// Digits include the styled hex digits `𝗔`..`𝗙` so hexadecimal literals
/// tokenize as plain numbers.
pub fn is_number_char(c: char) -> bool {
    c.is_ascii_digit() || is_styled_hex_digit(c)
}

pub fn is_styled_hex_digit(c: char) -> bool {
    ('\u{1D5D4}'..='\u{1D5D9}').contains(&c)
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphabetic()
        || ('Α'..='Ω').contains(&c)
        || ('α'..='ω').contains(&c)
        || matches!(c, '∫' | '#' | '/' | '?' | '+' | '-')
}

pub struct Lexer {
    input: Vec<char>,
    original: Vec<char>,
    cursor: usize,
    faked_right_parens: Vec<usize>,
}

impl Lexer {
    pub fn new() -> Self {
        Self {
            input: Vec::new(),
            original: Vec::new(),
            cursor: 0,
            faked_right_parens: Vec::new(),
        }
    }

    /// Reset cursor and state for a new source text.
    pub fn init(&mut self, input: &str) {
        self.input = input.chars().collect();
        self.original = self.input.clone();
        self.cursor = 0;
        self.faked_right_parens.clear();
    }

    /// Splice text into the stream at `index`, shifting the cursor when it
    /// sits at or past the insertion point. Used by the parser to
    /// materialize the parenthesis pair around a division's implicit
    /// right-hand operand.
    pub fn insert(&mut self, text: &str, index: usize) {
        let inserted: Vec<char> = text.chars().collect();
        let len = inserted.len();
        self.input.splice(index..index, inserted);
        if self.cursor >= index {
            self.cursor += len;
        }
    }

    pub fn insert_at_cursor(&mut self, text: &str) {
        self.insert(text, self.cursor);
    }

    pub fn input_modified(&self) -> bool {
        self.input != self.original
    }

    pub fn input(&self, original: bool) -> String {
        if original {
            self.original.iter().collect()
        } else {
            self.input.iter().collect()
        }
    }

    /// A zero-width `0` literal, used for the elided primary of `,y` data.
    pub fn empty_zero(&self) -> Token {
        Token::new(TokenKind::Number, "0", self.cursor, self.cursor)
    }

    pub fn is_fake_right_paren(&self, index: usize) -> bool {
        self.faked_right_parens.contains(&index)
    }

    /// Synthesize a zero-width closing parenthesis at the cursor so that
    /// downstream parsing can assume balanced parentheses.
    pub fn fake_right_parenthesis(&mut self) -> Token {
        self.faked_right_parens.push(self.cursor);
        Token::new(TokenKind::RightParen, ")", self.cursor, self.cursor)
    }

    pub fn cursor_current(&self) -> usize {
        self.cursor
    }

    pub fn cursor_last(&self) -> usize {
        self.cursor.saturating_sub(1)
    }

    fn has_more(&self) -> bool {
        self.cursor < self.input.len()
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.cursor).copied()
    }

    fn peek_at(&self, index: usize) -> Option<char> {
        self.input.get(index).copied()
    }

    fn matches_at(&self, index: usize, text: &str) -> bool {
        let mut i = index;
        for c in text.chars() {
            if self.peek_at(i) != Some(c) {
                return false;
            }
            i += 1;
        }
        true
    }

    /// Return the next token, or `None` at end of input.
    pub fn next_token(&mut self) -> CalcResult<Option<Token>> {
        while self.peek().is_some_and(is_whitespace) {
            self.cursor += 1;
        }

        let Some(c) = self.peek() else {
            return Ok(None);
        };

        if is_number_char(c) || c == '.' {
            return self.scan_number().map(Some);
        }

        if c == '\'' || c == '"' {
            return Ok(Some(self.scan_string(c)));
        }

        if let Some(token) = self.scan_operator() {
            return Ok(Some(token));
        }

        if is_word_char(c) {
            return Ok(Some(self.scan_word()));
        }

        let start = self.cursor;
        self.cursor += 1;
        Ok(Some(Token::new(
            TokenKind::Unknown,
            c.to_string(),
            start,
            start,
        )))
    }

    fn scan_number(&mut self) -> CalcResult<Token> {
        let start = self.cursor;
        let mut collection = String::new();
        let mut dots = 0;
        if self.peek() == Some('.') {
            collection.push('0');
        }
        loop {
            let c = self.input[self.cursor];
            if c == '.' {
                dots += 1;
                if dots > 1 {
                    return Err(syntax_error(format!(
                        "unexpected token . at position {}",
                        self.cursor
                    )));
                }
            }
            collection.push(c);
            self.cursor += 1;
            match self.peek() {
                Some(next) if is_number_char(next) || next == '.' => continue,
                _ => break,
            }
        }
        Ok(Token::new(TokenKind::Number, collection, start, self.cursor))
    }

    fn scan_string(&mut self, quote: char) -> Token {
        let start = self.cursor;
        let mut collection = String::new();
        collection.push(quote);
        self.cursor += 1;
        while self.has_more() && self.peek() != Some(quote) {
            collection.push(self.input[self.cursor]);
            self.cursor += 1;
        }
        if self.has_more() {
            collection.push(quote);
            self.cursor += 1;
        }
        Token::new(TokenKind::Str, collection, start, self.cursor)
    }

    fn scan_operator(&mut self) -> Option<Token> {
        for &(kind, charset) in OPERATORS {
            for &op in charset {
                if self.matches_at(self.cursor, op) {
                    let start = self.cursor;
                    self.cursor += op.chars().count();
                    if kind == TokenKind::Level5 && !self.peek().is_some_and(is_number_char) {
                        // Base prefixes only apply directly before a digit;
                        // otherwise `d`, `h`, `b`, `o` scan as words.
                        self.cursor = start;
                        break;
                    }
                    return Some(Token::new(kind, op, start, self.cursor));
                }
            }
        }
        None
    }

    fn scan_word(&mut self) -> Token {
        let start = self.cursor;
        let mut collection = String::new();
        loop {
            let c = self.input[self.cursor];
            // The slash survives only directly after `d` (for d/dx), and a
            // sign only directly after `M` (for the M+ / M- targets).
            if (c == '/' && collection != "d") || ((c == '+' || c == '-') && collection != "M") {
                break;
            }
            collection.push(c);
            self.cursor += 1;
            if !self.has_more() || !is_word_char(self.input[self.cursor]) {
                break;
            }
        }
        if Keyword::from_str(&collection).is_some() {
            return Token::new(TokenKind::Keyword, collection, start, self.cursor);
        }
        Token::new(TokenKind::Symbol, collection, start, self.cursor)
    }
}

impl Default for Lexer {
    fn default() -> Self {
        Self::new()
    }
}
