//! Recursive descent parser — tokens to a flat statement list.
//!
//! One function per precedence level, thirteen binary levels plus the
//! unary prefix/postfix tiers. Implicit multiplication is resolved while
//! parsing, division retroactively parenthesizes an implicit right-hand
//! operand in the source text (through the lexer), and control constructs
//! are linked by statement index as their closing keywords are found.
//! A malformed statement is recovered into an error node and parsing
//! resumes at the next separator.

use std::collections::HashMap;

use crate::ast::{is_numeric_sexagesimal, is_numerical, Implicity, Node, NodeKind, Program};
use crate::builtins::{builtin, Builtin};
use crate::error::{
    argument_error, syntax_error, CalcResult, Diagnostic, ErrorKind,
};
use crate::lexer::{
    Keyword, Lexer, Token, TokenKind, CONDITIONAL_JUMP_SEPARATOR, OUTPUT_SEPARATOR,
};

/// Runaway-parse guard: no real program reaches this many statements.
const MAX_STATEMENTS: usize = 1000;

pub struct Parser {
    lexer: Lexer,
    lookahead: Option<Token>,
    body: Vec<Node>,
    labels: HashMap<String, usize>,
    /// Body indices of the currently open control constructs. At most one
    /// `If`, and at most one of `For`/`While`, may be open at a time; the
    /// language forbids nesting of the same kind.
    open_if: Option<usize>,
    open_for: Option<usize>,
    open_while: Option<usize>,
    argument_list_nest: usize,
}

impl Parser {
    pub fn new() -> Self {
        Self {
            lexer: Lexer::new(),
            lookahead: None,
            body: Vec::new(),
            labels: HashMap::new(),
            open_if: None,
            open_for: None,
            open_while: None,
            argument_list_nest: 0,
        }
    }

    pub fn parse(&mut self, input: &str) -> CalcResult<Program> {
        self.lexer.init(input);
        self.lookahead = self.lexer.next_token()?;
        self.body = Vec::new();
        self.labels = HashMap::new();
        self.open_if = None;
        self.open_for = None;
        self.open_while = None;
        self.argument_list_nest = 0;

        let mut statements = 0;
        while self.lookahead.is_some() {
            if statements == MAX_STATEMENTS {
                return Err(Diagnostic::new(ErrorKind::Range)
                    .with_detail("statement limit exceeded"));
            }
            match self.parse_statement() {
                Ok(node) => {
                    let index = self.body.len();
                    let opens = match node.kind {
                        NodeKind::If { .. } => Some(&mut self.open_if),
                        NodeKind::For { .. } => Some(&mut self.open_for),
                        NodeKind::While { .. } => Some(&mut self.open_while),
                        _ => None,
                    };
                    if let Some(slot) = opens {
                        *slot = Some(index);
                    }
                    self.body.push(node);
                }
                Err(err) if err.is_recoverable() => {
                    let start = self
                        .lookahead
                        .as_ref()
                        .map(|t| t.start)
                        .unwrap_or_default();
                    self.body.push(Node::new(NodeKind::Error(err), start));
                    self.argument_list_nest = 0;
                    self.jump_to_next_statement()?;
                }
                Err(err) => return Err(err),
            }
            statements += 1;
        }
        Ok(Program {
            body: std::mem::take(&mut self.body),
            labels: std::mem::take(&mut self.labels),
        })
    }

    /// The source text, as corrected by parenthesis insertion.
    pub fn input(&self, original: bool) -> String {
        self.lexer.input(original)
    }

    pub fn input_modified(&self) -> bool {
        self.lexer.input_modified()
    }

    fn current_index(&self) -> usize {
        self.body.len()
    }

    // ── token plumbing ──────────────────────────────────────────────

    fn peek_kind(&self) -> Option<TokenKind> {
        self.lookahead.as_ref().map(|t| t.kind)
    }

    fn peek_is(&self, lexeme: &str) -> bool {
        self.lookahead.as_ref().is_some_and(|t| t.is(lexeme))
    }

    fn peek_keyword(&self) -> Option<Keyword> {
        self.lookahead.as_ref().and_then(Token::keyword)
    }

    /// Consume the lookahead, inferring the expected kind. A missing
    /// right parenthesis is synthesized instead of failing, so unbalanced
    /// input parses as if it were closed.
    fn eat(&mut self, kind: TokenKind) -> CalcResult<Token> {
        if kind == TokenKind::RightParen && self.peek_kind() != Some(TokenKind::RightParen) {
            return Ok(self.lexer.fake_right_parenthesis());
        }
        let token = self.lookahead.take();
        self.lookahead = self.lexer.next_token()?;
        let token = token.ok_or_else(|| syntax_error("unexpected end of input"))?;
        if token.kind != kind {
            return Err(match token.kind {
                TokenKind::Number => {
                    syntax_error(format!("unexpected number at position {}", token.start))
                }
                TokenKind::Str => {
                    syntax_error(format!("unexpected string at position {}", token.start))
                }
                _ => syntax_error(format!(
                    "unexpected token {} at position {}",
                    token.lexeme, token.start
                )),
            });
        }
        Ok(token)
    }

    fn jump_to_next_statement(&mut self) -> CalcResult<()> {
        while let Some(token) = self.lookahead.clone() {
            self.eat(token.kind)?;
            if token.kind == TokenKind::Separator {
                return Ok(());
            }
        }
        Ok(())
    }

    // ── statements ──────────────────────────────────────────────────

    fn parse_statement(&mut self) -> CalcResult<Node> {
        if let Some(token) = self.lookahead.clone() {
            if token.kind == TokenKind::Separator {
                self.eat(TokenKind::Separator)?;
                return Err(syntax_error(format!(
                    "unexpected token {} at position {}",
                    token.lexeme, token.start
                )));
            }
        }
        let mut expression = self.parse_expression()?;
        if self.lookahead.is_some() {
            let separator = self.eat(TokenKind::Separator)?;
            match separator.lexeme.as_str() {
                OUTPUT_SEPARATOR => expression.emits_output = true,
                CONDITIONAL_JUMP_SEPARATOR => expression.conditional_jump = true,
                _ => {}
            }
        }
        Ok(expression)
    }

    fn parse_expression(&mut self) -> CalcResult<Node> {
        self.parse_if_statement()
    }

    fn parse_if_statement(&mut self) -> CalcResult<Node> {
        if self.peek_keyword() == Some(Keyword::If) {
            if self.open_if.is_some() {
                return Err(syntax_error("nested If statements are not allowed"));
            }
            let token = self.eat(TokenKind::Keyword)?;
            let condition = self.parse_expression()?;
            return Ok(Node::new(
                NodeKind::If {
                    condition: Box::new(condition),
                    then_index: None,
                    else_index: None,
                    end_index: None,
                },
                token.start,
            ));
        }
        if let Some(if_index) = self.open_if {
            let (has_then, has_else) = match &self.body[if_index].kind {
                NodeKind::If {
                    then_index,
                    else_index,
                    ..
                } => (then_index.is_some(), else_index.is_some()),
                _ => (false, false),
            };
            if !has_else && self.peek_keyword() == Some(Keyword::Else) {
                self.eat(TokenKind::Keyword)?;
                let index = self.current_index();
                if let NodeKind::If { else_index, .. } = &mut self.body[if_index].kind {
                    *else_index = Some(index);
                }
                return self.parse_expression();
            }
            if has_then {
                if self.peek_keyword() == Some(Keyword::IfEnd) {
                    let token = self.eat(TokenKind::Keyword)?;
                    let index = self.current_index();
                    if let NodeKind::If { end_index, .. } = &mut self.body[if_index].kind {
                        *end_index = Some(index);
                    }
                    self.open_if = None;
                    return Ok(Node::new(NodeKind::IfEnd, token.start));
                }
            } else {
                if self.peek_keyword() != Some(Keyword::Then) {
                    return Err(syntax_error("expected Then after If"));
                }
                self.eat(TokenKind::Keyword)?;
                let index = self.current_index();
                if let NodeKind::If { then_index, .. } = &mut self.body[if_index].kind {
                    *then_index = Some(index);
                }
                return self.parse_expression();
            }
        }
        self.parse_for_statement()
    }

    fn parse_for_statement(&mut self) -> CalcResult<Node> {
        if self.peek_keyword() == Some(Keyword::For) {
            if self.open_for.is_some() || self.open_while.is_some() {
                return Err(syntax_error("nested For statements are not allowed"));
            }
            let token = self.eat(TokenKind::Keyword)?;
            let assignment = self.parse_assignment_expression()?;
            if !matches!(assignment.kind, NodeKind::Assignment { .. }) {
                return Err(syntax_error("expected variable assignment after For"));
            }
            if self.peek_keyword() != Some(Keyword::To) {
                return Err(syntax_error("expected To after For"));
            }
            self.eat(TokenKind::Keyword)?;
            let limit = self.parse_expression()?;
            let step = if self.peek_keyword() == Some(Keyword::Step) {
                self.eat(TokenKind::Keyword)?;
                Some(Box::new(self.parse_expression()?))
            } else {
                None
            };
            return Ok(Node::new(
                NodeKind::For {
                    start_index: self.current_index(),
                    assignment: Box::new(assignment),
                    limit: Box::new(limit),
                    step,
                    end_index: None,
                },
                token.start,
            ));
        }
        if self.open_for.is_some() && self.peek_keyword() == Some(Keyword::Next) {
            let token = self.eat(TokenKind::Keyword)?;
            let index = self.current_index();
            if let Some(for_index) = self.open_for.take() {
                if let NodeKind::For { end_index, .. } = &mut self.body[for_index].kind {
                    *end_index = Some(index);
                }
            }
            return Ok(Node::new(NodeKind::Next, token.start));
        }
        self.parse_while_statement()
    }

    fn parse_while_statement(&mut self) -> CalcResult<Node> {
        if self.peek_keyword() == Some(Keyword::While) {
            if self.open_for.is_some() || self.open_while.is_some() {
                return Err(syntax_error("nested While statements are not allowed"));
            }
            let token = self.eat(TokenKind::Keyword)?;
            let condition = self.parse_expression()?;
            return Ok(Node::new(
                NodeKind::While {
                    condition: Box::new(condition),
                    start_index: self.current_index(),
                    end_index: None,
                },
                token.start,
            ));
        }
        if self.open_while.is_some() && self.peek_keyword() == Some(Keyword::WhileEnd) {
            let token = self.eat(TokenKind::Keyword)?;
            let index = self.current_index();
            if let Some(while_index) = self.open_while.take() {
                if let NodeKind::While { end_index, .. } = &mut self.body[while_index].kind {
                    *end_index = Some(index);
                }
            }
            return Ok(Node::new(NodeKind::WhileEnd, token.start));
        }
        self.parse_break_statement()
    }

    fn parse_break_statement(&mut self) -> CalcResult<Node> {
        if self.peek_keyword() == Some(Keyword::Break) {
            let token = self.eat(TokenKind::Keyword)?;
            let loop_index = self
                .open_for
                .or(self.open_while)
                .ok_or_else(|| syntax_error("Break can only be used inside a For or While loop"))?;
            return Ok(Node::new(NodeKind::Break { loop_index }, token.start));
        }
        self.parse_jump_statement()
    }

    fn parse_jump_statement(&mut self) -> CalcResult<Node> {
        let goto = self.peek_keyword() == Some(Keyword::Goto);
        if goto || self.peek_keyword() == Some(Keyword::Lbl) {
            let keyword = self.eat(TokenKind::Keyword)?;
            let arg = self.parse_assignment_expression()?;
            let NodeKind::Number(label) = arg.kind else {
                return Err(argument_error(format!(
                    "{} statement must be followed by a number",
                    keyword.lexeme
                )));
            };
            if !goto {
                self.labels.insert(label.clone(), self.current_index());
            }
            return Ok(Node::new(NodeKind::Jump { goto, label }, keyword.start));
        }
        self.parse_assignment_expression()
    }

    fn parse_assignment_expression(&mut self) -> CalcResult<Node> {
        let left = self.parse_data_input_expression()?;
        if self.peek_kind() == Some(TokenKind::Assignment) {
            self.eat(TokenKind::Assignment)?;
            let identifier = self.parse_symbol()?;
            let NodeKind::Symbol(target) = identifier.kind else {
                unreachable!("parse_symbol always yields a symbol");
            };
            let start = left.start;
            return Ok(Node::new(
                NodeKind::Assignment {
                    target,
                    value: Box::new(left),
                },
                start,
            ));
        }
        Ok(left)
    }

    // ── data input layer ────────────────────────────────────────────

    fn parse_data_input_expression(&mut self) -> CalcResult<Node> {
        let left = self.parse_frequency()?;
        if self.peek_kind() == Some(TokenKind::DataInput) {
            self.eat(TokenKind::DataInput)?;
            let start = left.start;
            let kind = match left.kind {
                NodeKind::FrequencyPair { value, frequency } => NodeKind::DataInput {
                    value,
                    frequency: Some(frequency),
                },
                _ => NodeKind::DataInput {
                    value: Box::new(left),
                    frequency: None,
                },
            };
            return Ok(Node::new(kind, start));
        }
        Ok(left)
    }

    fn parse_frequency(&mut self) -> CalcResult<Node> {
        let left = self.parse_paired_datum()?;
        if self.peek_kind() == Some(TokenKind::Frequency) {
            self.eat(TokenKind::Frequency)?;
            let right = self.parse_level13()?;
            let start = left.start;
            return Ok(Node::new(
                NodeKind::FrequencyPair {
                    value: Box::new(left),
                    frequency: Box::new(right),
                },
                start,
            ));
        }
        Ok(left)
    }

    fn parse_paired_datum(&mut self) -> CalcResult<Node> {
        // `;3 DT` — no value at all: repeat the previous data line.
        if self.peek_kind() == Some(TokenKind::Frequency) {
            return Ok(Node::new(NodeKind::DittoDatum, self.lexer.cursor_current()));
        }
        // `,2;3 DT` — elided primary.
        if self.peek_kind() == Some(TokenKind::Comma) {
            let operator = self.eat(TokenKind::Comma)?;
            let right = self.parse_level13()?;
            let zero = self.implicit_zero();
            return Ok(Node::new(
                NodeKind::PairedDatum {
                    primary: Some(Box::new(zero)),
                    secondary: Box::new(right),
                },
                operator.start,
            ));
        }
        let left = self.parse_level13()?;
        if self.argument_list_nest > 0 {
            return Ok(left);
        }
        if self.peek_kind() == Some(TokenKind::Comma) {
            self.eat(TokenKind::Comma)?;
            let right = self.parse_level13()?;
            let start = left.start;
            return Ok(Node::new(
                NodeKind::PairedDatum {
                    primary: Some(Box::new(left)),
                    secondary: Box::new(right),
                },
                start,
            ));
        }
        Ok(left)
    }

    fn implicit_zero(&self) -> Node {
        let token = self.lexer.empty_zero();
        Node::new(NodeKind::Number(token.lexeme), token.start)
    }

    // ── binary precedence levels ────────────────────────────────────

    fn binary_level(
        &mut self,
        kind: TokenKind,
        next: fn(&mut Self) -> CalcResult<Node>,
    ) -> CalcResult<Node> {
        let mut left = next(self)?;
        while self.peek_kind() == Some(kind) {
            let operator = self.eat(kind)?;
            let right = next(self)?;
            let start = left.start;
            left = Node::new(
                NodeKind::Binary {
                    op: operator.lexeme,
                    left: Box::new(left),
                    right: Box::new(right),
                    implicity: Implicity::Explicit,
                },
                start,
            );
        }
        Ok(left)
    }

    fn parse_level13(&mut self) -> CalcResult<Node> {
        self.binary_level(TokenKind::Level13, Self::parse_level12)
    }

    fn parse_level12(&mut self) -> CalcResult<Node> {
        self.binary_level(TokenKind::Level12, Self::parse_level11)
    }

    fn parse_level11(&mut self) -> CalcResult<Node> {
        self.binary_level(TokenKind::Level11, Self::parse_level10)
    }

    fn parse_level10(&mut self) -> CalcResult<Node> {
        self.binary_level(TokenKind::Level10, Self::parse_implicit_multiplication)
    }

    /// Whether the lookahead can juxtapose onto a finished operand:
    /// an opening parenthesis, a symbol, or the exponential operator.
    fn juxtaposes(&self) -> bool {
        matches!(
            self.peek_kind(),
            Some(TokenKind::LeftParen) | Some(TokenKind::Symbol) | Some(TokenKind::Exponential)
        )
    }

    fn parse_implicit_multiplication(&mut self) -> CalcResult<Node> {
        let left = self.parse_multiplication()?;
        self.juxtaposition_chain(left)
    }

    /// Synthesize `*` nodes for juxtaposed operands, tagging each with how
    /// the implicit product was written.
    fn juxtaposition_chain(&mut self, mut left: Node) -> CalcResult<Node> {
        while self.juxtaposes() {
            let parenthesized = self.peek_kind() == Some(TokenKind::LeftParen);
            let right = self.parse_level7()?;
            let implicity = if parenthesized
                && left.operator() == Some(crate::lexer::SEXAGESIMAL_OPERATOR)
                && right.operator() == Some(crate::lexer::SEXAGESIMAL_OPERATOR)
                && is_numeric_sexagesimal(&left)
                && is_numeric_sexagesimal(&right)
            {
                Implicity::ParenthesizedSexagesimal
            } else if parenthesized {
                Implicity::Parenthesized
            } else {
                Implicity::Bare
            };
            let start = left.start;
            left = Node::new(
                NodeKind::Binary {
                    op: "*".to_string(),
                    left: Box::new(left),
                    right: Box::new(right),
                    implicity,
                },
                start,
            );
        }
        Ok(left)
    }

    fn parse_multiplication(&mut self) -> CalcResult<Node> {
        let mut left = self.parse_division()?;
        while self.peek_is("*") || self.peek_is("mod") {
            let operator = self.eat(TokenKind::Level9)?;
            let right = self.parse_division()?;
            let start = left.start;
            left = Node::new(
                NodeKind::Binary {
                    op: operator.lexeme,
                    left: Box::new(left),
                    right: Box::new(right),
                    implicity: Implicity::Explicit,
                },
                start,
            );
        }
        Ok(left)
    }

    fn parse_division(&mut self) -> CalcResult<Node> {
        let mut left = self.parse_level8()?;
        while self.peek_is("/") {
            let operator = self.eat(TokenKind::Level9)?;
            // The right operand greedily takes a juxtaposition chain, so
            // `a/bc` groups as `a/(b·c)` per calculator convention.
            let unit = self.parse_level8()?;
            let right = self.juxtaposition_chain(unit)?;
            let implicity = right.implicity();
            if matches!(right.kind, NodeKind::Binary { .. }) && implicity != Implicity::Explicit {
                // Make the grouping visible in the corrected source text.
                self.lexer.insert("(", right.start);
                if implicity != Implicity::Parenthesized
                    || !self.lexer.is_fake_right_paren(self.lexer.cursor_last())
                {
                    self.lexer.insert_at_cursor(")");
                }
            }
            let start = left.start;
            left = Node::new(
                NodeKind::Binary {
                    op: operator.lexeme,
                    left: Box::new(left),
                    right: Box::new(right),
                    implicity: Implicity::Explicit,
                },
                start,
            );
        }
        Ok(left)
    }

    fn parse_level8(&mut self) -> CalcResult<Node> {
        self.binary_level(TokenKind::Level8, Self::parse_level7)
    }

    fn parse_level7(&mut self) -> CalcResult<Node> {
        self.binary_level(TokenKind::Level7, Self::parse_level6)
    }

    fn parse_level6(&mut self) -> CalcResult<Node> {
        let mut arg = self.parse_level5()?;
        while self.peek_kind() == Some(TokenKind::Level6) {
            let operator = self.eat(TokenKind::Level6)?;
            let start = arg.start;
            arg = Node::new(
                NodeKind::Unary {
                    op: operator.lexeme,
                    arg: Box::new(arg),
                },
                start,
            );
        }
        Ok(arg)
    }

    fn parse_level5(&mut self) -> CalcResult<Node> {
        if self.peek_kind() == Some(TokenKind::Level10) {
            // Unary plus and minus bind here, below the postfix tiers.
            let operator = self.eat(TokenKind::Level10)?;
            let arg = self.parse_level5()?;
            return Ok(Node::new(
                NodeKind::Unary {
                    op: operator.lexeme,
                    arg: Box::new(arg),
                },
                operator.start,
            ));
        }
        if self.peek_kind() == Some(TokenKind::Level5) {
            let operator = self.eat(TokenKind::Level5)?;
            let arg = self.parse_level4()?;
            return Ok(Node::new(
                NodeKind::Unary {
                    op: operator.lexeme,
                    arg: Box::new(arg),
                },
                operator.start,
            ));
        }
        self.parse_level4()
    }

    fn parse_level4(&mut self) -> CalcResult<Node> {
        let left = self.parse_level3()?;
        if self.peek_kind() == Some(TokenKind::Level4) {
            let operator = self.eat(TokenKind::Level4)?;
            let middle = self.parse_level3()?;
            let start = left.start;
            if self.peek_kind() == Some(TokenKind::Level4) {
                self.eat(TokenKind::Level4)?;
                let right = self.parse_level3()?;
                return Ok(Node::new(
                    NodeKind::Ternary {
                        op: operator.lexeme,
                        left: Box::new(left),
                        middle: Box::new(middle),
                        right: Box::new(right),
                    },
                    start,
                ));
            }
            return Ok(Node::new(
                NodeKind::Binary {
                    op: operator.lexeme,
                    left: Box::new(left),
                    right: Box::new(middle),
                    implicity: Implicity::Explicit,
                },
                start,
            ));
        }
        Ok(left)
    }

    fn parse_level3(&mut self) -> CalcResult<Node> {
        self.binary_level(TokenKind::Level3, Self::parse_sexagesimal)
    }

    fn parse_sexagesimal(&mut self) -> CalcResult<Node> {
        let left = self.parse_level2()?;
        if self.argument_list_nest > 0 {
            return Ok(left);
        }
        if self.peek_kind() != Some(TokenKind::Sexagesimal) {
            return Ok(left);
        }
        let operator = self.eat(TokenKind::Sexagesimal)?;
        let start = left.start;
        if self.peek_kind() == Some(TokenKind::Number) {
            let middle = self.parse_level2()?;
            if self.peek_kind() == Some(TokenKind::Sexagesimal) {
                self.eat(TokenKind::Sexagesimal)?;
            }
            if self.peek_kind() == Some(TokenKind::Number) {
                let right = self.parse_level2()?;
                if self.peek_kind() == Some(TokenKind::Sexagesimal) {
                    self.eat(TokenKind::Sexagesimal)?;
                }
                return Ok(Node::new(
                    NodeKind::Ternary {
                        op: operator.lexeme,
                        left: Box::new(left),
                        middle: Box::new(middle),
                        right: Box::new(right),
                    },
                    start,
                ));
            }
            return Ok(Node::new(
                NodeKind::Binary {
                    op: operator.lexeme,
                    left: Box::new(left),
                    right: Box::new(middle),
                    implicity: Implicity::Explicit,
                },
                start,
            ));
        }
        Ok(Node::new(
            NodeKind::Unary {
                op: operator.lexeme,
                arg: Box::new(left),
            },
            start,
        ))
    }

    fn parse_level2(&mut self) -> CalcResult<Node> {
        if self.peek_kind() == Some(TokenKind::Exponential) {
            let operator = self.eat(TokenKind::Exponential)?;
            let arg = self.parse_level5()?;
            if !is_numerical(&arg) {
                return Err(syntax_error(format!(
                    "{} must be followed by a number",
                    operator.lexeme
                )));
            }
            return Ok(Node::new(
                NodeKind::Unary {
                    op: operator.lexeme,
                    arg: Box::new(arg),
                },
                operator.start,
            ));
        }
        let mut arg = self.parse_call_expression()?;
        while self.peek_kind() == Some(TokenKind::Level2) {
            let operator = self.eat(TokenKind::Level2)?;
            let start = arg.start;
            arg = Node::new(
                NodeKind::Unary {
                    op: operator.lexeme,
                    arg: Box::new(arg),
                },
                start,
            );
        }
        Ok(arg)
    }

    fn parse_call_expression(&mut self) -> CalcResult<Node> {
        let left = self.parse_primary()?;
        if let NodeKind::Symbol(ref name) = left.kind {
            if let Some(func) = builtin(name) {
                let start = left.start;
                let callee = name.clone();
                let args = self.parse_argument_list(func)?;
                return Ok(Node::new(NodeKind::Call { callee, args }, start));
            }
        }
        Ok(left)
    }

    fn parse_argument_list(&mut self, func: &Builtin) -> CalcResult<Vec<Node>> {
        if func.requires_parens() || self.peek_kind() == Some(TokenKind::LeftParen) {
            let (min, max) = func.arity();
            self.eat(TokenKind::LeftParen)?;
            self.argument_list_nest += 1;
            let result = (|| {
                let mut args = vec![self.parse_expression()?];
                while self.peek_kind() == Some(TokenKind::Comma) && args.len() < max {
                    self.eat(TokenKind::Comma)?;
                    args.push(self.parse_expression()?);
                }
                Ok(args)
            })();
            self.argument_list_nest -= 1;
            let args = result?;
            if args.len() < min {
                return Err(syntax_error(format!(
                    "expected {min} arguments, but got {}",
                    args.len()
                )));
            }
            self.eat(TokenKind::RightParen)?;
            Ok(args)
        } else {
            Ok(vec![self.parse_expression()?])
        }
    }

    fn parse_primary(&mut self) -> CalcResult<Node> {
        match self.peek_kind() {
            Some(TokenKind::LeftParen) => self.parse_parenthesized(),
            Some(TokenKind::Symbol) => self.parse_symbol(),
            Some(TokenKind::Keyword) => self.parse_command(),
            _ => self.parse_literal(),
        }
    }

    fn parse_parenthesized(&mut self) -> CalcResult<Node> {
        self.eat(TokenKind::LeftParen)?;
        let expression = self.parse_level11()?;
        self.eat(TokenKind::RightParen)?;
        Ok(expression)
    }

    fn parse_symbol(&mut self) -> CalcResult<Node> {
        let token = self.eat(TokenKind::Symbol)?;
        Ok(Node::new(NodeKind::Symbol(token.lexeme), token.start))
    }

    fn parse_command(&mut self) -> CalcResult<Node> {
        let token = self.eat(TokenKind::Keyword)?;
        let keyword = Keyword::from_str(&token.lexeme)
            .ok_or_else(|| syntax_error(format!("unknown keyword {}", token.lexeme)))?;
        Ok(Node::new(NodeKind::Command(keyword), token.start))
    }

    fn parse_literal(&mut self) -> CalcResult<Node> {
        match self.peek_kind() {
            Some(TokenKind::Number) => {
                let token = self.eat(TokenKind::Number)?;
                Ok(Node::new(NodeKind::Number(token.lexeme), token.start))
            }
            Some(TokenKind::Str) => {
                let token = self.eat(TokenKind::Str)?;
                let inner = token
                    .lexeme
                    .get(1..token.lexeme.len().saturating_sub(1))
                    .unwrap_or_default()
                    .to_string();
                Ok(Node::new(NodeKind::Str(inner), token.start))
            }
            Some(kind) => {
                let token = self.eat(kind)?;
                Err(syntax_error(format!(
                    "unexpected {} at position {}",
                    token.lexeme, token.start
                )))
            }
            None => Err(syntax_error("unexpected end of input")),
        }
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Program {
        Parser::new().parse(src).unwrap()
    }

    fn first(src: &str) -> Node {
        parse(src).body.into_iter().next().unwrap()
    }

    /// Strip positions and implicity so trees can be compared shape-wise.
    fn shape(node: &Node) -> String {
        match &node.kind {
            NodeKind::Number(n) => n.clone(),
            NodeKind::Str(s) => format!("{s:?}"),
            NodeKind::Symbol(s) => s.clone(),
            NodeKind::Command(k) => format!("{k:?}"),
            NodeKind::Unary { op, arg } => format!("({op} {})", shape(arg)),
            NodeKind::Binary {
                op, left, right, ..
            } => format!("({op} {} {})", shape(left), shape(right)),
            NodeKind::Ternary {
                op,
                left,
                middle,
                right,
            } => format!("({op} {} {} {})", shape(left), shape(middle), shape(right)),
            NodeKind::Call { callee, args } => {
                let args: Vec<String> = args.iter().map(shape).collect();
                format!("{callee}({})", args.join(","))
            }
            NodeKind::Assignment { target, value } => format!("({} → {target})", shape(value)),
            other => format!("{other:?}"),
        }
    }

    #[test]
    fn precedence_climbing() {
        assert_eq!(shape(&first("2 + 3 * 4")), "(+ 2 (* 3 4))");
        assert_eq!(shape(&first("7 * 8 - 4 * 5")), "(- (* 7 8) (* 4 5))");
        assert_eq!(shape(&first("(2 + 3) * 4")), "(* (+ 2 3) 4)");
        assert_eq!(shape(&first("1 = 2 or 3 < 4")), "(or (= 1 2) (< 3 4))");
    }

    #[test]
    fn explicit_multiplicative_chain_is_left_to_right() {
        assert_eq!(shape(&first("8 / 2 * 4")), "(* (/ 8 2) 4)");
        assert_eq!(shape(&first("17 mod 5")), "(mod 17 5)");
    }

    #[test]
    fn implicit_multiplication_shapes() {
        assert_eq!(shape(&first("2A")), "(* 2 A)");
        assert_eq!(shape(&first("2(3+1)")), "(* 2 (+ 3 1))");
        assert_eq!(shape(&first("3(5ᴇ-9)")), "(* 3 (* 5 (ᴇ (- 9))))");
    }

    #[test]
    fn division_groups_implicit_right_operand() {
        // a/bc must parse identically to a/(b*c)
        let implicit = shape(&first("6/2A"));
        let explicit = shape(&first("6/(2*A)"));
        assert_eq!(implicit, explicit);
        assert_eq!(implicit, "(/ 6 (* 2 A))");
    }

    #[test]
    fn division_correction_rewrites_source() {
        let mut parser = Parser::new();
        parser.parse("6/2A").unwrap();
        assert!(parser.input_modified());
        assert_eq!(parser.input(true), "6/2A");
        assert!(parser.input(false).contains("(2A"));
    }

    #[test]
    fn unary_minus_binds_below_postfix() {
        // -2! is -(2!)
        assert_eq!(shape(&first("-2!")), "(- (! 2))");
        // -2^(2⌟3) is -(2^(2/3))
        assert_eq!(shape(&first("-2^(2⌟3)")), "(- (^ 2 (⌟ 2 3)))");
    }

    #[test]
    fn fraction_forms() {
        assert_eq!(shape(&first("2⌟3")), "(⌟ 2 3)");
        assert_eq!(shape(&first("3⌟1⌟4")), "(⌟ 3 1 4)");
    }

    #[test]
    fn sexagesimal_forms() {
        assert_eq!(shape(&first("2″")), "(″ 2)");
        assert_eq!(shape(&first("2″20″")), "(″ 2 20)");
        assert_eq!(shape(&first("2″20″30″")), "(″ 2 20 30)");
        // trailing mark is optional
        assert_eq!(shape(&first("2″20″30")), "(″ 2 20 30)");
        assert_eq!(
            shape(&first("2″20″30 + 0″39″30")),
            "(+ (″ 2 20 30) (″ 0 39 30))"
        );
    }

    #[test]
    fn call_with_and_without_parens() {
        assert_eq!(shape(&first("sin(30)")), "sin(30)");
        assert_eq!(shape(&first("ln 90")), "ln(90)");
        assert_eq!(shape(&first("log(2, 16)")), "log(2,16)");
        assert_eq!(shape(&first("RanInt(1, 6)")), "RanInt(1,6)");
    }

    #[test]
    fn assignment_and_prompt() {
        assert_eq!(shape(&first("3 + 5 → A")), "((+ 3 5) → A)");
        assert_eq!(shape(&first("? → A")), "(? → A)");
        assert_eq!(shape(&first("8 → M+")), "(8 → M+)");
    }

    #[test]
    fn statement_flags_from_separators() {
        let program = parse("5 → A: A²◢ Ans²");
        assert_eq!(program.body.len(), 3);
        assert!(!program.body[0].emits_output);
        assert!(program.body[1].emits_output);
        assert!(!program.body[2].emits_output);
        let program = parse("A=1 ⇒ 2: 3");
        assert!(program.body[0].conditional_jump);
    }

    #[test]
    fn if_statement_linking() {
        let program = parse("If A=1: Then 2: Else 3: IfEnd: 4");
        match &program.body[0].kind {
            NodeKind::If {
                then_index,
                else_index,
                end_index,
                ..
            } => {
                assert_eq!(*then_index, Some(1));
                assert_eq!(*else_index, Some(2));
                assert_eq!(*end_index, Some(3));
            }
            other => panic!("expected If, got {other:?}"),
        }
        assert!(matches!(program.body[3].kind, NodeKind::IfEnd));
    }

    #[test]
    fn for_statement_linking() {
        let program = parse("For 1 → A To 9 Step 2: A◢ Next");
        match &program.body[0].kind {
            NodeKind::For {
                start_index,
                step,
                end_index,
                ..
            } => {
                assert_eq!(*start_index, 0);
                assert!(step.is_some());
                assert_eq!(*end_index, Some(2));
            }
            other => panic!("expected For, got {other:?}"),
        }
    }

    #[test]
    fn while_statement_linking() {
        let program = parse("While A<5: A+1 → A: WhileEnd");
        match &program.body[0].kind {
            NodeKind::While {
                start_index,
                end_index,
                ..
            } => {
                assert_eq!(*start_index, 0);
                assert_eq!(*end_index, Some(2));
            }
            other => panic!("expected While, got {other:?}"),
        }
    }

    #[test]
    fn nested_constructs_are_rejected_and_recovered() {
        // The second If is malformed; it becomes an error node and the
        // rest of the program still parses.
        let program = parse("If 1: Then If 2: 5");
        assert!(program
            .body
            .iter()
            .any(|n| matches!(n.kind, NodeKind::Error(_))));
        let program = parse("For 1 → A To 3: While 1: 5");
        assert!(program
            .body
            .iter()
            .any(|n| matches!(n.kind, NodeKind::Error(_))));
    }

    #[test]
    fn break_outside_loop_is_an_error_node() {
        let program = parse("Break: 5");
        assert!(matches!(program.body[0].kind, NodeKind::Error(_)));
        assert!(matches!(program.body[1].kind, NodeKind::Number(_)));
    }

    #[test]
    fn goto_and_label_register() {
        let program = parse("5: Goto 1: 1/0: Lbl 1");
        assert_eq!(program.labels.get("1"), Some(&3));
        assert!(matches!(
            program.body[1].kind,
            NodeKind::Jump { goto: true, .. }
        ));
        assert!(matches!(
            program.body[3].kind,
            NodeKind::Jump { goto: false, .. }
        ));
    }

    #[test]
    fn goto_requires_numeric_label() {
        let program = parse("Goto A: 5");
        assert!(matches!(program.body[0].kind, NodeKind::Error(_)));
    }

    #[test]
    fn unbalanced_parens_are_closed_synthetically() {
        let node = first("2 * (1 + 3");
        assert_eq!(shape(&node), "(* 2 (+ 1 3))");
    }

    #[test]
    fn data_input_forms() {
        let program = parse("5 DT");
        assert!(matches!(
            program.body[0].kind,
            NodeKind::DataInput { frequency: None, .. }
        ));
        let program = parse("5;3 DT");
        match &program.body[0].kind {
            NodeKind::DataInput {
                frequency: Some(_), ..
            } => {}
            other => panic!("expected DataInput with frequency, got {other:?}"),
        }
        let program = parse("1,2 DT");
        match &program.body[0].kind {
            NodeKind::DataInput { value, .. } => {
                assert!(matches!(value.kind, NodeKind::PairedDatum { .. }));
            }
            other => panic!("expected paired DataInput, got {other:?}"),
        }
    }

    #[test]
    fn empty_statement_recovers() {
        let program = parse("::5");
        assert!(matches!(program.body[0].kind, NodeKind::Error(_)));
    }

    #[test]
    fn commas_suppressed_inside_argument_lists() {
        // log(2, 16): the comma separates arguments, it does not build a
        // paired datum.
        assert_eq!(shape(&first("log(2, 16)")), "log(2,16)");
    }
}
