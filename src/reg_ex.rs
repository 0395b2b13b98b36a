/* Turn a regular expression over union, concatenation and Kleene star into a
 * postfix token sequence using the shunting-yard algorithm.
 * https://en.wikipedia.org/wiki/Shunting_yard_algorithm */

use color_eyre::eyre::{Report, Result};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    Literal(char),
    Star,
    Concat,
    Union,
    LParen,
    RParen,
}

impl Token {
    /// Binding strength of an operator. `(` acts as a barrier with precedence 0.
    pub fn precedence(&self) -> u8 {
        match self {
            Token::Star => 3,
            Token::Concat => 2,
            Token::Union => 1,
            _ => 0,
        }
    }

    pub fn is_operator(&self) -> bool {
        matches!(self, Token::Star | Token::Concat | Token::Union)
    }

    // True for tokens that can close an operand: `a`, `)` and `*`
    fn ends_operand(&self) -> bool {
        matches!(self, Token::Literal(_) | Token::RParen | Token::Star)
    }

    // True for tokens that can open an operand: `a` and `(`
    fn starts_operand(&self) -> bool {
        matches!(self, Token::Literal(_) | Token::LParen)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Literal(c) => write!(f, "{}", c),
            Token::Star => write!(f, "*"),
            Token::Concat => write!(f, "."),
            Token::Union => write!(f, "|"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
        }
    }
}

#[derive(Debug)]
pub enum RegExError {
    UnbalancedParenthesisError(String),
    DanglingOperatorError(char, usize),
    MissingOperandError(char, usize),
    EmptyGroupError(usize),
}

impl fmt::Display for RegExError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegExError::UnbalancedParenthesisError(regex) => {
                write!(f, "Error: {} has unbalanced parenthesis!", regex)
            }
            RegExError::DanglingOperatorError(op, pos) => {
                write!(f, "Error: Operator {} at position {} has nothing to repeat!", op, pos)
            }
            RegExError::MissingOperandError(op, pos) => {
                write!(f, "Error: Operator {} at position {} is missing an operand!", op, pos)
            }
            RegExError::EmptyGroupError(pos) => {
                write!(f, "Error: Empty group found at position {}!", pos)
            }
        }
    }
}

impl std::error::Error for RegExError {}

/// Split a raw regex into tokens. Every character other than `(`, `)`, `|` and `*` is a literal.
pub fn tokenize(regex: &str) -> Vec<Token> {
    regex
        .chars()
        .map(|ch| match ch {
            '(' => Token::LParen,
            ')' => Token::RParen,
            '|' => Token::Union,
            '*' => Token::Star,
            other => Token::Literal(other),
        })
        .collect()
}

pub fn render_tokens(tokens: &[Token]) -> String {
    tokens.iter().map(|token| token.to_string()).collect()
}

fn balanced_brackets(tokens: &[Token]) -> bool {
    let mut depth: usize = 0;

    for token in tokens {
        match token {
            Token::LParen => depth += 1,
            Token::RParen => {
                if depth == 0 {
                    return false;
                }
                depth -= 1;
            }
            _ => {}
        }
    }
    depth == 0
}

/// Reject expressions that would hand the construction engine a malformed postfix sequence.
pub fn validate(regex: &str, tokens: &[Token]) -> Result<(), RegExError> {
    if !balanced_brackets(tokens) {
        return Err(RegExError::UnbalancedParenthesisError(regex.to_string()));
    }

    for (pos, token) in tokens.iter().enumerate() {
        let prev = if pos == 0 { None } else { tokens.get(pos - 1) };
        let next = tokens.get(pos + 1);

        match token {
            Token::Star => {
                if !prev.is_some_and(|p| p.ends_operand()) {
                    return Err(RegExError::DanglingOperatorError('*', pos));
                }
            }
            Token::Union => {
                // `|*` is reported on the star, which has nothing to repeat
                let next_ok = next.is_some_and(|n| n.starts_operand() || *n == Token::Star);
                if !prev.is_some_and(|p| p.ends_operand()) || !next_ok {
                    return Err(RegExError::MissingOperandError('|', pos));
                }
            }
            Token::RParen => {
                if prev == Some(&Token::LParen) {
                    return Err(RegExError::EmptyGroupError(pos - 1));
                }
            }
            _ => {}
        }
    }

    Ok(())
}

/// Make every implicit concatenation explicit. A marker goes after the current token unless the
/// current token is `(` or `|`, or the next token is `|`, `*` or `)`.
pub fn insert_concatenation(tokens: &[Token]) -> Vec<Token> {
    let mut result = Vec::with_capacity(tokens.len() * 2);

    for (idx, token) in tokens.iter().enumerate() {
        result.push(*token);

        let next = match tokens.get(idx + 1) {
            None => continue,
            Some(next) => next,
        };

        let current_allows = !matches!(token, Token::LParen | Token::Union);
        let next_allows = !matches!(next, Token::Union | Token::Star | Token::RParen);

        if current_allows && next_allows {
            result.push(Token::Concat);
        }
    }

    result
}

/// Shunting-yard conversion of a concatenation-explicit infix sequence to postfix.
/// Parentheses never reach the output.
pub fn infix_to_postfix(tokens: &[Token]) -> Vec<Token> {
    let mut output: Vec<Token> = Vec::with_capacity(tokens.len());
    let mut stack: Vec<Token> = Vec::new();

    for token in tokens {
        match token {
            Token::LParen => stack.push(*token),
            Token::RParen => {
                while let Some(top) = stack.pop() {
                    if top == Token::LParen {
                        break;
                    }
                    output.push(top);
                }
            }
            Token::Star | Token::Concat | Token::Union => {
                while let Some(top) = stack.last() {
                    if !top.is_operator() || top.precedence() < token.precedence() {
                        break;
                    }
                    output.push(*top);
                    stack.pop();
                }
                stack.push(*token);
            }
            Token::Literal(_) => output.push(*token),
        }
    }

    while let Some(top) = stack.pop() {
        if top.is_operator() {
            output.push(top);
        }
    }

    output
}

/// Tokenize, validate, make concatenation explicit and convert to postfix.
pub fn parse_regex(regex: &str) -> Result<Vec<Token>> {
    let tokens = tokenize(regex);

    if let Err(err) = validate(regex, &tokens) {
        return Err(Report::new(err));
    }

    let explicit = insert_concatenation(&tokens);
    let postfix = infix_to_postfix(&explicit);

    log::debug!(
        "Parsed regex {:?}: explicit form {:?}, postfix {:?}",
        regex,
        render_tokens(&explicit),
        render_tokens(&postfix)
    );

    Ok(postfix)
}
