//! Condition DSL parser.
//!
//! Recursive descent over:
//!
//! ```text
//! condition  := timeframe ':' (cross | comparison)
//! cross      := ('crossover' | 'crossunder') '(' indicator ',' indicator ')'
//! comparison := indicator ('>' | '<') target | indicator 'between' number ',' number
//! target     := price_field | number | indicator
//! indicator  := name '(' [param {',' param}] ')' ['.' field]
//! param      := number | ident '=' number
//! ```
//!
//! Errors carry the character offset of the offending token.

use crate::domain::bar::PriceField;
use crate::domain::condition::{Compare, Condition, CrossDirection, Target};
use crate::domain::error::ParseError;
use crate::domain::indicator::{IndicatorRef, IndicatorSpec, Param};
use crate::domain::timeframe::TimeframeName;

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn error(&self, message: String, position: usize) -> ParseError {
        ParseError { message, position }
    }

    fn expect_char(&mut self, expected: char) -> Result<(), ParseError> {
        self.skip_whitespace();
        match self.peek() {
            Some(ch) if ch == expected => {
                self.advance();
                Ok(())
            }
            Some(ch) => Err(self.error(
                format!("expected '{}', found '{}'", expected, ch),
                self.pos,
            )),
            None => Err(self.error(
                format!("expected '{}', found end of input", expected),
                self.pos,
            )),
        }
    }

    fn consume_char(&mut self, expected: char) -> bool {
        self.skip_whitespace();
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        let remaining = self.remaining();
        remaining.starts_with(keyword)
            && !remaining[keyword.len()..]
                .chars()
                .next()
                .is_some_and(|c| c.is_alphanumeric() || c == '_')
    }

    fn consume_keyword(&mut self, keyword: &str) -> bool {
        if self.peek_keyword(keyword) {
            self.pos += keyword.len();
            true
        } else {
            false
        }
    }

    fn peek_word(&self) -> &'a str {
        let remaining = self.remaining();
        let end = remaining
            .char_indices()
            .find(|(_, c)| !(c.is_alphanumeric() || *c == '_'))
            .map(|(i, _)| i)
            .unwrap_or(remaining.len());
        &remaining[..end]
    }

    fn describe_next(&self) -> String {
        let word = self.peek_word();
        if !word.is_empty() {
            return word.to_string();
        }
        self.peek()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "end of input".to_string())
    }

    fn parse_word(&mut self, what: &str) -> Result<(&'a str, usize), ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        let word = self.peek_word();
        if word.is_empty() || !word.starts_with(|c: char| c.is_alphabetic()) {
            return Err(self.error(
                format!("expected {}, found '{}'", what, self.describe_next()),
                start,
            ));
        }
        self.pos += word.len();
        Ok((word, start))
    }

    fn parse_number(&mut self) -> Result<f64, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        let mut has_dot = false;
        let mut digits = 0;

        if self.peek() == Some('-') {
            self.advance();
        }

        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                digits += 1;
                self.advance();
            } else if ch == '.' && !has_dot {
                has_dot = true;
                self.advance();
            } else {
                break;
            }
        }

        if digits == 0 {
            return Err(self.error("expected number".to_string(), start));
        }

        let num_str = &self.input[start..self.pos];
        num_str
            .parse::<f64>()
            .map_err(|_| self.error(format!("invalid number: {}", num_str), start))
    }

    fn starts_number(&mut self) -> bool {
        self.skip_whitespace();
        matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == '-' || c == '.')
    }

    fn parse_timeframe(&mut self) -> Result<TimeframeName, ParseError> {
        let (word, start) = self.parse_word("timeframe (short, medium, long)")?;
        let timeframe = TimeframeName::from_name(word)
            .ok_or_else(|| self.error(format!("unknown timeframe '{}'", word), start))?;
        self.expect_char(':')?;
        Ok(timeframe)
    }

    fn parse_param(&mut self) -> Result<Param, ParseError> {
        if self.starts_number() {
            return Ok(Param::positional(self.parse_number()?));
        }
        let (name, _) = self.parse_word("parameter")?;
        self.expect_char('=')?;
        Ok(Param::named(name, self.parse_number()?))
    }

    fn parse_indicator(&mut self) -> Result<IndicatorRef, ParseError> {
        let (name, start) = self.parse_word("indicator")?;
        let name = name.to_lowercase();
        self.expect_char('(')?;

        let mut params = Vec::new();
        if !self.consume_char(')') {
            loop {
                params.push(self.parse_param()?);
                if self.consume_char(',') {
                    continue;
                }
                self.expect_char(')')?;
                break;
            }
        }

        let spec = IndicatorSpec::from_params(&name, &params)
            .map_err(|e| self.error(e.to_string(), start))?;

        if self.consume_char('.') {
            let (field_name, field_start) = self.parse_word("output field")?;
            let field = spec.field_by_name(field_name).ok_or_else(|| {
                self.error(
                    format!("{} has no output '{}'", spec.name(), field_name),
                    field_start,
                )
            })?;
            return Ok(IndicatorRef { spec, field });
        }

        Ok(IndicatorRef::new(spec))
    }

    fn parse_target(&mut self) -> Result<Target, ParseError> {
        if self.starts_number() {
            return Ok(Target::Value(self.parse_number()?));
        }
        if let Some(field) = PriceField::from_name(self.peek_word()) {
            self.pos += self.peek_word().len();
            return Ok(Target::Data(field));
        }
        Ok(Target::Indicator(self.parse_indicator()?))
    }

    fn parse_cross(
        &mut self,
        timeframe: TimeframeName,
        direction: CrossDirection,
    ) -> Result<Condition, ParseError> {
        self.expect_char('(')?;
        let fast = self.parse_indicator()?;
        self.expect_char(',')?;
        let slow = self.parse_indicator()?;
        self.expect_char(')')?;
        Ok(Condition::Cross {
            timeframe,
            fast,
            slow,
            direction,
        })
    }

    fn parse_comparison(&mut self, timeframe: TimeframeName) -> Result<Condition, ParseError> {
        let indicator = self.parse_indicator()?;
        self.skip_whitespace();
        let op_pos = self.pos;

        let (compare, target) = if self.consume_char('>') {
            (Compare::Above, self.parse_target()?)
        } else if self.consume_char('<') {
            (Compare::Below, self.parse_target()?)
        } else if self.consume_keyword("between") {
            let lower = self.parse_number()?;
            self.expect_char(',')?;
            let upper_pos = self.pos;
            let upper = self.parse_number()?;
            if lower >= upper {
                return Err(self.error(
                    format!("empty range: {} is not below {}", lower, upper),
                    upper_pos,
                ));
            }
            (Compare::Between, Target::Range(lower, upper))
        } else {
            return Err(self.error(
                format!(
                    "expected '>', '<' or 'between', found '{}'",
                    self.describe_next()
                ),
                op_pos,
            ));
        };

        Ok(Condition::Comparison {
            timeframe,
            indicator,
            compare,
            target,
        })
    }

    fn parse(&mut self) -> Result<Condition, ParseError> {
        let timeframe = self.parse_timeframe()?;
        self.skip_whitespace();
        let condition = if self.consume_keyword("crossover") {
            self.parse_cross(timeframe, CrossDirection::Over)?
        } else if self.consume_keyword("crossunder") {
            self.parse_cross(timeframe, CrossDirection::Under)?
        } else {
            self.parse_comparison(timeframe)?
        };

        self.skip_whitespace();
        if self.pos < self.input.len() {
            return Err(self.error(
                format!("unexpected input after condition: '{}'", self.remaining()),
                self.pos,
            ));
        }
        Ok(condition)
    }
}

pub fn parse(input: &str) -> Result<Condition, ParseError> {
    let mut parser = Parser::new(input);
    parser.parse()
}
