//! Parsing and classification of the simulator's end-of-match summary.
//!
//! The simulator prints a JavaScript-style object literal rather than JSON:
//!
//! ```text
//! { ranks: [ { rank: 1, agentID: 0, name: 'bot' }, { rank: 2, agentID: 1, name: 'bot' } ],
//!   replayFile: 'replays/1634227261.json', seed: 100 }
//! ```
//!
//! Keys may be bare identifiers and strings may use single quotes. [`parse_relaxed`] reads that
//! grammar into a [`serde_json::Value`], which is then deserialized into a [`MatchSummary`].
//! Expected keys are `ranks`, `rank`, `agentID`, `name`, `replayFile` and `seed`; any other key
//! is ignored.

use std::fmt::Display;

use anyhow::{anyhow, bail, Context};
use serde::Deserialize;
use serde_json::{Map, Number, Value};

/// Placement of one agent at the end of a match. Lower is better.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RankEntry {
    pub rank: u32,
    #[serde(rename = "agentID")]
    pub agent_id: u32,
    #[serde(default)]
    pub name: Option<String>,
}

/// Structured form of the simulator's stdout.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSummary {
    pub ranks: Vec<RankEntry>,
    #[serde(default)]
    pub replay_file: Option<String>,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl MatchSummary {
    /// Parse the simulator stdout.
    pub fn parse(output: &str) -> anyhow::Result<Self> {
        let value = parse_relaxed(output)?;
        serde_json::from_value(value).context("unexpected summary layout")
    }

    /// Outcome for agent 0 against agent 1.
    ///
    /// # Errors
    /// When `ranks` does not hold exactly the two agents.
    pub fn outcome(&self) -> anyhow::Result<Outcome> {
        let mut ranks = self.ranks.iter().collect::<Vec<_>>();
        ranks.sort_by_key(|r| r.agent_id);
        match ranks.as_slice() {
            [p0, p1] => Ok(Outcome::classify(p0.rank, p1.rank)),
            _ => bail!("expected 2 ranked agents, got {}", ranks.len()),
        }
    }
}

/// Result of one match from agent 0's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Win,
    Defeat,
    Draw,
    /// The simulator did not produce a usable summary.
    Crash,
}

impl Outcome {
    /// Compare agent 0's rank with agent 1's rank. A higher rank number is a worse placement.
    pub fn classify(rank_0: u32, rank_1: u32) -> Outcome {
        match rank_0.cmp(&rank_1) {
            std::cmp::Ordering::Equal => Outcome::Draw,
            std::cmp::Ordering::Greater => Outcome::Defeat,
            std::cmp::Ordering::Less => Outcome::Win,
        }
    }

    /// Same match seen from the other agent.
    pub fn swapped(self) -> Outcome {
        match self {
            Outcome::Win => Outcome::Defeat,
            Outcome::Defeat => Outcome::Win,
            other => other,
        }
    }

    /// Fixed-width label used in the per-game line.
    pub fn label(self) -> &'static str {
        match self {
            Outcome::Win => "Win     ",
            Outcome::Defeat => "Defeat  ",
            Outcome::Draw => "Equality",
            Outcome::Crash => "Crash   ",
        }
    }
}

impl Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label().trim_end())
    }
}

/// Parse an object literal using the relaxed grammar, skipping any text before the first `{`.
pub fn parse_relaxed(input: &str) -> anyhow::Result<Value> {
    let start = input
        .find('{')
        .ok_or_else(|| anyhow!("no object found in simulator output"))?;
    let mut parser = Parser {
        src: &input[start..],
        pos: 0,
    };
    let value = parser.value()?;
    parser.skip_whitespace();
    if parser.pos < parser.src.len() {
        bail!(
            "unexpected trailing text at offset {}: '{}'",
            start + parser.pos,
            parser.rest().chars().take(20).collect::<String>()
        );
    }
    Ok(value)
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn rest(&self) -> &'a str {
        let src = self.src;
        &src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn expect(&mut self, expected: char) -> anyhow::Result<()> {
        self.skip_whitespace();
        match self.bump() {
            Some(c) if c == expected => Ok(()),
            Some(c) => bail!("expected '{expected}' at offset {}, got '{c}'", self.pos - 1),
            None => bail!("expected '{expected}', got end of input"),
        }
    }

    fn value(&mut self) -> anyhow::Result<Value> {
        self.skip_whitespace();
        match self.peek() {
            Some('{') => self.object(),
            Some('[') => self.array(),
            Some(q @ ('"' | '\'')) => self.string(q).map(Value::String),
            Some(c) if c == '-' || c.is_ascii_digit() => self.number(),
            Some(c) if is_identifier_start(c) => match self.identifier() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                "null" | "undefined" => Ok(Value::Null),
                other => bail!("unexpected bare word '{other}'"),
            },
            Some(c) => bail!("unexpected character '{c}' at offset {}", self.pos),
            None => bail!("unexpected end of input"),
        }
    }

    fn object(&mut self) -> anyhow::Result<Value> {
        self.expect('{')?;
        let mut map = Map::new();
        loop {
            self.skip_whitespace();
            if self.peek() == Some('}') {
                self.bump();
                return Ok(Value::Object(map));
            }
            let key = match self.peek() {
                Some(q @ ('"' | '\'')) => self.string(q)?,
                Some(c) if is_identifier_start(c) => self.identifier().to_string(),
                Some(c) => bail!("expected a key at offset {}, got '{c}'", self.pos),
                None => bail!("unterminated object"),
            };
            self.expect(':')?;
            let value = self.value()?;
            map.insert(key, value);

            self.skip_whitespace();
            match self.bump() {
                Some(',') => continue,
                Some('}') => return Ok(Value::Object(map)),
                Some(c) => bail!("expected ',' or '}}' at offset {}, got '{c}'", self.pos - 1),
                None => bail!("unterminated object"),
            }
        }
    }

    fn array(&mut self) -> anyhow::Result<Value> {
        self.expect('[')?;
        let mut items = Vec::new();
        loop {
            self.skip_whitespace();
            if self.peek() == Some(']') {
                self.bump();
                return Ok(Value::Array(items));
            }
            items.push(self.value()?);

            self.skip_whitespace();
            match self.bump() {
                Some(',') => continue,
                Some(']') => return Ok(Value::Array(items)),
                Some(c) => bail!("expected ',' or ']' at offset {}, got '{c}'", self.pos - 1),
                None => bail!("unterminated array"),
            }
        }
    }

    fn string(&mut self, quote: char) -> anyhow::Result<String> {
        self.bump();
        let mut s = String::new();
        loop {
            match self.bump() {
                None => bail!("unterminated string"),
                Some(c) if c == quote => return Ok(s),
                Some('\\') => match self.bump() {
                    Some('n') => s.push('\n'),
                    Some('t') => s.push('\t'),
                    Some('r') => s.push('\r'),
                    Some('u') => s.push(self.unicode_escape()?),
                    Some(c) => s.push(c),
                    None => bail!("unterminated string"),
                },
                Some(c) => s.push(c),
            }
        }
    }

    fn unicode_escape(&mut self) -> anyhow::Result<char> {
        let hex = self.rest().get(..4).context("truncated \\u escape")?;
        let code = u32::from_str_radix(hex, 16).with_context(|| format!("bad escape '{hex}'"))?;
        self.pos += 4;
        Ok(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER))
    }

    fn number(&mut self) -> anyhow::Result<Value> {
        let start = self.pos;
        if self.peek() == Some('-') {
            self.bump();
        }
        let mut is_float = false;
        while let Some(c) = self.peek() {
            match c {
                '0'..='9' => {}
                '.' | 'e' | 'E' => is_float = true,
                '+' | '-' if is_float => {}
                _ => break,
            }
            self.bump();
        }
        let text = &self.src[start..self.pos];
        if !is_float {
            if let Ok(n) = text.parse::<i64>() {
                return Ok(Value::Number(n.into()));
            }
        }
        let f: f64 = text
            .parse()
            .with_context(|| format!("invalid number '{text}'"))?;
        Number::from_f64(f)
            .map(Value::Number)
            .with_context(|| format!("non-finite number '{text}'"))
    }

    fn identifier(&mut self) -> &'a str {
        let start = self.pos;
        while self.peek().is_some_and(is_identifier_continue) {
            self.bump();
        }
        let src = self.src;
        &src[start..self.pos]
    }
}

fn is_identifier_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_identifier_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}
