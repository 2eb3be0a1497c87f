//! In-memory FITS header model.
//!
//! A `Header` is an ordered sequence of cards. Keyword cards are unique and
//! looked up case-insensitively; commentary cards (COMMENT, HISTORY and blank
//! keywords) may repeat and keep their position.

use std::collections::HashMap;
use std::fmt;

use crate::constants::NULL_SENTINEL;

/// Typed value of a header keyword
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Value {
    /// Sentinel written for a legitimately indeterminate derived value
    pub fn null() -> Self {
        Value::Str(NULL_SENTINEL.to_string())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Str(s) if s == NULL_SENTINEL)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view of the value. Strings are not coerced here.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{}", s),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Bool(true) => write!(f, "T"),
            Value::Bool(false) => write!(f, "F"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// One header card
#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    pub keyword: String,
    pub value: Option<Value>,
    pub comment: String,
}

impl Card {
    pub fn new(keyword: impl Into<String>, value: Option<Value>, comment: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into().trim().to_ascii_uppercase(),
            value,
            comment: comment.into(),
        }
    }

    /// COMMENT, HISTORY, CONTINUE and blank-keyword cards
    pub fn is_commentary(&self) -> bool {
        is_commentary_keyword(&self.keyword)
    }
}

pub(crate) fn is_commentary_keyword(keyword: &str) -> bool {
    matches!(keyword, "COMMENT" | "HISTORY" | "CONTINUE" | "")
}

/// Ordered keyword store for one HDU
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header {
    cards: Vec<Card>,
    index: HashMap<String, usize>,
}

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a header from parsed cards. A repeated keyword keeps its first
    /// position and takes the last value, as FITS readers conventionally do.
    pub fn from_cards(cards: impl IntoIterator<Item = Card>) -> Self {
        let mut header = Self::new();
        for card in cards {
            if card.is_commentary() {
                header.cards.push(card);
            } else {
                header.insert_card(card);
            }
        }
        header
    }

    pub fn get(&self, keyword: &str) -> Option<&Value> {
        self.card(keyword).and_then(|c| c.value.as_ref())
    }

    pub fn card(&self, keyword: &str) -> Option<&Card> {
        let key = keyword.trim().to_ascii_uppercase();
        self.index.get(&key).map(|&i| &self.cards[i])
    }

    pub fn contains(&self, keyword: &str) -> bool {
        self.card(keyword).is_some()
    }

    pub fn comment(&self, keyword: &str) -> Option<&str> {
        self.card(keyword).map(|c| c.comment.as_str())
    }

    /// Overwrite in place (value and comment) or append a new keyword card
    pub fn set(&mut self, keyword: &str, value: impl Into<Value>, comment: &str) {
        self.insert_card(Card::new(keyword, Some(value.into()), comment));
    }

    pub fn push_commentary(&mut self, keyword: &str, text: &str) {
        self.cards.push(Card::new(keyword, None, text));
    }

    pub fn remove(&mut self, keyword: &str) -> Option<Card> {
        let key = keyword.trim().to_ascii_uppercase();
        let pos = self.index.remove(&key)?;
        let card = self.cards.remove(pos);
        for slot in self.index.values_mut() {
            if *slot > pos {
                *slot -= 1;
            }
        }
        Some(card)
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Keyword cards only, in header order
    pub fn keywords(&self) -> impl Iterator<Item = &str> {
        self.cards
            .iter()
            .filter(|c| !c.is_commentary())
            .map(|c| c.keyword.as_str())
    }

    fn insert_card(&mut self, card: Card) {
        match self.index.get(&card.keyword) {
            Some(&pos) => self.cards[pos] = card,
            None => {
                self.index.insert(card.keyword.clone(), self.cards.len());
                self.cards.push(card);
            }
        }
    }
}
