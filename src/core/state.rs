//! Symbolic item states.
//!
//! A state is a fixed-length vector of tokens. One-dimensional states are
//! plain tokens such as `idle`; higher dimensions are written joined by
//! [`SEPARATOR`], e.g. `aiming-loaded`. A token equal to [`WILDCARD`] turns
//! the value into a pattern that matches any token in that position.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Reserved separator between the tokens of a serialized state.
pub const SEPARATOR: char = '-';

/// Token matching any value in its dimension.
pub const WILDCARD: &str = "*";

/// Errors raised while constructing or combining states.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("State has no tokens")]
    Empty,

    #[error("State token at position {index} is empty")]
    EmptyToken { index: usize },

    #[error("State token '{token}' contains the reserved separator '-'")]
    ReservedSeparator { token: String },

    #[error("Dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("Index {index} is out of range for a state of dimension {dimension}")]
    IndexOutOfRange { index: usize, dimension: usize },
}

/// Immutable, hashable item state.
///
/// Cloning is cheap: tokens live behind an [`Arc`], so states can be used as
/// map keys on hot paths. Equality and hashing are structural; use
/// [`State::ptr_eq`] to test whether two values share the same interned
/// storage (see [`StateCache`](crate::core::StateCache)).
///
/// # Example
///
/// ```rust
/// use toolstate::core::State;
///
/// let pattern: State = "*-loaded".parse().unwrap();
/// let current: State = "aiming-empty".parse().unwrap();
///
/// assert_eq!(pattern.merge(&current).unwrap().to_string(), "aiming-loaded");
/// assert!(!pattern.matches(&current));
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct State {
    tokens: Arc<[Box<str>]>,
}

impl State {
    /// Build a one-dimensional state.
    pub fn single(token: impl Into<String>) -> Result<Self, StateError> {
        Self::vector([token.into()])
    }

    /// Build a state from its tokens, one per dimension.
    pub fn vector<I, T>(tokens: I) -> Result<Self, StateError>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let tokens = tokens
            .into_iter()
            .map(|token| token.into().into_boxed_str())
            .collect::<Vec<_>>();

        if tokens.is_empty() {
            return Err(StateError::Empty);
        }

        for (index, token) in tokens.iter().enumerate() {
            if token.is_empty() {
                return Err(StateError::EmptyToken { index });
            }
            if token.contains(SEPARATOR) {
                return Err(StateError::ReservedSeparator {
                    token: token.to_string(),
                });
            }
        }

        Ok(Self {
            tokens: tokens.into(),
        })
    }

    /// Parse a serialized state (`a-b-c`).
    pub fn parse(text: &str) -> Result<Self, StateError> {
        if text.is_empty() {
            return Err(StateError::Empty);
        }
        Self::vector(text.split(SEPARATOR))
    }

    /// A pattern of the given dimension with every position left free.
    pub fn any(dimension: usize) -> Result<Self, StateError> {
        Self::vector(std::iter::repeat(WILDCARD).take(dimension))
    }

    pub fn dimension(&self) -> usize {
        self.tokens.len()
    }

    pub fn token(&self, index: usize) -> Option<&str> {
        self.tokens.get(index).map(|token| &**token)
    }

    pub fn tokens(&self) -> impl Iterator<Item = &str> + '_ {
        self.tokens.iter().map(|token| &**token)
    }

    /// True if at least one position is the wildcard.
    pub fn is_pattern(&self) -> bool {
        self.tokens().any(|token| token == WILDCARD)
    }

    pub fn is_concrete(&self) -> bool {
        !self.is_pattern()
    }

    /// Positional match of this pattern against a state.
    ///
    /// States of another dimension never match.
    pub fn matches(&self, state: &State) -> bool {
        self.dimension() == state.dimension()
            && self
                .tokens()
                .zip(state.tokens())
                .all(|(pattern, token)| pattern == WILDCARD || pattern == token)
    }

    /// Replace the token at `index`, producing a new state.
    pub fn substitute(&self, index: usize, value: &str) -> Result<Self, StateError> {
        if index >= self.dimension() {
            return Err(StateError::IndexOutOfRange {
                index,
                dimension: self.dimension(),
            });
        }

        Self::vector(
            self.tokens()
                .enumerate()
                .map(|(position, token)| if position == index { value } else { token }),
        )
    }

    /// Fill every wildcard of `self` with the token of `other` in the same
    /// position. Concrete positions of `self` are kept.
    pub fn merge(&self, other: &State) -> Result<Self, StateError> {
        if self.dimension() != other.dimension() {
            return Err(StateError::DimensionMismatch {
                expected: self.dimension(),
                found: other.dimension(),
            });
        }

        if self.is_concrete() {
            return Ok(self.clone());
        }

        Self::vector(
            self.tokens()
                .zip(other.tokens())
                .map(|(own, theirs)| if own == WILDCARD { theirs } else { own }),
        )
    }

    /// Deterministic serialized form, identical to `to_string()`.
    pub fn serialize(&self) -> String {
        self.to_string()
    }

    /// True if both values share the same interned token storage.
    pub fn ptr_eq(a: &State, b: &State) -> bool {
        Arc::ptr_eq(&a.tokens, &b.tokens)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, token) in self.tokens().enumerate() {
            if index > 0 {
                write!(f, "{SEPARATOR}")?;
            }
            f.write_str(token)?;
        }
        Ok(())
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "State({self})")
    }
}

impl FromStr for State {
    type Err = StateError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Self::parse(text)
    }
}

impl TryFrom<String> for State {
    type Error = StateError;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        Self::parse(&text)
    }
}

impl From<State> for String {
    fn from(state: State) -> Self {
        state.serialize()
    }
}
