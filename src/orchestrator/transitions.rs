//! Transition-table normalization.
//!
//! Machine descriptors come from a loosely typed source and encode transitions either
//! positionally or with named fields. Each entry is decoded into [`RawTransition`] and
//! flattened into a [`TransitionView`] immediately; unknown shapes become a per-row
//! [`RenderError`] instead of failing the whole table.

use crate::model::symbol_label;
use crate::error::RenderError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single token or one token per tape.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Tokens {
    Many(Vec<Value>),
    One(Value),
}

impl Tokens {
    fn into_strings(self) -> Result<Vec<String>, String> {
        let values = match self {
            Tokens::Many(v) => v,
            Tokens::One(v) => vec![v],
        };
        values.iter().map(token_to_string).collect()
    }
}

fn token_to_string(v: &Value) -> Result<String, String> {
    match v {
        Value::Array(_) | Value::Object(_) => Err(format!("expected a symbol, found {v}")),
        other => Ok(symbol_label(other)),
    }
}

fn state_to_string(v: Value) -> Result<String, String> {
    match v {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(format!("expected a state label, found {other}")),
    }
}

#[derive(Debug, Clone, Deserialize)]
struct NamedFrom {
    state: Value,
    read: Tokens,
}

#[derive(Debug, Clone, Deserialize)]
struct NamedTo {
    state: Value,
    write: Tokens,
    #[serde(alias = "moves")]
    r#move: Tokens,
}

/// Accepted wire shapes of one transition.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawTransition {
    /// `[[from, read], [to, write, moves]]`
    Positional((Value, Tokens), (Value, Tokens, Tokens)),
    /// `{ "from": { "state", "read" }, "to": { "state", "write", "move" } }`
    Named { from: NamedFrom, to: NamedTo },
}

/// Display-ready transition row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionView {
    pub from_state: String,
    pub read_symbols: Vec<String>,
    pub to_state: String,
    pub write_symbols: Vec<String>,
    pub moves: Vec<String>,
}

impl TransitionView {
    fn from_parts(
        from: Value,
        read: Tokens,
        to: Value,
        write: Tokens,
        moves: Tokens,
    ) -> Result<Self, String> {
        Ok(Self {
            from_state: state_to_string(from)?,
            read_symbols: read.into_strings()?,
            to_state: state_to_string(to)?,
            write_symbols: write.into_strings()?,
            moves: moves.into_strings()?,
        })
    }
}

pub type TransitionRow = Result<TransitionView, RenderError>;

/// Normalize one transition entry. `index` tags the error if the entry is unusable.
pub fn normalize(index: usize, raw: &Value) -> TransitionRow {
    let fail = |reason: String| RenderError { index, reason };

    let parsed = RawTransition::deserialize(raw)
        .map_err(|_| fail(format!("unrecognized transition shape: {}", abbreviate(raw))))?;
    let view = match parsed {
        RawTransition::Positional((from, read), (to, write, moves)) => {
            TransitionView::from_parts(from, read, to, write, moves)
        }
        RawTransition::Named { from, to } => {
            TransitionView::from_parts(from.state, from.read, to.state, to.write, to.r#move)
        }
    };
    view.map_err(fail)
}

/// Normalize every entry independently.
pub fn normalize_table(entries: &[Value]) -> Vec<TransitionRow> {
    entries
        .iter()
        .enumerate()
        .map(|(i, raw)| normalize(i, raw))
        .collect()
}

fn abbreviate(v: &Value) -> String {
    const MAX: usize = 48;
    let s = v.to_string();
    if s.chars().count() > MAX {
        let cut: String = s.chars().take(MAX - 1).collect();
        format!("{cut}…")
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn positional_multi_tape() {
        let row = normalize(
            0,
            &json!([["q0", ["a", "b"]], ["q1", ["x", "y"], ["R", "L"]]]),
        )
        .unwrap();
        assert_eq!(
            row,
            TransitionView {
                from_state: "q0".into(),
                read_symbols: strings(&["a", "b"]),
                to_state: "q1".into(),
                write_symbols: strings(&["x", "y"]),
                moves: strings(&["R", "L"]),
            }
        );
    }

    #[test]
    fn positional_single_tokens_are_wrapped() {
        let row = normalize(0, &json!([["q0", 1], ["q1", "_", "R"]])).unwrap();
        assert_eq!(row.read_symbols, strings(&["1"]));
        assert_eq!(row.write_symbols, strings(&["_"]));
        assert_eq!(row.moves, strings(&["R"]));
    }

    #[test]
    fn named_form() {
        let row = normalize(
            3,
            &json!({
                "from": {"state": "scan", "read": ["0", null]},
                "to": {"state": "done", "write": "1", "move": ["S", "R"]}
            }),
        )
        .unwrap();
        assert_eq!(row.from_state, "scan");
        assert_eq!(row.read_symbols, strings(&["0", ""]));
        assert_eq!(row.write_symbols, strings(&["1"]));
        assert_eq!(row.moves, strings(&["S", "R"]));
    }

    #[test]
    fn malformed_entry_is_tagged_and_does_not_stop_the_batch() {
        let rows = normalize_table(&[
            json!(42),
            json!([["q0", "a"], ["q1", "b", "R"]]),
            json!({"from": {"state": "q0"}}),
            json!([["q0", [["nested"]]], ["q1", "b", "R"]]),
        ]);
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].as_ref().unwrap_err().index, 0);
        assert!(rows[1].is_ok());
        assert_eq!(rows[2].as_ref().unwrap_err().index, 2);
        assert_eq!(rows[3].as_ref().unwrap_err().index, 3);
    }

    #[test]
    fn object_state_label_is_rejected() {
        let err = normalize(1, &json!([[{"a": 1}, "a"], ["q1", "b", "R"]])).unwrap_err();
        assert_eq!(err.index, 1);
        assert!(err.reason.contains("state label"));
    }
}
