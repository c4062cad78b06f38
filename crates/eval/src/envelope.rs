//! Structured keyword results.
//!
//! A keyword may return a plain value or an envelope: a map with a
//! `result` key plus optional `captures`, `session_state` and `metadata`.
//! Captures become test variables before the result is assigned.

use std::collections::BTreeMap;

use crate::value::Value;

const RESULT: &str = "result";
const ENVELOPE_KEYS: [&str; 3] = ["captures", "session_state", "metadata"];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Envelope {
    pub result: Value,
    pub captures: BTreeMap<String, Value>,
    pub session_state: BTreeMap<String, Value>,
    pub metadata: BTreeMap<String, Value>,
}

impl Envelope {
    /// True for a map holding `result` whose other keys are all envelope
    /// keys. Ordinary data maps that happen to contain `result` alongside
    /// unrelated keys are left alone.
    pub fn detect(value: &Value) -> bool {
        match value {
            Value::Map(m) => {
                m.contains_key(RESULT)
                    && m.keys()
                        .all(|k| k == RESULT || ENVELOPE_KEYS.contains(&k.as_str()))
            }
            _ => false,
        }
    }

    /// Split an envelope, or wrap a plain value as its result.
    pub fn from_value(value: Value) -> Envelope {
        if !Envelope::detect(&value) {
            return Envelope::wrap(value);
        }
        let Value::Map(mut m) = value else {
            return Envelope::default();
        };
        let mut take = |key: &str| match m.remove(key) {
            Some(Value::Map(inner)) => inner,
            _ => BTreeMap::new(),
        };
        let captures = take("captures");
        let session_state = take("session_state");
        let metadata = take("metadata");
        Envelope {
            result: m.remove(RESULT).unwrap_or_default(),
            captures,
            session_state,
            metadata,
        }
    }

    pub fn wrap(result: Value) -> Envelope {
        Envelope {
            result,
            ..Envelope::default()
        }
    }

    pub fn into_value(self) -> Value {
        let mut m = BTreeMap::new();
        m.insert(RESULT.to_owned(), self.result);
        for (key, section) in [
            ("captures", self.captures),
            ("session_state", self.session_state),
            ("metadata", self.metadata),
        ] {
            if !section.is_empty() {
                m.insert(key.to_owned(), Value::Map(section));
            }
        }
        Value::Map(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn only_pure_envelopes_are_unpacked() {
        let env = Value::from(json!({"result": 5, "captures": {"a": 10}}));
        assert!(Envelope::detect(&env));
        let e = Envelope::from_value(env);
        assert_eq!(e.result, Value::Int(5));
        assert_eq!(e.captures.get("a"), Some(&Value::Int(10)));

        let data = Value::from(json!({"result": "ok", "code": 200}));
        assert!(!Envelope::detect(&data));
        assert_eq!(Envelope::from_value(data.clone()).result, data);

        assert!(!Envelope::detect(&Value::from(json!({"captures": {}}))));
    }

    #[test]
    fn into_value_omits_empty_sections() {
        let mut e = Envelope::wrap(Value::from("x"));
        e.metadata.insert("elapsed".into(), Value::Float(0.5));
        assert_eq!(
            e.into_value().to_json(),
            json!({"result": "x", "metadata": {"elapsed": 0.5}})
        );
    }
}
