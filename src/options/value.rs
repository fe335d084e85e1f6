// ABOUTME: Typed option values and their rendering as shell flags.
// ABOUTME: Booleans render as bare switches, lists repeat the flag, scalars quote.

use serde::Deserialize;
use std::fmt;

/// Value of one deployment option or attribute.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Switch(bool),
    Int(i64),
    Str(String),
    List(Vec<String>),
}

impl OptionValue {
    pub fn str(value: impl Into<String>) -> OptionValue {
        OptionValue::Str(value.into())
    }

    pub fn list<I, S>(values: I) -> OptionValue
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        OptionValue::List(values.into_iter().map(Into::into).collect())
    }

    /// Render this value as `--flag` tokens, appending to `out`.
    ///
    /// `Switch(true)` renders the bare flag, `Switch(false)` renders nothing;
    /// lists repeat the flag once per element preserving input order.
    pub fn render(&self, flag: &str, out: &mut Vec<String>) {
        match self {
            OptionValue::Switch(true) => out.push(format!("--{flag}")),
            OptionValue::Switch(false) => {}
            OptionValue::Int(n) => out.push(format!("--{flag} {n}")),
            OptionValue::Str(s) => out.push(format!("--{flag} {}", shell_quote(s))),
            OptionValue::List(values) => {
                for v in values {
                    out.push(format!("--{flag} {}", shell_quote(v)));
                }
            }
        }
    }

    /// The list elements of this value, treating scalars as single-element
    /// lists. Used by removable-option diffing.
    pub fn entries(&self) -> Vec<String> {
        match self {
            OptionValue::List(values) => values.clone(),
            OptionValue::Str(s) => vec![s.clone()],
            OptionValue::Int(n) => vec![n.to_string()],
            OptionValue::Switch(_) => vec![],
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Switch(b) => write!(f, "{b}"),
            OptionValue::Int(n) => write!(f, "{n}"),
            OptionValue::Str(s) => write!(f, "{s}"),
            OptionValue::List(values) => write!(f, "{}", values.join(",")),
        }
    }
}

/// Quote a value for the remote shell when it contains whitespace or quote
/// characters; plain values pass through unquoted.
pub fn shell_quote(value: &str) -> String {
    let needs_quoting = value
        .chars()
        .any(|c| c.is_whitespace() || c == '"' || c == '\'');
    if !needs_quoting {
        return value.to_string();
    }
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(value: &OptionValue, flag: &str) -> Vec<String> {
        let mut out = Vec::new();
        value.render(flag, &mut out);
        out
    }

    #[test]
    fn true_renders_bare_flag_false_omits() {
        assert_eq!(rendered(&OptionValue::Switch(true), "detach"), ["--detach"]);
        assert!(rendered(&OptionValue::Switch(false), "detach").is_empty());
    }

    #[test]
    fn list_repeats_flag_preserving_order() {
        let value = OptionValue::list(["80:80", "443:443"]);
        assert_eq!(
            rendered(&value, "publish"),
            ["--publish 80:80", "--publish 443:443"]
        );
    }

    #[test]
    fn value_with_whitespace_is_quoted() {
        let value = OptionValue::str("GREETING=hello world");
        assert_eq!(rendered(&value, "env"), ["--env \"GREETING=hello world\""]);
    }

    #[test]
    fn embedded_quotes_are_escaped() {
        assert_eq!(shell_quote("say \"hi\""), "\"say \\\"hi\\\"\"");
        assert_eq!(shell_quote("plain"), "plain");
    }
}
