//! FILTER clause construction

use sweep_core::{Result, SweepError};

/// How filter values are compared and quoted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterOptions {
    /// Comparison operator placed between variable and value
    pub operator: String,

    /// Opening and closing delimiters wrapped around each value
    pub escape: (String, String),
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            operator: "=".to_string(),
            escape: ("'".to_string(), "'".to_string()),
        }
    }
}

impl FilterOptions {
    /// Values are inserted verbatim
    pub fn unquoted() -> Self {
        Self {
            escape: (String::new(), String::new()),
            ..Default::default()
        }
    }

    pub fn with_operator(mut self, operator: impl Into<String>) -> Self {
        self.operator = operator.into();
        self
    }

    pub fn with_escape(mut self, open: impl Into<String>, close: impl Into<String>) -> Self {
        self.escape = (open.into(), close.into());
        self
    }

    fn wrap(&self, value: &str) -> String {
        let (open, close) = &self.escape;
        match close.as_str() {
            "'" => format!("{open}{}'", escape_body(value, '\'')),
            "\"" => format!("{open}{}\"", escape_body(value, '"')),
            _ => format!("{open}{value}{close}"),
        }
    }
}

/// One `FILTER` clause OR-ing every value of one field, or `None` when
/// there are no values.
pub(crate) fn build_filter(
    field: &str,
    values: &[String],
    options: &FilterOptions,
) -> Result<Option<String>> {
    if values.is_empty() {
        return Ok(None);
    }
    let variable = variable_name(field)?;

    let disjuncts = values
        .iter()
        .map(|value| format!("?{variable} {} {}", options.operator, options.wrap(value)))
        .collect::<Vec<_>>()
        .join(" || ");

    Ok(Some(format!("FILTER({disjuncts}) .")))
}

/// Quote a string literal with the given delimiter
pub(crate) fn quote_string(value: &str, quote: char) -> String {
    format!("{quote}{}{quote}", escape_body(value, quote))
}

fn escape_body(value: &str, quote: char) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            c if c == quote => {
                escaped.push('\\');
                escaped.push(c);
            }
            c => escaped.push(c),
        }
    }
    escaped
}

fn variable_name(field: &str) -> Result<&str> {
    let name = field.strip_prefix('?').unwrap_or(field);
    let valid = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(name)
    } else {
        Err(SweepError::InvalidArgument(format!(
            "filter field {field:?} is not a variable name"
        )))
    }
}
