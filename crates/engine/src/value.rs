use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Declared type of a column. Every cell in the column holds a value of this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    String,
    Integer,
    Float,
    Boolean,
}

impl ColumnType {
    /// Value a new row or back-filled column starts with.
    pub fn zero(self) -> CellValue {
        match self {
            ColumnType::String => CellValue::Text(String::new()),
            ColumnType::Integer => CellValue::Integer(0),
            ColumnType::Float => CellValue::Float(0.0),
            ColumnType::Boolean => CellValue::Boolean(false),
        }
    }

    /// Integer, float and boolean columns may be referenced by formulas.
    pub fn is_numeric(self) -> bool {
        !matches!(self, ColumnType::String)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ColumnType::String => "string",
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Boolean => "boolean",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "string" | "text" => Ok(ColumnType::String),
            "integer" | "int" => Ok(ColumnType::Integer),
            "float" | "number" => Ok(ColumnType::Float),
            "boolean" | "bool" => Ok(ColumnType::Boolean),
            other => Err(format!("unknown column type: {other}")),
        }
    }
}

/// A typed scalar stored in one cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Default for CellValue {
    fn default() -> Self {
        CellValue::Text(String::new())
    }
}

impl CellValue {
    pub fn column_type(&self) -> ColumnType {
        match self {
            CellValue::Text(_) => ColumnType::String,
            CellValue::Integer(_) => ColumnType::Integer,
            CellValue::Float(_) => ColumnType::Float,
            CellValue::Boolean(_) => ColumnType::Boolean,
        }
    }

    /// Strict parse of user input for a cell edit. `None` means the input
    /// cannot be represented in `ty`.
    pub fn parse_as(input: &str, ty: ColumnType) -> Option<CellValue> {
        match ty {
            ColumnType::String => Some(CellValue::Text(input.to_string())),
            ColumnType::Integer => input.trim().parse::<i64>().ok().map(CellValue::Integer),
            ColumnType::Float => input
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .map(CellValue::Float),
            ColumnType::Boolean => parse_bool(input).map(CellValue::Boolean),
        }
    }

    /// Best-effort conversion used when a column changes type. Anything that
    /// cannot be converted becomes the target type's zero value.
    pub fn convert_to(&self, ty: ColumnType) -> CellValue {
        if self.column_type() == ty {
            return self.clone();
        }
        match ty {
            ColumnType::String => CellValue::Text(self.display_text()),
            ColumnType::Integer => match self.numeric_source() {
                Some(n) if n.is_finite() && n.abs() < i64::MAX as f64 => {
                    CellValue::Integer(n.trunc() as i64)
                }
                _ => ty.zero(),
            },
            ColumnType::Float => match self.numeric_source() {
                Some(n) if n.is_finite() => CellValue::Float(n),
                _ => ty.zero(),
            },
            ColumnType::Boolean => CellValue::Boolean(match self {
                CellValue::Text(s) => !s.is_empty(),
                CellValue::Integer(i) => *i != 0,
                CellValue::Float(n) => *n != 0.0,
                CellValue::Boolean(b) => *b,
            }),
        }
    }

    /// Store a formula result in a column of type `ty`.
    pub fn from_number(n: f64, ty: ColumnType) -> CellValue {
        let n = if n.is_finite() { n } else { 0.0 };
        match ty {
            ColumnType::Float => CellValue::Float(n),
            ColumnType::Integer => {
                if n.abs() < i64::MAX as f64 {
                    CellValue::Integer(n.trunc() as i64)
                } else {
                    CellValue::Integer(0)
                }
            }
            ColumnType::Boolean => CellValue::Boolean(n != 0.0),
            ColumnType::String => CellValue::Text(format_number(n)),
        }
    }

    /// Numeric view used by formula references: booleans are 1/0, text is 0.
    pub fn as_number(&self) -> f64 {
        match self {
            CellValue::Integer(i) => *i as f64,
            CellValue::Float(n) => *n,
            CellValue::Boolean(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            CellValue::Text(_) => 0.0,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn display_text(&self) -> String {
        match self {
            CellValue::Text(s) => s.clone(),
            CellValue::Integer(i) => i.to_string(),
            CellValue::Float(n) => format_number(*n),
            CellValue::Boolean(b) => b.to_string(),
        }
    }

    // Text is read as a float here (int(float("3.5")) == 3), unlike `as_number`.
    fn numeric_source(&self) -> Option<f64> {
        match self {
            CellValue::Text(s) => s.trim().parse::<f64>().ok(),
            other => Some(other.as_number()),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_text())
    }
}

fn parse_bool(input: &str) -> Option<bool> {
    match input.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// Format a float without a trailing `.0` for whole numbers.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_values() {
        assert_eq!(ColumnType::String.zero(), CellValue::Text(String::new()));
        assert_eq!(ColumnType::Integer.zero(), CellValue::Integer(0));
        assert_eq!(ColumnType::Float.zero(), CellValue::Float(0.0));
        assert_eq!(ColumnType::Boolean.zero(), CellValue::Boolean(false));
    }

    #[test]
    fn test_parse_integer_rejects_text() {
        assert_eq!(CellValue::parse_as(" 42 ", ColumnType::Integer), Some(CellValue::Integer(42)));
        assert_eq!(CellValue::parse_as("abc", ColumnType::Integer), None);
        assert_eq!(CellValue::parse_as("4.5", ColumnType::Integer), None);
    }

    #[test]
    fn test_parse_float_rejects_non_finite() {
        assert_eq!(CellValue::parse_as("2.5", ColumnType::Float), Some(CellValue::Float(2.5)));
        assert_eq!(CellValue::parse_as("inf", ColumnType::Float), None);
        assert_eq!(CellValue::parse_as("NaN", ColumnType::Float), None);
    }

    #[test]
    fn test_parse_boolean() {
        assert_eq!(CellValue::parse_as("TRUE", ColumnType::Boolean), Some(CellValue::Boolean(true)));
        assert_eq!(CellValue::parse_as("no", ColumnType::Boolean), Some(CellValue::Boolean(false)));
        assert_eq!(CellValue::parse_as("maybe", ColumnType::Boolean), None);
    }

    #[test]
    fn test_convert_to_string_never_fails() {
        assert_eq!(CellValue::Integer(7).convert_to(ColumnType::String), CellValue::Text("7".into()));
        assert_eq!(CellValue::Float(2.5).convert_to(ColumnType::String), CellValue::Text("2.5".into()));
        assert_eq!(CellValue::Boolean(true).convert_to(ColumnType::String), CellValue::Text("true".into()));
    }

    #[test]
    fn test_convert_text_to_integer_truncates_or_zeroes() {
        assert_eq!(CellValue::Text("3.9".into()).convert_to(ColumnType::Integer), CellValue::Integer(3));
        assert_eq!(CellValue::Text("-3.9".into()).convert_to(ColumnType::Integer), CellValue::Integer(-3));
        assert_eq!(CellValue::Text("abc".into()).convert_to(ColumnType::Integer), CellValue::Integer(0));
        assert_eq!(CellValue::Boolean(true).convert_to(ColumnType::Integer), CellValue::Integer(1));
    }

    #[test]
    fn test_convert_to_boolean_is_truthiness() {
        assert_eq!(CellValue::Text(String::new()).convert_to(ColumnType::Boolean), CellValue::Boolean(false));
        assert_eq!(CellValue::Text("x".into()).convert_to(ColumnType::Boolean), CellValue::Boolean(true));
        assert_eq!(CellValue::Float(0.0).convert_to(ColumnType::Boolean), CellValue::Boolean(false));
    }

    #[test]
    fn test_as_number() {
        assert_eq!(CellValue::Boolean(true).as_number(), 1.0);
        assert_eq!(CellValue::Boolean(false).as_number(), 0.0);
        assert_eq!(CellValue::Text("12".into()).as_number(), 0.0);
        assert_eq!(CellValue::Integer(-4).as_number(), -4.0);
    }

    #[test]
    fn test_from_number_per_type() {
        assert_eq!(CellValue::from_number(15.7, ColumnType::Integer), CellValue::Integer(15));
        assert_eq!(CellValue::from_number(15.0, ColumnType::String), CellValue::Text("15".into()));
        assert_eq!(CellValue::from_number(f64::INFINITY, ColumnType::Float), CellValue::Float(0.0));
        assert_eq!(CellValue::from_number(-1.0, ColumnType::Boolean), CellValue::Boolean(true));
    }

    #[test]
    fn test_column_type_from_str() {
        assert_eq!("Integer".parse::<ColumnType>(), Ok(ColumnType::Integer));
        assert_eq!("bool".parse::<ColumnType>(), Ok(ColumnType::Boolean));
        assert!("date".parse::<ColumnType>().is_err());
    }

    #[test]
    fn test_serde_untagged() {
        let values = vec![
            CellValue::Text("a".into()),
            CellValue::Integer(5),
            CellValue::Float(2.5),
            CellValue::Boolean(true),
        ];
        let json = serde_json::to_string(&values).unwrap();
        assert_eq!(json, r#"["a",5,2.5,true]"#);
        let back: Vec<CellValue> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, values);
        assert_eq!(serde_json::to_string(&ColumnType::Boolean).unwrap(), r#""boolean""#);
    }
}
