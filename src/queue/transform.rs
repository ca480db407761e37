//! Converts raw form answers into the representation the backend expects.

use std::fmt;

use serde_json::{Number, Value};

use super::entry::AnswerMetadata;

/// Metadata keys that carry the question type discriminator.
const TYPE_KEYS: &[&str] = &["question_type", "questionType"];

const TRUTHY: &[&str] = &["true", "1", "sí", "si"];

/// Kind of question, as far as answer encoding is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestionType {
    Numeric,
    SingleChoice,
    Binary,
    MultiSelect,
    ImageScored,
    /// Unknown or missing type; answers pass through unchanged.
    Other(String),
}

impl QuestionType {
    /// Parses a type name, accepting the aliases used by the forms.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "numerica" | "numérica" | "numeric" | "number" => Self::Numeric,
            "seleccion_unica" | "unica" | "desplegable" | "dropdown" | "single_choice"
            | "radio" => Self::SingleChoice,
            "binaria" | "binary" | "boolean" | "si_no" => Self::Binary,
            "checkbox" | "seleccion_multiple" | "multiple" | "multi_select" => Self::MultiSelect,
            "imagen" | "image" | "image_scored" => Self::ImageScored,
            _ => Self::Other(name.to_string()),
        }
    }

    /// Reads the type from submission metadata.
    pub fn from_metadata(metadata: &AnswerMetadata) -> Self {
        TYPE_KEYS
            .iter()
            .find_map(|key| metadata.get(*key).and_then(Value::as_str))
            .map(Self::parse)
            .unwrap_or_else(|| Self::Other(String::new()))
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric => f.write_str("numeric"),
            Self::SingleChoice => f.write_str("single_choice"),
            Self::Binary => f.write_str("binary"),
            Self::MultiSelect => f.write_str("multi_select"),
            Self::ImageScored => f.write_str("image_scored"),
            Self::Other(name) if name.is_empty() => f.write_str("unknown"),
            Self::Other(name) => f.write_str(name),
        }
    }
}

/// A raw answer that did not fit its declared type and was replaced by a default.
#[derive(Debug, Clone, PartialEq)]
pub struct Coercion {
    pub question_type: QuestionType,
    pub original: Value,
    pub replacement: Value,
}

impl fmt::Display for Coercion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} answer {} coerced to {}",
            self.question_type, self.original, self.replacement
        )
    }
}

/// Output of [`transform_answer`].
#[derive(Debug, Clone, PartialEq)]
pub struct Transformed {
    pub value: Value,
    /// Set when the raw answer was malformed for its type.
    pub coercion: Option<Coercion>,
}

impl Transformed {
    fn clean(value: Value) -> Self {
        Self {
            value,
            coercion: None,
        }
    }

    fn coerced(question_type: &QuestionType, original: &Value, replacement: Value) -> Self {
        Self {
            value: replacement.clone(),
            coercion: Some(Coercion {
                question_type: question_type.clone(),
                original: original.clone(),
                replacement,
            }),
        }
    }
}

/// Transforms an answer for its question type. Pure and total.
pub fn transform_answer(question_type: &QuestionType, answer: &Value) -> Transformed {
    match question_type {
        QuestionType::Numeric | QuestionType::ImageScored => match parse_float(answer) {
            Some(n) => Transformed::clean(n),
            None => Transformed::coerced(question_type, answer, Value::from(0)),
        },
        QuestionType::Binary => {
            let label = if is_truthy(answer) { "Sí" } else { "No" };
            Transformed::clean(Value::from(label))
        }
        QuestionType::MultiSelect => match answer {
            Value::Array(_) => Transformed::clean(answer.clone()),
            _ => Transformed::coerced(question_type, answer, Value::Array(Vec::new())),
        },
        QuestionType::SingleChoice | QuestionType::Other(_) => Transformed::clean(answer.clone()),
    }
}

fn parse_float(answer: &Value) -> Option<Value> {
    let parsed = match answer {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    Number::from_f64(parsed).map(Value::Number)
}

fn is_truthy(answer: &Value) -> bool {
    let text = match answer {
        Value::Bool(b) => return *b,
        Value::String(s) => s.trim().to_lowercase(),
        // 1, 1.0 and 1e0 are all the same answer.
        Value::Number(n) => return n.as_f64() == Some(1.0),
        _ => return false,
    };
    TRUTHY.contains(&text.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    #[test]
    fn table() {
        let cases = [
            (QuestionType::Numeric, json!("12.5"), json!(12.5)),
            (QuestionType::Numeric, json!(" 7 "), json!(7.0)),
            (QuestionType::Numeric, json!(3), json!(3.0)),
            (QuestionType::Numeric, json!("abc"), json!(0)),
            (QuestionType::ImageScored, json!("4"), json!(4.0)),
            (QuestionType::ImageScored, json!(null), json!(0)),
            (QuestionType::SingleChoice, json!("opcion b"), json!("opcion b")),
            (QuestionType::Binary, json!(true), json!("Sí")),
            (QuestionType::Binary, json!("true"), json!("Sí")),
            (QuestionType::Binary, json!("1"), json!("Sí")),
            (QuestionType::Binary, json!(1), json!("Sí")),
            (QuestionType::Binary, json!(1.0), json!("Sí")),
            (QuestionType::Binary, json!(0.0), json!("No")),
            (QuestionType::Binary, json!(2), json!("No")),
            (QuestionType::Binary, json!("si"), json!("Sí")),
            (QuestionType::Binary, json!("Sí"), json!("Sí")),
            (QuestionType::Binary, json!("no"), json!("No")),
            (QuestionType::Binary, json!(false), json!("No")),
            (QuestionType::Binary, json!("yes"), json!("No")),
            (QuestionType::MultiSelect, json!(["a", "b"]), json!(["a", "b"])),
            (QuestionType::MultiSelect, json!("x"), json!([])),
            (QuestionType::Other("texto".into()), json!({"k": 1}), json!({"k": 1})),
        ];

        for (question_type, raw, expected) in cases {
            let out = transform_answer(&question_type, &raw);
            assert_eq!(out.value, expected, "{} with {}", question_type, raw);
        }
    }

    #[test]
    fn malformed_answers_report_coercion() {
        let out = transform_answer(&QuestionType::Numeric, &json!("doce"));
        let coercion = out.coercion.unwrap();
        assert_eq!(coercion.original, json!("doce"));
        assert_eq!(coercion.replacement, json!(0));

        let out = transform_answer(&QuestionType::MultiSelect, &json!("x"));
        assert!(out.coercion.is_some());

        let out = transform_answer(&QuestionType::Binary, &json!("no"));
        assert!(out.coercion.is_none());
    }

    #[test]
    fn type_names_and_aliases() {
        assert_eq!(QuestionType::parse("binaria"), QuestionType::Binary);
        assert_eq!(QuestionType::parse("Numérica"), QuestionType::Numeric);
        assert_eq!(QuestionType::parse("desplegable"), QuestionType::SingleChoice);
        assert_eq!(QuestionType::parse("checkbox"), QuestionType::MultiSelect);
        assert_eq!(QuestionType::parse("imagen"), QuestionType::ImageScored);
        assert_eq!(
            QuestionType::parse("texto_libre"),
            QuestionType::Other("texto_libre".to_string())
        );
    }

    #[test]
    fn type_is_read_from_either_metadata_key() {
        let mut meta = Map::new();
        meta.insert("questionType".to_string(), json!("binaria"));
        assert_eq!(QuestionType::from_metadata(&meta), QuestionType::Binary);

        meta.insert("question_type".to_string(), json!("numerica"));
        assert_eq!(QuestionType::from_metadata(&meta), QuestionType::Numeric);

        assert_eq!(
            QuestionType::from_metadata(&Map::new()),
            QuestionType::Other(String::new())
        );
    }
}
