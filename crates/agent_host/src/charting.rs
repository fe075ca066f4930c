//! Parameter handling shared by the chart tools.

use serde::de::DeserializeOwned;
use serde_json::Value;
use shared::chart::{Categorical, Smoothing, SmoothingMethod};
use shared::dataset::Dataset;
use shared::tool::ToolError;

/// Deserialize tool input, mapping shape errors to `InvalidParameters`.
pub fn parse_params<T: DeserializeOwned>(tool: &str, input: &Value) -> Result<T, ToolError> {
    let input = match input {
        // Some models send `null` instead of `{}` for calls without arguments
        Value::Null => Value::Object(Default::default()),
        // Arguments that did not parse arrive as their raw text
        Value::String(raw) => {
            serde_json::from_str(raw).map_err(|e| ToolError::InvalidParameters {
                tool: tool.to_string(),
                message: format!("malformed arguments: {}", e),
            })?
        }
        other => other.clone(),
    };
    serde_json::from_value(input).map_err(|e| ToolError::InvalidParameters {
        tool: tool.to_string(),
        message: e.to_string(),
    })
}

/// Blank strings count as "not given".
pub fn given(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Validate a required column reference and return its canonical name.
pub fn required_column(dataset: &Dataset, name: &str) -> Result<String, ToolError> {
    Ok(dataset.column(name.trim())?.name().to_string())
}

/// Coerce an optional grouping column.
pub fn grouping(dataset: &Dataset, name: Option<&str>) -> Result<Option<Categorical>, ToolError> {
    name.map(|n| dataset.categorical(n))
        .transpose()
        .map_err(ToolError::from)
}

/// Resolve the trend method; absent or "auto" picks by row count.
pub fn smoothing(method: Option<&str>, rows: usize) -> Result<Smoothing, ToolError> {
    match method {
        None => Ok(Smoothing {
            method: SmoothingMethod::automatic(rows),
            automatic: true,
        }),
        Some(name) if name.eq_ignore_ascii_case("auto") => Ok(Smoothing {
            method: SmoothingMethod::automatic(rows),
            automatic: true,
        }),
        Some(name) => SmoothingMethod::parse(name)
            .map(|method| Smoothing {
                method,
                automatic: false,
            })
            .ok_or_else(|| ToolError::InvalidSmoothingMethod {
                method: name.to_string(),
            }),
    }
}

/// Sentence listing the valid columns, for schema descriptions
pub fn column_hint(dataset: &Dataset) -> String {
    format!("One of: {}.", dataset.column_names().join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Params {
        x: String,
        #[serde(default)]
        flag: Option<bool>,
    }

    #[test]
    fn test_parse_params_type_error() {
        let err = parse_params::<Params>("plot_density", &json!({"x": 3})).unwrap_err();
        assert!(matches!(err, ToolError::InvalidParameters { ref tool, .. } if tool == "plot_density"));

        let err = parse_params::<Params>("plot_density", &json!({})).unwrap_err();
        assert!(err.to_string().contains("missing field `x`"));
    }

    #[test]
    fn test_parse_params_truncated_arguments() {
        let raw = Value::String(r#"{"x": "mpg", "y": "h"#.to_string());
        let err = parse_params::<Params>("plot_scatter", &raw).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("malformed arguments"), "{}", message);
        assert!(!message.contains("missing field"));

        let params: Params = parse_params("t", &json!(r#"{"x": "wt"}"#)).unwrap();
        assert_eq!(params.x, "wt");
    }

    #[test]
    fn test_parse_params_null_optional() {
        let params: Params = parse_params("t", &json!({"x": "mpg", "flag": null})).unwrap();
        assert_eq!(params.x, "mpg");
        assert!(params.flag.is_none());
    }

    #[test]
    fn test_given_skips_blank() {
        assert_eq!(given(&Some(" gear ".into())), Some("gear"));
        assert_eq!(given(&Some("  ".into())), None);
        assert_eq!(given(&None), None);
    }

    #[test]
    fn test_smoothing_resolution() {
        let auto = smoothing(None, 32).unwrap();
        assert!(auto.automatic);
        assert_eq!(auto.method, SmoothingMethod::Loess);

        let explicit_auto = smoothing(Some("AUTO"), 32).unwrap();
        assert!(explicit_auto.automatic);

        let lm = smoothing(Some("lm"), 32).unwrap();
        assert_eq!(lm.method, SmoothingMethod::Lm);
        assert!(!lm.automatic);

        let err = smoothing(Some("gam"), 32).unwrap_err();
        assert!(matches!(err, ToolError::InvalidSmoothingMethod { ref method } if method == "gam"));
    }

    #[test]
    fn test_grouping_and_required_column() {
        let dataset = Dataset::mtcars().unwrap();
        assert!(grouping(&dataset, None).unwrap().is_none());
        assert_eq!(grouping(&dataset, Some("vs")).unwrap().unwrap().len(), 2);
        assert!(matches!(
            grouping(&dataset, Some("colour")),
            Err(ToolError::Dataset(_))
        ));
        assert_eq!(required_column(&dataset, " wt").unwrap(), "wt");
        assert!(column_hint(&dataset).starts_with("One of: mpg, cyl"));
    }
}
