//! Dimension specs

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A group-by dimension: either a bare column name or a full spec object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DimensionSpec {
    Name(String),
    Spec(DimensionObject),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum DimensionObject {
    Default {
        dimension: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output_name: Option<String>,
    },
    Extraction {
        dimension: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output_name: Option<String>,
        /// Passed through to Druid untouched
        extraction_fn: JsonValue,
    },
}

impl DimensionSpec {
    pub fn named(dimension: impl Into<String>) -> Self {
        DimensionSpec::Name(dimension.into())
    }

    pub fn default_spec(dimension: impl Into<String>, output_name: impl Into<String>) -> Self {
        DimensionSpec::Spec(DimensionObject::Default {
            dimension: dimension.into(),
            output_name: Some(output_name.into()),
        })
    }

    pub fn extraction(
        dimension: impl Into<String>,
        output_name: impl Into<String>,
        extraction_fn: JsonValue,
    ) -> Self {
        DimensionSpec::Spec(DimensionObject::Extraction {
            dimension: dimension.into(),
            output_name: Some(output_name.into()),
            extraction_fn,
        })
    }

    /// The column name this dimension has in result rows
    pub fn output_name(&self) -> &str {
        match self {
            DimensionSpec::Name(name) => name,
            DimensionSpec::Spec(DimensionObject::Default {
                dimension,
                output_name,
            })
            | DimensionSpec::Spec(DimensionObject::Extraction {
                dimension,
                output_name,
                ..
            }) => output_name.as_deref().unwrap_or(dimension),
        }
    }
}

impl From<&str> for DimensionSpec {
    fn from(name: &str) -> Self {
        DimensionSpec::Name(name.to_string())
    }
}
