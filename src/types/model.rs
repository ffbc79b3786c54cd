use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Represents a hosted model identifier.
///
/// This can be one of the models the tutor ships with or a custom string for models a
/// deployment adds through configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Model {
    /// Known model identifiers
    Known(KnownModel),

    /// Custom model identifier
    Custom(String),
}

/// Models offered by default, in catalog order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KnownModel {
    /// Llama 3 70B with an 8k context window
    #[serde(rename = "llama3-70b-8192")]
    Llama3_70b8192,

    /// Llama 3 8B with an 8k context window
    #[serde(rename = "llama3-8b-8192")]
    Llama3_8b8192,

    /// Mixtral 8x7B with a 32k context window
    #[serde(rename = "mixtral-8x7b-32768")]
    Mixtral8x7b32768,

    /// DeepSeek R1 distilled into Llama 70B
    #[serde(rename = "deepseek-r1-distill-llama-70b")]
    DeepseekR1DistillLlama70b,
}

impl KnownModel {
    /// Every known model, in catalog order.
    pub const ALL: [KnownModel; 4] = [
        KnownModel::Llama3_70b8192,
        KnownModel::Llama3_8b8192,
        KnownModel::Mixtral8x7b32768,
        KnownModel::DeepseekR1DistillLlama70b,
    ];

    /// The identifier sent to the completion service.
    pub fn as_str(&self) -> &'static str {
        match self {
            KnownModel::Llama3_70b8192 => "llama3-70b-8192",
            KnownModel::Llama3_8b8192 => "llama3-8b-8192",
            KnownModel::Mixtral8x7b32768 => "mixtral-8x7b-32768",
            KnownModel::DeepseekR1DistillLlama70b => "deepseek-r1-distill-llama-70b",
        }
    }
}

impl Model {
    /// The identifier sent to the completion service.
    pub fn as_str(&self) -> &str {
        match self {
            Model::Known(known) => known.as_str(),
            Model::Custom(custom) => custom,
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Display for KnownModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for KnownModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KnownModel::ALL
            .into_iter()
            .find(|model| model.as_str() == s)
            .ok_or_else(|| format!("unknown model: {s}"))
    }
}

impl FromStr for Model {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(s.parse::<KnownModel>()
            .map(Model::Known)
            .unwrap_or_else(|_| Model::Custom(s.to_string())))
    }
}

impl From<KnownModel> for Model {
    fn from(model: KnownModel) -> Self {
        Model::Known(model)
    }
}

impl From<String> for Model {
    fn from(model: String) -> Self {
        Model::Custom(model)
    }
}

impl From<&str> for Model {
    fn from(model: &str) -> Self {
        Model::Custom(model.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_model_serialization() {
        let model = Model::Known(KnownModel::Llama3_8b8192);
        let json = serde_json::to_string(&model).unwrap();
        assert_eq!(json, r#""llama3-8b-8192""#);

        let model = Model::Known(KnownModel::DeepseekR1DistillLlama70b);
        let json = serde_json::to_string(&model).unwrap();
        assert_eq!(json, r#""deepseek-r1-distill-llama-70b""#);
    }

    #[test]
    fn model_deserialization() {
        let model: Model = serde_json::from_str(r#""mixtral-8x7b-32768""#).unwrap();
        assert_eq!(model, Model::Known(KnownModel::Mixtral8x7b32768));

        let model: Model = serde_json::from_str(r#""llama-3.1-8b-instant""#).unwrap();
        assert_eq!(model, Model::Custom("llama-3.1-8b-instant".to_string()));
    }

    #[test]
    fn parse_prefers_known() {
        let model: Model = "llama3-70b-8192".parse().unwrap();
        assert_eq!(model, Model::Known(KnownModel::Llama3_70b8192));

        let model: Model = "gemma2-9b-it".parse().unwrap();
        assert_eq!(model, Model::Custom("gemma2-9b-it".to_string()));
    }

    #[test]
    fn display() {
        for known in KnownModel::ALL {
            assert_eq!(Model::Known(known).to_string(), known.as_str());
        }
        assert_eq!(Model::Custom("custom".to_string()).to_string(), "custom");
    }
}
