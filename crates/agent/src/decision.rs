//! One parsed reasoning turn

use serde_json::{Map, Value};

/// Untyped parameter bag as it comes out of the parser
pub type Params = Map<String, Value>;

/// Terminal operation
pub const FINISH: &str = "finish";

/// Ask-the-human operation, also the parser's fallback
pub const CHECK_IN: &str = "check_in";

/// What the reasoning backend chose to do this turn
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    rationale: String,
    operation: String,
    params: Params,
}

impl Decision {
    pub fn new(rationale: impl Into<String>, operation: impl Into<String>, params: Params) -> Self {
        Self {
            rationale: rationale.into(),
            operation: operation.into(),
            params,
        }
    }

    /// Hand control back to the human with `message`
    pub fn check_in(rationale: impl Into<String>, message: impl Into<String>) -> Self {
        let mut params = Params::new();
        params.insert("message".to_string(), Value::String(message.into()));
        Self::new(rationale, CHECK_IN, params)
    }

    pub fn rationale(&self) -> &str {
        &self.rationale
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn is_finish(&self) -> bool {
        self.operation == FINISH
    }

    pub fn into_params(self) -> Params {
        self.params
    }
}
