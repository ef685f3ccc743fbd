pub mod http;

pub use http::HttpDecisionClient;

use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::{capture::Frame, config::SessionConfig, error::Result, BoxFuture};

/// Field of the classifier's reply that says whether to fire a stimulus.
pub const TRIGGER_FIELD: &str = "negative_stimulus";

/// Remote classifier: one frame in, one decision out. Implementations never
/// retry; the next sampling tick is the retry.
pub trait DecisionClient: Send + Sync {
    fn submit<'a>(
        &'a self,
        frame: &'a Frame,
        config: &'a SessionConfig,
    ) -> BoxFuture<'a, Result<Decision>>;
}

/// The classifier's verdict. Everything besides the trigger flag is kept as
/// opaque JSON for the history view.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    negative_stimulus: bool,
    payload: Value,
}

impl Decision {
    /// A payload without a boolean trigger field counts as "no stimulus".
    pub fn from_payload(payload: Value) -> Self {
        let negative_stimulus = payload
            .get(TRIGGER_FIELD)
            .and_then(Value::as_bool)
            .unwrap_or(false);

        Self {
            negative_stimulus,
            payload,
        }
    }

    pub fn negative_stimulus(&self) -> bool {
        self.negative_stimulus
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn analysis(&self) -> Option<&str> {
        self.payload.get("analysis").and_then(Value::as_str)
    }

    pub fn confidence(&self) -> Option<f64> {
        self.payload.get("confidence").and_then(Value::as_f64)
    }
}

impl Serialize for Decision {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.payload.serialize(serializer)
    }
}
