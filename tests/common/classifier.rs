//! Classification fixtures
//!
//! Canned classifier replies and settings that switch classification on.

use std::sync::Arc;
use todo_harvest::{ClassifyError, MockClassifier, Settings};

pub const ENDPOINT: &str = "http://127.0.0.1:9/classify";

/// Turn classification on with a dummy endpoint and credential.
pub fn enable_classification(settings: &mut Settings) {
    settings.classification_enabled = true;
    settings.classification_endpoint = ENDPOINT.to_string();
    settings.credential = "test-credential".to_string();
}

/// A classifier answering with the structured `groups` form.
pub fn structured(groups: serde_json::Value) -> Arc<MockClassifier> {
    let reply = serde_json::json!({ "groups": groups }).to_string();
    Arc::new(MockClassifier::responding(reply))
}

/// A classifier answering with grouped markdown.
pub fn freeform(markdown: &str) -> Arc<MockClassifier> {
    Arc::new(MockClassifier::responding(markdown))
}

/// A classifier whose calls fail at the transport level.
pub fn unreachable() -> Arc<MockClassifier> {
    Arc::new(MockClassifier::failing(ClassifyError::Transport(
        "connection refused".to_string(),
    )))
}
