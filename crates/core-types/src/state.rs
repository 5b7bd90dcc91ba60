use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Serialized browser storage state. Opaque to the engine apart from the
/// cookie jar, which is the part that carries the login.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SerializedState(pub Value);

impl SerializedState {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn from_cookies(cookies: Vec<Value>) -> Self {
        Self(serde_json::json!({ "cookies": cookies }))
    }

    pub fn cookies(&self) -> &[Value] {
        self.0
            .get("cookies")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Well-formed means an object carrying a non-empty cookie array.
    pub fn is_well_formed(&self) -> bool {
        self.0.is_object() && !self.cookies().is_empty()
    }

    /// Cookie-only copy; local/session storage origins are dropped before the
    /// state is handed to a browser.
    pub fn cookies_only(&self) -> Self {
        Self::from_cookies(self.cookies().to_vec())
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn well_formed_requires_cookies() {
        let state = SerializedState::new(json!({ "cookies": [{ "name": "sid", "value": "1" }] }));
        assert!(state.is_well_formed());

        assert!(!SerializedState::new(json!({ "cookies": [] })).is_well_formed());
        assert!(!SerializedState::new(json!("blob")).is_well_formed());
    }

    #[test]
    fn cookies_only_drops_origins() {
        let state = SerializedState::new(json!({
            "cookies": [{ "name": "sid", "value": "1" }],
            "origins": [{ "origin": "https://example.com", "localStorage": [] }]
        }));
        let cleaned = state.cookies_only();
        assert!(cleaned.as_value().get("origins").is_none());
        assert_eq!(cleaned.cookies().len(), 1);
    }
}
