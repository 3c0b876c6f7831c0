use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A page action suggested by the backend alongside a reply.
///
/// The backend currently emits navigation hints such as
/// `{"type": "navigate", "section_id": "projects"}`.  The core never acts on
/// them; they are handed to the host through the session observer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Action {
    /// The action kind, e.g. `navigate`.
    #[serde(rename = "type")]
    pub kind: String,

    /// Target page section for navigation actions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_id: Option<String>,

    /// Any additional fields the backend attached.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Action {
    /// Create a navigation action for the given section.
    pub fn navigate(section_id: impl Into<String>) -> Self {
        Self {
            kind: "navigate".to_string(),
            section_id: Some(section_id.into()),
            extra: Map::new(),
        }
    }

    /// Returns the target section if this is a navigation action.
    pub fn navigation_target(&self) -> Option<&str> {
        if self.kind == "navigate" {
            self.section_id.as_deref()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, to_value};

    #[test]
    fn navigate_round_trip_shape() {
        assert_eq!(
            to_value(Action::navigate("skills")).unwrap(),
            json!({"type": "navigate", "section_id": "skills"})
        );
    }

    #[test]
    fn extra_fields_are_kept() {
        let action: Action = serde_json::from_value(json!({
            "type": "highlight",
            "selector": "#contact"
        }))
        .unwrap();
        assert_eq!(action.kind, "highlight");
        assert!(action.navigation_target().is_none());
        assert_eq!(action.extra["selector"], "#contact");
    }
}
