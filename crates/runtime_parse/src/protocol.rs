use serde::Deserialize;

/// Reserved identifiers and payload markers of the partial protocol.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProtocolNames {
    pub view_state: String,
    pub view_root: String,
    pub view_head: String,
    pub view_body: String,
    pub source_param: String,
    pub ajax_param: String,
    pub execute_param: String,
    pub render_param: String,
    pub event_param: String,
    pub partial_header: String,
    pub partial_header_value: String,
}

impl Default for ProtocolNames {
    fn default() -> Self {
        Self {
            view_state: "javax.faces.ViewState".to_string(),
            view_root: "javax.faces.ViewRoot".to_string(),
            view_head: "javax.faces.ViewHead".to_string(),
            view_body: "javax.faces.ViewBody".to_string(),
            source_param: "javax.faces.source".to_string(),
            ajax_param: "javax.faces.partial.ajax".to_string(),
            execute_param: "javax.faces.partial.execute".to_string(),
            render_param: "javax.faces.partial.render".to_string(),
            event_param: "javax.faces.partial.event".to_string(),
            partial_header: "Faces-Request".to_string(),
            partial_header_value: "partial/ajax".to_string(),
        }
    }
}

impl ProtocolNames {
    /// Whether an `update` id names the view token, including namespaced
    /// forms such as `ns:javax.faces.ViewState:0`.
    pub fn is_view_state_id(&self, id: &str) -> bool {
        let vs = self.view_state.as_str();
        if id == vs {
            return true;
        }
        id.split(':').any(|segment| segment == vs)
    }

    /// Whether a form field name carries the view token.
    pub fn is_view_state_field(&self, name: &str) -> bool {
        name == self.view_state
            || name
                .strip_suffix(self.view_state.as_str())
                .is_some_and(|prefix| prefix.ends_with(':'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_namespaced_view_state_ids() {
        let names = ProtocolNames::default();
        assert!(names.is_view_state_id("javax.faces.ViewState"));
        assert!(names.is_view_state_id("j_id1:javax.faces.ViewState:0"));
        assert!(names.is_view_state_id("javax.faces.ViewState:1"));
        assert!(!names.is_view_state_id("javax.faces.ViewStateX"));
        assert!(!names.is_view_state_id("form:field"));
    }

    #[test]
    fn recognizes_view_state_fields() {
        let names = ProtocolNames::default();
        assert!(names.is_view_state_field("javax.faces.ViewState"));
        assert!(names.is_view_state_field("ns:javax.faces.ViewState"));
        assert!(!names.is_view_state_field("nsjavax.faces.ViewState"));
    }

    #[test]
    fn partial_overrides_keep_defaults() {
        let names: ProtocolNames = toml::from_str("view_state = \"vs\"").unwrap();
        assert_eq!(names.view_state, "vs");
        assert_eq!(names.view_body, "javax.faces.ViewBody");
    }
}
