use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use slotcore::{slugify, RegistryError, Widget, WidgetAction};

/// Catalog entry describing a registered widget
#[derive(Debug, Clone, Serialize)]
pub struct WidgetInfo {
    pub name: String,
    pub icon: Option<String>,
    pub template: Option<String>,
    pub actions: Vec<String>,
    pub has_schema: bool,
    pub default_tools: Vec<String>,
}

/// Registry of available widgets.
///
/// Populated once at process start, then shared read-only across the API
/// boundary and the workers.
pub struct WidgetRegistry {
    widgets: HashMap<String, Arc<dyn Widget>>,
}

impl WidgetRegistry {
    pub fn new() -> Self {
        Self {
            widgets: HashMap::new(),
        }
    }

    /// Register a widget under its name
    pub fn register(&mut self, widget: Arc<dyn Widget>) {
        let name = widget.name().to_string();
        tracing::info!("Registering widget: {}", name);
        if self.widgets.insert(name.clone(), widget).is_some() {
            tracing::warn!("Widget '{}' registered twice, the later one wins", name);
        }
    }

    /// Resolve a widget by exact name first, then by slug-normalized match.
    pub fn resolve_widget(&self, name: &str) -> Result<Arc<dyn Widget>, RegistryError> {
        if let Some(widget) = self.widgets.get(name) {
            return Ok(Arc::clone(widget));
        }
        let wanted = slugify(name);
        self.widgets
            .iter()
            .find(|(registered, _)| slugify(registered) == wanted)
            .map(|(_, widget)| Arc::clone(widget))
            .ok_or_else(|| RegistryError::WidgetNotFound(name.to_string()))
    }

    /// Resolve one of the widget's actions by exact name first, then by
    /// slug-normalized equality.
    pub fn resolve_action(
        &self,
        widget: &dyn Widget,
        identifier: &str,
    ) -> Result<Arc<dyn WidgetAction>, RegistryError> {
        let actions = widget.actions();
        if let Some(action) = actions.iter().find(|a| a.name() == identifier) {
            return Ok(Arc::clone(action));
        }
        let wanted = slugify(identifier);
        actions
            .iter()
            .find(|a| slugify(a.name()) == wanted)
            .map(Arc::clone)
            .ok_or_else(|| RegistryError::ActionNotFound {
                widget: widget.name().to_string(),
                action: identifier.to_string(),
            })
    }

    /// Catalog of all registered widgets, sorted by name
    pub fn list_widgets(&self) -> Vec<WidgetInfo> {
        let mut infos: Vec<WidgetInfo> = self
            .widgets
            .values()
            .map(|widget| WidgetInfo {
                name: widget.name().to_string(),
                icon: widget.icon().map(str::to_string),
                template: widget.template().map(str::to_string),
                actions: widget
                    .actions()
                    .iter()
                    .map(|action| action.name().to_string())
                    .collect(),
                has_schema: widget.schema().is_some(),
                default_tools: widget.default_tools(),
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    pub fn len(&self) -> usize {
        self.widgets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.widgets.is_empty()
    }
}

impl Default for WidgetRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotcore::ExecutionContext;

    struct TestAction(&'static str);

    impl WidgetAction for TestAction {
        fn name(&self) -> &str {
            self.0
        }

        fn build_prompt(&self, _ctx: &ExecutionContext) -> String {
            String::new()
        }
    }

    struct TestWidget;

    impl Widget for TestWidget {
        fn name(&self) -> &str {
            "key_facts"
        }

        fn actions(&self) -> Vec<Arc<dyn WidgetAction>> {
            vec![
                Arc::new(TestAction("generate")),
                Arc::new(TestAction("summarize")),
            ]
        }
    }

    fn registry() -> WidgetRegistry {
        let mut registry = WidgetRegistry::new();
        registry.register(Arc::new(TestWidget));
        registry
    }

    #[test]
    fn test_resolve_widget_exact_and_normalized() {
        let registry = registry();
        assert!(registry.resolve_widget("key_facts").is_ok());
        assert!(registry.resolve_widget("Key Facts").is_ok());
        assert!(registry.resolve_widget("KEY-FACTS").is_ok());
    }

    #[test]
    fn test_resolve_widget_unknown() {
        let registry = registry();
        let err = registry.resolve_widget("missing").err().unwrap();
        match err {
            RegistryError::WidgetNotFound(name) => assert_eq!(name, "missing"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_resolve_action_exact_and_normalized() {
        let registry = registry();
        let widget = registry.resolve_widget("key_facts").unwrap();

        let exact = registry.resolve_action(widget.as_ref(), "summarize").unwrap();
        assert_eq!(exact.name(), "summarize");

        let folded = registry.resolve_action(widget.as_ref(), "SUMMARIZE").unwrap();
        assert_eq!(folded.name(), "summarize");
    }

    #[test]
    fn test_resolve_action_unknown_names_both_sides() {
        let registry = registry();
        let widget = registry.resolve_widget("key_facts").unwrap();
        let err = registry.resolve_action(widget.as_ref(), "UNKNOWN").err().unwrap();
        match err {
            RegistryError::ActionNotFound { widget, action } => {
                assert_eq!(widget, "key_facts");
                assert_eq!(action, "UNKNOWN");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_list_widgets_reports_catalog_metadata() {
        let registry = registry();
        let infos = registry.list_widgets();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].name, "key_facts");
        assert_eq!(infos[0].actions, vec!["generate", "summarize"]);
        assert!(!infos[0].has_schema);
    }
}
