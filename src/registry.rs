use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::config::Config;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::Template;

/// Compiled templates stored under symbolic references.
///
/// `save` takes the write lock only to swap the map entry; compilation
/// happens before it. `load` hands out an `Arc`, so callers render
/// without holding the lock.
#[derive(Debug, Default)]
pub struct Registry {
    config: Config,
    templates: RwLock<HashMap<String, Arc<Template>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry whose `save` compiles with `config`.
    pub fn with_config(config: Config) -> Self {
        Self {
            config,
            templates: RwLock::default(),
        }
    }

    /// Compile `source` and store it under `reference`, replacing any
    /// previous template with that name. Nothing is stored on error.
    pub fn save(&self, reference: &str, source: &str) -> Result<Arc<Template>> {
        let template = Arc::new(Template::compile_with(source, self.config.clone())?);
        self.insert(reference, Arc::clone(&template));
        Ok(template)
    }

    pub fn insert(&self, reference: &str, template: Arc<Template>) {
        debug!(reference, "saving template");
        self.templates.write().insert(reference.to_string(), template);
    }

    pub fn load(&self, reference: &str) -> Result<Arc<Template>> {
        self.templates
            .read()
            .get(reference)
            .cloned()
            .ok_or_else(|| Error::TemplateNotFound(reference.to_string()))
    }

    /// Load and render in one step.
    pub fn render(&self, reference: &str, context: &Context) -> Result<String> {
        self.load(reference)?.render(context)
    }

    pub fn remove(&self, reference: &str) -> Option<Arc<Template>> {
        self.templates.write().remove(reference)
    }

    pub fn contains(&self, reference: &str) -> bool {
        self.templates.read().contains_key(reference)
    }

    pub fn len(&self) -> usize {
        self.templates.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn save_and_load_by_reference() {
        let registry = Registry::new();
        registry.save("test", r#"{{ "test" }}"#).unwrap();
        assert_eq!(registry.render("test", &Context::new()).unwrap(), "test");
        assert!(registry.contains("test"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn missing_reference() {
        let registry = Registry::new();
        assert_eq!(
            registry.load("nope").unwrap_err(),
            Error::TemplateNotFound("nope".into())
        );
    }

    #[test]
    fn saved_templates_use_the_registry_config() {
        let registry = Registry::with_config(Config::new().with_trim_blocks(true));
        let template = registry.save("list", "{% for x in xs %}\n{{ x }}\n{% endfor %}\n").unwrap();
        assert!(template.config().trim_blocks);

        let ctx = Context::new().with("xs", vec![1, 2]);
        assert_eq!(registry.render("list", &ctx).unwrap(), "1\n2\n");
        assert!(!Registry::new().save("t", "x").unwrap().config().trim_blocks);
    }

    #[test]
    fn failed_compile_keeps_previous() {
        let registry = Registry::new();
        registry.save("t", "ok").unwrap();
        assert!(registry.save("t", "{% if x %}").is_err());
        assert_eq!(registry.render("t", &Context::new()).unwrap(), "ok");
        assert!(registry.remove("t").is_some());
        assert!(registry.is_empty());
    }

    #[test]
    fn concurrent_renders_share_one_template() {
        let registry = Arc::new(Registry::new());
        registry.save("greet", "{{ name|upper }}").unwrap();

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    let ctx = Context::new().with("name", format!("user{i}"));
                    registry.render("greet", &ctx).unwrap()
                })
            })
            .collect();

        let mut outputs: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        outputs.sort();
        assert_eq!(outputs, ["USER0", "USER1", "USER2", "USER3"]);
    }
}
