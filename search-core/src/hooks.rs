//! The `indexPage` hook registry.
//!
//! Hooks run synchronously on the indexing path, after script/style/marker
//! stripping but before the head/body split, and before the write lock is
//! acquired — they must not assume a surrounding transaction.

/// Metadata available to a hook, mirroring [`crate::model::IndexInput`] minus
/// the raw HTML content (which the hook receives separately, and may mutate).
#[derive(Debug, Clone, Copy)]
pub struct PageMetadata<'a> {
    pub url: &'a str,
    pub pid: i64,
    pub title: &'a str,
    pub language: &'a str,
    pub protected: bool,
    pub groups: &'a str,
}

/// One registered collaborator. `on_index` may rewrite `content` in place and
/// push additional surface forms into `extra_terms`, which get folded into
/// the document text before tokenization.
pub trait IndexHook: Send + Sync {
    fn on_index(&self, content: &mut String, metadata: &PageMetadata<'_>, extra_terms: &mut Vec<String>);
}

/// An ordered list of [`IndexHook`]s, invoked in registration order.
#[derive(Default)]
pub struct HookRegistry {
    hooks: Vec<Box<dyn IndexHook>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, hook: Box<dyn IndexHook>) {
        self.hooks.push(hook);
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Run every hook against `content`, returning the terms they built.
    pub fn run(&self, content: &mut String, metadata: &PageMetadata<'_>) -> Vec<String> {
        let mut extra_terms = Vec::new();
        for hook in &self.hooks {
            hook.on_index(content, metadata, &mut extra_terms);
        }
        extra_terms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct UppercaseMarker;

    impl IndexHook for UppercaseMarker {
        fn on_index(&self, content: &mut String, _metadata: &PageMetadata<'_>, extra_terms: &mut Vec<String>) {
            content.push_str(" [seen]");
            extra_terms.push("seen".to_string());
        }
    }

    #[test]
    fn runs_hooks_in_registration_order() {
        let mut registry = HookRegistry::new();
        registry.register(Box::new(UppercaseMarker));

        let mut content = "hello".to_string();
        let metadata = PageMetadata {
            url: "https://example.com",
            pid: 1,
            title: "",
            language: "en",
            protected: false,
            groups: "",
        };

        let extra = registry.run(&mut content, &metadata);

        assert_eq!(content, "hello [seen]");
        assert_eq!(extra, vec!["seen".to_string()]);
    }

    #[test]
    fn empty_registry_is_a_no_op() {
        let registry = HookRegistry::new();
        assert!(registry.is_empty());

        let mut content = "hello".to_string();
        let metadata = PageMetadata {
            url: "https://example.com",
            pid: 1,
            title: "",
            language: "en",
            protected: false,
            groups: "",
        };

        let extra = registry.run(&mut content, &metadata);
        assert_eq!(content, "hello");
        assert!(extra.is_empty());
    }
}
