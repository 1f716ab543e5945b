//! Part handler registry
//!
//! Maps part type tags to their handlers. Registration is write-once: a tag
//! can never be rebound, so behavior for a part type stays stable for the
//! lifetime of the process. A shared global registry with the built-in
//! handlers is available through [`global_registry`].

use super::{
    IntanHandler, JsonHandler, OpaqueHandler, PartError, PartHandler, PartResult, TableHandler,
    TsyncHandler, VideoHandler,
};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Part type tag resolved when no handler matches a declared type
pub const FALLBACK_PART_TYPE: &str = "opaque";

/// Registry of part handlers keyed by type tag
pub struct PartRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn PartHandler>>>,
}

impl PartRegistry {
    /// Create a registry with the built-in handlers
    pub fn new() -> Self {
        let registry = Self {
            handlers: RwLock::new(HashMap::new()),
        };
        registry.register_builtin();
        registry
    }

    /// Register built-in part handlers
    fn register_builtin(&self) {
        let builtin: [Arc<dyn PartHandler>; 7] = [
            Arc::new(VideoHandler),
            Arc::new(TableHandler::csv()),
            Arc::new(TableHandler::tsv()),
            Arc::new(TsyncHandler),
            Arc::new(IntanHandler),
            Arc::new(JsonHandler),
            Arc::new(OpaqueHandler),
        ];

        let mut handlers = self.handlers.write().unwrap();
        for handler in builtin {
            handlers.insert(handler.name().to_string(), handler);
        }
    }

    /// Register a custom part handler under a type tag
    ///
    /// Fails if the tag is already bound, including the built-in tags.
    pub fn register(
        &self,
        part_type: impl Into<String>,
        handler: Arc<dyn PartHandler>,
    ) -> PartResult<()> {
        let part_type = part_type.into();
        let mut handlers = self.handlers.write().unwrap();
        if handlers.contains_key(&part_type) {
            return Err(PartError::AlreadyRegistered(part_type));
        }
        handlers.insert(part_type, handler);
        Ok(())
    }

    /// Look up the handler for a part type tag
    pub fn resolve(&self, part_type: &str) -> Option<Arc<dyn PartHandler>> {
        let handlers = self.handlers.read().unwrap();
        handlers.get(part_type).cloned()
    }

    /// Handler used for part types without a registered handler
    pub fn fallback(&self) -> Option<Arc<dyn PartHandler>> {
        self.resolve(FALLBACK_PART_TYPE)
    }

    /// Check if a part type tag is registered
    pub fn is_registered(&self, part_type: &str) -> bool {
        let handlers = self.handlers.read().unwrap();
        handlers.contains_key(part_type)
    }

    /// List all registered part type tags in sorted order
    pub fn list_types(&self) -> Vec<String> {
        let handlers = self.handlers.read().unwrap();
        let mut types: Vec<String> = handlers.keys().cloned().collect();
        types.sort();
        types
    }
}

impl Default for PartRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Global part registry instance
static GLOBAL_REGISTRY: once_cell::sync::Lazy<PartRegistry> =
    once_cell::sync::Lazy::new(PartRegistry::new);

/// Get the global part registry
///
/// Discovery and conversion use this registry unless one is passed
/// explicitly. Handlers registered here are visible process-wide.
pub fn global_registry() -> &'static PartRegistry {
    &GLOBAL_REGISTRY
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parts::PartData;
    use edl_core_manifest::DataPartRef;
    use std::path::Path;

    struct NullHandler;

    impl PartHandler for NullHandler {
        fn name(&self) -> &str {
            "null"
        }

        fn validate(&self, _path: &Path, _part: &DataPartRef) -> PartResult<Vec<String>> {
            Ok(Vec::new())
        }

        fn load(&self, _path: &Path, _part: &DataPartRef) -> PartResult<PartData> {
            Ok(PartData::Bytes(Vec::new()))
        }
    }

    #[test]
    fn test_builtin_handlers_registered() {
        let registry = PartRegistry::new();
        assert_eq!(
            registry.list_types(),
            vec!["intan", "json", "opaque", "table:csv", "table:tsv", "tsync", "video"]
        );
    }

    #[test]
    fn test_resolve_returns_matching_handler() {
        let registry = PartRegistry::new();
        let handler = registry.resolve("table:csv").unwrap();
        assert_eq!(handler.name(), "table:csv");
        assert!(registry.resolve("table:parquet").is_none());
    }

    #[test]
    fn test_fallback_is_opaque() {
        let registry = PartRegistry::new();
        assert_eq!(registry.fallback().unwrap().name(), "opaque");
    }

    #[test]
    fn test_register_custom_handler() {
        let registry = PartRegistry::new();
        registry.register("null", Arc::new(NullHandler)).unwrap();
        assert!(registry.is_registered("null"));
        assert_eq!(registry.resolve("null").unwrap().name(), "null");
    }

    #[test]
    fn test_register_is_write_once() {
        let registry = PartRegistry::new();
        registry.register("null", Arc::new(NullHandler)).unwrap();

        let err = registry
            .register("null", Arc::new(NullHandler))
            .unwrap_err();
        assert!(matches!(err, PartError::AlreadyRegistered(_)));

        let err = registry
            .register("video", Arc::new(NullHandler))
            .unwrap_err();
        assert!(err.to_string().contains("video"));
    }

    #[test]
    fn test_global_registry_has_builtins() {
        let registry = global_registry();
        assert!(registry.is_registered("tsync"));
        assert!(registry.is_registered("opaque"));
    }
}
