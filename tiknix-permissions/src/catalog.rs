//! Registry of routable handlers.
//!
//! Build mode only auto-creates a permission for a handler that exists and
//! is public. Controllers register their handlers here at startup.

use std::collections::HashMap;

use tiknix_core::PermissionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Protected,
    Private,
}

/// Answers whether a controller/method pair names a handler.
pub trait HandlerLookup: Send + Sync + std::fmt::Debug {
    /// Visibility of the handler, or `None` if it does not exist.
    fn visibility(&self, control: &str, method: &str) -> Option<Visibility>;

    /// Ok if the handler exists and can be routed to.
    fn ensure_routable(&self, control: &str, method: &str) -> Result<(), PermissionError> {
        match self.visibility(control, method) {
            Some(Visibility::Public) => Ok(()),
            Some(_) => Err(PermissionError::HandlerNotPublic {
                control: control.to_string(),
                method: method.to_string(),
            }),
            None => Err(PermissionError::HandlerNotFound {
                control: control.to_string(),
                method: method.to_string(),
            }),
        }
    }
}

/// In-memory handler catalog. Lookups ignore case.
#[derive(Debug, Clone, Default)]
pub struct HandlerCatalog {
    controllers: HashMap<String, HashMap<String, Visibility>>,
}

impl HandlerCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        control: &str,
        method: &str,
        visibility: Visibility,
    ) -> &mut Self {
        self.controllers
            .entry(control.to_lowercase())
            .or_default()
            .insert(method.to_lowercase(), visibility);
        self
    }

    /// Builder form: register public handlers for one controller.
    pub fn with_public(mut self, control: &str, methods: &[&str]) -> Self {
        for method in methods {
            self.register(control, method, Visibility::Public);
        }
        self
    }

    pub fn with_handler(mut self, control: &str, method: &str, visibility: Visibility) -> Self {
        self.register(control, method, visibility);
        self
    }

    pub fn controller_count(&self) -> usize {
        self.controllers.len()
    }
}

impl HandlerLookup for HandlerCatalog {
    fn visibility(&self, control: &str, method: &str) -> Option<Visibility> {
        self.controllers
            .get(&control.to_lowercase())?
            .get(&method.to_lowercase())
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_ignores_case() {
        let catalog = HandlerCatalog::new().with_public("Widgets", &["list", "Show"]);
        assert_eq!(catalog.visibility("widgets", "LIST"), Some(Visibility::Public));
        assert_eq!(catalog.visibility("WIDGETS", "show"), Some(Visibility::Public));
        assert!(catalog.ensure_routable("widgets", "list").is_ok());
    }

    #[test]
    fn test_unroutable_handlers() {
        let catalog = HandlerCatalog::new().with_handler("widgets", "rebuild", Visibility::Private);

        assert!(matches!(
            catalog.ensure_routable("widgets", "rebuild"),
            Err(PermissionError::HandlerNotPublic { .. })
        ));
        assert!(matches!(
            catalog.ensure_routable("widgets", "missing"),
            Err(PermissionError::HandlerNotFound { .. })
        ));
        assert!(matches!(
            catalog.ensure_routable("nothing", "list"),
            Err(PermissionError::HandlerNotFound { .. })
        ));
    }
}
