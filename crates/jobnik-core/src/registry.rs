//! FactoryRegistry - name -> factory の登録と管理
//!
//! - 起動時に登録（書き込み）、以後は読み取りのみ
//! - 名前は小文字に正規化して保存（case-insensitive lookup）
//! - DashMap による lock-free な並行アクセス

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::error::RegistryError;

/// Concurrent name -> factory table.
///
/// `kind` only appears in error messages ("jobnik", "job queue").
pub struct FactoryRegistry<F> {
    kind: &'static str,
    factories: DashMap<String, F>,
}

impl<F: Clone> FactoryRegistry<F> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            factories: DashMap::new(),
        }
    }

    pub fn register(&self, name: &str, factory: F) -> Result<(), RegistryError> {
        if name.is_empty() {
            return Err(RegistryError::EmptyName(self.kind));
        }
        match self.factories.entry(name.to_lowercase()) {
            Entry::Occupied(_) => Err(RegistryError::AlreadyRegistered {
                kind: self.kind,
                name: name.to_string(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(factory);
                Ok(())
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<F> {
        self.factories
            .get(&name.to_lowercase())
            .map(|f| f.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(&name.to_lowercase())
    }

    pub fn registered_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    type Factory = Arc<dyn Fn() -> u32 + Send + Sync>;

    fn registry() -> FactoryRegistry<Factory> {
        FactoryRegistry::new("test")
    }

    #[test]
    fn register_and_get_ignores_case() {
        let reg = registry();
        reg.register("PrintAttributes", Arc::new(|| 7)).unwrap();

        let factory = reg.get("printattributes").unwrap();
        assert_eq!(factory(), 7);
        assert!(reg.contains("PRINTATTRIBUTES"));
    }

    #[test]
    fn double_registration_differs_only_in_case() {
        let reg = registry();
        reg.register("loopTillCancel", Arc::new(|| 1)).unwrap();
        let result = reg.register("LOOPTILLCANCEL", Arc::new(|| 2));
        assert!(matches!(
            result,
            Err(RegistryError::AlreadyRegistered { kind: "test", .. })
        ));
        assert_eq!(reg.get("looptillcancel").unwrap()(), 1);
    }

    #[test]
    fn empty_name_is_rejected() {
        let reg = registry();
        assert_eq!(
            reg.register("", Arc::new(|| 0)).unwrap_err(),
            RegistryError::EmptyName("test")
        );
    }

    #[test]
    fn missing_factory_is_none() {
        assert!(registry().get("nothing").is_none());
    }

    #[test]
    fn registered_names_are_sorted_lowercase() {
        let reg = registry();
        reg.register("b", Arc::new(|| 0)).unwrap();
        reg.register("A", Arc::new(|| 0)).unwrap();
        assert_eq!(reg.registered_names(), vec!["a".to_string(), "b".to_string()]);
    }
}
