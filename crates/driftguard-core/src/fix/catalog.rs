//! Fix catalog: the flat, ordered list of fixes contributed by loaded plugins.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::ProjectConfig;
use crate::error::DriftError;
use crate::plugin::LoadedPlugins;
use crate::types::{Stage, TargetOs};

use super::{Fix, synthesize_env_fixes};

/// Ordered fix catalog, rebuilt on every invocation.
#[derive(Debug, Clone, Default)]
pub struct FixCatalog {
    fixes: Vec<Arc<Fix>>,
}

/// Fixes of one stage after target-OS filtering.
#[derive(Debug, Clone, Default)]
pub struct StageFixes {
    pub applicable: Vec<Arc<Fix>>,
    /// Filtered out by OS; neither scanned nor counted
    pub os_skipped: Vec<Arc<Fix>>,
}

impl FixCatalog {
    /// Build the catalog: per plugin, its own fixes then its synthesized
    /// env-var checks. Fix ids must be unique across the catalog.
    pub fn build(plugins: &LoadedPlugins, config: &ProjectConfig) -> Result<Self, DriftError> {
        let mut fixes = Vec::new();
        for plugin in plugins.plugins() {
            let id = plugin.id();
            fixes.extend(plugin.fixes(config).into_iter().map(|f| f.with_plugin(id)));
            for var in plugin.required_env_vars(config) {
                fixes.extend(synthesize_env_fixes(id, &var));
            }
        }
        Self::from_fixes(fixes)
    }

    /// Build a catalog from an explicit list, keeping the given order.
    pub fn from_fixes(fixes: Vec<Fix>) -> Result<Self, DriftError> {
        let mut owners: HashMap<String, String> = HashMap::new();
        for fix in &fixes {
            if let Some(first) = owners.insert(fix.id.clone(), fix.plugin.clone()) {
                return Err(DriftError::DuplicateFixId {
                    id: fix.id.clone(),
                    first,
                    second: fix.plugin.clone(),
                });
            }
        }
        Ok(Self {
            fixes: fixes.into_iter().map(Arc::new).collect(),
        })
    }

    pub fn all(&self) -> &[Arc<Fix>] {
        &self.fixes
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Fix>> {
        self.fixes.iter().find(|f| f.id == id)
    }

    pub fn len(&self) -> usize {
        self.fixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fixes.is_empty()
    }

    /// Fixes tagged with `stage`, in catalog order.
    pub fn for_stage(&self, stage: Stage) -> impl Iterator<Item = &Arc<Fix>> {
        self.fixes.iter().filter(move |f| f.stage == stage)
    }

    /// Fixes of `stage`, split by whether their OS filter admits `os`.
    pub fn applicable(&self, stage: Stage, os: TargetOs) -> StageFixes {
        let (applicable, os_skipped) = self
            .for_stage(stage)
            .cloned()
            .partition(|f| f.applies_to_os(os));
        StageFixes {
            applicable,
            os_skipped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fix::Detection;
    use crate::types::{OsFilter, Severity};

    fn fix(id: &str, stage: Stage) -> Fix {
        Fix::new(id, stage, Severity::Warning, id, |_, _| Ok(Detection::Clean))
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let err = FixCatalog::from_fixes(vec![
            fix("a", Stage::Dev).with_plugin("one"),
            fix("a", Stage::Prod).with_plugin("two"),
        ])
        .unwrap_err();
        match err {
            DriftError::DuplicateFixId { id, first, second } => {
                assert_eq!(id, "a");
                assert_eq!(first, "one");
                assert_eq!(second, "two");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_for_stage_keeps_catalog_order() {
        let catalog = FixCatalog::from_fixes(vec![
            fix("b", Stage::Dev),
            fix("x", Stage::Prod),
            fix("a", Stage::Dev),
        ])
        .unwrap();
        let ids: Vec<_> = catalog.for_stage(Stage::Dev).map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn test_applicable_splits_by_os() {
        let catalog = FixCatalog::from_fixes(vec![
            fix("linux-only", Stage::Prod).with_os(OsFilter::only(TargetOs::Linux)),
            fix("any", Stage::Prod),
        ])
        .unwrap();

        let darwin = catalog.applicable(Stage::Prod, TargetOs::Darwin);
        assert_eq!(darwin.applicable.len(), 1);
        assert_eq!(darwin.applicable[0].id, "any");
        assert_eq!(darwin.os_skipped.len(), 1);
        assert_eq!(darwin.os_skipped[0].id, "linux-only");

        let linux = catalog.applicable(Stage::Prod, TargetOs::Linux);
        assert_eq!(linux.applicable.len(), 2);
        assert!(linux.os_skipped.is_empty());
    }
}
