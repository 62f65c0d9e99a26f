//! Tool registry.
//!
//! The registry is the process-wide catalog of callable tools, built once at
//! startup and read by the planner and executor.  It is an explicit instance
//! passed by reference — no global mutable state.  Internally backed by
//! [`DashMap`], so the registry is cheaply cloneable and safe to share across
//! tasks without a surrounding lock.
//!
//! Duplicate registration is a warn-and-overwrite, never a failure: the most
//! recently registered tool wins.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ToolError};
use crate::traits::{ActionKind, Tool, ToolCategory, ToolMetadata};

// ---------------------------------------------------------------------------
// Filter criteria
// ---------------------------------------------------------------------------

/// Criteria for narrowing a registry lookup.  Unset fields match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolFilter {
    /// Match only tools in this category.
    pub category: Option<ToolCategory>,

    /// Match only tools with this verb class.
    pub action: Option<ActionKind>,

    /// Match only tools operating on this entity type.
    pub entity: Option<String>,

    /// Match only tools with this approval requirement.
    pub requires_approval: Option<bool>,
}

impl ToolFilter {
    fn matches(&self, meta: &ToolMetadata) -> bool {
        if self.category.is_some_and(|c| meta.category != c) {
            return false;
        }
        if self.action.is_some_and(|a| meta.action != a) {
            return false;
        }
        if self.entity.as_deref().is_some_and(|e| meta.entity != e) {
            return false;
        }
        if self
            .requires_approval
            .is_some_and(|r| meta.requires_approval != r)
        {
            return false;
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// A registered tool together with its metadata snapshot.
#[derive(Clone)]
struct Entry {
    tool: Arc<dyn Tool>,
    meta: ToolMetadata,
}

/// Concurrent tool catalog backed by [`DashMap`].
///
/// Cheaply cloneable (`Arc`-backed) and `Send + Sync`.  Writes happen only
/// during startup registration; steady-state access is read-only.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    inner: Arc<DashMap<String, Entry>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
        }
    }

    /// Register a tool under its name.
    ///
    /// If a tool with the same name already exists it is overwritten with a
    /// warning; registration never fails.
    pub fn register(&self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_owned();
        let meta = tool.metadata();

        if self.inner.contains_key(&name) {
            tracing::warn!(tool = %name, "tool already registered, overwriting");
        } else {
            tracing::info!(tool = %name, category = %meta.category, "tool registered");
        }

        self.inner.insert(name, Entry { tool, meta });
    }

    /// Look up a tool by exact name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Tool>> {
        self.inner
            .get(name)
            .map(|entry| entry.tool.clone())
            .ok_or_else(|| ToolError::NotFound {
                tool_name: name.to_owned(),
            })
    }

    /// Metadata snapshot for a tool by exact name.
    pub fn metadata(&self, name: &str) -> Result<ToolMetadata> {
        self.inner
            .get(name)
            .map(|entry| entry.meta.clone())
            .ok_or_else(|| ToolError::NotFound {
                tool_name: name.to_owned(),
            })
    }

    /// Whether a tool with this exact name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(name)
    }

    /// All registered tool names, sorted for deterministic output.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// All tools in the given category.
    pub fn by_category(&self, category: ToolCategory) -> Vec<String> {
        self.filter(&ToolFilter {
            category: Some(category),
            ..ToolFilter::default()
        })
    }

    /// All tools with the given verb class.
    pub fn by_action(&self, action: ActionKind) -> Vec<String> {
        self.filter(&ToolFilter {
            action: Some(action),
            ..ToolFilter::default()
        })
    }

    /// All tools operating on the given entity type.
    pub fn by_entity(&self, entity: &str) -> Vec<String> {
        self.filter(&ToolFilter {
            entity: Some(entity.to_owned()),
            ..ToolFilter::default()
        })
    }

    /// Names of all tools matching the filter, sorted.
    pub fn filter(&self, criteria: &ToolFilter) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .iter()
            .filter(|e| criteria.matches(&e.value().meta))
            .map(|e| e.key().clone())
            .collect();
        names.sort();
        names
    }

    /// Find the closest registered name for an unrecognized tool name.
    ///
    /// Used by the planner's tool-name reconciliation: an exact
    /// case-insensitive match wins, then a case-insensitive substring match
    /// in either direction.  Ties resolve to the alphabetically first
    /// candidate so remapping is deterministic.
    pub fn closest_match(&self, name: &str) -> Option<String> {
        let wanted = name.to_lowercase();
        let names = self.names();

        if let Some(exact) = names.iter().find(|n| n.to_lowercase() == wanted) {
            return Some(exact.clone());
        }

        names
            .iter()
            .find(|n| {
                let registered = n.to_lowercase();
                registered.contains(&wanted) || wanted.contains(&registered)
            })
            .cloned()
    }

    /// Render a textual catalog of the registered tools, with metadata and
    /// example invocations.  Used to prime the planner's generation prompt.
    pub fn render_catalog(&self, criteria: Option<&ToolFilter>) -> String {
        let names = match criteria {
            Some(filter) => self.filter(filter),
            None => self.names(),
        };

        let mut buf = String::with_capacity(names.len() * 200);
        for name in names {
            let Some(entry) = self.inner.get(&name) else {
                continue;
            };
            let meta = &entry.value().meta;

            buf.push_str(&format!(
                "- `{}` ({}) [{}/{} -> {}]\n",
                name, meta.display_name, meta.category, meta.action, meta.entity,
            ));
            buf.push_str(&format!(
                "  approval: {} | reversible: {}\n",
                if meta.requires_approval { "required" } else { "not required" },
                if meta.is_reversible { "yes" } else { "no" },
            ));
            if !meta.keywords.is_empty() {
                buf.push_str(&format!("  keywords: {}\n", meta.keywords.join(", ")));
            }
            for example in &meta.examples {
                buf.push_str(&format!("  example: {example}\n"));
            }
        }
        buf
    }

    /// Count how many distinct registered tools the given text references.
    ///
    /// A tool is referenced when its name (with underscores read as spaces)
    /// or one of its keywords appears in the text, case-insensitively.
    pub fn referenced_tools(&self, text: &str) -> usize {
        let haystack = text.to_lowercase();
        let mut seen: HashSet<String> = HashSet::new();

        for entry in self.inner.iter() {
            let spoken_name = entry.key().replace('_', " ").to_lowercase();
            let matched = haystack.contains(&spoken_name)
                || entry
                    .value()
                    .meta
                    .keywords
                    .iter()
                    .any(|kw| haystack.contains(&kw.to_lowercase()));
            if matched {
                seen.insert(entry.key().clone());
            }
        }

        seen.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{ToolContext, ToolOutcome};
    use async_trait::async_trait;
    use serde_json::Value;

    struct FakeTool {
        name: String,
        meta: ToolMetadata,
    }

    impl FakeTool {
        fn boxed(
            name: &str,
            category: ToolCategory,
            action: ActionKind,
            entity: &str,
            keywords: &[&str],
        ) -> Arc<dyn Tool> {
            Arc::new(Self {
                name: name.to_owned(),
                meta: ToolMetadata {
                    display_name: name.replace('_', " "),
                    category,
                    action,
                    requires_approval: category == ToolCategory::Creation,
                    is_reversible: true,
                    entity: entity.to_owned(),
                    keywords: keywords.iter().map(|s| s.to_string()).collect(),
                    examples: vec![format!("please {name}")],
                },
            })
        }
    }

    #[async_trait]
    impl Tool for FakeTool {
        fn name(&self) -> &str {
            &self.name
        }

        fn metadata(&self) -> ToolMetadata {
            self.meta.clone()
        }

        async fn execute(&self, params: Value, _ctx: &ToolContext) -> Result<ToolOutcome> {
            Ok(ToolOutcome::Completed(params))
        }
    }

    fn seeded_registry() -> ToolRegistry {
        let registry = ToolRegistry::new();
        registry.register(FakeTool::boxed(
            "create_work_item",
            ToolCategory::Creation,
            ActionKind::Create,
            "work_item",
            &["task", "ticket"],
        ));
        registry.register(FakeTool::boxed(
            "analyze_board",
            ToolCategory::Analysis,
            ActionKind::Read,
            "board",
            &["bottleneck"],
        ));
        registry.register(FakeTool::boxed(
            "search_competitors",
            ToolCategory::Analysis,
            ActionKind::Search,
            "market",
            &["competitor", "competitors"],
        ));
        registry
    }

    #[test]
    fn register_and_get() {
        let registry = seeded_registry();
        assert_eq!(registry.len(), 3);
        assert!(registry.get("create_work_item").is_ok());
        assert!(matches!(
            registry.get("nope"),
            Err(ToolError::NotFound { .. })
        ));
    }

    #[test]
    fn duplicate_registration_overwrites() {
        let registry = seeded_registry();
        registry.register(FakeTool::boxed(
            "create_work_item",
            ToolCategory::Creation,
            ActionKind::Create,
            "work_item",
            &["replacement"],
        ));

        assert_eq!(registry.len(), 3);
        let meta = registry.metadata("create_work_item").unwrap();
        assert_eq!(meta.keywords, vec!["replacement"]);
    }

    #[test]
    fn category_entity_and_action_lookups() {
        let registry = seeded_registry();

        assert_eq!(
            registry.by_category(ToolCategory::Analysis),
            vec!["analyze_board", "search_competitors"]
        );
        assert_eq!(registry.by_entity("work_item"), vec!["create_work_item"]);
        assert_eq!(registry.by_action(ActionKind::Search), vec!["search_competitors"]);
    }

    #[test]
    fn filter_combines_criteria() {
        let registry = seeded_registry();

        let hits = registry.filter(&ToolFilter {
            category: Some(ToolCategory::Analysis),
            action: Some(ActionKind::Read),
            ..ToolFilter::default()
        });
        assert_eq!(hits, vec!["analyze_board"]);

        let none = registry.filter(&ToolFilter {
            category: Some(ToolCategory::Strategy),
            ..ToolFilter::default()
        });
        assert!(none.is_empty());
    }

    #[test]
    fn closest_match_prefers_exact_then_substring() {
        let registry = seeded_registry();

        assert_eq!(
            registry.closest_match("Create_Work_Item").as_deref(),
            Some("create_work_item")
        );
        assert_eq!(
            registry.closest_match("work_item").as_deref(),
            Some("create_work_item")
        );
        assert_eq!(
            registry.closest_match("analyze_board_deeply").as_deref(),
            Some("analyze_board")
        );
        assert!(registry.closest_match("launch_rocket").is_none());
    }

    #[test]
    fn catalog_rendering_includes_examples() {
        let registry = seeded_registry();
        let catalog = registry.render_catalog(None);

        assert!(catalog.contains("`analyze_board`"));
        assert!(catalog.contains("example: please create_work_item"));
        assert!(catalog.contains("approval: required"));

        let filtered = registry.render_catalog(Some(&ToolFilter {
            entity: Some("market".into()),
            ..ToolFilter::default()
        }));
        assert!(filtered.contains("search_competitors"));
        assert!(!filtered.contains("analyze_board"));
    }

    #[test]
    fn referenced_tool_counting() {
        let registry = seeded_registry();

        assert_eq!(
            registry.referenced_tools("search competitors and then create a ticket"),
            2
        );
        assert_eq!(registry.referenced_tools("what is the weather"), 0);
    }
}
