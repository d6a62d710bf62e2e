//! Workflow template registry.
//!
//! Templates are opaque, parameterized graph descriptions consumed by the
//! generation backend. The orchestrator treats each one as an immutable JSON
//! blob with backend-resolved injection points: it never parses or branches
//! on the graph's internals, it only verifies the file is a JSON object and
//! forwards it verbatim on submission.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use crate::error::CoreError;

/// A single pre-validated workflow graph, keyed by its file stem.
#[derive(Debug, Clone)]
pub struct WorkflowTemplate {
    id: String,
    graph: serde_json::Value,
}

impl WorkflowTemplate {
    /// Wrap a parsed graph, rejecting anything that is not a JSON object.
    pub fn new(id: String, graph: serde_json::Value) -> Result<Self, CoreError> {
        if !graph.is_object() {
            return Err(CoreError::Validation(format!(
                "Template '{id}' is not a JSON object"
            )));
        }
        Ok(Self { id, graph })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The opaque graph, forwarded verbatim to the backend.
    pub fn graph(&self) -> &serde_json::Value {
        &self.graph
    }
}

/// All templates available to one run.
#[derive(Debug, Clone, Default)]
pub struct TemplateSet {
    templates: HashMap<String, WorkflowTemplate>,
}

impl TemplateSet {
    /// Load every `*.json` file in `dir` as a template; the file stem is the
    /// template id.
    pub fn load_dir(dir: &Path) -> Result<Self, CoreError> {
        let mut templates = HashMap::new();
        for dir_entry in fs::read_dir(dir)? {
            let path = dir_entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            let text = fs::read_to_string(&path)?;
            let graph: serde_json::Value = serde_json::from_str(&text).map_err(|e| {
                CoreError::Validation(format!("Template '{stem}' is not valid JSON: {e}"))
            })?;
            let template = WorkflowTemplate::new(stem.to_string(), graph)?;
            templates.insert(template.id.clone(), template);
        }
        Ok(Self { templates })
    }

    /// Build a set directly from templates (test and embedding hook).
    pub fn from_templates(templates: Vec<WorkflowTemplate>) -> Self {
        Self {
            templates: templates
                .into_iter()
                .map(|template| (template.id.clone(), template))
                .collect(),
        }
    }

    /// The ids known to this set, for manifest validation.
    pub fn ids(&self) -> HashSet<String> {
        self.templates.keys().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Result<&WorkflowTemplate, CoreError> {
        self.templates.get(id).ok_or(CoreError::NotFound {
            entity: "template",
            name: id.to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}
