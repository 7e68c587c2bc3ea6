//! CRUD store for workflow definitions and projects.
//!
//! Persistence is an external concern; this store keeps the §3 data model
//! behind the same interface an on-disk database would offer.

use autodeck_workflow::Workflow;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;

/// Project grouping a set of workflows.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub description: String,
}

/// Thread-safe in-memory workflow + project store.
#[derive(Default)]
pub struct WorkflowStore {
    workflows: RwLock<HashMap<String, Workflow>>,
    projects: RwLock<HashMap<String, ProjectRecord>>,
}

impl WorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ── workflows ────────────────────────────────────────────────────────

    pub fn save_workflow(&self, workflow: Workflow) {
        self.workflows
            .write()
            .insert(workflow.id.clone(), workflow);
    }

    pub fn get_workflow(&self, id: &str) -> Option<Workflow> {
        self.workflows.read().get(id).cloned()
    }

    pub fn delete_workflow(&self, id: &str) -> bool {
        self.workflows.write().remove(id).is_some()
    }

    pub fn rename_workflow(&self, id: &str, new_name: &str) -> bool {
        match self.workflows.write().get_mut(id) {
            Some(workflow) => {
                workflow.name = new_name.to_string();
                true
            }
            None => false,
        }
    }

    /// Workflow summaries (id, name, project, platform).
    pub fn list_workflows(&self) -> Vec<Value> {
        let mut summaries: Vec<Value> = self
            .workflows
            .read()
            .values()
            .map(workflow_summary)
            .collect();
        summaries.sort_by_key(|v| v["id"].as_str().unwrap_or_default().to_string());
        summaries
    }

    // ── projects ─────────────────────────────────────────────────────────

    pub fn save_project(&self, project: ProjectRecord) {
        self.projects.write().insert(project.id.clone(), project);
    }

    pub fn rename_project(&self, id: &str, new_name: &str) -> bool {
        match self.projects.write().get_mut(id) {
            Some(project) => {
                project.name = new_name.to_string();
                true
            }
            None => false,
        }
    }

    /// Delete a project and every workflow belonging to it.
    pub fn delete_project(&self, id: &str) -> bool {
        let existed = self.projects.write().remove(id).is_some();
        self.workflows.write().retain(|_, wf| wf.project_id != id);
        existed
    }

    /// Projects with their contained workflow summaries.
    pub fn list_projects(&self) -> Vec<Value> {
        let workflows = self.workflows.read();
        let mut listed: Vec<Value> = self
            .projects
            .read()
            .values()
            .map(|project| {
                let mut contained: Vec<Value> = workflows
                    .values()
                    .filter(|wf| wf.project_id == project.id)
                    .map(workflow_summary)
                    .collect();
                contained.sort_by_key(|v| v["id"].as_str().unwrap_or_default().to_string());
                json!({
                    "id": project.id,
                    "name": project.name,
                    "platform": project.platform,
                    "description": project.description,
                    "workflows": contained,
                })
            })
            .collect();
        listed.sort_by_key(|v| v["id"].as_str().unwrap_or_default().to_string());
        listed
    }
}

fn workflow_summary(workflow: &Workflow) -> Value {
    json!({
        "id": workflow.id,
        "name": workflow.name,
        "projectId": workflow.project_id,
        "platform": workflow.platform,
        "description": workflow.description,
    })
}
