use std::fs;
use std::path::{Path, PathBuf};

use iai_core::tool::{Tool, ToolOutput};
use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::task::spawn_blocking;

use super::{
    NAMED_QUERY_DIR, PERSPECTIVE_DIR, SCRIPT_DIR, VISION_DIR, join_failure,
};

#[derive(Deserialize, JsonSchema)]
pub struct ListProjectsParameters {}

/// A tool for listing the projects of the gateway.
pub struct ListProjectsTool {
    projects_dir: PathBuf,
    parameter_schema: Value,
}

impl ListProjectsTool {
    /// Creates a tool that lists the projects under `projects_dir`.
    #[inline]
    pub fn new<P: Into<PathBuf>>(projects_dir: P) -> Self {
        ListProjectsTool {
            projects_dir: projects_dir.into(),
            parameter_schema: schema_for!(ListProjectsParameters).to_value(),
        }
    }
}

impl Tool for ListProjectsTool {
    type Input = ListProjectsParameters;

    fn name(&self) -> &str {
        "list_projects"
    }

    fn description(&self) -> &str {
        r#"
List all Ignition projects in the Gateway.
Returns project names and basic information about each project."#
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    fn execute(
        &self,
        _input: ListProjectsParameters,
    ) -> impl Future<Output = ToolOutput> + Send + 'static {
        let projects_dir = self.projects_dir.clone();
        async move {
            spawn_blocking(move || list_projects(&projects_dir))
                .await
                .unwrap_or_else(join_failure)
        }
    }
}

fn list_projects(projects_dir: &Path) -> ToolOutput {
    let entries = match fs::read_dir(projects_dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!("failed to read {}: {err}", projects_dir.display());
            return ToolOutput::failure(format!(
                "Projects directory not found: {}",
                projects_dir.display()
            ));
        }
    };

    let mut projects = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .filter_map(|path| {
            let name = path.file_name()?.to_string_lossy().into_owned();
            Some((name, path))
        })
        .collect::<Vec<_>>();
    projects.sort_by(|a, b| a.0.cmp(&b.0));

    let projects = projects
        .into_iter()
        .map(|(name, path)| {
            json!({
                "name": name,
                "type": project_type(&path),
                "has_scripts": path.join(SCRIPT_DIR).exists(),
                "has_named_queries": path.join(NAMED_QUERY_DIR).exists(),
            })
        })
        .collect::<Vec<_>>();

    ToolOutput::success(json!({
        "count": projects.len(),
        "projects": projects,
    }))
}

fn project_type(path: &Path) -> &'static str {
    let perspective = path.join(PERSPECTIVE_DIR).exists();
    let vision = path.join(VISION_DIR).exists();
    match (perspective, vision) {
        (true, true) => "Perspective + Vision",
        (true, false) => "Perspective",
        (false, true) => "Vision",
        (false, false) => "Unknown",
    }
}
