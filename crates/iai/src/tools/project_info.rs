use std::fs;
use std::path::{Path, PathBuf};

use iai_core::tool::{Tool, ToolOutput};
use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tokio::task::spawn_blocking;

use super::{join_failure, project_dir};

#[derive(Deserialize, JsonSchema)]
pub struct ProjectInfoParameters {
    #[schemars(description = "The name of the Ignition project.")]
    project_name: String,
}

/// A tool for reading the metadata of a project, along with a summary of
/// the resources it contains.
pub struct ProjectInfoTool {
    projects_dir: PathBuf,
    parameter_schema: Value,
}

impl ProjectInfoTool {
    /// Creates a tool that looks up projects under `projects_dir`.
    #[inline]
    pub fn new<P: Into<PathBuf>>(projects_dir: P) -> Self {
        ProjectInfoTool {
            projects_dir: projects_dir.into(),
            parameter_schema: schema_for!(ProjectInfoParameters).to_value(),
        }
    }
}

impl Tool for ProjectInfoTool {
    type Input = ProjectInfoParameters;

    fn name(&self) -> &str {
        "get_project_info"
    }

    fn description(&self) -> &str {
        r#"
Get information about an Ignition project: its title, description, whether it's enabled, its parent project,
and the number of resource files in each module directory."#
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    fn execute(
        &self,
        input: ProjectInfoParameters,
    ) -> impl Future<Output = ToolOutput> + Send + 'static {
        let projects_dir = self.projects_dir.clone();
        async move {
            spawn_blocking(move || {
                project_info(&projects_dir, &input.project_name)
            })
            .await
            .unwrap_or_else(join_failure)
        }
    }
}

fn project_info(projects_dir: &Path, project_name: &str) -> ToolOutput {
    let dir = match project_dir(projects_dir, project_name) {
        Ok(dir) => dir,
        Err(output) => return output,
    };

    let manifest = match read_manifest(&dir.join("project.json")) {
        Ok(manifest) => manifest,
        Err(reason) => {
            return ToolOutput::failure(format!(
                "Failed to read project.json of '{project_name}': {reason}"
            ));
        }
    };

    let mut resources = Map::new();
    let mut total = 0;
    for (module, count) in resource_counts(&dir) {
        total += count;
        resources.insert(module, count.into());
    }

    let field = |key: &str| manifest.get(key).cloned().unwrap_or(Value::Null);
    ToolOutput::success(json!({
        "name": project_name,
        "title": field("title"),
        "description": field("description"),
        "enabled": field("enabled"),
        "parent": field("parent"),
        "inheritable": field("inheritable"),
        "resources": resources,
        "total_resource_files": total,
    }))
}

fn read_manifest(path: &Path) -> Result<Map<String, Value>, String> {
    let text = fs::read_to_string(path).map_err(|err| err.to_string())?;
    match serde_json::from_str(&text) {
        Ok(Value::Object(manifest)) => Ok(manifest),
        Ok(_) => Err("expected a JSON object".to_owned()),
        Err(err) => Err(err.to_string()),
    }
}

/// Counts the files under each top-level directory of a project, sorted by
/// directory name.
fn resource_counts(dir: &Path) -> Vec<(String, u64)> {
    let Ok(entries) = fs::read_dir(dir) else {
        return vec![];
    };
    let mut counts = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .filter_map(|path| {
            let name = path.file_name()?.to_string_lossy().into_owned();
            Some((name, count_files(&path)))
        })
        .collect::<Vec<_>>();
    counts.sort();
    counts
}

fn count_files(dir: &Path) -> u64 {
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };
    let mut count = 0;
    for entry in entries.flatten() {
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        // Symlinks are skipped so a cycle can't recurse forever.
        if file_type.is_dir() {
            count += count_files(&entry.path());
        } else if file_type.is_file() {
            count += 1;
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::fixture::Projects;

    fn params(project_name: &str) -> ProjectInfoParameters {
        ProjectInfoParameters {
            project_name: project_name.to_owned(),
        }
    }

    #[tokio::test]
    async fn test_project_info() {
        let projects = Projects::new("info");
        let tool = ProjectInfoTool::new(projects.path());

        let output = tool.execute(params("aimee")).await;
        assert!(!output.is_error, "{}", output.to_text());
        assert_eq!(output.content["title"], "AIMEE");
        assert_eq!(output.content["enabled"], true);
        assert_eq!(output.content["parent"], "global");

        let resources = &output.content["resources"];
        assert_eq!(resources["com.inductiveautomation.perspective"], 2);
        assert_eq!(resources["ignition"], 1);
        assert_eq!(output.content["total_resource_files"], 4);
    }

    #[tokio::test]
    async fn test_missing_manifest() {
        let projects = Projects::new("info-manifest");
        let tool = ProjectInfoTool::new(projects.path());

        let output = tool.execute(params("legacy")).await;
        assert!(output.is_error);
        assert!(output.to_text().contains("project.json"));
    }

    #[tokio::test]
    async fn test_unknown_project() {
        let projects = Projects::new("info-unknown");
        let tool = ProjectInfoTool::new(projects.path());

        let output = tool.execute(params("nope")).await;
        assert!(output.is_error);
        assert_eq!(output.content["error"], "Project 'nope' not found");

        let output = tool.execute(params("../aimee")).await;
        assert!(output.is_error);
    }
}
