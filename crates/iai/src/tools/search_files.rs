use std::path::{Component, Path, PathBuf};

use iai_core::tool::{Tool, ToolOutput};
use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::task::spawn_blocking;

use super::{join_failure, project_dir};

const MAX_RESULTS: usize = 50;

#[derive(Deserialize, JsonSchema)]
pub struct SearchProjectFilesParameters {
    #[schemars(description = "The name of the Ignition project.")]
    project_name: String,
    #[schemars(description = "The glob pattern, relative to the project.")]
    pattern: String,
}

/// A tool for finding files inside a project using glob patterns.
pub struct SearchProjectFilesTool {
    projects_dir: PathBuf,
    parameter_schema: Value,
}

impl SearchProjectFilesTool {
    /// Creates a tool that searches projects under `projects_dir`.
    #[inline]
    pub fn new<P: Into<PathBuf>>(projects_dir: P) -> Self {
        SearchProjectFilesTool {
            projects_dir: projects_dir.into(),
            parameter_schema: schema_for!(SearchProjectFilesParameters)
                .to_value(),
        }
    }
}

impl Tool for SearchProjectFilesTool {
    type Input = SearchProjectFilesParameters;

    fn name(&self) -> &str {
        "search_project_files"
    }

    fn description(&self) -> &str {
        r#"
Find files in an Ignition project using glob patterns.
This tool supports standard glob syntax like *, ? and ** for recursive searches, and returns at most 50 paths
relative to the project directory."#
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    fn execute(
        &self,
        input: SearchProjectFilesParameters,
    ) -> impl Future<Output = ToolOutput> + Send + 'static {
        let projects_dir = self.projects_dir.clone();
        async move {
            spawn_blocking(move || search(&projects_dir, input))
                .await
                .unwrap_or_else(join_failure)
        }
    }
}

fn search(
    projects_dir: &Path,
    input: SearchProjectFilesParameters,
) -> ToolOutput {
    let pattern_path = Path::new(&input.pattern);
    if pattern_path.is_absolute()
        || pattern_path.components().any(|c| c == Component::ParentDir)
    {
        return ToolOutput::failure(
            "`pattern` must be relative to the project directory",
        );
    }

    let dir = match project_dir(projects_dir, &input.project_name) {
        Ok(dir) => dir,
        Err(output) => return output,
    };

    let mut pattern = glob::Pattern::escape(&dir.to_string_lossy());
    if !pattern.ends_with('/') {
        pattern.push('/');
    }
    pattern.push_str(&input.pattern);
    let paths = match glob::glob(&pattern) {
        Ok(paths) => paths,
        Err(err) => {
            return ToolOutput::failure(format!("Invalid pattern: {err}"));
        }
    };

    // One extra hit tells whether the listing was cut.
    let mut files = paths
        .flatten()
        .filter_map(|path| {
            let relative = path.strip_prefix(&dir).ok()?;
            Some(relative.to_string_lossy().replace('\\', "/"))
        })
        .take(MAX_RESULTS + 1)
        .collect::<Vec<_>>();
    let truncated = files.len() > MAX_RESULTS;
    files.truncate(MAX_RESULTS);

    debug!(
        "pattern `{}` matched {} file(s) in {}",
        input.pattern,
        files.len(),
        input.project_name
    );
    ToolOutput::success(json!({
        "project_name": input.project_name,
        "pattern": input.pattern,
        "count": files.len(),
        "files": files,
        "truncated": truncated,
    }))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::tools::fixture::Projects;

    fn params(
        project_name: &str,
        pattern: &str,
    ) -> SearchProjectFilesParameters {
        SearchProjectFilesParameters {
            project_name: project_name.to_owned(),
            pattern: pattern.to_owned(),
        }
    }

    #[tokio::test]
    async fn test_search() {
        let projects = Projects::new("search");
        let tool = SearchProjectFilesTool::new(projects.path());

        let output = tool.execute(params("aimee", "**/*.py")).await;
        assert!(!output.is_error, "{}", output.to_text());
        assert_eq!(output.content["count"], 1);
        assert_eq!(
            output.content["files"][0],
            "ignition/script-python/util/code.py"
        );
        assert_eq!(output.content["truncated"], false);

        let output = tool.execute(params("aimee", "**/*.json")).await;
        assert_eq!(output.content["count"], 3);
    }

    #[tokio::test]
    async fn test_result_limit() {
        let projects = Projects::new("search-limit");
        let dir = projects.path().join("aimee/many");
        fs::create_dir_all(&dir).unwrap();
        for idx in 0..(MAX_RESULTS + 5) {
            fs::write(dir.join(format!("file{idx}.txt")), "x").unwrap();
        }
        let tool = SearchProjectFilesTool::new(projects.path());

        let output = tool.execute(params("aimee", "many/*.txt")).await;
        assert_eq!(output.content["count"], MAX_RESULTS);
        assert_eq!(output.content["truncated"], true);
    }

    #[tokio::test]
    async fn test_input_validation() {
        let projects = Projects::new("search-validation");
        let tool = SearchProjectFilesTool::new(projects.path());

        let output = tool.execute(params("aimee", "/etc/*")).await;
        assert!(output.is_error);

        let output = tool.execute(params("aimee", "../legacy/**/*")).await;
        assert!(output.is_error);

        let output = tool.execute(params("missing", "*")).await;
        assert_eq!(output.content["error"], "Project 'missing' not found");
    }
}
