//! Built-in tools that let the model explore the projects of a gateway.
//!
//! Every project tool is rooted at a projects directory, where each
//! subdirectory is one project. The memory tool searches the conversation
//! the session is bound to.

mod list_projects;
mod memory;
mod project_info;
mod read_file;
mod search_files;

use std::path::{Path, PathBuf};

use iai_core::tool::ToolOutput;

pub use list_projects::ListProjectsTool;
pub use memory::QueryConversationMemoryTool;
pub use project_info::ProjectInfoTool;
pub use read_file::ReadProjectFileTool;
pub use search_files::SearchProjectFilesTool;

/// Subdirectory of a project holding Perspective resources.
pub(crate) const PERSPECTIVE_DIR: &str = "com.inductiveautomation.perspective";
/// Subdirectory of a project holding Vision resources.
pub(crate) const VISION_DIR: &str = "com.inductiveautomation.vision";
/// Subdirectory of a project holding named queries.
pub(crate) const NAMED_QUERY_DIR: &str =
    "com.inductiveautomation.ignition.common.script.NamedQuery";
/// Subdirectory of a project holding script modules.
pub(crate) const SCRIPT_DIR: &str = "ignition/script-python";

/// Resolves the directory of `project_name` under `projects_dir`.
///
/// Names that aren't a single path component are rejected, so a project
/// name can never point outside of the projects directory.
pub(crate) fn project_dir(
    projects_dir: &Path,
    project_name: &str,
) -> Result<PathBuf, ToolOutput> {
    let is_plain_name = !project_name.is_empty()
        && project_name != "."
        && project_name != ".."
        && !project_name.contains(['/', '\\']);
    if !is_plain_name {
        return Err(ToolOutput::failure(format!(
            "Invalid project name '{project_name}'"
        )));
    }

    let dir = projects_dir.join(project_name);
    if !dir.is_dir() {
        return Err(ToolOutput::failure(format!(
            "Project '{project_name}' not found"
        )));
    }
    Ok(dir)
}

/// Turns a panicked blocking task into an error output.
pub(crate) fn join_failure(err: tokio::task::JoinError) -> ToolOutput {
    error!("blocking tool task failed: {err}");
    ToolOutput::failure("Tool task failed unexpectedly")
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_dir() {
        let projects = fixture::Projects::new("project-dir");

        let dir = project_dir(projects.path(), "aimee").unwrap();
        assert!(dir.ends_with("aimee"));

        for name in ["", ".", "..", "../aimee", "aimee/ignition"] {
            let output = project_dir(projects.path(), name).unwrap_err();
            assert!(output.is_error, "`{name}` should be rejected");
        }

        let output = project_dir(projects.path(), "missing").unwrap_err();
        assert_eq!(
            output.to_text(),
            r#"{"error":"Project 'missing' not found"}"#
        );
    }
}
