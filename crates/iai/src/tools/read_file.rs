use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use iai_core::tool::{Tool, ToolOutput};
use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::task::spawn_blocking;

use super::{join_failure, project_dir};

const MAX_LINES: usize = 1000;
const MAX_BYTES: usize = 64 * 1024;

#[derive(Deserialize, JsonSchema)]
pub struct ReadProjectFileParameters {
    #[schemars(description = "The name of the Ignition project.")]
    project_name: String,
    #[schemars(description = "Path to the file, relative to the project.")]
    path: String,
    #[schemars(description = "1-based start line to read from, default to 1.")]
    start_line: Option<usize>,
}

/// A tool for reading the content of a project file with line numbers.
pub struct ReadProjectFileTool {
    projects_dir: PathBuf,
    parameter_schema: Value,
}

impl ReadProjectFileTool {
    /// Creates a tool that reads files of projects under `projects_dir`.
    #[inline]
    pub fn new<P: Into<PathBuf>>(projects_dir: P) -> Self {
        ReadProjectFileTool {
            projects_dir: projects_dir.into(),
            parameter_schema: schema_for!(ReadProjectFileParameters)
                .to_value(),
        }
    }
}

impl Tool for ReadProjectFileTool {
    type Input = ReadProjectFileParameters;

    fn name(&self) -> &str {
        "read_project_file"
    }

    fn description(&self) -> &str {
        r#"
Reads a file of an Ignition project and returns its content prefixed with line numbers.
Returns up to 1000 lines or 64 KiB starting at `start_line`. When the result is truncated, read again with a larger
`start_line` to continue."#
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    fn execute(
        &self,
        input: ReadProjectFileParameters,
    ) -> impl Future<Output = ToolOutput> + Send + 'static {
        let projects_dir = self.projects_dir.clone();
        async move {
            spawn_blocking(move || read_project_file(&projects_dir, input))
                .await
                .unwrap_or_else(join_failure)
        }
    }
}

fn read_project_file(
    projects_dir: &Path,
    input: ReadProjectFileParameters,
) -> ToolOutput {
    let start_line = input.start_line.unwrap_or(1);
    if start_line == 0 {
        return ToolOutput::failure("`start_line` must be 1-based");
    }

    let dir = match project_dir(projects_dir, &input.project_name) {
        Ok(dir) => dir,
        Err(output) => return output,
    };
    let path = match confine(&dir, &input.path) {
        Some(path) => path,
        None => {
            return ToolOutput::failure(format!(
                "File not found: {}",
                input.path
            ));
        }
    };

    let file = match File::open(&path) {
        Ok(file) => file,
        Err(err) => {
            return ToolOutput::failure(format!(
                "Failed to open {}: {err}",
                input.path
            ));
        }
    };
    match format_reader_section(file, start_line) {
        Ok(section) => ToolOutput::success(json!({
            "path": input.path,
            "start_line": start_line,
            "lines_read": section.lines_read,
            "content": section.content,
            "truncated": section.truncated,
        })),
        Err(err) => ToolOutput::failure(format!(
            "Failed to read {}: {err}",
            input.path
        )),
    }
}

/// Resolves `relative` inside `dir`, following symlinks.
///
/// Returns `None` if the file doesn't exist, isn't a regular file, or
/// resolves to somewhere outside of `dir`.
fn confine(dir: &Path, relative: &str) -> Option<PathBuf> {
    let relative = Path::new(relative);
    if relative.is_absolute() {
        return None;
    }
    let dir = dir.canonicalize().ok()?;
    let path = dir.join(relative).canonicalize().ok()?;
    if !path.starts_with(&dir) {
        warn!("refused to read {} outside of the project", path.display());
        return None;
    }
    path.is_file().then_some(path)
}

struct Section {
    content: String,
    lines_read: usize,
    truncated: bool,
}

fn format_reader_section<R: Read>(
    reader: R,
    start_line: usize,
) -> std::io::Result<Section> {
    let reader = BufReader::new(reader);
    let mut section = Section {
        content: String::new(),
        lines_read: 0,
        truncated: false,
    };
    for (index, line) in reader.lines().enumerate() {
        let line_no = index + 1;
        if line_no < start_line {
            continue;
        }
        let line = line?;
        let formatted = format!("{line_no:>6}\t{line}\n");
        if section.lines_read >= MAX_LINES
            || section.content.len() + formatted.len() > MAX_BYTES
        {
            section.truncated = true;
            break;
        }
        section.content.push_str(&formatted);
        section.lines_read += 1;
    }
    Ok(section)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::tools::fixture::Projects;

    fn params(
        project_name: &str,
        path: &str,
        start_line: Option<usize>,
    ) -> ReadProjectFileParameters {
        ReadProjectFileParameters {
            project_name: project_name.to_owned(),
            path: path.to_owned(),
            start_line,
        }
    }

    #[test]
    fn test_format_reader_section() {
        let input = b"first\nsecond\nthird\n";

        let section = format_reader_section(Cursor::new(input), 2).unwrap();
        let mut lines = section.content.lines();
        assert_eq!(lines.next().unwrap(), "     2\tsecond");
        assert_eq!(lines.next().unwrap(), "     3\tthird");
        assert_eq!(section.lines_read, 2);
        assert!(!section.truncated);
    }

    #[test]
    fn test_format_reader_section_limits() {
        let mut input = Vec::new();
        for _ in 0..(MAX_LINES + 10) {
            input.extend_from_slice(b"line\n");
        }
        let section = format_reader_section(Cursor::new(input), 1).unwrap();
        assert_eq!(section.lines_read, MAX_LINES);
        assert!(section.truncated);

        let long_line = "x".repeat(MAX_BYTES / 2);
        let input = format!("{long_line}\n{long_line}\n{long_line}\n");
        let section =
            format_reader_section(Cursor::new(input.into_bytes()), 1).unwrap();
        assert_eq!(section.lines_read, 1);
        assert!(section.truncated);
    }

    #[tokio::test]
    async fn test_read_project_file() {
        let projects = Projects::new("read");
        let tool = ReadProjectFileTool::new(projects.path());

        let path = "ignition/script-python/util/code.py";
        let output = tool.execute(params("aimee", path, None)).await;
        assert!(!output.is_error, "{}", output.to_text());
        assert_eq!(output.content["lines_read"], 2);
        assert_eq!(
            output.content["content"],
            "     1\tdef greet(name):\n     2\t    return 'Hello ' + name\n"
        );
    }

    #[tokio::test]
    async fn test_path_confinement() {
        let projects = Projects::new("read-confine");
        let tool = ReadProjectFileTool::new(projects.path());

        for path in ["../legacy/project.json", "/etc/passwd", "missing.txt"] {
            let output = tool.execute(params("aimee", path, None)).await;
            assert!(output.is_error, "`{path}` should be refused");
        }

        // Only the resolved path matters.
        let path = "../aimee/project.json";
        let output = tool.execute(params("aimee", path, Some(1))).await;
        assert!(!output.is_error);
        let output = tool.execute(params("legacy", path, Some(1))).await;
        assert!(output.is_error);

        let output = tool
            .execute(params("aimee", "project.json", Some(0)))
            .await;
        assert!(output.is_error);
    }
}
