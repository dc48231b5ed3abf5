//! Workspace file tools — safe, auditable file I/O constrained to the
//! current context's workspace root.
//!
//! Paths containing `..`, absolute paths, or anything resolving outside the
//! root are rejected. Writes go through a tmp sibling + rename so readers
//! never see a partial file.

use std::path::{Component, Path, PathBuf};

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use mgx_domain::ToolDefinition;

use crate::{Tool, ToolOutcome};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Path validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Validate and resolve a requested path within a workspace root.
///
/// 1. Rejects absolute paths and raw `..` components.
/// 2. Joins onto the canonicalized root.
/// 3. Canonicalizes the longest existing prefix and checks containment.
pub fn validate_path(workspace_root: &Path, requested: &str) -> Result<PathBuf, String> {
    let requested_path = Path::new(requested);
    if requested_path.is_absolute() {
        return Err(format!(
            "absolute paths are not allowed; use a path relative to the workspace root (got '{requested}')"
        ));
    }

    for component in requested_path.components() {
        if matches!(component, Component::ParentDir) {
            return Err("path must not contain '..' components".to_owned());
        }
    }

    let canonical_root = workspace_root
        .canonicalize()
        .map_err(|e| format!("cannot resolve workspace root '{}': {e}", workspace_root.display()))?;

    let candidate = canonical_root.join(requested_path);

    let resolved = if candidate.exists() {
        candidate
            .canonicalize()
            .map_err(|e| format!("cannot resolve path '{}': {e}", candidate.display()))?
    } else {
        // Canonicalize the nearest existing ancestor, then re-append the
        // non-existing tail.
        let mut existing = candidate.as_path();
        let mut tail_parts: Vec<&std::ffi::OsStr> = Vec::new();
        loop {
            if existing.exists() {
                break;
            }
            match existing.parent() {
                Some(parent) => {
                    if let Some(file_name) = existing.file_name() {
                        tail_parts.push(file_name);
                    }
                    existing = parent;
                }
                None => break,
            }
        }
        let mut resolved = existing
            .canonicalize()
            .map_err(|e| format!("cannot resolve ancestor of '{}': {e}", candidate.display()))?;
        for part in tail_parts.into_iter().rev() {
            resolved.push(part);
        }
        resolved
    };

    if !resolved.starts_with(&canonical_root) {
        return Err(format!(
            "path '{}' resolves outside workspace root '{}'",
            requested,
            canonical_root.display()
        ));
    }

    Ok(resolved)
}

/// Resolve the current context's workspace root, or an error outcome.
fn workspace_root() -> Result<PathBuf, ToolOutcome> {
    mgx_context::current()
        .map(|ctx| ctx.workspace_path.clone())
        .map_err(|e| ToolOutcome::error(e.to_string()))
}

fn parse_args<T: for<'de> Deserialize<'de>>(args: Value) -> Result<T, ToolOutcome> {
    serde_json::from_value(args).map_err(|e| ToolOutcome::error(format!("invalid arguments: {e}")))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// read_file
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Deserialize)]
struct ReadFileArgs {
    path: String,
    #[serde(default)]
    offset: Option<usize>,
    #[serde(default)]
    limit: Option<usize>,
}

pub struct ReadFileTool;

#[async_trait::async_trait]
impl Tool for ReadFileTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "read_file".into(),
            description: "Read a file from the workspace, optionally a line range.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "Workspace-relative path" },
                    "offset": { "type": "integer", "description": "First line (0-indexed)" },
                    "limit": { "type": "integer", "description": "Maximum lines to return" }
                },
                "required": ["path"]
            }),
        }
    }

    async fn invoke(&self, args: Value) -> ToolOutcome {
        let args: ReadFileArgs = match parse_args(args) {
            Ok(a) => a,
            Err(e) => return e,
        };
        let root = match workspace_root() {
            Ok(r) => r,
            Err(e) => return e,
        };
        let path = match validate_path(&root, &args.path) {
            Ok(p) => p,
            Err(e) => return ToolOutcome::error(e),
        };

        let content = match fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) => return ToolOutcome::error(format!("failed to read '{}': {e}", args.path)),
        };

        let lines: Vec<&str> = content.lines().collect();
        let total_lines = lines.len();
        let offset = args.offset.unwrap_or(0);
        let limit = args.limit.unwrap_or(total_lines.saturating_sub(offset));
        let selected: Vec<&str> = lines.into_iter().skip(offset).take(limit).collect();

        ToolOutcome::json(json!({
            "path": args.path,
            "content": selected.join("\n"),
            "total_lines": total_lines,
            "lines_returned": selected.len(),
        }))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// write_file
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Deserialize)]
struct WriteFileArgs {
    path: String,
    content: String,
}

pub struct WriteFileTool;

/// Atomic write: tmp sibling, sync, rename into place.
pub async fn write_file_atomic(path: &Path, content: &str) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| format!("failed to create parent directory: {e}"))?;
    }

    let tmp_name = format!(
        ".{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        uuid::Uuid::new_v4().as_simple()
    );
    let tmp_path = path.with_file_name(tmp_name);

    let mut file = fs::File::create(&tmp_path)
        .await
        .map_err(|e| format!("failed to create temp file: {e}"))?;
    file.write_all(content.as_bytes())
        .await
        .map_err(|e| format!("failed to write temp file: {e}"))?;
    file.flush()
        .await
        .map_err(|e| format!("failed to flush temp file: {e}"))?;
    file.sync_data()
        .await
        .map_err(|e| format!("failed to sync temp file: {e}"))?;

    fs::rename(&tmp_path, path).await.map_err(|e| {
        let tmp = tmp_path.clone();
        tokio::spawn(async move {
            let _ = fs::remove_file(&tmp).await;
        });
        format!("failed to rename temp file into place: {e}")
    })
}

#[async_trait::async_trait]
impl Tool for WriteFileTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "write_file".into(),
            description: "Create or overwrite a file in the workspace (atomic).".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "Workspace-relative path" },
                    "content": { "type": "string", "description": "Full file contents" }
                },
                "required": ["path", "content"]
            }),
        }
    }

    async fn invoke(&self, args: Value) -> ToolOutcome {
        let args: WriteFileArgs = match parse_args(args) {
            Ok(a) => a,
            Err(e) => return e,
        };
        let root = match workspace_root() {
            Ok(r) => r,
            Err(e) => return e,
        };
        let path = match validate_path(&root, &args.path) {
            Ok(p) => p,
            Err(e) => return ToolOutcome::error(e),
        };
        if let Err(e) = write_file_atomic(&path, &args.content).await {
            return ToolOutcome::error(e);
        }
        ToolOutcome::json(json!({
            "path": args.path,
            "bytes_written": args.content.len(),
        }))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// list_dir
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Deserialize)]
struct ListDirArgs {
    #[serde(default = "default_dot")]
    path: String,
}

fn default_dot() -> String {
    ".".into()
}

pub struct ListDirTool;

#[async_trait::async_trait]
impl Tool for ListDirTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "list_dir".into(),
            description: "List a workspace directory with file sizes.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "Workspace-relative path (default '.')" }
                }
            }),
        }
    }

    async fn invoke(&self, args: Value) -> ToolOutcome {
        let args: ListDirArgs = match parse_args(args) {
            Ok(a) => a,
            Err(e) => return e,
        };
        let root = match workspace_root() {
            Ok(r) => r,
            Err(e) => return e,
        };
        let path = match validate_path(&root, &args.path) {
            Ok(p) => p,
            Err(e) => return ToolOutcome::error(e),
        };

        let mut read_dir = match fs::read_dir(&path).await {
            Ok(rd) => rd,
            Err(e) => return ToolOutcome::error(format!("failed to read '{}': {e}", args.path)),
        };

        let mut entries = Vec::new();
        loop {
            match read_dir.next_entry().await {
                Ok(Some(entry)) => {
                    let meta = match entry.metadata().await {
                        Ok(m) => m,
                        Err(_) => continue,
                    };
                    entries.push(json!({
                        "name": entry.file_name().to_string_lossy(),
                        "size": meta.len(),
                        "is_dir": meta.is_dir(),
                    }));
                }
                Ok(None) => break,
                Err(e) => return ToolOutcome::error(format!("failed to iterate: {e}")),
            }
        }
        entries.sort_by(|a, b| {
            a["name"]
                .as_str()
                .unwrap_or("")
                .cmp(b["name"].as_str().unwrap_or(""))
        });

        ToolOutcome::json(json!({
            "path": args.path,
            "count": entries.len(),
            "entries": entries,
        }))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// make_dir
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Deserialize)]
struct MakeDirArgs {
    path: String,
}

pub struct MakeDirTool;

#[async_trait::async_trait]
impl Tool for MakeDirTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "make_dir".into(),
            description: "Create a directory (and parents) in the workspace.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "Workspace-relative path" }
                },
                "required": ["path"]
            }),
        }
    }

    async fn invoke(&self, args: Value) -> ToolOutcome {
        let args: MakeDirArgs = match parse_args(args) {
            Ok(a) => a,
            Err(e) => return e,
        };
        let root = match workspace_root() {
            Ok(r) => r,
            Err(e) => return e,
        };
        let path = match validate_path(&root, &args.path) {
            Ok(p) => p,
            Err(e) => return ToolOutcome::error(e),
        };
        match fs::create_dir_all(&path).await {
            Ok(()) => ToolOutcome::json(json!({ "path": args.path })),
            Err(e) => ToolOutcome::error(format!("failed to create '{}': {e}", args.path)),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// delete_path
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Deserialize)]
struct DeletePathArgs {
    path: String,
}

pub struct DeletePathTool;

#[async_trait::async_trait]
impl Tool for DeletePathTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "delete_path".into(),
            description: "Delete a file or empty directory in the workspace.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "Workspace-relative path" }
                },
                "required": ["path"]
            }),
        }
    }

    async fn invoke(&self, args: Value) -> ToolOutcome {
        let args: DeletePathArgs = match parse_args(args) {
            Ok(a) => a,
            Err(e) => return e,
        };
        let root = match workspace_root() {
            Ok(r) => r,
            Err(e) => return e,
        };
        let path = match validate_path(&root, &args.path) {
            Ok(p) => p,
            Err(e) => return ToolOutcome::error(e),
        };
        let meta = match fs::metadata(&path).await {
            Ok(m) => m,
            Err(e) => return ToolOutcome::error(format!("failed to stat '{}': {e}", args.path)),
        };
        let result = if meta.is_dir() {
            fs::remove_dir(&path).await
        } else {
            fs::remove_file(&path).await
        };
        match result {
            Ok(()) => ToolOutcome::json(json!({ "path": args.path })),
            Err(e) => ToolOutcome::error(format!("failed to delete '{}': {e}", args.path)),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// grep_files
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Deserialize)]
struct GrepArgs {
    pattern: String,
    #[serde(default = "default_dot")]
    path: String,
    #[serde(default = "default_max_matches")]
    max_matches: usize,
}

fn default_max_matches() -> usize {
    200
}

pub struct GrepFilesTool;

const GREP_SKIP_DIRS: &[&str] = &[".git", "node_modules", "target", ".dev-server.log"];

fn grep_dir(
    root: &Path,
    dir: &Path,
    regex: &regex::Regex,
    max_matches: usize,
    matches: &mut Vec<Value>,
) {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return,
    };
    for entry in entries.flatten() {
        if matches.len() >= max_matches {
            return;
        }
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();
        if GREP_SKIP_DIRS.contains(&name.as_str()) {
            continue;
        }
        if path.is_dir() {
            grep_dir(root, &path, regex, max_matches, matches);
        } else if let Ok(content) = std::fs::read_to_string(&path) {
            for (line_no, line) in content.lines().enumerate() {
                if regex.is_match(line) {
                    let rel = path.strip_prefix(root).unwrap_or(&path);
                    matches.push(json!({
                        "file": rel.to_string_lossy(),
                        "line": line_no + 1,
                        "text": line,
                    }));
                    if matches.len() >= max_matches {
                        return;
                    }
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl Tool for GrepFilesTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "grep_files".into(),
            description: "Search workspace files for a regex pattern.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "pattern": { "type": "string", "description": "Regex to search for" },
                    "path": { "type": "string", "description": "Subdirectory to search (default '.')" },
                    "max_matches": { "type": "integer", "description": "Result cap (default 200)" }
                },
                "required": ["pattern"]
            }),
        }
    }

    async fn invoke(&self, args: Value) -> ToolOutcome {
        let args: GrepArgs = match parse_args(args) {
            Ok(a) => a,
            Err(e) => return e,
        };
        let root = match workspace_root() {
            Ok(r) => r,
            Err(e) => return e,
        };
        let search_root = match validate_path(&root, &args.path) {
            Ok(p) => p,
            Err(e) => return ToolOutcome::error(e),
        };
        let regex = match regex::Regex::new(&args.pattern) {
            Ok(r) => r,
            Err(e) => return ToolOutcome::error(format!("invalid pattern: {e}")),
        };

        let max_matches = args.max_matches.min(1000);
        let result = tokio::task::spawn_blocking(move || {
            let mut matches = Vec::new();
            grep_dir(&search_root, &search_root, &regex, max_matches, &mut matches);
            matches
        })
        .await;

        match result {
            Ok(matches) => ToolOutcome::json(json!({
                "pattern": args.pattern,
                "count": matches.len(),
                "matches": matches,
            })),
            Err(e) => ToolOutcome::error(format!("grep task failed: {e}")),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
