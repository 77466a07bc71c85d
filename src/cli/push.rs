use std::fs;
use std::path::Path;

use anyhow::Context;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use walkdir::WalkDir;

use super::http_client::ApiClient;
use crate::blob::content_hash;
use crate::types::{DEFAULT_FILE_MODE, SnapshotWithFiles};

const SKIPPED_DIRS: &[&str] = &[".git"];

#[derive(Debug, Clone)]
pub struct PushOptions {
    pub project_id: String,
    pub user_id: String,
    pub branch: Option<String>,
    pub title: Option<String>,
    pub message: Option<String>,
}

/// One local file ready to be sent inline.
#[derive(Debug, Clone, Serialize)]
pub struct LocalFile {
    pub path: String,
    pub hash: String,
    pub size: i64,
    pub mode: String,
    pub content: String,
}

#[derive(Serialize)]
struct PushRequest<'a> {
    project_id: &'a str,
    user_id: &'a str,
    timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    branch: Option<&'a str>,
    files: &'a [LocalFile],
}

/// Reads every regular file below `root`, with paths relative to it using `/`.
pub fn collect_files(root: &Path) -> anyhow::Result<Vec<LocalFile>> {
    if !root.is_dir() {
        anyhow::bail!("{} is not a directory", root.display());
    }

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by(|a, b| a.path().cmp(b.path()))
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || !(e.file_type().is_dir()
                    && SKIPPED_DIRS.iter().any(|d| e.file_name() == *d))
        });

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let rel = entry
            .path()
            .strip_prefix(root)
            .context("failed to relativize path")?;
        let path = rel
            .components()
            .map(|c| {
                c.as_os_str().to_str().ok_or_else(|| {
                    anyhow::anyhow!("{} is not valid UTF-8", entry.path().display())
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?
            .join("/");

        let data = fs::read(entry.path())
            .with_context(|| format!("failed to read {}", entry.path().display()))?;

        files.push(LocalFile {
            path,
            hash: content_hash(&data),
            size: data.len() as i64,
            mode: DEFAULT_FILE_MODE.to_string(),
            content: STANDARD.encode(&data),
        });
    }

    Ok(files)
}

pub async fn run_push(client: &ApiClient, dir: &Path, opts: &PushOptions) -> anyhow::Result<()> {
    let files = collect_files(dir)?;
    if files.is_empty() {
        anyhow::bail!("No files found in {}", dir.display());
    }

    let total_bytes: i64 = files.iter().map(|f| f.size).sum();
    tracing::info!(count = files.len(), total_bytes, "pushing snapshot");

    let request = PushRequest {
        project_id: &opts.project_id,
        user_id: &opts.user_id,
        timestamp: chrono::Utc::now().timestamp_millis(),
        title: opts.title.as_deref(),
        description: opts.message.as_deref(),
        branch: opts.branch.as_deref(),
        files: &files,
    };

    let snapshot: SnapshotWithFiles = client.post("/snapshots", &request).await?;

    println!(
        "Created snapshot {} ({} files, {} bytes) on {}",
        snapshot.snapshot.id,
        snapshot.files.len(),
        total_bytes,
        client.base_url()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_files_skips_git_and_uses_forward_slashes() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src/nested")).unwrap();
        fs::create_dir_all(dir.path().join(".git/objects")).unwrap();
        fs::write(dir.path().join("README.md"), "hello").unwrap();
        fs::write(dir.path().join("src/nested/lib.rs"), "pub fn f() {}").unwrap();
        fs::write(dir.path().join(".git/HEAD"), "ref: refs/heads/main").unwrap();
        fs::write(dir.path().join(".gitignore"), "target").unwrap();

        let files = collect_files(dir.path()).unwrap();
        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec![".gitignore", "README.md", "src/nested/lib.rs"]);

        let readme = &files[1];
        assert_eq!(readme.hash, content_hash(b"hello"));
        assert_eq!(readme.size, 5);
        assert_eq!(readme.content, "aGVsbG8=");
    }

    #[test]
    fn test_collect_files_requires_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file.txt");
        fs::write(&file, "x").unwrap();
        assert!(collect_files(&file).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_collect_files_rejects_non_utf8_names() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(OsStr::from_bytes(b"bad\xff.txt")), "x").unwrap();

        let err = collect_files(dir.path()).unwrap_err();
        assert!(err.to_string().contains("not valid UTF-8"));
    }
}
