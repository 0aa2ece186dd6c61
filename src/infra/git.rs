//! Git operations
//!
//! Sources tracked in git are cloned fresh and checked out at the recipe's
//! reference, which may be a tag, a branch or a commit. The repository itself
//! is pulled by `update`.

use std::path::Path;

use tracing::debug;

use crate::error::FetchError;
use crate::infra::filesystem;
use crate::infra::process::{run_tool, tool_output};

/// Clone `url` into `dest`, replacing anything already there
pub async fn clone(package: &str, url: &str, dest: &Path) -> Result<(), FetchError> {
    filesystem::remove_dir_all(dest)?;
    let dest = dest.to_string_lossy();
    run_tool(package, "git", &["clone", url, &dest], None).await
}

/// Check out `reference` in the repository at `repo`
pub async fn checkout(package: &str, repo: &Path, reference: &str) -> Result<(), FetchError> {
    let repo = repo.to_string_lossy();
    run_tool(package, "git", &["-C", &repo, "checkout", reference], None).await
}

/// Commit checked out in `repo`
pub async fn head(package: &str, repo: &Path) -> Result<String, FetchError> {
    let repo = repo.to_string_lossy();
    let out = tool_output(package, "git", &["-C", &repo, "rev-parse", "HEAD"], None).await?;
    Ok(out.trim().to_string())
}

/// Pull the upstream changes of the current branch
pub async fn pull(package: &str, repo: &Path) -> Result<(), FetchError> {
    let repo = repo.to_string_lossy();
    // Keep git's summary off stdout, which belongs to strapkit's own output
    let summary = tool_output(package, "git", &["-C", &repo, "pull", "--ff-only"], None).await?;
    debug!("git pull: {}", summary.trim());
    Ok(())
}

/// Files changed between `since` and `HEAD`, relative to `repo`
pub async fn changed_files(package: &str, repo: &Path, since: &str) -> Result<Vec<String>, FetchError> {
    let repo = repo.to_string_lossy();
    let range = format!("{since}..HEAD");
    let out = tool_output(
        package,
        "git",
        &["-C", &repo, "diff", "--name-only", "--relative", &range],
        None,
    )
    .await?;
    Ok(out.lines().filter(|l| !l.is_empty()).map(str::to_string).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn git(cwd: &Path, args: &[&str]) {
        run_tool("test", "git", args, Some(cwd)).await.unwrap();
    }

    #[tokio::test]
    async fn test_clone_and_checkout() {
        if which::which("git").is_err() {
            return;
        }

        let temp = TempDir::new().unwrap();
        let upstream = temp.path().join("upstream");
        std::fs::create_dir_all(&upstream).unwrap();
        git(&upstream, &["init", "-q"]).await;
        git(&upstream, &["config", "user.email", "dev@example.org"]).await;
        git(&upstream, &["config", "user.name", "dev"]).await;
        std::fs::write(upstream.join("VERSION"), "1").unwrap();
        git(&upstream, &["add", "VERSION"]).await;
        git(&upstream, &["commit", "-q", "-m", "one"]).await;
        git(&upstream, &["tag", "v1"]).await;
        std::fs::write(upstream.join("VERSION"), "2").unwrap();
        git(&upstream, &["commit", "-q", "-am", "two"]).await;

        let dest = temp.path().join("repos/pkg");
        std::fs::create_dir_all(&dest).unwrap();
        std::fs::write(dest.join("stale"), "").unwrap();

        clone("pkg", upstream.to_str().unwrap(), &dest).await.unwrap();
        assert!(!dest.join("stale").exists());
        assert_eq!(std::fs::read_to_string(dest.join("VERSION")).unwrap(), "2");

        checkout("pkg", &dest, "v1").await.unwrap();
        assert_eq!(std::fs::read_to_string(dest.join("VERSION")).unwrap(), "1");

        assert!(checkout("pkg", &dest, "no-such-ref").await.is_err());
    }

    #[tokio::test]
    async fn test_pull_lists_changed_files() {
        if which::which("git").is_err() {
            return;
        }

        let temp = TempDir::new().unwrap();
        let upstream = temp.path().join("upstream");
        std::fs::create_dir_all(upstream.join("recipes")).unwrap();
        git(&upstream, &["init", "-q"]).await;
        git(&upstream, &["config", "user.email", "dev@example.org"]).await;
        git(&upstream, &["config", "user.name", "dev"]).await;
        std::fs::write(upstream.join("recipes/zlib.json"), "{}").unwrap();
        std::fs::write(upstream.join("README"), "").unwrap();
        git(&upstream, &["add", "."]).await;
        git(&upstream, &["commit", "-q", "-m", "one"]).await;

        let work = temp.path().join("work");
        clone("repo", upstream.to_str().unwrap(), &work).await.unwrap();
        let before = head("repo", &work).await.unwrap();
        assert_eq!(before.len(), 40);

        std::fs::write(upstream.join("recipes/zlib.json"), "{ }").unwrap();
        std::fs::write(upstream.join("recipes/bzip2.json"), "{}").unwrap();
        git(&upstream, &["add", "."]).await;
        git(&upstream, &["commit", "-q", "-m", "two"]).await;

        pull("repo", &work).await.unwrap();
        assert_ne!(head("repo", &work).await.unwrap(), before);

        let mut changed = changed_files("repo", &work, &before).await.unwrap();
        changed.sort();
        assert_eq!(changed, vec!["recipes/bzip2.json", "recipes/zlib.json"]);
    }
}
