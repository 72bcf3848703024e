//! First step of a fresh session: render the repository tree and pick up
//! repository-specific agent instructions.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use futures_util::future::BoxFuture;

use super::StepHandler;
use crate::git;
use crate::models::state::{SessionState, WorkflowStatus};
use crate::workflow::context::ExecutionContext;
use crate::Result;

/// Tree depth for repositories under the file-count threshold.
pub const FULL_TREE_DEPTH: usize = 20;
/// Tree depth for large monorepos.
pub const MONOREPO_TREE_DEPTH: usize = 2;
/// Tree depth for other large repositories.
pub const LARGE_TREE_DEPTH: usize = 3;

/// Top-level directories that mark a monorepo.
pub const MONOREPO_INDICATORS: [&str; 4] = ["apps/", "packages/", "services/", "modules/"];

/// Appended to a monorepo's shortened tree.
pub const MONOREPO_NOTE: &str = "\n\n[Note]: This appears to be a Monorepo. The tree is truncated to depth 2. Use `list_files` to explore subdirectories.";

/// Shown when the repository has no files.
pub const EMPTY_TREE: &str = "(empty repository)";

#[derive(Default)]
struct TreeNode {
    children: BTreeMap<String, TreeNode>,
}

/// Render `files` as an indented tree, cutting paths below `depth` levels.
#[must_use]
pub fn render_tree(files: &[String], depth: usize) -> String {
    let mut root = TreeNode::default();
    for file in files {
        let parts: Vec<&str> = file.split('/').filter(|part| !part.is_empty()).collect();
        let kept = parts.len().min(depth);
        let mut node = &mut root;
        for (index, part) in parts.iter().take(kept).enumerate() {
            let is_dir = index + 1 < parts.len();
            let key = if is_dir {
                format!("{part}/")
            } else {
                (*part).to_owned()
            };
            node = node.children.entry(key).or_default();
        }
    }

    let mut out = String::new();
    write_level(&root, 0, &mut out);
    if out.is_empty() {
        EMPTY_TREE.to_owned()
    } else {
        out.trim_end().to_owned()
    }
}

fn write_level(node: &TreeNode, level: usize, out: &mut String) {
    for (name, child) in &node.children {
        let _ = writeln!(out, "{}{name}", "  ".repeat(level));
        write_level(child, level + 1, out);
    }
}

/// Builds the codebase tree and reads `AGENTS.md`.
pub struct Initializer;

impl Initializer {
    async fn build_tree(ctx: &ExecutionContext, state: &mut SessionState) -> Result<String> {
        let files = git::list_tracked_files(ctx.sandbox.as_ref()).await?;
        let count = files.len();

        if count < ctx.limits.file_count_threshold {
            let tree = render_tree(&files, FULL_TREE_DEPTH);
            ctx.log(state, format!("Generated full codebase tree ({count} files)."))
                .await;
            return Ok(tree);
        }

        let root_entries = ctx.sandbox.list_dir(".").await?;
        let is_monorepo = root_entries
            .iter()
            .any(|entry| MONOREPO_INDICATORS.contains(&entry.as_str()));

        if is_monorepo {
            let mut tree = render_tree(&files, MONOREPO_TREE_DEPTH);
            tree.push_str(MONOREPO_NOTE);
            ctx.log(
                state,
                "Detected Monorepo structure. Generated truncated codebase tree.",
            )
            .await;
            Ok(tree)
        } else {
            let tree = render_tree(&files, LARGE_TREE_DEPTH);
            ctx.log(state, "Generated codebase tree for context.").await;
            Ok(tree)
        }
    }
}

impl StepHandler for Initializer {
    fn run<'a>(
        &'a self,
        state: &'a mut SessionState,
        ctx: &'a ExecutionContext,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            match Self::build_tree(ctx, state).await {
                Ok(tree) => state.codebase_tree = Some(tree),
                Err(err) => {
                    ctx.log(state, format!("Initialization failed: {err}")).await;
                    state.status = WorkflowStatus::Failed;
                    return Ok(());
                }
            }

            state.agents_md_content = match ctx.sandbox.read_file("AGENTS.md").await {
                Ok(content) if !content.trim().is_empty() => {
                    ctx.log(state, "Found AGENTS.md instructions.").await;
                    Some(content)
                }
                _ => None,
            };

            state.status = WorkflowStatus::Planning;
            Ok(())
        })
    }
}
