//! Custom command evaluation.
//!
//! Expands a custom target's heterogeneous command tokens into a concrete
//! argv plus the input and output path lists, substituting template
//! placeholders against the tree roots and the target's own files.

use std::path::PathBuf;

use anyhow::Result;
use tracing::warn;

use crate::backend::context::LoweringContext;
use crate::backend::paths::PathPlanner;
use crate::core::graph::{BuildGraph, TargetId};
use crate::core::target::{AnyTarget, CommandToken, CustomTarget};
use crate::util::diagnostic::{MissingDepfileError, PlaceholderIndexError};
use crate::util::fs::unix_path_str;

/// The fully evaluated form of one custom command.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluatedCommand {
    /// Input file paths
    pub inputs: Vec<PathBuf>,

    /// Output file paths
    pub outputs: Vec<PathBuf>,

    /// Final argv
    pub argv: Vec<String>,

    /// Targets referenced by the command, in token order
    pub deps: Vec<TargetId>,
}

/// Placeholder values available while substituting one command.
struct SubstContext {
    target: String,
    source_root: String,
    build_root: String,
    current_source_dir: String,
    private_dir: String,
    depfile: Option<String>,
    inputs: Vec<String>,
    outputs: Vec<String>,
}

/// Expands custom command templates against concrete paths.
pub struct CustomCommandEvaluator<'g, 'c> {
    graph: &'g BuildGraph,
    ctx: &'c LoweringContext,
}

impl<'g, 'c> CustomCommandEvaluator<'g, 'c> {
    pub fn new(graph: &'g BuildGraph, ctx: &'c LoweringContext) -> Self {
        CustomCommandEvaluator { graph, ctx }
    }

    /// Evaluate a custom target's command.
    ///
    /// With `absolute_outputs` unset, every path is rendered relative to the
    /// build root (`@BUILD_ROOT@` resolves to `.`); otherwise everything is
    /// absolute. Evaluation is pure: the same target yields the same result
    /// every time.
    pub fn evaluate(
        &self,
        id: TargetId,
        absolute_outputs: bool,
        planner: &mut PathPlanner<'g>,
    ) -> Result<EvaluatedCommand> {
        let target = self
            .graph
            .custom_target(id)
            .unwrap_or_else(|| panic!("target {} is not a custom target", id.index()));

        let inputs: Vec<PathBuf> = target
            .inputs
            .iter()
            .map(|f| {
                if absolute_outputs {
                    f.absolute(&self.ctx.source_root, &self.ctx.build_root)
                } else {
                    f.rel_to_build(&self.ctx.src_to_build)
                }
            })
            .collect();

        let outputs: Vec<PathBuf> = (0..target.outputs.len())
            .map(|i| self.render_dir(planner.output_path(id, i), absolute_outputs))
            .collect();

        let private_dir = self.render_dir(planner.private_dir(id), absolute_outputs);
        let subst = self.subst_context(target, &inputs, &outputs, private_dir, absolute_outputs);

        let mut argv = Vec::with_capacity(target.command.len());
        let mut deps = Vec::new();
        for token in &target.command {
            argv.push(self.eval_token(token, &subst, absolute_outputs, planner, &mut deps)?);
        }

        Ok(EvaluatedCommand {
            inputs,
            outputs,
            argv,
            deps,
        })
    }

    /// Evaluate a free-standing token list (an install script command).
    ///
    /// Only the tree-root placeholders are meaningful here; there is no
    /// owning custom target to supply inputs, outputs, or a depfile.
    pub fn evaluate_script(
        &self,
        name: &str,
        tokens: &[CommandToken],
        planner: &mut PathPlanner<'g>,
    ) -> Result<(Vec<String>, Vec<TargetId>)> {
        let subst = SubstContext {
            target: name.to_string(),
            source_root: self.ctx.source_root.display().to_string(),
            build_root: self.ctx.build_root.display().to_string(),
            current_source_dir: self.ctx.source_root.display().to_string(),
            private_dir: self.ctx.scratch_dir().display().to_string(),
            depfile: None,
            inputs: vec![],
            outputs: vec![],
        };

        let mut argv = Vec::with_capacity(tokens.len());
        let mut deps = Vec::new();
        for token in tokens {
            argv.push(self.eval_token(token, &subst, true, planner, &mut deps)?);
        }
        Ok((argv, deps))
    }

    fn subst_context(
        &self,
        target: &CustomTarget,
        inputs: &[PathBuf],
        outputs: &[PathBuf],
        private_dir: PathBuf,
        absolute: bool,
    ) -> SubstContext {
        let (source_root, build_root) = if absolute {
            (
                self.ctx.source_root.display().to_string(),
                self.ctx.build_root.display().to_string(),
            )
        } else {
            (unix_path_str(&self.ctx.src_to_build), ".".to_string())
        };
        let current_source_dir = if target.subdir.as_os_str().is_empty() {
            source_root.clone()
        } else {
            format!("{}/{}", source_root, unix_path_str(&target.subdir))
        };

        SubstContext {
            target: target.id(),
            source_root,
            build_root,
            current_source_dir,
            depfile: target
                .depfile
                .as_ref()
                .map(|name| unix_path_str(&private_dir.join(name))),
            private_dir: unix_path_str(&private_dir),
            inputs: inputs.iter().map(|p| unix_path_str(p)).collect(),
            outputs: outputs.iter().map(|p| unix_path_str(p)).collect(),
        }
    }

    fn render_dir(&self, rel: PathBuf, absolute: bool) -> PathBuf {
        if absolute {
            self.ctx.to_absolute(&rel)
        } else {
            rel
        }
    }

    /// Resolve one command token to its final string form.
    ///
    /// Backslashes are normalized to forward slashes in every token. A
    /// command that needs a literal backslash cannot express one; this is a
    /// known platform-compatibility limitation, kept deliberately.
    fn eval_token(
        &self,
        token: &CommandToken,
        subst: &SubstContext,
        absolute: bool,
        planner: &mut PathPlanner<'g>,
        deps: &mut Vec<TargetId>,
    ) -> Result<String> {
        let evaluated = match token {
            CommandToken::Str { value } => substitute(value, subst)?,
            CommandToken::File { file } => {
                let path = if absolute {
                    file.absolute(&self.ctx.source_root, &self.ctx.build_root)
                } else {
                    file.rel_to_build(&self.ctx.src_to_build)
                };
                path.display().to_string()
            }
            CommandToken::Target { target } => {
                deps.push(*target);
                if let AnyTarget::Custom(t) = self.graph.target(*target) {
                    if t.outputs.len() > 1 {
                        warn!(
                            "custom target `{}` has {} outputs; using the first",
                            t.id(),
                            t.outputs.len()
                        );
                    }
                }
                let path = self.render_dir(planner.output_path(*target, 0), absolute);
                path.display().to_string()
            }
            CommandToken::TargetOutput { target, output } => {
                deps.push(*target);
                let available = self.graph.target(*target).outputs().len();
                if *output >= available {
                    return Err(PlaceholderIndexError {
                        target: self.graph.target(*target).id(),
                        placeholder: format!("output #{}", output),
                        kind: "outputs",
                        available,
                    }
                    .into());
                }
                let path = self.render_dir(planner.output_path(*target, *output), absolute);
                path.display().to_string()
            }
        };

        Ok(evaluated.replace('\\', "/"))
    }
}

/// Substitute every placeholder in one string token.
fn substitute(value: &str, subst: &SubstContext) -> Result<String> {
    let mut s = value
        .replace("@SOURCE_ROOT@", &subst.source_root)
        .replace("@BUILD_ROOT@", &subst.build_root)
        .replace("@CURRENT_SOURCE_DIR@", &subst.current_source_dir)
        .replace("@PRIVATE_DIR@", &subst.private_dir);

    if s.contains("@DEPFILE@") {
        let depfile = subst.depfile.as_ref().ok_or_else(|| MissingDepfileError {
            target: subst.target.clone(),
        })?;
        s = s.replace("@DEPFILE@", depfile);
    }

    s = replace_indexed(&s, "@OUTPUT", &subst.outputs, &subst.target, "outputs")?;
    s = replace_indexed(&s, "@INPUT", &subst.inputs, &subst.target, "inputs")?;
    Ok(s)
}

/// Replace indexed placeholders like `@OUTPUT0@` with the matching value.
fn replace_indexed(
    s: &str,
    tag: &str,
    values: &[String],
    target: &str,
    kind: &'static str,
) -> Result<String> {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(pos) = rest.find(tag) {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + tag.len()..];
        let digits: &str = &after[..after
            .char_indices()
            .find(|(_, c)| !c.is_ascii_digit())
            .map(|(i, _)| i)
            .unwrap_or(after.len())];

        if digits.is_empty() || !after[digits.len()..].starts_with('@') {
            // not an indexed placeholder, keep the text as-is
            out.push_str(tag);
            rest = after;
            continue;
        }

        let index: usize = digits.parse().expect("digits parse");
        let Some(value) = values.get(index) else {
            return Err(PlaceholderIndexError {
                target: target.to_string(),
                placeholder: format!("{}{}@", tag, index),
                kind,
                available: values.len(),
            }
            .into());
        };
        out.push_str(value);
        rest = &after[digits.len() + 1..];
    }

    out.push_str(rest);
    Ok(out)
}
