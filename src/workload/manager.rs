//! Workload manager (C11): discovers agent definitions across a set of
//! search paths and dispatches each discovered file/directory to the loader
//! for its kind.

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};

use crate::dsl::codegen::CompiledWorkflow;
use crate::runtime::errors::AgentDuplicateNameError;
use crate::runtime::tool_provider::ToolProvider;

/// `STREETRACE_AGENT_PATHS` is a `:`-separated list of extra search
/// directories, appended after the built-in defaults.
const AGENT_PATHS_ENV: &str = "STREETRACE_AGENT_PATHS";

#[derive(Debug, Clone)]
pub struct WorkloadManagerConfig {
    pub search_paths: Vec<PathBuf>,
}

impl Default for WorkloadManagerConfig {
    /// ```
    /// use streetrace::workload::manager::WorkloadManagerConfig;
    ///
    /// let config = WorkloadManagerConfig::default();
    /// assert!(config.search_paths.iter().any(|p| p == std::path::Path::new(".")));
    /// ```
    fn default() -> Self {
        let mut search_paths = vec![
            PathBuf::from("./agents"),
            PathBuf::from("."),
        ];
        if let Some(home) = env::var_os("HOME") {
            search_paths.push(PathBuf::from(home).join(".streetrace/agents"));
        }
        search_paths.push(PathBuf::from("/etc/streetrace/agents"));

        if let Ok(extra) = env::var(AGENT_PATHS_ENV) {
            search_paths.extend(env::split_paths(&extra));
        }

        Self { search_paths }
    }
}

/// One discovered agent definition, tagged by the loader that owns it.
/// Only the `.sr` case is compiled in-process; YAML and `agent.py`
/// directories are external contracts per `spec.md` §1/§4.11 — discovery
/// records where they live without parsing them further.
pub enum DiscoveredDefinition {
    Dsl { name: String, source_path: PathBuf, compiled: CompiledWorkflow },
    Declarative { name: String, source_path: PathBuf },
    ConcreteAgentDir { name: String, source_path: PathBuf },
}

impl DiscoveredDefinition {
    pub fn name(&self) -> &str {
        match self {
            DiscoveredDefinition::Dsl { name, .. } => name,
            DiscoveredDefinition::Declarative { name, .. } => name,
            DiscoveredDefinition::ConcreteAgentDir { name, .. } => name,
        }
    }

    pub fn source_path(&self) -> &Path {
        match self {
            DiscoveredDefinition::Dsl { source_path, .. } => source_path,
            DiscoveredDefinition::Declarative { source_path, .. } => source_path,
            DiscoveredDefinition::ConcreteAgentDir { source_path, .. } => source_path,
        }
    }
}

fn stem_name(path: &Path) -> String {
    path.file_stem().and_then(|s| s.to_str()).unwrap_or("unnamed").to_string()
}

/// Scan every configured search path for agent definitions. Invalid `.sr`
/// files are skipped with a `warn!` rather than aborting discovery entirely
/// (`spec.md` §4.11: "invalid files are skipped with a warning, never
/// throw from discovery").
pub fn discover(config: &WorkloadManagerConfig) -> Vec<DiscoveredDefinition> {
    let mut found = Vec::new();
    for root in &config.search_paths {
        let Ok(entries) = std::fs::read_dir(root) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                if path.join("agent.py").is_file() {
                    found.push(DiscoveredDefinition::ConcreteAgentDir { name: stem_name(&path), source_path: path });
                }
                continue;
            }
            match path.extension().and_then(|e| e.to_str()) {
                Some("sr") => match std::fs::read_to_string(&path) {
                    Ok(source) => match crate::dsl::compile_source(&source, &path.to_string_lossy()) {
                        Ok(outcome) if outcome.is_valid => {
                            found.push(DiscoveredDefinition::Dsl { name: stem_name(&path), source_path: path, compiled: outcome.compiled });
                        }
                        Ok(outcome) => {
                            warn!("skipping invalid agent definition {}: {} error(s)", path.display(), outcome.errors.len());
                        }
                        Err(e) => warn!("skipping agent definition {}: {e}", path.display()),
                    },
                    Err(e) => warn!("could not read agent definition {}: {e}", path.display()),
                },
                Some("yaml") | Some("yml") => {
                    found.push(DiscoveredDefinition::Declarative { name: stem_name(&path), source_path: path });
                }
                _ => {}
            }
        }
    }
    info!("workload discovery found {} agent definition(s)", found.len());
    found
}

/// A resolved set of agent definitions plus the tool providers they share,
/// ready for the supervisor to drive turns against.
pub struct Workload {
    definitions: HashMap<String, DiscoveredDefinition>,
    tools: Vec<Arc<dyn ToolProvider>>,
    sub_workloads: Vec<Workload>,
}

impl Workload {
    pub fn get(&self, name: &str) -> Option<&DiscoveredDefinition> {
        self.definitions.get(name)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Depth-first teardown: sub-workloads close first, then this
    /// workload's own tool providers (`spec.md` §4.11).
    pub async fn close(&self) {
        for sub in &self.sub_workloads {
            Box::pin(sub.close()).await;
        }
        for tool in &self.tools {
            tool.close().await;
        }
    }
}

/// Build a [`Workload`] from discovered definitions, raising
/// [`AgentDuplicateNameError`] the moment two definitions claim the same
/// name.
pub fn create_workload(
    discovered: Vec<DiscoveredDefinition>,
    tools: Vec<Arc<dyn ToolProvider>>,
) -> Result<Workload, AgentDuplicateNameError> {
    let mut definitions = HashMap::with_capacity(discovered.len());
    for def in discovered {
        let name = def.name().to_string();
        if let Some(existing) = definitions.get(&name) {
            let existing: &DiscoveredDefinition = existing;
            return Err(AgentDuplicateNameError {
                name,
                first_source: existing.source_path().display().to_string(),
                second_source: def.source_path().display().to_string(),
            });
        }
        definitions.insert(name, def);
    }
    Ok(Workload { definitions, tools, sub_workloads: Vec::new() })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dsl_def(name: &str) -> DiscoveredDefinition {
        let src = "streetrace v1\nflow main:\n    return 1\n";
        let outcome = crate::dsl::compile_source(src, "x.sr").unwrap();
        DiscoveredDefinition::Dsl { name: name.to_string(), source_path: PathBuf::from(format!("{name}.sr")), compiled: outcome.compiled }
    }

    #[test]
    fn default_config_includes_home_and_etc_paths() {
        let config = WorkloadManagerConfig::default();
        assert!(config.search_paths.iter().any(|p| p.ends_with("agents") || p == Path::new(".")));
        assert!(config.search_paths.contains(&PathBuf::from("/etc/streetrace/agents")));
    }

    #[test]
    fn create_workload_detects_duplicate_names() {
        let defs = vec![dsl_def("helper"), dsl_def("helper")];
        let err = create_workload(defs, Vec::new()).unwrap_err();
        assert_eq!(err.name, "helper");
    }

    #[test]
    fn create_workload_succeeds_for_unique_names() {
        let defs = vec![dsl_def("a"), dsl_def("b")];
        let workload = create_workload(defs, Vec::new()).unwrap();
        assert_eq!(workload.len(), 2);
    }
}
