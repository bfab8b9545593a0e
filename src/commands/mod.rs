pub mod apply;
pub mod info;
pub mod plan;

use anyhow::Result;
use declarative::ExecutionPlan;
use std::path::PathBuf;

use crate::Context;
use crate::compose::compose;
use crate::config::{self, RoleConfig};
use crate::platform::PlatformFacts;

/// A loaded role config and the facts it is composed for
pub struct Role {
    pub path: PathBuf,
    pub config: RoleConfig,
    pub facts: PlatformFacts,
}

impl Role {
    pub fn load(ctx: &Context) -> Result<Self> {
        let path = config::resolve_path(ctx.config.as_deref())?;
        let config = RoleConfig::load(&path)?;
        let facts = config.facts()?;
        log::info!(
            "Role config {} on {} {} ({})",
            path.display(),
            facts.os_family,
            facts.os_release,
            facts.architecture
        );
        if !facts.os_family.is_supported() {
            log::warn!("{} is not a supported OS family", facts.os_family);
        }
        Ok(Self {
            path,
            config,
            facts,
        })
    }

    /// Compose the graph and fix its order, optionally narrowed to a target
    pub fn plan(&self, target: Option<&str>) -> Result<ExecutionPlan> {
        let graph = compose(&self.config.parameters, &self.facts)?;
        let plan = ExecutionPlan::new(graph)?.filter_by_target(target)?;
        log::debug!("Plan has {} resources", plan.len());
        Ok(plan)
    }
}
