//! Execution engine - converges a plan with a bounded worker pool
//!
//! The dispatch loop runs on the calling thread and is the only place that
//! decides whether a resource may start. Probing and applying happen on
//! rayon workers and report back over a channel.

use crate::context::{ApplyContext, CancelToken, NoProgress, ProgressCallback};
use crate::lock;
use crate::planner::ExecutionPlan;
use crate::resource::{Identity, Provider, ProviderSet, Resource};
use crate::types::{
    AppliedResult, ApplyResult, ExecuteOptions, FailureStage, Phase, ResourceState, RunReport,
};
use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Mutex;
use std::sync::mpsc;

/// Per-run result table, guarded by one lock
struct ResultTable {
    results: Vec<Option<AppliedResult>>,
    /// Predecessors not yet finished, by plan position
    waiting_on: Vec<usize>,
    /// Positions whose predecessors are all done, lowest first
    ready: BTreeSet<usize>,
    /// First failure when running in strict mode
    halted_by: Option<Identity>,
}

impl ResultTable {
    fn new(predecessors: &[Vec<usize>]) -> Self {
        let waiting_on: Vec<usize> = predecessors.iter().map(Vec::len).collect();
        let ready = waiting_on
            .iter()
            .enumerate()
            .filter(|&(_, &n)| n == 0)
            .map(|(position, _)| position)
            .collect();
        Self {
            results: vec![None; predecessors.len()],
            waiting_on,
            ready,
            halted_by: None,
        }
    }

    /// Record a finished resource and release or block its dependents
    ///
    /// Returns the results of dependents that were blocked as a consequence.
    fn record(
        &mut self,
        position: usize,
        applied: AppliedResult,
        successors: &[Vec<usize>],
        plan: &ExecutionPlan,
        strict: bool,
    ) -> Vec<(Identity, ApplyResult)> {
        let identity = applied.identity.clone();
        let unblocks = applied.result.unblocks_dependents();
        self.results[position] = Some(applied);

        if unblocks {
            for &next in &successors[position] {
                self.waiting_on[next] -= 1;
                if self.waiting_on[next] == 0 && self.results[next].is_none() {
                    self.ready.insert(next);
                }
            }
            return Vec::new();
        }

        if strict && self.halted_by.is_none() {
            log::warn!("Strict mode: halting dispatch after failure of {identity}");
            self.halted_by = Some(identity.clone());
        }

        let mut blocked = Vec::new();
        let mut stack = successors[position].clone();
        while let Some(next) = stack.pop() {
            if self.results[next].is_some() {
                continue;
            }
            let dependent = plan.resource_at(next).identity.clone();
            let result = ApplyResult::Blocked {
                dependency: identity.to_string(),
            };
            log::warn!("{dependent} blocked by failed dependency {identity}");
            self.ready.remove(&next);
            self.results[next] = Some(AppliedResult::not_attempted(
                dependent.clone(),
                result.clone(),
            ));
            blocked.push((dependent, result));
            stack.extend(successors[next].iter().copied());
        }
        blocked
    }
}

/// Execute a plan against a provider set
///
/// Resources start only after every predecessor is done. A failure blocks
/// its transitive dependents while independent branches keep going, unless
/// `opts.strict` is set. Cancelling `cancel` lets in-flight resources finish
/// and marks everything not yet dispatched as cancelled.
///
/// # Returns
/// One [`AppliedResult`] per resource, in plan order
pub fn execute<P: ProgressCallback>(
    plan: &ExecutionPlan,
    providers: &dyn ProviderSet,
    opts: &ExecuteOptions,
    cancel: &CancelToken,
    progress: &mut P,
) -> Result<RunReport> {
    progress.on_run_start(plan.len());
    if plan.is_empty() {
        progress.on_run_complete();
        return Ok(RunReport::default());
    }

    let jobs = opts.jobs.max(1);
    let ctx = ApplyContext::new(opts.dry_run, opts.verbose);
    let (predecessors, successors) = plan.links();
    let table = Mutex::new(ResultTable::new(&predecessors));

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs)
        .build()
        .context("Failed to create apply thread pool")?;

    let (tx, rx) = mpsc::channel::<(usize, AppliedResult)>();

    pool.in_place_scope(|scope| -> Result<()> {
        let mut in_flight = 0usize;

        loop {
            while in_flight < jobs {
                let next = {
                    let mut table = lock(&table);
                    if cancel.is_cancelled() || table.halted_by.is_some() {
                        None
                    } else {
                        table.ready.pop_first()
                    }
                };
                let Some(position) = next else {
                    break;
                };

                let resource = plan.resource_at(position);
                let provider = providers.provider_for(resource.kind());
                log::debug!("Dispatching {}", resource.identity);
                progress.on_resource_start(&resource.identity, &resource.description());

                let tx = tx.clone();
                scope.spawn(move |_| {
                    let mut phases = Vec::new();
                    let outcome = catch_unwind(AssertUnwindSafe(|| {
                        reconcile(resource, provider, ctx, &mut phases)
                    }));
                    let applied = match outcome {
                        Ok(applied) => applied,
                        Err(_) => panicked(resource.identity.clone(), phases),
                    };
                    // The receiver outlives every worker
                    let _ = tx.send((position, applied));
                });
                in_flight += 1;
            }

            if in_flight == 0 {
                break;
            }

            let (position, applied) = rx
                .recv()
                .context("Apply workers stopped reporting results")?;
            in_flight -= 1;

            log::info!("{}: {}", applied.identity, applied.result);
            progress.on_resource_complete(&applied.identity, &applied.result);

            let blocked = lock(&table).record(position, applied, &successors, plan, opts.strict);
            for (identity, result) in &blocked {
                progress.on_resource_complete(identity, result);
            }
        }

        Ok(())
    })?;

    let table = table.into_inner().unwrap_or_else(|p| p.into_inner());
    let halted_by = table.halted_by;
    let mut results = Vec::with_capacity(plan.len());
    for (position, slot) in table.results.into_iter().enumerate() {
        let applied = match slot {
            Some(applied) => applied,
            None => {
                let identity = plan.resource_at(position).identity.clone();
                let result = match (&halted_by, cancel.is_cancelled()) {
                    (_, true) | (None, false) => ApplyResult::Cancelled,
                    (Some(failed), false) => ApplyResult::Skipped {
                        reason: format!("aborted after failure of {failed}"),
                    },
                };
                progress.on_resource_complete(&identity, &result);
                AppliedResult::not_attempted(identity, result)
            }
        };
        results.push(applied);
    }

    progress.on_run_complete();
    Ok(RunReport::from_results(results))
}

/// Walk one resource through the state machine
///
/// `phases` is filled in as the resource moves, so a worker that unwinds
/// still knows how far it got.
fn reconcile(
    resource: &Resource,
    provider: Option<&dyn Provider>,
    ctx: ApplyContext,
    phases: &mut Vec<Phase>,
) -> AppliedResult {
    let identity = resource.identity.clone();
    phases.extend([Phase::Pending, Phase::Probing]);

    let Some(provider) = provider else {
        phases.push(Phase::Failed);
        return failed(
            identity,
            None,
            std::mem::take(phases),
            FailureStage::Probe,
            format!("no provider registered for {} resources", resource.kind()),
        );
    };

    let probed = provider
        .probe(resource)
        .and_then(|current| Ok((current, provider.desired_state(resource)?)));
    let (current, desired) = match probed {
        Ok(states) => states,
        Err(e) => {
            phases.push(Phase::Failed);
            return failed(
                identity,
                None,
                std::mem::take(phases),
                FailureStage::Probe,
                format!("{e:#}"),
            );
        }
    };

    if current == desired {
        phases.extend([Phase::NoChangeNeeded, Phase::Done]);
        return AppliedResult {
            identity,
            previous: Some(current.clone()),
            result: ApplyResult::NoChange,
            final_state: Some(current),
            phases: std::mem::take(phases),
        };
    }

    if ctx.dry_run {
        phases.push(Phase::Done);
        return AppliedResult {
            identity,
            previous: Some(current),
            result: ApplyResult::Skipped {
                reason: "dry run".to_string(),
            },
            final_state: None,
            phases: std::mem::take(phases),
        };
    }

    phases.push(Phase::Applying);
    let result = match provider.apply(resource, &ctx) {
        Ok(result) => result,
        Err(e) => ApplyResult::apply_failed(format!("{e:#}")),
    };

    if !result.unblocks_dependents() {
        phases.push(Phase::Failed);
        return AppliedResult {
            identity,
            previous: Some(current),
            result,
            final_state: None,
            phases: std::mem::take(phases),
        };
    }

    let final_state = provider
        .probe(resource)
        .unwrap_or(ResourceState::Unknown);
    phases.push(Phase::Done);
    AppliedResult {
        identity,
        previous: Some(current),
        result,
        final_state: Some(final_state),
        phases: std::mem::take(phases),
    }
}

/// Failure for a worker that unwound, charged to the stage it had reached
fn panicked(identity: Identity, mut phases: Vec<Phase>) -> AppliedResult {
    let stage = if phases.contains(&Phase::Applying) {
        FailureStage::Apply
    } else {
        FailureStage::Probe
    };
    phases.push(Phase::Failed);
    failed(identity, None, phases, stage, "provider panicked".to_string())
}

fn failed(
    identity: Identity,
    previous: Option<ResourceState>,
    phases: Vec<Phase>,
    stage: FailureStage,
    error: String,
) -> AppliedResult {
    AppliedResult {
        identity,
        previous,
        result: ApplyResult::Failed { stage, error },
        final_state: None,
        phases,
    }
}

/// Simple execution without callbacks or cancellation
pub fn execute_simple(
    plan: &ExecutionPlan,
    providers: &dyn ProviderSet,
    opts: &ExecuteOptions,
) -> Result<RunReport> {
    execute(plan, providers, opts, &CancelToken::new(), &mut NoProgress)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::DesiredStateGraph;
    use crate::resource::{Attributes, ResourceKind};
    use crate::simulated::SimulatedHost;
    use crate::types::Ensure;
    use std::time::Duration;

    fn pkg(name: &str) -> Identity {
        Identity::new(ResourceKind::Package, name)
    }

    /// `a -> b -> c` plus an independent `d`
    fn chain_graph() -> DesiredStateGraph {
        let mut graph = DesiredStateGraph::new();
        for name in ["a", "b", "c", "d"] {
            graph
                .define_resource(pkg(name), Attributes::new(Ensure::Present))
                .unwrap();
        }
        graph.add_edge(&pkg("a"), &pkg("b")).unwrap();
        graph.add_edge(&pkg("b"), &pkg("c")).unwrap();
        graph
    }

    fn plan(graph: DesiredStateGraph) -> ExecutionPlan {
        ExecutionPlan::new(graph).unwrap()
    }

    #[test]
    fn test_execute_empty_plan() {
        let host = SimulatedHost::new();
        let report = execute_simple(
            &plan(DesiredStateGraph::new()),
            &host,
            &ExecuteOptions::default(),
        )
        .unwrap();

        assert_eq!(report.summary.total(), 0);
        assert!(report.is_success());
    }

    #[test]
    fn test_execute_applies_in_dependency_order() {
        let host = SimulatedHost::new();
        let report = execute_simple(&plan(chain_graph()), &host, &ExecuteOptions::default())
            .unwrap();

        assert!(report.is_success());
        assert_eq!(report.summary.created, 4);

        let applied = host.applied();
        let pos = |name: &str| applied.iter().position(|i| i == &pkg(name)).unwrap();
        assert!(pos("a") < pos("b"));
        assert!(pos("b") < pos("c"));

        let order: Vec<_> = report.results.iter().map(|r| r.identity.clone()).collect();
        assert_eq!(order, vec![pkg("a"), pkg("b"), pkg("c"), pkg("d")]);
    }

    #[test]
    fn test_second_run_is_no_change() {
        let host = SimulatedHost::new();
        let plan = plan(chain_graph());
        let opts = ExecuteOptions::default();

        let first = execute_simple(&plan, &host, &opts).unwrap();
        assert_eq!(first.applied_count(), 4);

        let second = execute_simple(&plan, &host, &opts).unwrap();
        assert_eq!(second.applied_count(), 0);
        assert_eq!(second.summary.no_change, 4);
        assert!(second.results.iter().all(|r| {
            r.phases
                == vec![
                    Phase::Pending,
                    Phase::Probing,
                    Phase::NoChangeNeeded,
                    Phase::Done,
                ]
        }));
        assert_eq!(host.apply_count(), 4);
    }

    #[test]
    fn test_failure_blocks_dependents_only() {
        let host = SimulatedHost::new();
        host.fail_apply(pkg("a"));

        let report = execute_simple(&plan(chain_graph()), &host, &ExecuteOptions::default())
            .unwrap();

        assert!(!report.is_success());
        assert!(matches!(
            report.get(&pkg("a")).unwrap().result,
            ApplyResult::Failed {
                stage: FailureStage::Apply,
                ..
            }
        ));
        for name in ["b", "c"] {
            assert_eq!(
                report.get(&pkg(name)).unwrap().result,
                ApplyResult::Blocked {
                    dependency: "package:a".to_string()
                }
            );
        }
        assert_eq!(report.get(&pkg("d")).unwrap().result, ApplyResult::Created);
        assert_eq!(report.summary.blocked, 2);
    }

    #[test]
    fn test_probe_failure_is_recorded() {
        let host = SimulatedHost::new();
        host.fail_probe(pkg("c"));

        let report = execute_simple(&plan(chain_graph()), &host, &ExecuteOptions::default())
            .unwrap();

        let c = report.get(&pkg("c")).unwrap();
        assert!(matches!(
            c.result,
            ApplyResult::Failed {
                stage: FailureStage::Probe,
                ..
            }
        ));
        assert_eq!(
            c.phases,
            vec![Phase::Pending, Phase::Probing, Phase::Failed]
        );
    }

    #[test]
    fn test_strict_mode_stops_dispatch() {
        let host = SimulatedHost::new();
        host.fail_apply(pkg("a"));
        let opts = ExecuteOptions {
            jobs: 1,
            strict: true,
            ..ExecuteOptions::default()
        };

        let report = execute_simple(&plan(chain_graph()), &host, &opts).unwrap();

        // `a` is dispatched first and fails before `d` gets a worker
        assert!(matches!(
            report.get(&pkg("d")).unwrap().result,
            ApplyResult::Skipped { .. }
        ));
        assert_eq!(host.apply_count(), 0);
    }

    #[test]
    fn test_cancelled_before_start() {
        let host = SimulatedHost::new();
        let cancel = CancelToken::new();
        cancel.cancel();

        let report = execute(
            &plan(chain_graph()),
            &host,
            &ExecuteOptions::default(),
            &cancel,
            &mut NoProgress,
        )
        .unwrap();

        assert_eq!(report.summary.cancelled, 4);
        assert_eq!(host.apply_count(), 0);
        assert!(!report.is_success());
    }

    /// Cancels the run from inside the apply step of one resource
    struct CancelDuringApply {
        host: SimulatedHost,
        cancel: CancelToken,
        trigger: Identity,
    }

    impl Provider for CancelDuringApply {
        fn probe(&self, resource: &Resource) -> Result<ResourceState> {
            self.host.probe(resource)
        }

        fn apply(&self, resource: &Resource, ctx: &ApplyContext) -> Result<ApplyResult> {
            if resource.identity == self.trigger {
                self.cancel.cancel();
            }
            self.host.apply(resource, ctx)
        }
    }

    impl ProviderSet for CancelDuringApply {
        fn provider_for(&self, _kind: ResourceKind) -> Option<&dyn Provider> {
            Some(self)
        }
    }

    #[test]
    fn test_cancel_mid_run_finishes_in_flight_work() {
        let mut graph = DesiredStateGraph::new();
        for name in ["a", "b", "c"] {
            graph
                .define_resource(pkg(name), Attributes::new(Ensure::Present))
                .unwrap();
        }
        graph.add_edge(&pkg("a"), &pkg("b")).unwrap();
        graph.add_edge(&pkg("b"), &pkg("c")).unwrap();

        let cancel = CancelToken::new();
        let providers = CancelDuringApply {
            host: SimulatedHost::new(),
            cancel: cancel.clone(),
            trigger: pkg("a"),
        };

        let report = execute(
            &plan(graph),
            &providers,
            &ExecuteOptions::default(),
            &cancel,
            &mut NoProgress,
        )
        .unwrap();

        assert_eq!(report.get(&pkg("a")).unwrap().result, ApplyResult::Created);
        for name in ["b", "c"] {
            assert_eq!(report.get(&pkg(name)).unwrap().result, ApplyResult::Cancelled);
        }
        assert_eq!(providers.host.applied(), vec![pkg("a")]);
        assert_eq!(report.summary.cancelled, 2);
        assert!(!report.is_success());
    }

    /// Panics at one step of the state machine
    struct Panicking {
        during_apply: bool,
    }

    impl Provider for Panicking {
        fn probe(&self, _resource: &Resource) -> Result<ResourceState> {
            if !self.during_apply {
                panic!("probe blew up");
            }
            Ok(ResourceState::Absent)
        }

        fn apply(&self, _resource: &Resource, _ctx: &ApplyContext) -> Result<ApplyResult> {
            panic!("apply blew up");
        }
    }

    impl ProviderSet for Panicking {
        fn provider_for(&self, _kind: ResourceKind) -> Option<&dyn Provider> {
            Some(self)
        }
    }

    #[test]
    fn test_panic_is_charged_to_the_stage_reached() {
        let mut graph = DesiredStateGraph::new();
        graph
            .define_resource(pkg("a"), Attributes::new(Ensure::Present))
            .unwrap();
        let plan = plan(graph);

        let report = execute_simple(
            &plan,
            &Panicking { during_apply: false },
            &ExecuteOptions::default(),
        )
        .unwrap();
        let a = report.get(&pkg("a")).unwrap();
        assert!(matches!(
            a.result,
            ApplyResult::Failed {
                stage: FailureStage::Probe,
                ..
            }
        ));
        assert_eq!(a.phases, vec![Phase::Pending, Phase::Probing, Phase::Failed]);

        let report = execute_simple(
            &plan,
            &Panicking { during_apply: true },
            &ExecuteOptions::default(),
        )
        .unwrap();
        let a = report.get(&pkg("a")).unwrap();
        assert!(matches!(
            a.result,
            ApplyResult::Failed {
                stage: FailureStage::Apply,
                ..
            }
        ));
        assert_eq!(
            a.phases,
            vec![
                Phase::Pending,
                Phase::Probing,
                Phase::Applying,
                Phase::Failed
            ]
        );
    }

    #[test]
    fn test_dry_run_never_applies() {
        let host = SimulatedHost::new();
        let opts = ExecuteOptions {
            dry_run: true,
            ..ExecuteOptions::default()
        };

        let report = execute_simple(&plan(chain_graph()), &host, &opts).unwrap();

        assert_eq!(report.summary.skipped, 4);
        assert_eq!(host.apply_count(), 0);
    }

    #[test]
    fn test_concurrency_is_bounded() {
        let host = SimulatedHost::new().with_apply_delay(Duration::from_millis(20));
        let mut graph = DesiredStateGraph::new();
        for i in 0..8 {
            graph
                .define_resource(pkg(&format!("p{i}")), Attributes::new(Ensure::Present))
                .unwrap();
        }
        let opts = ExecuteOptions {
            jobs: 2,
            ..ExecuteOptions::default()
        };

        let report = execute_simple(&plan(graph), &host, &opts).unwrap();

        assert!(report.is_success());
        assert!(host.max_concurrent_applies() <= 2);
    }

    #[test]
    fn test_missing_provider_fails_resource() {
        struct Empty;
        impl ProviderSet for Empty {
            fn provider_for(&self, _kind: ResourceKind) -> Option<&dyn Provider> {
                None
            }
        }

        let report =
            execute_simple(&plan(chain_graph()), &Empty, &ExecuteOptions::default()).unwrap();
        assert_eq!(report.summary.failed, 2);
        assert_eq!(report.summary.blocked, 2);
    }
}
