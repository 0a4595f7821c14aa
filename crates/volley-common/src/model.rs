//! The immutable benchmark data model (§3). A `Benchmark` is a name plus a
//! simulation: a set of phases with a partial order induced by
//! `startAfter`/`startAfterStrict`. Everything here is built once, by
//! `Benchmark::build`, and never mutated afterward — mutable runtime state
//! lives in `volley-scheduler::PhaseInstance`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use ahash::AHashSet;
use serde::{Deserialize, Serialize};

use crate::error::BenchmarkDefinitionError;
use crate::step::Step;
use crate::value::VarType;

/// One of the five arrival models a phase may use (§3, §4.3).
#[derive(Clone)]
pub enum ArrivalSpec {
    /// A burst of `users` virtual users at phase start, then finish.
    AtOnce { users: u32 },
    /// Keep exactly `users` concurrent sessions active for the phase's
    /// `duration`, immediately replacing completions.
    Always { users: u32 },
    /// Open-loop, constant target rate in users/second.
    ConstantPerSec {
        users_per_sec: f64,
        max_sessions_estimate: u32,
    },
    /// Open-loop, linearly ramping rate from `initial` to `target`
    /// users/second over the phase's `duration`.
    RampPerSec {
        initial_users_per_sec: f64,
        target_users_per_sec: f64,
        max_sessions_estimate: u32,
    },
    /// Run one session to completion, repeat `repeats` times, one at a time.
    Sequentially { repeats: u32 },
}

impl ArrivalSpec {
    /// An upper bound on concurrently-live sessions this arrival process can
    /// produce, used to size the session pool (§4.1).
    pub fn max_concurrent_sessions(&self) -> u32 {
        match self {
            ArrivalSpec::AtOnce { users } => *users,
            ArrivalSpec::Always { users } => *users,
            ArrivalSpec::ConstantPerSec {
                max_sessions_estimate,
                ..
            } => *max_sessions_estimate,
            ArrivalSpec::RampPerSec {
                max_sessions_estimate,
                ..
            } => *max_sessions_estimate,
            ArrivalSpec::Sequentially { .. } => 1,
        }
    }
}

/// A single step in a sequence, held behind an `Arc` so template sequences
/// can be instantiated multiple times without cloning step state.
pub type SequenceStep = Arc<dyn Step>;

/// An ordered list of steps a session walks through.
#[derive(Clone)]
pub struct Sequence {
    pub name: String,
    pub steps: Vec<SequenceStep>,
}

impl Sequence {
    pub fn new(name: impl Into<String>, steps: Vec<SequenceStep>) -> Self {
        Self {
            name: name.into(),
            steps,
        }
    }
}

/// A declared session variable (§4.6): name plus type, used to derive the
/// fixed-size variable table schema at build time.
#[derive(Debug, Clone)]
pub struct VariableDecl {
    pub name: String,
    pub var_type: VarType,
}

/// The set of sequences a session walks through, plus the variable schema
/// it is allowed to use.
#[derive(Clone)]
pub struct Scenario {
    /// Sequences every session in this phase runs, in order, concurrently
    /// with each other (a session can have multiple running sequence
    /// instances at once, per §3).
    pub initial_sequences: Vec<Sequence>,
    /// Sequences that may be instantiated dynamically at runtime (e.g. by a
    /// step that forks a new concurrent sequence instance). Not run unless
    /// something instantiates them.
    pub template_sequences: Vec<Sequence>,
    pub variables: Vec<VariableDecl>,
}

impl Scenario {
    pub fn template(&self, name: &str) -> Option<&Sequence> {
        self.template_sequences.iter().find(|s| s.name == name)
    }
}

/// An immutable phase definition (§3). One `PhaseDef` may be instantiated
/// as exactly one `PhaseInstance` at runtime (volley-scheduler).
pub struct PhaseDef {
    pub name: String,
    pub scenario: Arc<Scenario>,
    /// Absolute offset from benchmark start at which this phase becomes
    /// eligible to start, in addition to its dependency predicate.
    pub start_time: Option<Duration>,
    /// Names of phases that must be at least FINISHED before this phase
    /// may start.
    pub start_after: Vec<String>,
    /// Names of phases that must be TERMINATED before this phase may start.
    pub start_after_strict: Vec<String>,
    /// Names of phases that must be TERMINATED before this (already
    /// FINISHED) phase is allowed to terminate.
    pub terminate_after_strict: Vec<String>,
    pub duration: Duration,
    /// Hard stop, independent of `duration`; a safety valve against
    /// runaway sessions.
    pub max_duration: Option<Duration>,
    pub arrival: ArrivalSpec,
}

/// The whole benchmark: a name and a partially-ordered set of phases.
/// Immutable once built.
pub struct Benchmark {
    pub name: String,
    pub agents: Vec<String>,
    phases: Vec<Arc<PhaseDef>>,
    by_name: HashMap<String, usize>,
}

impl Benchmark {
    /// Validate and assemble a set of phase definitions into a `Benchmark`.
    /// Catches dangling dependency references, dependency cycles, empty
    /// scenarios, and step references to undeclared variables — the
    /// "structural problem detected while building" case of
    /// `BenchmarkDefinitionError` (§7).
    pub fn build(
        name: impl Into<String>,
        agents: Vec<String>,
        phases: Vec<PhaseDef>,
    ) -> Result<Benchmark, BenchmarkDefinitionError> {
        let mut by_name = HashMap::with_capacity(phases.len());
        for (idx, phase) in phases.iter().enumerate() {
            if by_name.insert(phase.name.clone(), idx).is_some() {
                return Err(BenchmarkDefinitionError::DuplicatePhase(phase.name.clone()));
            }
        }

        for phase in &phases {
            for dep in phase
                .start_after
                .iter()
                .chain(phase.start_after_strict.iter())
                .chain(phase.terminate_after_strict.iter())
            {
                if !by_name.contains_key(dep) {
                    return Err(BenchmarkDefinitionError::UnknownDependency(
                        phase.name.clone(),
                        dep.clone(),
                    ));
                }
            }
            if phase.scenario.initial_sequences.is_empty() {
                return Err(BenchmarkDefinitionError::EmptyScenario(phase.name.clone()));
            }
            validate_variables(phase)?;
            validate_templates_reachable(phase)?;
        }

        detect_cycles(&phases, &by_name)?;

        let phases: Vec<Arc<PhaseDef>> = phases.into_iter().map(Arc::new).collect();
        Ok(Benchmark {
            name: name.into(),
            agents,
            phases,
            by_name,
        })
    }

    pub fn phases(&self) -> &[Arc<PhaseDef>] {
        &self.phases
    }

    pub fn phase(&self, name: &str) -> Option<&Arc<PhaseDef>> {
        self.by_name.get(name).map(|&idx| &self.phases[idx])
    }
}

fn validate_variables(phase: &PhaseDef) -> Result<(), BenchmarkDefinitionError> {
    let declared: AHashSet<&str> = phase
        .scenario
        .variables
        .iter()
        .map(|v| v.name.as_str())
        .collect();
    for sequence in phase
        .scenario
        .initial_sequences
        .iter()
        .chain(phase.scenario.template_sequences.iter())
    {
        for step in &sequence.steps {
            for var in step.variables() {
                if !declared.contains(var) {
                    return Err(BenchmarkDefinitionError::UnknownVariable {
                        sequence: sequence.name.clone(),
                        step: step.name().to_string(),
                        variable: var.to_string(),
                    });
                }
            }
        }
    }
    Ok(())
}

/// Every declared template sequence must be instantiable by some step's
/// `spawns()` — one that's never referenced can never run, which is almost
/// certainly a scenario authoring mistake rather than intentional dead
/// weight (§3: template sequences "may be instantiated dynamically at
/// runtime", implying something must actually do the instantiating).
fn validate_templates_reachable(phase: &PhaseDef) -> Result<(), BenchmarkDefinitionError> {
    if phase.scenario.template_sequences.is_empty() {
        return Ok(());
    }
    let spawned: AHashSet<&str> = phase
        .scenario
        .initial_sequences
        .iter()
        .chain(phase.scenario.template_sequences.iter())
        .flat_map(|seq| seq.steps.iter())
        .flat_map(|step| step.spawns().iter().copied())
        .collect();
    for template in &phase.scenario.template_sequences {
        if !spawned.contains(template.name.as_str()) {
            return Err(BenchmarkDefinitionError::UnreachableSequence(
                template.name.clone(),
            ));
        }
    }
    Ok(())
}

/// DFS-based cycle detection over the union of `startAfter` and
/// `startAfterStrict` edges (both express "must happen before me").
fn detect_cycles(
    phases: &[PhaseDef],
    by_name: &HashMap<String, usize>,
) -> Result<(), BenchmarkDefinitionError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        Visiting,
        Done,
    }

    let mut marks = vec![Mark::Unvisited; phases.len()];

    fn visit(
        idx: usize,
        phases: &[PhaseDef],
        by_name: &HashMap<String, usize>,
        marks: &mut Vec<Mark>,
        stack: &mut HashSet<usize>,
    ) -> Result<(), BenchmarkDefinitionError> {
        match marks[idx] {
            Mark::Done => return Ok(()),
            Mark::Visiting => {
                return Err(BenchmarkDefinitionError::DependencyCycle(
                    phases[idx].name.clone(),
                ));
            }
            Mark::Unvisited => {}
        }
        marks[idx] = Mark::Visiting;
        stack.insert(idx);
        for dep in phases[idx]
            .start_after
            .iter()
            .chain(phases[idx].start_after_strict.iter())
        {
            let dep_idx = by_name[dep];
            visit(dep_idx, phases, by_name, marks, stack)?;
        }
        stack.remove(&idx);
        marks[idx] = Mark::Done;
        Ok(())
    }

    for idx in 0..phases.len() {
        let mut stack = HashSet::new();
        visit(idx, phases, by_name, &mut marks, &mut stack)?;
    }
    Ok(())
}

/// Raw wire shape for a phase's arrival spec, used by the YAML loader
/// (`volley-cli`) before it is resolved into an [`ArrivalSpec`]. Kept here,
/// not in the CLI crate, since the tag names are part of the benchmark
/// definition's external contract (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ArrivalSpecDto {
    AtOnce {
        users: u32,
    },
    Always {
        users: u32,
    },
    ConstantPerSec {
        #[serde(rename = "usersPerSec")]
        users_per_sec: f64,
        #[serde(rename = "maxSessionsEstimate")]
        max_sessions_estimate: u32,
    },
    RampPerSec {
        #[serde(rename = "initialUsersPerSec")]
        initial_users_per_sec: f64,
        #[serde(rename = "targetUsersPerSec")]
        target_users_per_sec: f64,
        #[serde(rename = "maxSessionsEstimate")]
        max_sessions_estimate: u32,
    },
    Sequentially {
        repeats: u32,
    },
}

impl From<ArrivalSpecDto> for ArrivalSpec {
    fn from(dto: ArrivalSpecDto) -> Self {
        match dto {
            ArrivalSpecDto::AtOnce { users } => ArrivalSpec::AtOnce { users },
            ArrivalSpecDto::Always { users } => ArrivalSpec::Always { users },
            ArrivalSpecDto::ConstantPerSec {
                users_per_sec,
                max_sessions_estimate,
            } => ArrivalSpec::ConstantPerSec {
                users_per_sec,
                max_sessions_estimate,
            },
            ArrivalSpecDto::RampPerSec {
                initial_users_per_sec,
                target_users_per_sec,
                max_sessions_estimate,
            } => ArrivalSpec::RampPerSec {
                initial_users_per_sec,
                target_users_per_sec,
                max_sessions_estimate,
            },
            ArrivalSpecDto::Sequentially { repeats } => ArrivalSpec::Sequentially { repeats },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::{SessionContext, StepAction};

    struct NoopStep;
    impl Step for NoopStep {
        fn name(&self) -> &str {
            "noop"
        }
        fn invoke(&self, _session: &mut dyn SessionContext) -> StepAction {
            StepAction::Advance
        }
    }

    fn phase(name: &str, start_after: Vec<&str>) -> PhaseDef {
        let scenario = Arc::new(Scenario {
            initial_sequences: vec![Sequence::new("main", vec![Arc::new(NoopStep)])],
            template_sequences: vec![],
            variables: vec![],
        });
        PhaseDef {
            name: name.to_string(),
            scenario,
            start_time: None,
            start_after: start_after.into_iter().map(String::from).collect(),
            start_after_strict: vec![],
            terminate_after_strict: vec![],
            duration: Duration::from_secs(1),
            max_duration: None,
            arrival: ArrivalSpec::AtOnce { users: 1 },
        }
    }

    #[test]
    fn build_accepts_valid_dag() {
        let b = Benchmark::build(
            "bm",
            vec![],
            vec![phase("a", vec![]), phase("b", vec!["a"])],
        )
        .expect("should build");
        assert_eq!(b.phases().len(), 2);
        assert!(b.phase("a").is_some());
    }

    #[test]
    fn build_rejects_duplicate_phase_names() {
        let err = Benchmark::build("bm", vec![], vec![phase("a", vec![]), phase("a", vec![])])
            .unwrap_err();
        assert_eq!(err, BenchmarkDefinitionError::DuplicatePhase("a".into()));
    }

    #[test]
    fn build_rejects_dangling_dependency() {
        let err = Benchmark::build("bm", vec![], vec![phase("a", vec!["ghost"])]).unwrap_err();
        assert_eq!(
            err,
            BenchmarkDefinitionError::UnknownDependency("a".into(), "ghost".into())
        );
    }

    #[test]
    fn build_rejects_an_unreachable_template_sequence() {
        struct SpawningStep;
        impl Step for SpawningStep {
            fn name(&self) -> &str {
                "spawning"
            }
            fn invoke(&self, _session: &mut dyn SessionContext) -> StepAction {
                StepAction::Advance
            }
            fn spawns(&self) -> &[&str] {
                &["other"]
            }
        }

        let scenario = Arc::new(Scenario {
            initial_sequences: vec![Sequence::new("main", vec![Arc::new(NoopStep)])],
            template_sequences: vec![Sequence::new("background", vec![Arc::new(NoopStep)])],
            variables: vec![],
        });
        let phase = PhaseDef {
            name: "only".to_string(),
            scenario,
            start_time: None,
            start_after: vec![],
            start_after_strict: vec![],
            terminate_after_strict: vec![],
            duration: Duration::from_secs(1),
            max_duration: None,
            arrival: ArrivalSpec::AtOnce { users: 1 },
        };
        let err = Benchmark::build("bm", vec![], vec![phase]).unwrap_err();
        assert_eq!(
            err,
            BenchmarkDefinitionError::UnreachableSequence("background".into())
        );

        // With a step that spawns it by name, the same scenario builds fine.
        let scenario = Arc::new(Scenario {
            initial_sequences: vec![Sequence::new("main", vec![Arc::new(SpawningStep)])],
            template_sequences: vec![Sequence::new("other", vec![Arc::new(NoopStep)])],
            variables: vec![],
        });
        let phase = PhaseDef {
            name: "only".to_string(),
            scenario,
            start_time: None,
            start_after: vec![],
            start_after_strict: vec![],
            terminate_after_strict: vec![],
            duration: Duration::from_secs(1),
            max_duration: None,
            arrival: ArrivalSpec::AtOnce { users: 1 },
        };
        assert!(Benchmark::build("bm", vec![], vec![phase]).is_ok());
    }

    #[test]
    fn build_rejects_cycle() {
        let err = Benchmark::build(
            "bm",
            vec![],
            vec![phase("a", vec!["b"]), phase("b", vec!["a"])],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            BenchmarkDefinitionError::DependencyCycle(_)
        ));
    }
}
