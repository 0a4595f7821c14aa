//! The YAML benchmark-definition loader (§6: "out of scope except for the
//! contract it must yield"). Parses a workload file into the in-memory
//! `volley_common::Benchmark`, resolving each step's tag into one of the
//! demonstration steps in [`crate::steps`].
//!
//! This is deliberately the thinnest loader that can drive the core end to
//! end — the real system's YAML surface (weight-based rate splitting, agent
//! manifests, includes) is explicitly a parser-side concern the core never
//! sees (§6).

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use eyre::{Context, Result};
use serde::Deserialize;

use volley_common::{
    ArrivalSpecDto, Benchmark, PhaseDef, Scenario, Sequence, SequenceStep, VarType, VariableDecl,
    Value,
};

use crate::steps;

fn de_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
}

fn de_duration_opt<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    raw.map(|s| humantime::parse_duration(&s).map_err(serde::de::Error::custom))
        .transpose()
}

#[derive(Debug, Clone, Deserialize)]
struct BenchmarkFile {
    name: String,
    #[serde(default)]
    agents: Vec<String>,
    phases: Vec<PhaseFileDto>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PhaseFileDto {
    name: String,
    #[serde(default, deserialize_with = "de_duration_opt")]
    start_time: Option<Duration>,
    #[serde(default)]
    start_after: Vec<String>,
    #[serde(default)]
    start_after_strict: Vec<String>,
    #[serde(default)]
    terminate_after_strict: Vec<String>,
    #[serde(deserialize_with = "de_duration")]
    duration: Duration,
    #[serde(default, deserialize_with = "de_duration_opt")]
    max_duration: Option<Duration>,
    arrival: ArrivalSpecDto,
    #[serde(default)]
    variables: Vec<VariableDeclDto>,
    sequences: Vec<SequenceDto>,
    #[serde(default)]
    templates: Vec<SequenceDto>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VariableDeclDto {
    name: String,
    #[serde(rename = "type")]
    var_type: VarTypeDto,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
enum VarTypeDto {
    Int,
    Float,
    Str,
    Bool,
}

impl From<VarTypeDto> for VarType {
    fn from(dto: VarTypeDto) -> Self {
        match dto {
            VarTypeDto::Int => VarType::Int,
            VarTypeDto::Float => VarType::Float,
            VarTypeDto::Str => VarType::Str,
            VarTypeDto::Bool => VarType::Bool,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct SequenceDto {
    name: String,
    steps: Vec<StepDto>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum ValueDto {
    Int { value: i64 },
    Float { value: f64 },
    Str { value: String },
    Bool { value: bool },
}

impl From<ValueDto> for Value {
    fn from(dto: ValueDto) -> Self {
        match dto {
            ValueDto::Int { value } => Value::Int(value),
            ValueDto::Float { value } => Value::Float(value),
            ValueDto::Str { value } => Value::Str(value),
            ValueDto::Bool { value } => Value::Bool(value),
        }
    }
}

/// The tag names a step in the demonstration library is selected by. None of
/// these are part of the core's own contract (§6) — they're
/// `volley-cli`-local, the way a real deployment's step library would define
/// its own much larger tag set.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum StepDto {
    Log {
        message: String,
    },
    SetVar {
        var: String,
        value: ValueDto,
    },
    IncrCounter {
        key: String,
        #[serde(default = "default_delta")]
        delta: i64,
    },
    AwaitCounter {
        key: String,
        equals: i64,
    },
    Delay {
        #[serde(deserialize_with = "de_duration")]
        duration: Duration,
    },
    Fail {
        message: String,
    },
    Terminate,
    Spawn {
        template: String,
    },
}

fn default_delta() -> i64 {
    1
}

/// Leak a runtime-constructed name to `'static` so demonstration steps can
/// hold it as a plain `&'static str` for `Step::variables()` without a
/// self-referential struct. The step library is built once at CLI startup
/// and lives for the whole process, so the one-time leak is harmless.
fn intern(s: String) -> &'static str {
    Box::leak(s.into_boxed_str())
}

/// Parse and validate `path` into a `Benchmark` ready for `PhaseScheduler`.
pub fn load_benchmark(path: &Path) -> Result<Benchmark> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading benchmark definition at {}", path.display()))?;
    let file: BenchmarkFile = serde_yaml::from_str(&raw)
        .with_context(|| format!("parsing benchmark definition at {}", path.display()))?;

    let mut delay_counter = 0usize;
    let phases = file
        .phases
        .into_iter()
        .map(|dto| phase_from_dto(dto, &mut delay_counter))
        .collect::<Result<Vec<_>>>()?;

    Ok(Benchmark::build(file.name, file.agents, phases)?)
}

fn phase_from_dto(dto: PhaseFileDto, delay_counter: &mut usize) -> Result<PhaseDef> {
    let mut variables: Vec<VariableDecl> = dto
        .variables
        .into_iter()
        .map(|v| VariableDecl {
            name: v.name,
            var_type: v.var_type.into(),
        })
        .collect();

    let initial_sequences = dto
        .sequences
        .into_iter()
        .map(|s| sequence_from_dto(s, delay_counter, &mut variables))
        .collect::<Result<Vec<_>>>()?;
    let template_sequences = dto
        .templates
        .into_iter()
        .map(|s| sequence_from_dto(s, delay_counter, &mut variables))
        .collect::<Result<Vec<_>>>()?;

    let scenario = Arc::new(Scenario {
        initial_sequences,
        template_sequences,
        variables,
    });

    Ok(PhaseDef {
        name: dto.name,
        scenario,
        start_time: dto.start_time,
        start_after: dto.start_after,
        start_after_strict: dto.start_after_strict,
        terminate_after_strict: dto.terminate_after_strict,
        duration: dto.duration,
        max_duration: dto.max_duration,
        arrival: dto.arrival.into(),
    })
}

fn sequence_from_dto(
    dto: SequenceDto,
    delay_counter: &mut usize,
    variables: &mut Vec<VariableDecl>,
) -> Result<Sequence> {
    let steps = dto
        .steps
        .into_iter()
        .map(|s| step_from_dto(s, delay_counter, variables))
        .collect::<Result<Vec<_>>>()?;
    Ok(Sequence::new(dto.name, steps))
}

fn step_from_dto(
    dto: StepDto,
    delay_counter: &mut usize,
    variables: &mut Vec<VariableDecl>,
) -> Result<SequenceStep> {
    let step: SequenceStep = match dto {
        StepDto::Log { message } => Arc::new(steps::LogStep { message }),
        StepDto::SetVar { var, value } => Arc::new(steps::SetVarStep {
            var: intern(var),
            value: value.into(),
        }),
        StepDto::IncrCounter { key, delta } => Arc::new(steps::IncrCounterStep { key, delta }),
        StepDto::AwaitCounter { key, equals } => {
            Arc::new(steps::AwaitCounterStep { key, equals })
        }
        StepDto::Delay { duration } => {
            let armed_var = intern(format!("__delay_armed_{delay_counter}"));
            *delay_counter += 1;
            variables.push(VariableDecl {
                name: armed_var.to_string(),
                var_type: VarType::Int,
            });
            Arc::new(steps::DelayStep {
                duration,
                armed_var,
            })
        }
        StepDto::Fail { message } => Arc::new(steps::FailStep { message }),
        StepDto::Terminate => Arc::new(steps::TerminateStep),
        StepDto::Spawn { template } => Arc::new(steps::SpawnStep {
            template: intern(template),
        }),
    };
    Ok(step)
}
