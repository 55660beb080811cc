/// Module registry for pipeline files.
///
/// Defines every module name a pipeline step may declare, with the kind of
/// step it builds. This is the single source of truth for module names:
/// the configuration loader resolves names here rather than matching
/// strings of its own.

// ---------------------------------------------------------------------------
// Module metadata
// ---------------------------------------------------------------------------

/// What a step does to the run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// Reads a source and merges it into the accumulator table.
    Read,
    /// Replaces the accumulator table with a filtered copy.
    Filter,
    /// Emits series sets; the table is left unchanged.
    Aggregate,
    /// Emits scatter sets; the table is left unchanged.
    Correlate,
    /// Emits a table summary; the table is left unchanged.
    Inspect,
}

/// Handler a module name resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleId {
    Tabular,
    Electricity,
    Gas,
    LineProtocol,
    Filter,
    Inspect,
    Daily,
    Hourly,
    Weekly,
    Correlation,
}

pub struct Module {
    /// Name used in pipeline files (`module = "..."` or the table name).
    pub name: &'static str,
    pub id: ModuleId,
    pub kind: StepKind,
    pub description: &'static str,
}

/// All modules, readers first.
pub static MODULE_REGISTRY: &[Module] = &[
    Module {
        name: "csv",
        id: ModuleId::Tabular,
        kind: StepKind::Read,
        description: "Delimited file with a timestamp column.",
    },
    Module {
        name: "electricity",
        id: ModuleId::Electricity,
        kind: StepKind::Read,
        description: "Half-hourly power export, converted to kWh.",
    },
    Module {
        name: "gas",
        id: ModuleId::Gas,
        kind: StepKind::Read,
        description: "Daily gas consumption export, readings at noon.",
    },
    Module {
        name: "line_protocol",
        id: ModuleId::LineProtocol,
        kind: StepKind::Read,
        description: "Measurement line-protocol dump, averaged per minute.",
    },
    Module {
        name: "filter",
        id: ModuleId::Filter,
        kind: StepKind::Filter,
        description: "Deduplicate, resample, bound by date and query rows.",
    },
    Module {
        name: "inspect",
        id: ModuleId::Inspect,
        kind: StepKind::Inspect,
        description: "Summarize the table, optionally dump it to CSV.",
    },
    Module {
        name: "daily",
        id: ModuleId::Daily,
        kind: StepKind::Aggregate,
        description: "Daily overlay over the year, one curve per year.",
    },
    Module {
        name: "hourly",
        id: ModuleId::Hourly,
        kind: StepKind::Aggregate,
        description: "Profile over the day per grouping condition.",
    },
    Module {
        name: "weekly",
        id: ModuleId::Weekly,
        kind: StepKind::Aggregate,
        description: "Profile over the week per grouping condition.",
    },
    Module {
        name: "correlation",
        id: ModuleId::Correlation,
        kind: StepKind::Correlate,
        description: "Scatter of variable pairs aligned on the sparser series.",
    },
];

/// Exact-name lookup.
pub fn find_module(name: &str) -> Option<&'static Module> {
    MODULE_REGISTRY.iter().find(|m| m.name == name)
}

pub fn module_names() -> Vec<&'static str> {
    MODULE_REGISTRY.iter().map(|m| m.name).collect()
}
