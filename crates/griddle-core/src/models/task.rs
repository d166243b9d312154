use std::time::Duration;

/// Where a single declaration is in the pipeline.
///
/// Stages only move forward: `Unbuilt → Building → Built → Bound → Executing → Done`.
/// `Failed` is reachable from every non-terminal stage and ends the whole run.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum TaskStage {
    Unbuilt,
    Building,
    Built,
    Bound,
    Executing,
    Done,
    Failed,
}

impl TaskStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unbuilt => "unbuilt",
            Self::Building => "building",
            Self::Built => "built",
            Self::Bound => "bound",
            Self::Executing => "executing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    pub fn next(self) -> Option<Self> {
        match self {
            Self::Unbuilt => Some(Self::Building),
            Self::Building => Some(Self::Built),
            Self::Built => Some(Self::Bound),
            Self::Bound => Some(Self::Executing),
            Self::Executing => Some(Self::Done),
            Self::Done | Self::Failed => None,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CompletedTask {
    pub index: usize,
    pub package: String,
    pub symbol: String,
    pub elapsed: Duration,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RunReport {
    pub completed: Vec<CompletedTask>,
}
