use std::error::Error;
use std::fmt::{Display, Formatter};

use crate::models::TaskStage;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum LoadFailure {
    Open,
    MissingSymbol,
    NotATask,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum BindFailure {
    Serialize,
    Apply,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CoreErrorKind {
    Declaration,
    Synthesis,
    Compile,
    Load(LoadFailure),
    Bind(BindFailure),
    Execution,
    Cancelled,
    Internal,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CoreError {
    pub declaration: Option<usize>,
    pub package: Option<String>,
    pub symbol: Option<String>,
    pub stage: Option<TaskStage>,
    pub kind: CoreErrorKind,
    pub message: String,
}

impl CoreError {
    pub fn new(kind: CoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            declaration: None,
            package: None,
            symbol: None,
            stage: None,
            kind,
            message: message.into(),
        }
    }

    pub fn for_task(mut self, package: &str, symbol: &str) -> Self {
        self.package.get_or_insert_with(|| package.to_string());
        self.symbol.get_or_insert_with(|| symbol.to_string());
        self
    }

    /// Attributes the error to a declaration; context already present is kept.
    pub fn at(mut self, index: usize, stage: TaskStage) -> Self {
        self.declaration.get_or_insert(index);
        self.stage.get_or_insert(stage);
        self
    }
}

impl Display for CoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.kind)?;

        let mut context = Vec::new();
        if let Some(index) = self.declaration {
            context.push(format!("task #{index}"));
        }
        match (&self.package, &self.symbol) {
            (Some(package), Some(symbol)) => context.push(format!("{package}:{symbol}")),
            (Some(package), None) => context.push(package.clone()),
            (None, Some(symbol)) => context.push(symbol.clone()),
            (None, None) => {}
        }
        if let Some(stage) = self.stage {
            context.push(format!("while {}", stage.as_str()));
        }
        if !context.is_empty() {
            write!(f, " ({})", context.join(", "))?;
        }

        write!(f, ": {}", self.message)
    }
}

impl Error for CoreError {}
