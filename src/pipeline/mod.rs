// Pipelines: the multi-step operations the CLI runs.

pub mod refresh;
pub mod track;
