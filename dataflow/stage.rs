use std::collections::HashSet;
use std::fmt;
use std::fmt::Write as FmtWrite;
use std::sync::Arc;

/// The kind of operation a stage performs on its upstream collections.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    Source,
    ParallelDo,
    Filter,
    Distinct,
    Count,
    Length,
    Aggregate,
    GroupByKey,
    CombineValues,
    Join,
}

impl Operation {
    pub fn describe(self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::ParallelDo => "parallel-do",
            Self::Filter => "filter",
            Self::Distinct => "distinct",
            Self::Count => "count",
            Self::Length => "length",
            Self::Aggregate => "aggregate",
            Self::GroupByKey => "group-by-key",
            Self::CombineValues => "combine-values",
            Self::Join => "inner-join",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// One node of the deferred dataflow graph.
///
/// A stage only records what will be computed and from which upstream stages.
/// The data itself lives in the collection that owns the stage and is produced
/// lazily on materialization.
#[derive(Debug)]
pub struct Stage {
    id: usize,
    operation: Operation,
    label: String,
    upstream: Vec<Arc<Stage>>,
}

impl Stage {
    pub(crate) fn new(
        id: usize,
        operation: Operation,
        label: &str,
        upstream: Vec<Arc<Stage>>,
    ) -> Self {
        Self {
            id,
            operation,
            label: label.to_string(),
            upstream,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn upstream(&self) -> &[Arc<Stage>] {
        &self.upstream
    }

    /// Renders this stage and everything it depends on as an indented tree.
    /// Stages reachable through more than one path are expanded once and
    /// referenced by id afterwards.
    pub fn render_lineage(&self) -> String {
        let mut out = String::new();
        let mut seen = HashSet::new();
        self.render_into(&mut out, 0, &mut seen);
        out
    }

    fn render_into(&self, out: &mut String, depth: usize, seen: &mut HashSet<usize>) {
        let indent = "  ".repeat(depth);
        if !seen.insert(self.id) {
            let _ = writeln!(out, "{indent}{self} (see above)");
            return;
        }
        let _ = writeln!(out, "{indent}{self}");
        for parent in &self.upstream {
            parent.render_into(out, depth + 1, seen);
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {} '{}'", self.id, self.operation, self.label)
    }
}
