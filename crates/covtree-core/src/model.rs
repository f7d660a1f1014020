//! Source positions, detail records and coverage counts

use facet::Facet;

/// A position in a source file (zero-based line and column)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Facet)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// A span of source text. Both ends are inclusive for containment checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Facet)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    /// Create a range, swapping the ends if they are given in reverse.
    pub fn new(start: Position, end: Position) -> Self {
        if end < start {
            Self {
                start: end,
                end: start,
            }
        } else {
            Self { start, end }
        }
    }

    /// Range covering whole lines, from the start of `start_line` to the start of `end_line`
    pub fn lines(start_line: u32, end_line: u32) -> Self {
        Self::new(Position::new(start_line, 0), Position::new(end_line, 0))
    }

    pub fn contains_position(&self, position: Position) -> bool {
        self.start <= position && position <= self.end
    }

    pub fn contains_range(&self, other: &Range) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// Where a detail record lives: either a span or a single point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Facet)]
#[repr(u8)]
pub enum Location {
    Range(Range),
    Position(Position),
}

impl Location {
    pub fn start(&self) -> Position {
        match self {
            Location::Range(range) => range.start,
            Location::Position(position) => *position,
        }
    }

    pub fn as_range(&self) -> Option<&Range> {
        match self {
            Location::Range(range) => Some(range),
            Location::Position(_) => None,
        }
    }
}

impl From<Range> for Location {
    fn from(range: Range) -> Self {
        Location::Range(range)
    }
}

impl From<Position> for Location {
    fn from(position: Position) -> Self {
        Location::Position(position)
    }
}

/// Covered/total pair for one kind of coverage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Facet)]
pub struct CoverageCount {
    pub covered: u32,
    pub total: u32,
}

impl CoverageCount {
    pub const fn new(covered: u32, total: u32) -> Self {
        Self { covered, total }
    }

    /// Record one item, covered when `count` is non-zero.
    pub fn record(&mut self, count: u64) {
        self.total += 1;
        if count > 0 {
            self.covered += 1;
        }
    }

    pub fn add(&mut self, other: &CoverageCount) {
        self.covered += other.covered;
        self.total += other.total;
    }
}

/// Combined coverage ratio (0.0 - 1.0) over the given counts.
///
/// Returns 1.0 when there is nothing to cover.
pub fn total_coverage_percent(
    statement: &CoverageCount,
    branch: Option<&CoverageCount>,
    declaration: Option<&CoverageCount>,
) -> f64 {
    let mut covered = statement.covered as u64;
    let mut total = statement.total as u64;
    for count in [branch, declaration].into_iter().flatten() {
        covered += count.covered as u64;
        total += count.total as u64;
    }

    if total == 0 {
        1.0
    } else {
        covered as f64 / total as f64
    }
}

/// A named declaration (function, method, ...) and how often it was entered
#[derive(Debug, Clone, PartialEq, Facet)]
pub struct DeclarationDetail {
    pub name: String,
    pub location: Location,
    pub count: u64,
}

/// A statement and how often it executed
#[derive(Debug, Clone, PartialEq, Facet)]
pub struct StatementDetail {
    pub location: Location,
    pub count: u64,
    #[facet(default)]
    pub branches: Vec<BranchDetail>,
}

/// One arm of a branching statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Facet)]
pub struct BranchDetail {
    pub count: u64,
}

/// Fine-grained coverage record for a single file
#[derive(Debug, Clone, PartialEq, Facet)]
#[repr(u8)]
pub enum DetailEntry {
    Declaration(DeclarationDetail),
    Statement(StatementDetail),
    Branch(BranchDetail),
}

impl DetailEntry {
    pub fn declaration(name: impl Into<String>, location: impl Into<Location>, count: u64) -> Self {
        DetailEntry::Declaration(DeclarationDetail {
            name: name.into(),
            location: location.into(),
            count,
        })
    }

    pub fn statement(location: impl Into<Location>, count: u64) -> Self {
        DetailEntry::Statement(StatementDetail {
            location: location.into(),
            count,
            branches: Vec::new(),
        })
    }

    pub fn statement_with_branches(
        location: impl Into<Location>,
        count: u64,
        branches: impl IntoIterator<Item = u64>,
    ) -> Self {
        DetailEntry::Statement(StatementDetail {
            location: location.into(),
            count,
            branches: branches
                .into_iter()
                .map(|count| BranchDetail { count })
                .collect(),
        })
    }

    /// Source location, if the record has one. Branches never do.
    pub fn location(&self) -> Option<Location> {
        match self {
            DetailEntry::Declaration(d) => Some(d.location),
            DetailEntry::Statement(s) => Some(s.location),
            DetailEntry::Branch(_) => None,
        }
    }

    pub fn count(&self) -> u64 {
        match self {
            DetailEntry::Declaration(d) => d.count,
            DetailEntry::Statement(s) => s.count,
            DetailEntry::Branch(b) => b.count,
        }
    }
}
