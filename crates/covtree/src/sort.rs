//! Sibling ordering for coverage rows

use facet::Facet;
use std::cmp::Ordering;

use crate::coverage::basename_or_authority;
use crate::elements::CoverageElement;
use crate::tree::TreeSorter;

/// User-selectable order of coverage rows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Facet)]
#[facet(rename_all = "lowercase")]
#[repr(u8)]
pub enum SortOrder {
    /// Highest coverage first
    Coverage,
    /// Files by URI, declarations by source position
    #[default]
    Location,
    /// Alphabetical
    Name,
}

impl SortOrder {
    pub const ALL: [SortOrder; 3] = [Self::Location, Self::Coverage, Self::Name];

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "coverage" => Some(Self::Coverage),
            "location" | "position" => Some(Self::Location),
            "name" => Some(Self::Name),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Coverage => "coverage",
            Self::Location => "location",
            Self::Name => "name",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Coverage => "Sort by Coverage",
            Self::Location => "Sort by Location",
            Self::Name => "Sort by Name",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Coverage => "Files and declarations are sorted by total coverage",
            Self::Location => "Files are sorted alphabetically, declarations are sorted by position",
            Self::Name => "Files and declarations are sorted alphabetically",
        }
    }
}

/// Compares rows of the same kind under a [`SortOrder`].
///
/// A file row and a declaration row always compare equal, as do sentinel rows.
#[derive(Debug, Clone, Copy)]
pub struct Sorter(pub SortOrder);

impl TreeSorter<CoverageElement> for Sorter {
    fn compare(&self, a: &CoverageElement, b: &CoverageElement) -> Ordering {
        match (a, b) {
            (CoverageElement::File(a), CoverageElement::File(b)) => {
                let (a, b) = (a.value(), b.value());
                match self.0 {
                    SortOrder::Location => a.uri.cmp(&b.uri),
                    SortOrder::Name => {
                        basename_or_authority(&a.uri).cmp(basename_or_authority(&b.uri))
                    }
                    SortOrder::Coverage => b.tpc().total_cmp(&a.tpc()),
                }
            }
            (CoverageElement::Declaration(a), CoverageElement::Declaration(b)) => {
                let (a, b) = (a.node(), b.node());
                match self.0 {
                    SortOrder::Location => a.location().start().cmp(&b.location().start()),
                    SortOrder::Name => a.label().cmp(b.label()),
                    SortOrder::Coverage => {
                        let by_tpc = match (a.tpc(), b.tpc()) {
                            (Some(ta), Some(tb)) => tb.total_cmp(&ta),
                            _ => Ordering::Equal,
                        };
                        by_tpc
                            .then_with(|| b.hits().cmp(&a.hits()))
                            .then_with(|| a.label().cmp(b.label()))
                    }
                }
            }
            _ => Ordering::Equal,
        }
    }
}
