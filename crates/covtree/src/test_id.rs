//! Test identities
//!
//! A test is identified by the path of ids from its root (controller) down to
//! itself. The string form joins the segments with `\0`.

use std::fmt::{Display, Formatter};

const SEPARATOR: char = '\0';

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TestId(Vec<String>);

impl TestId {
    pub fn new(path: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self(path.into_iter().map(Into::into).collect())
    }

    /// Parse the `\0`-joined string form.
    pub fn from_string(s: &str) -> Self {
        Self(s.split(SEPARATOR).map(str::to_string).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Ids of this test's ancestors and itself, root first.
    pub fn ids_from_root(&self) -> impl Iterator<Item = TestId> + '_ {
        (1..=self.0.len()).map(|n| TestId(self.0[..n].to_vec()))
    }

    /// Number of leading segments shared by every id in `ids`.
    ///
    /// A lone id shares all but its last segment with itself, so single-test
    /// labels still show the test's own name.
    pub fn common_prefix_len(ids: &[TestId]) -> usize {
        let Some((first, rest)) = ids.split_first() else {
            return 0;
        };
        if rest.is_empty() {
            return first.len().saturating_sub(1);
        }

        let mut len = first.len();
        for id in rest {
            len = len.min(
                first
                    .0
                    .iter()
                    .zip(&id.0)
                    .take_while(|(a, b)| a == b)
                    .count(),
            );
        }
        // Never swallow a whole id.
        let shortest = ids.iter().map(TestId::len).min().unwrap_or(0);
        len.min(shortest.saturating_sub(1))
    }
}

impl Display for TestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "{SEPARATOR}")?;
            }
            f.write_str(segment)?;
        }
        Ok(())
    }
}

/// A test known to the run that produced the coverage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestItem {
    pub id: TestId,
    pub label: String,
}

impl TestItem {
    pub fn new(id: TestId, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
        }
    }
}
