//! Student selectors.
//!
//! A selector is either a keyword (`all`, `active`, `inactive`) or an exact
//! student identity. An identity nobody knows is not an error: it resolves
//! to itself and yields a zero-VM result, which is how a brand-new student
//! gets a first VM.

use std::collections::BTreeSet;
use std::str::FromStr;

use labfleet_id::{IdError, StudentId};

use crate::index::FleetIndex;
use crate::roster::{Activity, Roster};

/// Which students a command applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// Every indexed student: known from discovery or owning a VM.
    All,
    /// Known students tagged active.
    Active,
    /// Known students tagged inactive.
    Inactive,
    /// Exactly one student.
    Student(StudentId),
}

impl FromStr for Selector {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Self::All),
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            other => StudentId::parse(other).map(Self::Student),
        }
    }
}

impl Selector {
    /// Parse a keyword or student identity. Keywords are lower case only.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        s.parse()
    }

    /// Resolve to a sorted, duplicate-free list of students.
    pub fn resolve(&self, roster: &Roster, index: &FleetIndex) -> Vec<StudentId> {
        let selected: BTreeSet<StudentId> = match self {
            Self::All => index.students().cloned().collect(),
            Self::Active => by_activity(roster, Activity::Active),
            Self::Inactive => by_activity(roster, Activity::Inactive),
            Self::Student(id) => BTreeSet::from([id.clone()]),
        };
        selected.into_iter().collect()
    }
}

fn by_activity(roster: &Roster, activity: Activity) -> BTreeSet<StudentId> {
    roster
        .students()
        .filter(|s| s.activity == activity)
        .map(|s| s.id.clone())
        .collect()
}
