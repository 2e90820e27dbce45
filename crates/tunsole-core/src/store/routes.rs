// ── Route table ──
//
// Ordered, cidr-keyed collection. Each entry carries its own source tag so
// optimistic rows stay distinguishable from confirmed ones.

use indexmap::IndexMap;
use serde::{Serialize, Serializer};

use super::Source;
use crate::model::Route;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteEntry {
    #[serde(flatten)]
    pub route: Route,
    pub source: Source,
}

/// One write against the route table: either a full replacement after a
/// fetch or a single-entry delta after a mutation, never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteWrite {
    /// Replace every entry.
    Replace(Vec<Route>),
    /// Insert, or overwrite in place when the cidr already exists.
    Upsert(Route),
    /// Remove by cidr.
    Remove(String),
    /// Remove by cidr, recording the observation even when the cidr is
    /// already absent so older fetches cannot bring it back.
    Retire(String),
    /// Put an exact prior entry back at its prior position.
    Restore { entry: RouteEntry, index: usize },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteTable {
    entries: IndexMap<String, RouteEntry>,
}

impl RouteTable {
    pub fn from_routes(routes: impl IntoIterator<Item = Route>, source: Source) -> Self {
        let entries = routes
            .into_iter()
            .map(|route| (route.cidr.clone(), RouteEntry { route, source }))
            .collect();
        Self { entries }
    }

    pub fn get(&self, cidr: &str) -> Option<&RouteEntry> {
        self.entries.get(cidr)
    }

    /// Position and entry for `cidr`.
    pub fn find(&self, cidr: &str) -> Option<(usize, &RouteEntry)> {
        self.entries.get_full(cidr).map(|(index, _, entry)| (index, entry))
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouteEntry> {
        self.entries.values()
    }

    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.entries.values().map(|e| &e.route)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Apply `write`, returning the new table or `None` when nothing changes.
    pub(crate) fn apply(mut self, write: RouteWrite, source: Source) -> Option<Self> {
        match write {
            RouteWrite::Replace(routes) => Some(Self::from_routes(routes, source)),
            RouteWrite::Upsert(route) => {
                self.entries
                    .insert(route.cidr.clone(), RouteEntry { route, source });
                Some(self)
            }
            RouteWrite::Remove(cidr) => {
                self.entries.shift_remove(&cidr)?;
                Some(self)
            }
            RouteWrite::Retire(cidr) => {
                self.entries.shift_remove(&cidr);
                Some(self)
            }
            RouteWrite::Restore { entry, index } => {
                let cidr = entry.route.cidr.clone();
                self.entries.shift_remove(&cidr);
                let index = index.min(self.entries.len());
                self.entries.shift_insert(index, cidr, entry);
                Some(self)
            }
        }
    }
}

impl Serialize for RouteTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.entries.values())
    }
}

impl<'a> IntoIterator for &'a RouteTable {
    type Item = &'a RouteEntry;
    type IntoIter = indexmap::map::Values<'a, String, RouteEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.values()
    }
}
