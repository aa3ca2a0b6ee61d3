//! Routing table
//!
//! Three indices over the active route set (by content hash, by CAN ID, by
//! topic), kept consistent under a single lock. A CAN ID and a topic are each
//! owned by at most one route.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;

use crate::error::{RoutingError, RoutingResult};
use crate::route::{Route, RouteHash};

/// Routes to install and routes to tear down after a set change
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteDelta {
    pub added: Vec<Route>,
    pub removed: Vec<Route>,
}

impl RouteDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug, Clone)]
struct Entry {
    id: u32,
    route: Route,
}

#[derive(Debug, Default)]
struct Index {
    by_hash: HashMap<RouteHash, Entry>,
    by_can_id: HashMap<u32, RouteHash>,
    by_topic: HashMap<String, RouteHash>,
}

impl Index {
    fn insert(&mut self, route: Route) -> RoutingResult<RouteHash> {
        let id = route.validate()?;
        let hash = route.hash();

        if self.by_hash.contains_key(&hash) {
            return Err(RoutingError::DuplicateRoute(hash));
        }
        if let Some(owner) = self.by_can_id.get(&id) {
            return Err(RoutingError::CanIdInUse {
                can_id: route.can_id,
                owner: owner.clone(),
            });
        }
        if let Some(owner) = self.by_topic.get(&route.topic) {
            return Err(RoutingError::TopicInUse {
                topic: route.topic,
                owner: owner.clone(),
            });
        }

        self.by_can_id.insert(id, hash.clone());
        self.by_topic.insert(route.topic.clone(), hash.clone());
        self.by_hash.insert(hash.clone(), Entry { id, route });
        Ok(hash)
    }

    fn remove(&mut self, hash: &RouteHash) -> RoutingResult<Route> {
        let entry = self
            .by_hash
            .remove(hash)
            .ok_or_else(|| RoutingError::NotFound(hash.to_string()))?;
        self.by_can_id.remove(&entry.id);
        self.by_topic.remove(&entry.route.topic);
        Ok(entry.route)
    }

    /// Build an index, collecting the routes that could not be inserted
    fn build(routes: Vec<Route>) -> (Self, Vec<RoutingError>) {
        let mut index = Self::default();
        let mut rejected = Vec::new();
        for route in routes {
            if let Err(e) = index.insert(route) {
                rejected.push(e);
            }
        }
        (index, rejected)
    }

    /// Routes sorted by CAN ID
    fn sorted(&self) -> Vec<Route> {
        let mut entries: Vec<&Entry> = self.by_hash.values().collect();
        entries.sort_by_key(|e| e.id);
        entries.into_iter().map(|e| e.route.clone()).collect()
    }
}

/// Thread-safe routing table shared by both listeners
#[derive(Debug, Default)]
pub struct RoutingTable {
    index: RwLock<Index>,
}

impl RoutingTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table from a route list, returning the rejected entries too
    pub fn with_routes(routes: Vec<Route>) -> (Self, Vec<RoutingError>) {
        let (index, rejected) = Index::build(routes);
        (
            Self {
                index: RwLock::new(index),
            },
            rejected,
        )
    }

    /// Insert a route
    ///
    /// Fails on an identical route, or when its CAN ID or topic is already
    /// owned by a different route.
    pub fn add_route(&self, route: Route) -> RoutingResult<RouteHash> {
        self.index.write().insert(route)
    }

    /// Insert several routes, collecting failures instead of stopping
    pub fn add_routes(&self, routes: Vec<Route>) -> Vec<RoutingError> {
        let mut index = self.index.write();
        routes
            .into_iter()
            .filter_map(|route| index.insert(route).err())
            .collect()
    }

    pub fn remove_route(&self, hash: &RouteHash) -> RoutingResult<Route> {
        self.index.write().remove(hash)
    }

    pub fn remove_route_by_can_id(&self, id: u32) -> RoutingResult<Route> {
        let mut index = self.index.write();
        let hash = index
            .by_can_id
            .get(&id)
            .cloned()
            .ok_or_else(|| RoutingError::NotFound(format!("CAN ID 0x{:X}", id)))?;
        index.remove(&hash)
    }

    pub fn remove_route_by_topic(&self, topic: &str) -> RoutingResult<Route> {
        let mut index = self.index.write();
        let hash = index
            .by_topic
            .get(topic)
            .cloned()
            .ok_or_else(|| RoutingError::NotFound(format!("topic {:?}", topic)))?;
        index.remove(&hash)
    }

    pub fn get(&self, hash: &RouteHash) -> RoutingResult<Route> {
        self.index
            .read()
            .by_hash
            .get(hash)
            .map(|e| e.route.clone())
            .ok_or_else(|| RoutingError::NotFound(hash.to_string()))
    }

    pub fn get_by_can_id(&self, id: u32) -> RoutingResult<Route> {
        let index = self.index.read();
        index
            .by_can_id
            .get(&id)
            .and_then(|hash| index.by_hash.get(hash))
            .map(|e| e.route.clone())
            .ok_or_else(|| RoutingError::NotFound(format!("CAN ID 0x{:X}", id)))
    }

    pub fn get_by_topic(&self, topic: &str) -> RoutingResult<Route> {
        let index = self.index.read();
        index
            .by_topic
            .get(topic)
            .and_then(|hash| index.by_hash.get(hash))
            .map(|e| e.route.clone())
            .ok_or_else(|| RoutingError::NotFound(format!("topic {:?}", topic)))
    }

    /// Replace the whole route set
    ///
    /// Indices are rebuilt from scratch. Routes that cannot be installed
    /// (duplicate, colliding, invalid ID) are left out and returned.
    pub fn update_routes(&self, routes: Vec<Route>) -> Vec<RoutingError> {
        let (index, rejected) = Index::build(routes);
        *self.index.write() = index;
        rejected
    }

    /// Diff a candidate set against the current content, by hash only
    ///
    /// `added` keeps the candidate order; `removed` is ordered by CAN ID.
    /// A changed field always shows up as remove old + add new.
    pub fn compare_routes(&self, routes: &[Route]) -> RouteDelta {
        let index = self.index.read();
        let mut seen = HashSet::new();

        let added = routes
            .iter()
            .filter(|route| {
                let hash = route.hash();
                !index.by_hash.contains_key(&hash) && seen.insert(hash)
            })
            .cloned()
            .collect();

        let wanted: HashSet<RouteHash> = routes.iter().map(Route::hash).collect();
        let removed = index
            .sorted()
            .into_iter()
            .filter(|route| !wanted.contains(&route.hash()))
            .collect();

        RouteDelta { added, removed }
    }

    /// Diff and replace in one step
    ///
    /// The delta is computed against what was actually installed, so routes
    /// rejected from the new set are neither reported as added nor left
    /// behind. Holds the write lock for the whole operation.
    pub fn replace_routes(&self, routes: Vec<Route>) -> (RouteDelta, Vec<RoutingError>) {
        let (next, rejected) = Index::build(routes);
        let mut index = self.index.write();

        let added = next
            .sorted()
            .into_iter()
            .filter(|route| !index.by_hash.contains_key(&route.hash()))
            .collect();
        let removed = index
            .sorted()
            .into_iter()
            .filter(|route| !next.by_hash.contains_key(&route.hash()))
            .collect();

        *index = next;
        (RouteDelta { added, removed }, rejected)
    }

    /// Snapshot of all routes ordered by CAN ID
    pub fn routes(&self) -> Vec<Route> {
        self.index.read().sorted()
    }

    pub fn len(&self) -> usize {
        self.index.read().by_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.read().by_hash.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::Direction;
    use pretty_assertions::assert_eq;

    fn table(routes: &[Route]) -> RoutingTable {
        let (table, rejected) = RoutingTable::with_routes(routes.to_vec());
        assert!(rejected.is_empty());
        table
    }

    /// No two routes share a CAN ID or a topic, and all indices agree
    fn assert_consistent(table: &RoutingTable) {
        let index = table.index.read();
        assert_eq!(index.by_can_id.len(), index.by_hash.len());
        assert_eq!(index.by_topic.len(), index.by_hash.len());
        for (hash, entry) in &index.by_hash {
            assert_eq!(index.by_can_id.get(&entry.id), Some(hash));
            assert_eq!(index.by_topic.get(&entry.route.topic), Some(hash));
        }
    }

    #[test]
    fn test_add_and_lookup() {
        let table = RoutingTable::new();
        let route = Route::new("100", "example/topic");
        let hash = table.add_route(route.clone()).unwrap();

        assert_eq!(table.get(&hash).unwrap(), route);
        assert_eq!(table.get_by_can_id(100).unwrap(), route);
        assert_eq!(table.get_by_topic("example/topic").unwrap(), route);
        assert!(table.get_by_can_id(101).is_err());
        assert!(table.get_by_topic("other").is_err());
        assert_consistent(&table);
    }

    #[test]
    fn test_add_duplicate() {
        let table = RoutingTable::new();
        table.add_route(Route::new("100", "t1")).unwrap();
        let err = table.add_route(Route::new("100", "t1")).unwrap_err();
        assert!(matches!(err, RoutingError::DuplicateRoute(_)));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_can_id_collision() {
        let table = RoutingTable::new();
        table.add_route(Route::new("100", "t1")).unwrap();
        let err = table.add_route(Route::new("100", "t2")).unwrap_err();
        assert!(matches!(err, RoutingError::CanIdInUse { .. }));
        assert_eq!(table.get_by_can_id(100).unwrap().topic, "t1");
        assert!(table.get_by_topic("t2").is_err());
        assert_consistent(&table);
    }

    #[test]
    fn test_can_id_collision_across_notation() {
        let table = RoutingTable::new();
        table.add_route(Route::new("256", "t1")).unwrap();
        let err = table.add_route(Route::new("0x100", "t2")).unwrap_err();
        assert!(matches!(err, RoutingError::CanIdInUse { .. }));
    }

    #[test]
    fn test_codec_change_is_a_collision() {
        let table = RoutingTable::new();
        table.add_route(Route::new("100", "t1")).unwrap();
        let err = table
            .add_route(Route::new("100", "t1").with_codec("uint82ascii"))
            .unwrap_err();
        assert!(matches!(err, RoutingError::CanIdInUse { .. }));
    }

    #[test]
    fn test_topic_collision() {
        let table = RoutingTable::new();
        table.add_route(Route::new("100", "t1")).unwrap();
        let err = table.add_route(Route::new("101", "t1")).unwrap_err();
        assert!(matches!(err, RoutingError::TopicInUse { .. }));
        assert_consistent(&table);
    }

    #[test]
    fn test_invalid_routes() {
        let table = RoutingTable::new();
        assert!(table.add_route(Route::new("abc", "t")).is_err());
        assert!(table.add_route(Route::new("100", "")).is_err());
        assert!(table.is_empty());
    }

    #[test]
    fn test_remove_route() {
        let table = table(&[Route::new("100", "t1"), Route::new("101", "t2")]);
        let hash = Route::new("100", "t1").hash();

        assert!(table.remove_route(&hash).is_ok());
        assert!(table.remove_route(&hash).is_err());
        // both secondary indices are cleared
        assert!(table.get_by_can_id(100).is_err());
        assert!(table.get_by_topic("t1").is_err());
        assert_consistent(&table);

        // the topic is free again
        table.add_route(Route::new("102", "t1")).unwrap();
    }

    #[test]
    fn test_remove_by_keys() {
        let table = table(&[Route::new("100", "t1"), Route::new("101", "t2")]);

        assert_eq!(table.remove_route_by_can_id(100).unwrap().topic, "t1");
        assert!(table.remove_route_by_can_id(100).is_err());
        assert_eq!(table.remove_route_by_topic("t2").unwrap().can_id, "101");
        assert!(table.remove_route_by_topic("t2").is_err());
        assert!(table.is_empty());
        assert_consistent(&table);
    }

    #[test]
    fn test_update_routes() {
        let table = table(&[Route::new("100", "t1")]);
        let rejected = table.update_routes(vec![
            Route::new("200", "a"),
            Route::new("201", "b"),
            Route::new("200", "c"),
        ]);
        assert_eq!(rejected.len(), 1);
        assert_eq!(table.len(), 2);
        assert!(table.get_by_can_id(100).is_err());
        assert_eq!(table.get_by_can_id(200).unwrap().topic, "a");
        assert_consistent(&table);
    }

    #[test]
    fn test_compare_routes() {
        let table = table(&[Route::new("100", "t100"), Route::new("101", "t101")]);
        let delta = table.compare_routes(&[Route::new("100", "t100"), Route::new("102", "t102")]);

        assert_eq!(delta.added, vec![Route::new("102", "t102")]);
        assert_eq!(delta.removed, vec![Route::new("101", "t101")]);
        // pure
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_compare_routes_field_change() {
        let table = table(&[Route::new("100", "t")]);
        let changed = Route::new("100", "t").with_direction(Direction::CanToMqtt);
        let delta = table.compare_routes(std::slice::from_ref(&changed));
        assert_eq!(delta.added, vec![changed]);
        assert_eq!(delta.removed, vec![Route::new("100", "t")]);
    }

    #[test]
    fn test_compare_routes_unchanged() {
        let routes = [Route::new("1", "a"), Route::new("2", "b")];
        let table = table(&routes);
        let mut reversed = routes.to_vec();
        reversed.reverse();
        assert!(table.compare_routes(&reversed).is_empty());
    }

    #[test]
    fn test_diff_applied_yields_target() {
        let current = vec![
            Route::new("1", "a"),
            Route::new("2", "b"),
            Route::new("3", "c").with_codec("uint82ascii"),
        ];
        let target = vec![
            Route::new("2", "b"),
            Route::new("3", "c"),
            Route::new("4", "d").with_direction(Direction::MqttToCan),
        ];
        let table = table(&current);
        let delta = table.compare_routes(&target);

        for route in &delta.removed {
            table.remove_route(&route.hash()).unwrap();
        }
        for route in delta.added {
            table.add_route(route).unwrap();
        }

        let got: HashSet<RouteHash> = table.routes().iter().map(Route::hash).collect();
        let want: HashSet<RouteHash> = target.iter().map(Route::hash).collect();
        assert_eq!(got, want);
        assert_consistent(&table);
    }

    #[test]
    fn test_replace_routes() {
        let table = table(&[Route::new("100", "t100"), Route::new("101", "t101")]);
        let (delta, rejected) = table.replace_routes(vec![
            Route::new("100", "t100"),
            Route::new("102", "t102"),
            Route::new("103", "t102"),
        ]);

        assert_eq!(rejected.len(), 1);
        assert_eq!(delta.added, vec![Route::new("102", "t102")]);
        assert_eq!(delta.removed, vec![Route::new("101", "t101")]);
        assert_eq!(table.len(), 2);
        assert_consistent(&table);
    }

    #[test]
    fn test_replace_with_swap() {
        // a route set that moves a topic from one ID to another
        let table = table(&[Route::new("1", "a"), Route::new("2", "b")]);
        let (delta, rejected) = table.replace_routes(vec![Route::new("1", "b"), Route::new("2", "a")]);
        assert!(rejected.is_empty());
        assert_eq!(delta.added.len(), 2);
        assert_eq!(delta.removed.len(), 2);
        assert_eq!(table.get_by_topic("a").unwrap().can_id, "2");
        assert_consistent(&table);
    }
}
