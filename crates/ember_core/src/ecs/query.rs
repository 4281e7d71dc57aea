//! # Query Engine
//!
//! Computes the set of entities satisfying a boolean combination of
//! "has component type" predicates by intersecting sparse-set
//! membership.
//!
//! Execution is lazy (an iterator over the candidate dense array) and
//! restartable - re-running a built query re-evaluates against current
//! data; results are never live views.
//!
//! ## Caching
//!
//! A cached result is only safe to reuse while the populations it
//! touched are unchanged. Every sparse set carries a generation counter
//! bumped on membership change; a cache entry captures the generation of
//! every type the query mentions and is invalidated the moment any
//! captured stamp goes stale.

use std::collections::{HashMap, HashSet};

use super::component::ComponentTypeId;
use super::entity::EntityId;
use super::store::ComponentStore;

/// A boolean component-membership query.
///
/// Matching entities hold every type in `all`, at least one type in
/// `any` (when non-empty), and no type in `none`. Type lists are
/// normalized at build time so structurally equal queries hash equally.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Query {
    all: Vec<ComponentTypeId>,
    any: Vec<ComponentTypeId>,
    none: Vec<ComponentTypeId>,
    ordered: bool,
}

impl Query {
    /// Creates an empty query (matches nothing until a positive
    /// predicate is added).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires every listed type.
    #[must_use]
    pub fn with_all(mut self, types: &[ComponentTypeId]) -> Self {
        self.all.extend_from_slice(types);
        self.all.sort_unstable();
        self.all.dedup();
        self
    }

    /// Requires at least one of the listed types.
    #[must_use]
    pub fn with_any(mut self, types: &[ComponentTypeId]) -> Self {
        self.any.extend_from_slice(types);
        self.any.sort_unstable();
        self.any.dedup();
        self
    }

    /// Excludes entities holding any listed type.
    #[must_use]
    pub fn with_none(mut self, types: &[ComponentTypeId]) -> Self {
        self.none.extend_from_slice(types);
        self.none.sort_unstable();
        self.none.dedup();
        self
    }

    /// Orders collected results by entity index (deterministic
    /// iteration independent of insertion history). Applies to
    /// [`QueryEngine::execute_cached`]; lazy execution yields dense
    /// order.
    #[must_use]
    pub fn ordered(mut self) -> Self {
        self.ordered = true;
        self
    }

    /// True when the query has no positive predicate and can match
    /// nothing.
    #[must_use]
    pub fn is_vacuous(&self) -> bool {
        self.all.is_empty() && self.any.is_empty()
    }

    /// Evaluates the predicates against one entity.
    #[must_use]
    pub fn matches(&self, store: &ComponentStore, entity: EntityId) -> bool {
        self.all.iter().all(|&t| store.has(entity, t))
            && (self.any.is_empty() || self.any.iter().any(|&t| store.has(entity, t)))
            && !self.none.iter().any(|&t| store.has(entity, t))
    }

    /// Every type the query mentions (for cache stamping).
    fn touched_types(&self) -> impl Iterator<Item = ComponentTypeId> + '_ {
        self.all
            .iter()
            .chain(self.any.iter())
            .chain(self.none.iter())
            .copied()
    }
}

/// Lazy, restartable query execution.
///
/// Iterates candidate owners from the driving sparse set(s), filtering
/// each against the remaining predicates on demand.
pub struct QueryIter<'s, 'q> {
    store: &'s ComponentStore,
    query: &'q Query,
    slices: Vec<&'s [EntityId]>,
    slice_idx: usize,
    pos: usize,
    /// Dedup across slices; only populated in union (any-driven) mode.
    seen: Option<HashSet<EntityId>>,
}

impl Iterator for QueryIter<'_, '_> {
    type Item = EntityId;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let slice = self.slices.get(self.slice_idx)?;
            let Some(&candidate) = slice.get(self.pos) else {
                self.slice_idx += 1;
                self.pos = 0;
                continue;
            };
            self.pos += 1;

            if let Some(seen) = &mut self.seen {
                if !seen.insert(candidate) {
                    continue;
                }
            }
            if self.query.matches(self.store, candidate) {
                return Some(candidate);
            }
        }
    }
}

/// A cached query result with its staleness stamps.
#[derive(Debug)]
struct CacheEntry {
    result: Vec<EntityId>,
    stamps: Vec<(ComponentTypeId, u64)>,
}

/// Builds, executes and caches component-membership queries.
#[derive(Debug, Default)]
pub struct QueryEngine {
    cache: HashMap<Query, CacheEntry>,
    hits: u64,
    misses: u64,
}

impl QueryEngine {
    /// Creates an engine with an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Executes a query lazily against current data.
    ///
    /// With `all` predicates, the type with the smallest population
    /// drives the candidate set; `any`-only queries walk the union of
    /// the listed sets. A query with no positive predicate yields
    /// nothing.
    #[must_use]
    pub fn execute<'s, 'q>(
        &self,
        store: &'s ComponentStore,
        query: &'q Query,
    ) -> QueryIter<'s, 'q> {
        let (slices, seen) = if let Some(&driver) = query
            .all
            .iter()
            .min_by_key(|&&t| store.population(t))
        {
            (vec![store.owners_of(driver)], None)
        } else if query.any.is_empty() {
            (Vec::new(), None)
        } else {
            let slices = query.any.iter().map(|&t| store.owners_of(t)).collect();
            (slices, Some(HashSet::new()))
        };

        QueryIter {
            store,
            query,
            slices,
            slice_idx: 0,
            pos: 0,
            seen,
        }
    }

    /// Counts matching entities without materializing the result.
    #[must_use]
    pub fn count(&self, store: &ComponentStore, query: &Query) -> usize {
        self.execute(store, query).count()
    }

    /// Executes through the cache.
    ///
    /// A cached entry is reused only while every generation stamp it
    /// captured is still current; otherwise it is recomputed and
    /// restamped.
    pub fn execute_cached(&mut self, store: &ComponentStore, query: &Query) -> Vec<EntityId> {
        if let Some(entry) = self.cache.get(query) {
            let fresh = entry
                .stamps
                .iter()
                .all(|&(t, stamp)| store.generation(t) == stamp);
            if fresh {
                self.hits += 1;
                return entry.result.clone();
            }
        }

        self.misses += 1;
        let mut result: Vec<EntityId> = self.execute(store, query).collect();
        if query.ordered {
            result.sort_by_key(|id| id.index());
        }

        let stamps = query
            .touched_types()
            .map(|t| (t, store.generation(t)))
            .collect();
        self.cache.insert(
            query.clone(),
            CacheEntry {
                result: result.clone(),
                stamps,
            },
        );
        result
    }

    /// Cache hits since construction.
    #[must_use]
    pub const fn cache_hits(&self) -> u64 {
        self.hits
    }

    /// Cache misses since construction.
    #[must_use]
    pub const fn cache_misses(&self) -> u64 {
        self.misses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::component::{
        ComponentKind, ComponentValue, RigidBody, Sprite, Transform,
    };

    const POSITION: ComponentTypeId = ComponentTypeId(0);
    const BODY: ComponentTypeId = ComponentTypeId(1);
    const SPRITE: ComponentTypeId = ComponentTypeId(2);

    fn store() -> ComponentStore {
        let mut s = ComponentStore::new();
        s.register(POSITION, ComponentKind::Transform, 16).unwrap();
        s.register(BODY, ComponentKind::RigidBody, 16).unwrap();
        s.register(SPRITE, ComponentKind::Sprite, 16).unwrap();
        s
    }

    fn populate(s: &mut ComponentStore) -> (EntityId, EntityId, EntityId) {
        let a = EntityId::new(0, 0);
        let b = EntityId::new(1, 0);
        let c = EntityId::new(2, 0);
        s.add(a, POSITION, ComponentValue::Transform(Transform::default()))
            .unwrap();
        s.add(b, POSITION, ComponentValue::Transform(Transform::default()))
            .unwrap();
        s.add(b, BODY, ComponentValue::RigidBody(RigidBody::default()))
            .unwrap();
        s.add(c, SPRITE, ComponentValue::Sprite(Sprite::default()))
            .unwrap();
        (a, b, c)
    }

    #[test]
    fn test_all_intersection() {
        let mut s = store();
        let (_, b, _) = populate(&mut s);
        let engine = QueryEngine::new();

        let q = Query::new().with_all(&[POSITION, BODY]);
        let result: Vec<_> = engine.execute(&s, &q).collect();
        assert_eq!(result, vec![b]);
    }

    #[test]
    fn test_any_union_dedups() {
        let mut s = store();
        let (a, b, c) = populate(&mut s);
        let engine = QueryEngine::new();

        let q = Query::new().with_any(&[POSITION, BODY, SPRITE]);
        let mut result: Vec<_> = engine.execute(&s, &q).collect();
        result.sort_by_key(|id| id.index());
        assert_eq!(result, vec![a, b, c]);
    }

    #[test]
    fn test_none_exclusion() {
        let mut s = store();
        let (a, _, _) = populate(&mut s);
        let engine = QueryEngine::new();

        let q = Query::new().with_all(&[POSITION]).with_none(&[BODY]);
        let result: Vec<_> = engine.execute(&s, &q).collect();
        assert_eq!(result, vec![a]);
    }

    #[test]
    fn test_vacuous_query_matches_nothing() {
        let mut s = store();
        populate(&mut s);
        let engine = QueryEngine::new();

        let q = Query::new().with_none(&[BODY]);
        assert!(q.is_vacuous());
        assert_eq!(engine.count(&s, &q), 0);
    }

    #[test]
    fn test_restartable() {
        let mut s = store();
        populate(&mut s);
        let engine = QueryEngine::new();

        let q = Query::new().with_all(&[POSITION]);
        assert_eq!(engine.count(&s, &q), 2);
        // Same built query, fresh evaluation.
        assert_eq!(engine.count(&s, &q), 2);
    }

    #[test]
    fn test_cache_hit_then_invalidation() {
        let mut s = store();
        let (a, b, _) = populate(&mut s);
        let mut engine = QueryEngine::new();

        let q = Query::new().with_all(&[POSITION]).ordered();
        let r1 = engine.execute_cached(&s, &q);
        assert_eq!(r1, vec![a, b]);
        assert_eq!(engine.cache_misses(), 1);

        // Untouched population: served from cache.
        let r2 = engine.execute_cached(&s, &q);
        assert_eq!(r2, r1);
        assert_eq!(engine.cache_hits(), 1);

        // Membership change invalidates the captured stamp.
        let d = EntityId::new(7, 0);
        s.add(d, POSITION, ComponentValue::Transform(Transform::default()))
            .unwrap();
        let r3 = engine.execute_cached(&s, &q);
        assert_eq!(r3, vec![a, b, d]);
        assert_eq!(engine.cache_misses(), 2);
    }

    #[test]
    fn test_cache_invalidated_by_none_type_change() {
        let mut s = store();
        let (a, b, _) = populate(&mut s);
        let mut engine = QueryEngine::new();

        let q = Query::new().with_all(&[POSITION]).with_none(&[BODY]).ordered();
        assert_eq!(engine.execute_cached(&s, &q), vec![a]);

        // b loses its body: the `none` stamp goes stale.
        s.remove(b, BODY).unwrap();
        assert_eq!(engine.execute_cached(&s, &q), vec![a, b]);
    }
}
