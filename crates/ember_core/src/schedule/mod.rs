//! # System Scheduler
//!
//! Holds the ordered list of update units and drives the per-tick
//! update and render passes.
//!
//! ## Ordering
//!
//! Execution order is a stable topological sort over declared
//! "runs after" dependencies, ties broken by declared priority (higher
//! first), then by registration order. The same registration sequence
//! always resolves to the same order - reproducible tests depend on it.
//!
//! ## Failure isolation
//!
//! A unit whose update returns an error is recorded as failed for that
//! tick (failure counter incremented, alert raised) but the remaining
//! units still run. One misbehaving extension system cannot stall the
//! frame.
//!
//! ```text
//! Tick N:
//! ┌──────────────────────────────────────────────┐
//! │ 1. resolve order (cached until graph change) │
//! │ 2. UPDATE pass - every unit, in order        │
//! │ 3. RENDER pass - observes completed updates  │
//! └──────────────────────────────────────────────┘
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ember_metrics::{AlertLevel, MetricsHub};

use crate::ecs::component::ComponentTypeId;
use crate::ecs::entity::EntityId;
use crate::ecs::query::Query;
use crate::ecs::world::World;
use crate::error::{CoreError, CoreResult};

/// Opaque drawable handle passed into the render pass.
///
/// The core never interprets the surface; render units downcast to the
/// concrete backend type they were written for.
pub trait RenderSurface {
    /// Downcast hook for concrete render backends.
    fn as_any(&mut self) -> &mut dyn Any;
}

/// Per-invocation context handed to a unit's update entry point.
#[derive(Debug)]
pub struct UnitRun {
    /// Seconds since the previous tick.
    pub delta_time: f64,
    /// Monotonic tick number.
    pub tick: u64,
    /// Entities matching the unit's required component types, resolved
    /// through the query engine before the unit runs.
    pub entities: Vec<EntityId>,
}

/// A scheduled piece of per-tick logic.
///
/// Units declare what they need (required component types) and a single
/// update entry point; the scheduler decides when they run. The render
/// hook is optional - pure-logic units keep the default no-op.
pub trait UpdateUnit: Send {
    /// Stable identifier, unique within a scheduler.
    fn id(&self) -> &str;

    /// Declared priority; higher runs earlier among order ties.
    fn priority(&self) -> i32 {
        0
    }

    /// Human-readable behavior summary (screened at sandbox admission).
    fn description(&self) -> &str {
        ""
    }

    /// Component types this unit operates on.
    fn required_components(&self) -> Vec<ComponentTypeId>;

    /// Per-tick update entry point.
    fn update(&mut self, world: &mut World, run: &UnitRun) -> CoreResult<()>;

    /// Per-frame render entry point. Runs after every update completed.
    fn render(&mut self, _world: &World, _surface: &mut dyn RenderSurface) -> CoreResult<()> {
        Ok(())
    }
}

/// Timing and failure report for one tick.
#[derive(Clone, Debug)]
pub struct TickStats {
    /// Tick number this report describes.
    pub tick: u64,
    /// Wall-clock duration of the whole update pass.
    pub duration: Duration,
    /// Per-unit wall-clock durations, in execution order.
    pub unit_timings: Vec<(String, Duration)>,
    /// Units that returned an error this tick.
    pub failures: u32,
}

/// A registered unit with its scheduling metadata.
struct UnitEntry {
    unit: Box<dyn UpdateUnit>,
    /// Registration sequence number - the final ordering tie-break.
    seq: u64,
    /// Identifiers of units this one runs after.
    after: Vec<String>,
}

/// Deterministic multi-unit scheduler over the ECS world.
pub struct SystemScheduler {
    units: Vec<UnitEntry>,
    next_seq: u64,
    /// Resolved execution order (indices into `units`); recomputed
    /// lazily after any graph change.
    order: Option<Vec<usize>>,
    tick: u64,
    metrics: Arc<MetricsHub>,
}

impl SystemScheduler {
    /// Creates a scheduler reporting into the given metrics hub.
    #[must_use]
    pub fn new(metrics: Arc<MetricsHub>) -> Self {
        Self {
            units: Vec::new(),
            next_seq: 0,
            order: None,
            tick: 0,
            metrics,
        }
    }

    /// Number of registered units.
    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// True if no units are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// True if a unit with this identifier is registered.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.units.iter().any(|e| e.unit.id() == id)
    }

    /// Registered unit identifiers, in registration order.
    #[must_use]
    pub fn unit_ids(&self) -> Vec<String> {
        self.units.iter().map(|e| e.unit.id().to_string()).collect()
    }

    /// Registers an update unit.
    ///
    /// Fails with [`CoreError::DuplicateUnit`] if the identifier is
    /// taken.
    pub fn register(&mut self, unit: Box<dyn UpdateUnit>) -> CoreResult<()> {
        if self.contains(unit.id()) {
            return Err(CoreError::DuplicateUnit(unit.id().to_string()));
        }
        self.units.push(UnitEntry {
            unit,
            seq: self.next_seq,
            after: Vec::new(),
        });
        self.next_seq += 1;
        self.order = None;
        Ok(())
    }

    /// Unregisters a unit and drops every dependency edge touching it.
    pub fn unregister(&mut self, id: &str) -> CoreResult<()> {
        let idx = self
            .units
            .iter()
            .position(|e| e.unit.id() == id)
            .ok_or_else(|| CoreError::UnknownUnit(id.to_string()))?;
        self.units.remove(idx);
        for entry in &mut self.units {
            entry.after.retain(|dep| dep != id);
        }
        self.order = None;
        Ok(())
    }

    /// Declares that `unit` runs after `runs_after`.
    ///
    /// Fails with [`CoreError::CyclicDependency`] if the edge would
    /// close a cycle; the failed call records nothing.
    pub fn set_dependency(&mut self, unit: &str, runs_after: &str) -> CoreResult<()> {
        if !self.contains(unit) {
            return Err(CoreError::UnknownUnit(unit.to_string()));
        }
        if !self.contains(runs_after) {
            return Err(CoreError::UnknownUnit(runs_after.to_string()));
        }
        if unit == runs_after || self.runs_transitively_after(runs_after, unit) {
            return Err(CoreError::CyclicDependency {
                unit: unit.to_string(),
                runs_after: runs_after.to_string(),
            });
        }

        let entry = self
            .units
            .iter_mut()
            .find(|e| e.unit.id() == unit)
            .ok_or_else(|| CoreError::UnknownUnit(unit.to_string()))?;
        if !entry.after.iter().any(|dep| dep == runs_after) {
            entry.after.push(runs_after.to_string());
            self.order = None;
        }
        Ok(())
    }

    /// The resolved execution order, as unit identifiers.
    pub fn resolved_order(&mut self) -> CoreResult<Vec<String>> {
        let order = self.ensure_order()?;
        Ok(order
            .iter()
            .map(|&idx| self.units[idx].unit.id().to_string())
            .collect())
    }

    /// Runs one update pass.
    ///
    /// Every unit runs in resolved order; a failing unit is isolated
    /// (counted, alerted, logged) and the pass continues.
    pub fn update(&mut self, world: &mut World, delta_time: f64) -> CoreResult<TickStats> {
        let order = self.ensure_order()?;
        self.tick += 1;
        let tick = self.tick;

        let tick_start = Instant::now();
        let mut unit_timings = Vec::with_capacity(order.len());
        let mut failures = 0u32;

        for idx in order {
            let entry = &mut self.units[idx];
            let required = entry.unit.required_components();
            let entities = if required.is_empty() {
                Vec::new()
            } else {
                world.execute_query(&Query::new().with_all(&required))
            };

            let run = UnitRun {
                delta_time,
                tick,
                entities,
            };

            let started = Instant::now();
            let result = entry.unit.update(world, &run);
            unit_timings.push((entry.unit.id().to_string(), started.elapsed()));

            if let Err(error) = result {
                failures += 1;
                let id = entry.unit.id().to_string();
                self.metrics.increment("scheduler.unit_failures", 1);
                self.metrics.raise(
                    &format!("scheduler.unit.{id}"),
                    AlertLevel::Error,
                    1.0,
                    0.0,
                );
                tracing::warn!(unit = %id, %error, "update unit failed; continuing pass");
            }
        }

        let duration = tick_start.elapsed();
        self.metrics
            .observe("scheduler.tick_ms", duration.as_secs_f64() * 1000.0);

        Ok(TickStats {
            tick,
            duration,
            unit_timings,
            failures,
        })
    }

    /// Runs one render pass over the resolved order.
    ///
    /// Always follows a completed update pass; render units observe
    /// every update's output. Failures are isolated exactly like update
    /// failures.
    pub fn render(&mut self, world: &World, surface: &mut dyn RenderSurface) -> CoreResult<()> {
        let order = self.ensure_order()?;

        for idx in order {
            let entry = &mut self.units[idx];
            if let Err(error) = entry.unit.render(world, surface) {
                let id = entry.unit.id().to_string();
                self.metrics.increment("scheduler.render_failures", 1);
                self.metrics.raise(
                    &format!("scheduler.unit.{id}"),
                    AlertLevel::Error,
                    1.0,
                    0.0,
                );
                tracing::warn!(unit = %id, %error, "render unit failed; continuing pass");
            }
        }
        Ok(())
    }

    /// Current tick number.
    #[must_use]
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// True if a path `from -> ... -> to` exists in the after-relation.
    fn runs_transitively_after(&self, from: &str, to: &str) -> bool {
        let mut stack = vec![from.to_string()];
        let mut visited: Vec<String> = Vec::new();

        while let Some(current) = stack.pop() {
            if current == to {
                return true;
            }
            if visited.contains(&current) {
                continue;
            }
            visited.push(current.clone());

            if let Some(entry) = self.units.iter().find(|e| e.unit.id() == current) {
                stack.extend(entry.after.iter().cloned());
            }
        }
        false
    }

    fn ensure_order(&mut self) -> CoreResult<Vec<usize>> {
        if self.order.is_none() {
            self.order = Some(self.compute_order()?);
        }
        Ok(self.order.clone().unwrap_or_default())
    }

    /// Stable topological sort: Kahn's algorithm with a deterministic
    /// ready-set pick (priority desc, then registration order).
    fn compute_order(&self) -> CoreResult<Vec<usize>> {
        let index_of: HashMap<&str, usize> = self
            .units
            .iter()
            .enumerate()
            .map(|(i, e)| (e.unit.id(), i))
            .collect();

        let mut in_degree = vec![0usize; self.units.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.units.len()];

        for (i, entry) in self.units.iter().enumerate() {
            for dep in &entry.after {
                if let Some(&d) = index_of.get(dep.as_str()) {
                    in_degree[i] += 1;
                    dependents[d].push(i);
                }
            }
        }

        let mut ready: Vec<usize> = (0..self.units.len())
            .filter(|&i| in_degree[i] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.units.len());

        while !ready.is_empty() {
            // Deterministic pick: highest priority, then earliest
            // registration.
            let pick = ready
                .iter()
                .enumerate()
                .min_by_key(|&(_, &i)| {
                    (
                        std::cmp::Reverse(self.units[i].unit.priority()),
                        self.units[i].seq,
                    )
                })
                .map(|(pos, _)| pos)
                .unwrap_or(0);
            let next = ready.swap_remove(pick);
            order.push(next);

            for &dep in &dependents[next] {
                in_degree[dep] -= 1;
                if in_degree[dep] == 0 {
                    ready.push(dep);
                }
            }
        }

        if order.len() < self.units.len() {
            // Guarded against at edge insertion; only a bug could land
            // here, but the error is still a clean refusal.
            let stuck = self
                .units
                .iter()
                .enumerate()
                .find(|&(i, _)| in_degree[i] > 0)
                .map(|(_, e)| e.unit.id().to_string())
                .unwrap_or_default();
            let dep = self
                .units
                .iter()
                .find(|e| e.unit.id() == stuck)
                .and_then(|e| e.after.first().cloned())
                .unwrap_or_default();
            return Err(CoreError::CyclicDependency {
                unit: stuck,
                runs_after: dep,
            });
        }
        Ok(order)
    }
}
