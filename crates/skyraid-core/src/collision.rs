//! Pairwise overlap detection between bullets, enemies, players and power-ups.
//!
//! Detection is pure: it reports every overlapping pair in a fully id-ordered
//! form and leaves damage application to the caller, which resolves each
//! bullet against the first candidate that is still alive.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::geometry::Aabb;

/// Overlap test used for every pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HitShape {
    #[default]
    Aabb,
    /// Circles with radius equal to the larger half extent.
    Circle,
}

impl HitShape {
    pub fn overlaps(self, a: &Aabb, b: &Aabb) -> bool {
        match self {
            HitShape::Aabb => a.overlaps(b),
            HitShape::Circle => a.circles_overlap(b),
        }
    }
}

/// Which [`BroadPhase`] a room uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BroadPhaseKind {
    #[default]
    Scan,
    Grid,
}

/// A collidable body keyed by an ordered id.
#[derive(Debug, Clone, PartialEq)]
pub struct Body<K> {
    pub id: K,
    pub bounds: Aabb,
}

impl<K> Body<K> {
    pub fn new(id: K, bounds: Aabb) -> Self {
        Self { id, bounds }
    }
}

/// Candidate selection for one category of targets.
///
/// `query` pushes indices into the slice passed to `build`. Implementations
/// may over-report; the exact shape test runs afterwards.
pub trait BroadPhase {
    fn build(targets: &[Aabb]) -> Self;
    fn query(&self, area: &Aabb, out: &mut Vec<usize>);
}

/// Tests every target.
#[derive(Debug, Clone)]
pub struct BruteForce {
    len: usize,
}

impl BroadPhase for BruteForce {
    fn build(targets: &[Aabb]) -> Self {
        Self { len: targets.len() }
    }

    fn query(&self, _area: &Aabb, out: &mut Vec<usize>) {
        out.extend(0..self.len);
    }
}

/// Uniform spatial hash. Each target is registered in every cell its box covers.
///
/// Boxes spanning more than `MAX_SPAN` cells on an axis, or with non-finite
/// bounds, bypass the cells: such targets are returned by every query, and
/// such query areas scan every target.
#[derive(Debug, Clone)]
pub struct UniformGrid {
    cell: f32,
    len: usize,
    cells: HashMap<(i32, i32), Vec<usize>>,
    oversized: Vec<usize>,
}

impl UniformGrid {
    pub const DEFAULT_CELL_SIZE: f32 = 64.0;
    pub const MAX_SPAN: i64 = 64;

    pub fn with_cell_size(targets: &[Aabb], cell: f32) -> Self {
        let cell = if cell.is_finite() && cell > 0.0 {
            cell
        } else {
            Self::DEFAULT_CELL_SIZE
        };
        let mut grid = Self {
            cell,
            len: targets.len(),
            cells: HashMap::new(),
            oversized: Vec::new(),
        };
        for (i, bounds) in targets.iter().enumerate() {
            let Some((x0, y0, x1, y1)) = grid.cell_range(bounds) else {
                grid.oversized.push(i);
                continue;
            };
            for cx in x0..=x1 {
                for cy in y0..=y1 {
                    grid.cells.entry((cx, cy)).or_default().push(i);
                }
            }
        }
        grid
    }

    fn cell_range(&self, bounds: &Aabb) -> Option<(i32, i32, i32, i32)> {
        let min = bounds.min();
        let max = bounds.max();
        if ![min.x, min.y, max.x, max.y].iter().all(|v| v.is_finite()) {
            return None;
        }
        let c = |v: f32| (v / self.cell).floor() as i64;
        let (x0, y0, x1, y1) = (c(min.x), c(min.y), c(max.x), c(max.y));
        if x1 - x0 > Self::MAX_SPAN || y1 - y0 > Self::MAX_SPAN {
            return None;
        }
        let fit = |v: i64| i32::try_from(v).ok();
        Some((fit(x0)?, fit(y0)?, fit(x1)?, fit(y1)?))
    }
}

impl BroadPhase for UniformGrid {
    fn build(targets: &[Aabb]) -> Self {
        Self::with_cell_size(targets, Self::DEFAULT_CELL_SIZE)
    }

    fn query(&self, area: &Aabb, out: &mut Vec<usize>) {
        let start = out.len();
        match self.cell_range(area) {
            Some((x0, y0, x1, y1)) => {
                for cx in x0..=x1 {
                    for cy in y0..=y1 {
                        if let Some(list) = self.cells.get(&(cx, cy)) {
                            out.extend_from_slice(list);
                        }
                    }
                }
                out.extend_from_slice(&self.oversized);
            },
            None => out.extend(0..self.len),
        }
        out[start..].sort_unstable();
        let mut tail = out.split_off(start);
        tail.dedup();
        out.extend(tail);
    }
}

/// One bullet and every target it overlaps, lowest id first.
#[derive(Debug, Clone, PartialEq)]
pub struct BulletContact<B, T> {
    pub bullet: B,
    pub targets: Vec<T>,
}

/// A non-bullet body and the players it touches, lowest id first.
#[derive(Debug, Clone, PartialEq)]
pub struct Touch<A, P> {
    pub body: A,
    pub players: Vec<P>,
}

/// Bodies participating in one detection pass, grouped by kind.
#[derive(Debug, Clone, Copy)]
pub struct CollisionSet<'a, E, P> {
    pub player_bullets: &'a [Body<E>],
    pub enemy_bullets: &'a [Body<E>],
    pub enemies: &'a [Body<E>],
    /// Living players only.
    pub players: &'a [Body<P>],
    pub powerups: &'a [Body<E>],
}

/// Everything that overlapped this tick, sorted by the acting body's id.
#[derive(Debug, Clone, PartialEq)]
pub struct Contacts<E, P> {
    pub enemy_hits: Vec<BulletContact<E, E>>,
    pub player_hits: Vec<BulletContact<E, P>>,
    pub rams: Vec<Touch<E, P>>,
    pub pickups: Vec<Touch<E, P>>,
}

impl<E, P> Default for Contacts<E, P> {
    fn default() -> Self {
        Self {
            enemy_hits: Vec::new(),
            player_hits: Vec::new(),
            rams: Vec::new(),
            pickups: Vec::new(),
        }
    }
}

impl<E, P> Contacts<E, P> {
    pub fn is_empty(&self) -> bool {
        self.enemy_hits.is_empty()
            && self.player_hits.is_empty()
            && self.rams.is_empty()
            && self.pickups.is_empty()
    }
}

/// Detect with the brute-force scan.
pub fn detect<E, P>(set: &CollisionSet<'_, E, P>, shape: HitShape) -> Contacts<E, P>
where
    E: Ord + Clone,
    P: Ord + Clone,
{
    detect_with::<BruteForce, E, P>(set, shape)
}

/// Detect with the configured broad phase.
pub fn detect_by<E, P>(set: &CollisionSet<'_, E, P>, shape: HitShape, kind: BroadPhaseKind) -> Contacts<E, P>
where
    E: Ord + Clone,
    P: Ord + Clone,
{
    match kind {
        BroadPhaseKind::Scan => detect_with::<BruteForce, E, P>(set, shape),
        BroadPhaseKind::Grid => detect_with::<UniformGrid, E, P>(set, shape),
    }
}

/// Detect using `B` as the broad phase for every target category.
pub fn detect_with<B, E, P>(set: &CollisionSet<'_, E, P>, shape: HitShape) -> Contacts<E, P>
where
    B: BroadPhase,
    E: Ord + Clone,
    P: Ord + Clone,
{
    let enemy_index = B::build(&bounds_of(set.enemies));
    let player_index = B::build(&bounds_of(set.players));
    let mut scratch = Vec::new();

    let mut contacts = Contacts {
        enemy_hits: overlapping(
            set.player_bullets,
            set.enemies,
            &enemy_index,
            shape,
            &mut scratch,
        )
        .into_iter()
        .map(|(bullet, targets)| BulletContact { bullet, targets })
        .collect(),
        player_hits: overlapping(
            set.enemy_bullets,
            set.players,
            &player_index,
            shape,
            &mut scratch,
        )
        .into_iter()
        .map(|(bullet, targets)| BulletContact { bullet, targets })
        .collect(),
        rams: overlapping(set.enemies, set.players, &player_index, shape, &mut scratch)
            .into_iter()
            .map(|(body, players)| Touch { body, players })
            .collect(),
        pickups: overlapping(set.powerups, set.players, &player_index, shape, &mut scratch)
            .into_iter()
            .map(|(body, players)| Touch { body, players })
            .collect(),
    };

    contacts.enemy_hits.sort_by(|a, b| a.bullet.cmp(&b.bullet));
    contacts.player_hits.sort_by(|a, b| a.bullet.cmp(&b.bullet));
    contacts.rams.sort_by(|a, b| a.body.cmp(&b.body));
    contacts.pickups.sort_by(|a, b| a.body.cmp(&b.body));
    contacts
}

fn bounds_of<K>(bodies: &[Body<K>]) -> Vec<Aabb> {
    bodies.iter().map(|b| b.bounds).collect()
}

/// For each actor, the sorted ids of every overlapping target. Actors without
/// a contact are omitted.
fn overlapping<A, T, B>(
    actors: &[Body<A>],
    targets: &[Body<T>],
    index: &B,
    shape: HitShape,
    scratch: &mut Vec<usize>,
) -> Vec<(A, Vec<T>)>
where
    A: Clone,
    T: Ord + Clone,
    B: BroadPhase,
{
    let mut out = Vec::new();
    if targets.is_empty() {
        return out;
    }
    for actor in actors {
        scratch.clear();
        index.query(&actor.bounds, scratch);
        let mut hit: Vec<T> = scratch
            .iter()
            .filter_map(|&i| targets.get(i))
            .filter(|t| shape.overlaps(&actor.bounds, &t.bounds))
            .map(|t| t.id.clone())
            .collect();
        if hit.is_empty() {
            continue;
        }
        hit.sort();
        hit.dedup();
        out.push((actor.id.clone(), hit));
    }
    out
}
