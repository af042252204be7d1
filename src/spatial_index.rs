use rstar::{primitives::GeomWithData, PointDistance, RTree};

use crate::error::{Error, Result};

/// A point returned by a fixed-radius range query.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Hit {
    /// The index of the point in the slice the index was built from.
    pub index: usize,
    /// The squared distance from the query point, if the index computed it.
    pub dist2: Option<f64>,
}

/// How the number of result slots of a range query is chosen.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SearchMode {
    /// Count the points within the radius first, then allocate exactly that many slots.
    #[default]
    Exact,
    /// Allocate one slot for every point in the index, skipping the counting pass.
    Approximate,
}

/// A rebuildable structure answering fixed-radius range queries over a point set.
pub trait SpatialIndex {
    /// Replaces the indexed point set.
    fn rebuild(&mut self, positions: &[[f64; 3]]);

    /// The number of indexed points.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of points within `radius` of `point`, without allocating.
    fn count_within(&self, point: &[f64; 3], radius: f64) -> usize;

    /// Appends all points within `radius` of `point` to `out`, in unspecified order.
    fn query_into(&self, point: &[f64; 3], radius: f64, out: &mut Vec<Hit>);

    /// Returns all points within `radius` of `point`.
    ///
    /// Both modes return the same set of points and only differ in how the result buffer is sized.
    fn query_radius(&self, point: &[f64; 3], radius: f64, mode: SearchMode) -> Result<Vec<Hit>> {
        let capacity = match mode {
            SearchMode::Exact => self.count_within(point, radius),
            SearchMode::Approximate => self.len(),
        };
        let mut hits = Vec::new();
        hits.try_reserve_exact(capacity)
            .map_err(|_| Error::Allocation { requested: capacity })?;
        self.query_into(point, radius, &mut hits);
        Ok(hits)
    }
}

type IndexedPoint = GeomWithData<[f64; 3], usize>;

/// A spatial index backed by a bulk-loaded R*-tree.
#[derive(Default, Debug, Clone)]
pub struct RTreeIndex {
    tree: RTree<IndexedPoint>,
}

impl SpatialIndex for RTreeIndex {
    fn rebuild(&mut self, positions: &[[f64; 3]]) {
        let points = positions
            .iter()
            .enumerate()
            .map(|(idx, pos)| IndexedPoint::new(*pos, idx))
            .collect();
        self.tree = RTree::bulk_load(points);
    }

    fn len(&self) -> usize {
        self.tree.size()
    }

    fn count_within(&self, point: &[f64; 3], radius: f64) -> usize {
        self.tree
            .locate_within_distance(*point, radius * radius)
            .count()
    }

    fn query_into(&self, point: &[f64; 3], radius: f64, out: &mut Vec<Hit>) {
        out.extend(
            self.tree
                .locate_within_distance(*point, radius * radius)
                .map(|item| Hit {
                    index: item.data,
                    dist2: Some(item.distance_2(point)),
                }),
        );
    }
}

/// A linear scan over all points.
/// Queries cost O(n), so this is only suitable for small systems and as a reference.
#[derive(Default, Debug, Clone)]
pub struct BruteForceIndex {
    positions: Vec<[f64; 3]>,
}

impl BruteForceIndex {
    fn within<'t>(&'t self, point: &'t [f64; 3], radius: f64) -> impl Iterator<Item = usize> + 't {
        let radius2 = radius * radius;
        self.positions
            .iter()
            .enumerate()
            .filter(move |(_, pos)| distance_squared(pos, point) <= radius2)
            .map(|(idx, _)| idx)
    }
}

impl SpatialIndex for BruteForceIndex {
    fn rebuild(&mut self, positions: &[[f64; 3]]) {
        self.positions.clear();
        self.positions.extend_from_slice(positions);
    }

    fn len(&self) -> usize {
        self.positions.len()
    }

    fn count_within(&self, point: &[f64; 3], radius: f64) -> usize {
        self.within(point, radius).count()
    }

    /// The scan does not report distances, so callers recompute them from the positions.
    fn query_into(&self, point: &[f64; 3], radius: f64, out: &mut Vec<Hit>) {
        out.extend(
            self.within(point, radius)
                .map(|index| Hit { index, dist2: None }),
        );
    }
}

/// The squared euclidean distance between two points.
pub fn distance_squared(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}
