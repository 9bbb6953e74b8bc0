//! Ball-tree over geographic points with the Haversine metric.
//!
//! Each node stores a center and the maximum great-circle distance from that
//! center to any point beneath it, which makes triangle-inequality pruning
//! valid for any center choice. Leaves hold a handful of points and are
//! scanned linearly.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::haversine_km;

const LEAF_SIZE: usize = 8;

/// Ball-tree over (lat, lng) points in degrees.
///
/// Indices returned by queries are positions in the slice the tree was
/// built from.
#[derive(Debug)]
pub struct BallTree {
    points: Vec<(f64, f64)>,
    root: Option<Node>,
}

#[derive(Debug)]
struct Node {
    center: (f64, f64),
    /// Max distance from `center` to any point in this subtree, km.
    radius_km: f64,
    kind: NodeKind,
}

#[derive(Debug)]
enum NodeKind {
    Leaf(Vec<u32>),
    Branch(Box<Node>, Box<Node>),
}

/// Max-heap entry for k-NN; largest distance on top so it can be evicted.
struct HeapEntry {
    dist: f64,
    idx: u32,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.dist == other.dist && self.idx == other.idx
    }
}
impl Eq for HeapEntry {}
impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist.total_cmp(&other.dist)
    }
}

impl BallTree {
    /// Build a tree from points in degrees.
    pub fn build(points: Vec<(f64, f64)>) -> Self {
        let indices: Vec<u32> = (0..points.len() as u32).collect();
        let root = if indices.is_empty() {
            None
        } else {
            Some(build_node(&points, indices))
        };
        Self { points, root }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// All points within `radius_km` of `center`, sorted by distance
    /// ascending.
    pub fn within_radius(&self, center: (f64, f64), radius_km: f64) -> Vec<(usize, f64)> {
        let mut out = Vec::new();
        if let Some(root) = &self.root {
            collect_radius(root, &self.points, center, radius_km, &mut out);
        }
        out.sort_by(|a, b| a.1.total_cmp(&b.1));
        out
    }

    /// The `k` nearest points to `center`, sorted by distance ascending.
    pub fn nearest(&self, center: (f64, f64), k: usize) -> Vec<(usize, f64)> {
        if k == 0 {
            return Vec::new();
        }
        let mut heap: BinaryHeap<HeapEntry> = BinaryHeap::with_capacity(k + 1);
        if let Some(root) = &self.root {
            collect_nearest(root, &self.points, center, k, &mut heap);
        }
        let mut out: Vec<(usize, f64)> = heap
            .into_iter()
            .map(|e| (e.idx as usize, e.dist))
            .collect();
        out.sort_by(|a, b| a.1.total_cmp(&b.1));
        out
    }
}

fn build_node(points: &[(f64, f64)], indices: Vec<u32>) -> Node {
    let center = centroid(points, &indices);
    let radius_km = indices
        .iter()
        .map(|&i| haversine_km(center, points[i as usize]))
        .fold(0.0, f64::max);

    if indices.len() <= LEAF_SIZE {
        return Node {
            center,
            radius_km,
            kind: NodeKind::Leaf(indices),
        };
    }

    // Farthest-point split: a = farthest from center, b = farthest from a.
    let a = *indices
        .iter()
        .max_by(|&&x, &&y| {
            haversine_km(center, points[x as usize])
                .total_cmp(&haversine_km(center, points[y as usize]))
        })
        .expect("non-empty node");
    let b = *indices
        .iter()
        .max_by(|&&x, &&y| {
            haversine_km(points[a as usize], points[x as usize])
                .total_cmp(&haversine_km(points[a as usize], points[y as usize]))
        })
        .expect("non-empty node");

    let (mut left, mut right) = (Vec::new(), Vec::new());
    for &i in &indices {
        let da = haversine_km(points[i as usize], points[a as usize]);
        let db = haversine_km(points[i as usize], points[b as usize]);
        if da <= db {
            left.push(i);
        } else {
            right.push(i);
        }
    }

    // Coincident points defeat the split; fall back to a flat leaf.
    if left.is_empty() || right.is_empty() {
        return Node {
            center,
            radius_km,
            kind: NodeKind::Leaf(indices),
        };
    }

    Node {
        center,
        radius_km,
        kind: NodeKind::Branch(
            Box::new(build_node(points, left)),
            Box::new(build_node(points, right)),
        ),
    }
}

fn centroid(points: &[(f64, f64)], indices: &[u32]) -> (f64, f64) {
    let n = indices.len() as f64;
    let (mut lat, mut lng) = (0.0, 0.0);
    for &i in indices {
        lat += points[i as usize].0;
        lng += points[i as usize].1;
    }
    (lat / n, lng / n)
}

fn collect_radius(
    node: &Node,
    points: &[(f64, f64)],
    center: (f64, f64),
    radius_km: f64,
    out: &mut Vec<(usize, f64)>,
) {
    let to_center = haversine_km(center, node.center);
    if to_center - node.radius_km > radius_km {
        return;
    }
    match &node.kind {
        NodeKind::Leaf(indices) => {
            for &i in indices {
                let d = haversine_km(center, points[i as usize]);
                if d <= radius_km {
                    out.push((i as usize, d));
                }
            }
        }
        NodeKind::Branch(left, right) => {
            collect_radius(left, points, center, radius_km, out);
            collect_radius(right, points, center, radius_km, out);
        }
    }
}

fn collect_nearest(
    node: &Node,
    points: &[(f64, f64)],
    center: (f64, f64),
    k: usize,
    heap: &mut BinaryHeap<HeapEntry>,
) {
    let to_center = haversine_km(center, node.center);
    if heap.len() == k {
        let worst = heap.peek().map(|e| e.dist).unwrap_or(f64::INFINITY);
        if to_center - node.radius_km > worst {
            return;
        }
    }
    match &node.kind {
        NodeKind::Leaf(indices) => {
            for &i in indices {
                let d = haversine_km(center, points[i as usize]);
                if heap.len() < k {
                    heap.push(HeapEntry { dist: d, idx: i });
                } else if d < heap.peek().map(|e| e.dist).unwrap_or(f64::INFINITY) {
                    heap.pop();
                    heap.push(HeapEntry { dist: d, idx: i });
                }
            }
        }
        NodeKind::Branch(left, right) => {
            // Descend the closer child first to tighten the bound early.
            let dl = haversine_km(center, left.center);
            let dr = haversine_km(center, right.center);
            if dl <= dr {
                collect_nearest(left, points, center, k, heap);
                collect_nearest(right, points, center, k, heap);
            } else {
                collect_nearest(right, points, center, k, heap);
                collect_nearest(left, points, center, k, heap);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn random_ghana_points(n: usize, seed: u64) -> Vec<(f64, f64)> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        (0..n)
            .map(|_| {
                (
                    rng.gen_range(4.74..11.17),
                    rng.gen_range(-3.26..1.20),
                )
            })
            .collect()
    }

    fn brute_radius(points: &[(f64, f64)], center: (f64, f64), r: f64) -> Vec<(usize, f64)> {
        let mut out: Vec<(usize, f64)> = points
            .iter()
            .enumerate()
            .map(|(i, &p)| (i, haversine_km(center, p)))
            .filter(|&(_, d)| d <= r)
            .collect();
        out.sort_by(|a, b| a.1.total_cmp(&b.1));
        out
    }

    #[test]
    fn radius_matches_brute_force() {
        let points = random_ghana_points(300, 7);
        let tree = BallTree::build(points.clone());
        for &center in &[(7.9465, -1.0232), (5.6037, -0.1870), (10.0, -2.5)] {
            for &r in &[25.0, 80.0, 200.0] {
                let got = tree.within_radius(center, r);
                let want = brute_radius(&points, center, r);
                assert_eq!(got.len(), want.len(), "center {center:?} r {r}");
                for (g, w) in got.iter().zip(&want) {
                    assert!((g.1 - w.1).abs() < 1e-9);
                }
            }
        }
    }

    #[test]
    fn nearest_matches_brute_force() {
        let points = random_ghana_points(250, 11);
        let tree = BallTree::build(points.clone());
        let center = (6.5, -1.0);
        for k in [1, 5, 17] {
            let got = tree.nearest(center, k);
            let mut want: Vec<(usize, f64)> = points
                .iter()
                .enumerate()
                .map(|(i, &p)| (i, haversine_km(center, p)))
                .collect();
            want.sort_by(|a, b| a.1.total_cmp(&b.1));
            want.truncate(k);
            assert_eq!(got.len(), k);
            for (g, w) in got.iter().zip(&want) {
                assert!((g.1 - w.1).abs() < 1e-9, "k={k} got {g:?} want {w:?}");
            }
        }
    }

    #[test]
    fn empty_and_singleton_trees() {
        let empty = BallTree::build(vec![]);
        assert!(empty.within_radius((5.0, 0.0), 100.0).is_empty());
        assert!(empty.nearest((5.0, 0.0), 3).is_empty());

        let one = BallTree::build(vec![(6.0, -1.0)]);
        assert_eq!(one.nearest((6.0, -1.0), 5).len(), 1);
    }

    #[test]
    fn coincident_points_build_a_leaf() {
        let points = vec![(6.0, -1.0); 40];
        let tree = BallTree::build(points);
        assert_eq!(tree.within_radius((6.0, -1.0), 1.0).len(), 40);
        assert_eq!(tree.nearest((6.0, -1.0), 3).len(), 3);
    }
}
