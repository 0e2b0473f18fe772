//! Toolpath ordering optimizer.
//!
//! Reorders disjoint strokes of one category to shorten pen-up travel
//! between consecutive strokes. Greedy nearest-neighbor: seed with the first
//! stroke, then repeatedly pick the unvisited stroke whose start point is
//! closest to the current stroke's end point. O(N²), which is fine for the
//! few-hundred-stroke jobs this targets; spatial indexing would be the
//! extension beyond that.

use plotkit_core::{Point, Polyline};

/// Order items by greedy nearest-neighbor travel, parameterized by start
/// and end point extractors.
///
/// Returns a permutation of the input: nothing is dropped or duplicated.
/// Ties are resolved in favor of the earlier original index. Lists of one
/// or zero items are returned unchanged. Items whose distance to the
/// current end is undefined (non-finite) are skipped during selection and
/// appended in original order at the end.
pub fn order_by_travel<T, S, E>(items: &[T], start_of: S, end_of: E) -> Vec<T>
where
    T: Clone,
    S: Fn(&T) -> Point,
    E: Fn(&T) -> Point,
{
    if items.len() <= 1 {
        return items.to_vec();
    }

    let starts: Vec<Point> = items.iter().map(&start_of).collect();
    let mut visited = vec![false; items.len()];
    let mut order = Vec::with_capacity(items.len());

    let mut current = 0;
    visited[0] = true;
    order.push(0);

    while order.len() < items.len() {
        let from = end_of(&items[current]);
        let mut nearest: Option<(usize, f64)> = None;

        for (candidate, candidate_start) in starts.iter().enumerate() {
            if visited[candidate] {
                continue;
            }
            let dist = from.distance_squared_to(candidate_start);
            if !dist.is_finite() {
                continue;
            }
            // Strict comparison keeps the earlier index on ties.
            match nearest {
                Some((_, best)) if dist >= best => {}
                _ => nearest = Some((candidate, dist)),
            }
        }

        match nearest {
            Some((next, _)) => {
                visited[next] = true;
                order.push(next);
                current = next;
            }
            None => {
                // All remaining distances undefined: append remainder in
                // original order.
                for (candidate, seen) in visited.iter_mut().enumerate() {
                    if !*seen {
                        *seen = true;
                        order.push(candidate);
                    }
                }
            }
        }
    }

    order.into_iter().map(|i| items[i].clone()).collect()
}

/// Order the strokes of one category by greedy travel between the end of
/// one stroke and the start of the next.
pub fn optimize_strokes(strokes: &[Polyline]) -> Vec<Polyline> {
    order_by_travel(strokes, Polyline::start, Polyline::end)
}
