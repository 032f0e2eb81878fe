//! Complete-linkage agglomerative clustering.

use crate::{
    fXX,
    math::{MathError, powi, sqrt},
};

/// Cluster 3D points by complete-linkage agglomeration with a distance cutoff.
///
/// Two clusters are merged while the *maximum* pairwise distance between their
/// members does not exceed `radius`, always merging the closest pair first.
/// Returns the member indices of each cluster; the union of all clusters is
/// exactly `0..points.len()` and the ordering of clusters is unspecified.
pub fn complete_linkage<T>(points: &[[T; 3]], radius: T) -> Result<Vec<Vec<usize>>, MathError<T>>
where
    T: fXX,
{
    if radius <= T::zero() {
        return Err(MathError::InvalidParameter {
            name: "radius",
            value: radius,
        });
    }

    if points.is_empty() {
        return Ok(Vec::new());
    }

    let n = points.len();

    let mut clusters = (0..n).map(|idx| vec![idx]).collect::<Vec<Vec<usize>>>();

    // Complete-linkage distances between active clusters, updated with the
    // Lance-Williams rule d(a∪b, k) = max(d(a,k), d(b,k)).
    let mut dist = vec![vec![T::zero(); n]; n];

    for i in 0..n {
        for j in (i + 1)..n {
            let d = sqrt!(
                powi!(points[i][0] - points[j][0], 2)
                    + powi!(points[i][1] - points[j][1], 2)
                    + powi!(points[i][2] - points[j][2], 2)
            );

            dist[i][j] = d;
            dist[j][i] = d;
        }
    }

    let mut active = (0..n).collect::<Vec<usize>>();

    loop {
        let mut best: Option<(T, usize, usize)> = None;

        for (adx, &a) in active.iter().enumerate() {
            for &b in active.iter().skip(adx + 1) {
                let d = dist[a][b];

                if d <= radius && best.map(|(bd, ..)| d < bd).unwrap_or(true) {
                    best = Some((d, a, b));
                }
            }
        }

        let Some((_, a, b)) = best else {
            break;
        };

        let members = clusters[b].clone();
        clusters[a].extend(members);
        active.retain(|&idx| idx != b);

        for &k in &active {
            if k != a {
                let d = if dist[a][k] >= dist[b][k] {
                    dist[a][k]
                } else {
                    dist[b][k]
                };

                dist[a][k] = d;
                dist[k][a] = d;
            }
        }
    }

    Ok(active
        .into_iter()
        .map(|idx| std::mem::take(&mut clusters[idx]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_well_separated_groups() {
        let points = [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [100.0, 100.0, 0.0],
            [101.0, 100.0, 0.0],
        ];

        let mut clusters = complete_linkage(&points, 5.0).unwrap();
        clusters.iter_mut().for_each(|c| c.sort());
        clusters.sort();

        assert_eq!(clusters, vec![vec![0, 1, 2], vec![3, 4]]);
    }

    #[test]
    fn test_radius_limits_merging() {
        let points = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [2.1, 0.0, 0.0]];

        // Complete linkage: merging all three would give a 2.1 diameter.
        let clusters = complete_linkage(&points, 2.0).unwrap();

        assert_eq!(clusters.len(), 2);
    }

    #[test]
    fn test_empty_and_invalid_input() {
        assert!(complete_linkage::<f64>(&[], 1.0).unwrap().is_empty());
        assert!(complete_linkage(&[[0.0, 0.0, 0.0]], -1.0).is_err());
    }
}
